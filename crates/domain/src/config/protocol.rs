use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Protocol backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolBackend {
    /// In-process client that never leaves the machine.
    #[default]
    Loopback,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub backend: ProtocolBackend,

    /// Loopback only: complete a pending QR / pairing-code exchange on its
    /// own after this many seconds. `None` waits for an explicit pairing.
    #[serde(default)]
    pub auto_pair_after_secs: Option<u64>,
}
