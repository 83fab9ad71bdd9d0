use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a new device link is authorized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMethod {
    /// Scan a QR code from the phone.
    #[default]
    Qr,
    /// Enter a short code on the phone.
    PairingCode,
}

impl LinkMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qr => "qr",
            Self::PairingCode => "pairing_code",
        }
    }
}

/// Per-user session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Method used when a reconnect request does not name one.
    #[serde(default)]
    pub default_method: LinkMethod,

    /// Client name shown on the phone while pairing by code.
    #[serde(default = "d_pairing_client_name")]
    pub pairing_client_name: String,

    /// Upper bound on how long an API caller waits for an outbound
    /// protocol command (send, join, leave). The command itself keeps
    /// running detached past this point.
    #[serde(default = "d_command_timeout")]
    pub command_timeout_secs: u64,

    /// Age after which the in-memory group list is refreshed on read.
    #[serde(default = "d_groups_ttl")]
    pub groups_ttl_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            default_method: LinkMethod::Qr,
            pairing_client_name: d_pairing_client_name(),
            command_timeout_secs: d_command_timeout(),
            groups_ttl_secs: d_groups_ttl(),
        }
    }
}

fn d_pairing_client_name() -> String {
    "Chrome (Windows)".into()
}
fn d_command_timeout() -> u64 {
    30
}
fn d_groups_ttl() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_method_wire_names() {
        assert_eq!(serde_json::to_string(&LinkMethod::Qr).unwrap(), "\"qr\"");
        assert_eq!(
            serde_json::from_str::<LinkMethod>("\"pairing_code\"").unwrap(),
            LinkMethod::PairingCode
        );
        assert!(serde_json::from_str::<LinkMethod>("\"sms\"").is_err());
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let cfg: SessionsConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.default_method, LinkMethod::Qr);
        assert_eq!(cfg.command_timeout_secs, 30);
        assert_eq!(cfg.groups_ttl_secs, 300);
        assert_eq!(cfg.pairing_client_name, "Chrome (Windows)");
    }
}
