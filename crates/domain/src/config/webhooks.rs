use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Webhook delivery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Per-request timeout for a single delivery attempt.
    #[serde(default = "d_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "d_user_agent")]
    pub user_agent: String,

    /// Environment variable holding an HMAC-SHA256 signing secret. When the
    /// variable is set and non-empty, every delivery carries
    /// `X-Hookline-Signature: sha256=<hex>` over the request body.
    #[serde(default = "d_signing_secret_env")]
    pub signing_secret_env: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: d_timeout(),
            user_agent: d_user_agent(),
            signing_secret_env: d_signing_secret_env(),
        }
    }
}

fn d_timeout() -> u64 {
    10
}
fn d_user_agent() -> String {
    "Hookline-Webhook/1.0".into()
}
fn d_signing_secret_env() -> String {
    "HL_WEBHOOK_SECRET".into()
}
