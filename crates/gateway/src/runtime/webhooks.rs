//! Outbound webhook fan-out.
//!
//! Each inbound message is POSTed once to every URL the user registered.
//! One detached task per URL; a slow or failing endpoint never delays the
//! others or the event pump. Delivery is best effort: no retries, failures
//! are logged and dropped.

use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::task::JoinHandle;

use hl_domain::config::WebhookConfig;
use hl_domain::error::{Error, Result};
use hl_domain::model::{Message, Webhook};
use hl_domain::trace::TraceEvent;
use hl_domain::UserId;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex>` over the raw request body.
pub const SIGNATURE_HEADER: &str = "x-hookline-signature";

pub struct WebhookDispatcher {
    client: reqwest::Client,
    signing_secret: Option<Vec<u8>>,
}

impl WebhookDispatcher {
    /// Build from config. The signing secret is read once from the
    /// environment variable named by `signing_secret_env`.
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let secret = std::env::var(&config.signing_secret_env)
            .ok()
            .filter(|s| !s.is_empty())
            .map(String::into_bytes);
        Self::with_secret(
            Duration::from_secs(config.timeout_secs),
            &config.user_agent,
            secret,
        )
    }

    pub fn with_secret(
        timeout: Duration,
        user_agent: &str,
        signing_secret: Option<Vec<u8>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::Config(format!("building webhook HTTP client: {e}")))?;
        Ok(Self {
            client,
            signing_secret,
        })
    }

    pub fn signs_payloads(&self) -> bool {
        self.signing_secret.is_some()
    }

    /// Fire one POST per hook and return immediately. The returned handles
    /// may be awaited or dropped; dropping them does not cancel delivery.
    pub fn dispatch(
        &self,
        user: &UserId,
        message: &Message,
        hooks: &[Webhook],
    ) -> Vec<JoinHandle<()>> {
        if hooks.is_empty() {
            return Vec::new();
        }
        let body = match serde_json::to_vec(message) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(user = %user.short(), error = %e, "serializing webhook payload");
                return Vec::new();
            }
        };
        let signature = self.sign(&body);

        hooks
            .iter()
            .map(|hook| {
                let client = self.client.clone();
                let body = body.clone();
                let signature = signature.clone();
                let user = user.clone();
                let hook_id = hook.id.clone();
                let url = hook.url.clone();
                tokio::spawn(async move {
                    deliver(client, user, hook_id, url, body, signature).await;
                })
            })
            .collect()
    }

    fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.signing_secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret).ok()?;
        mac.update(body);
        Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }
}

async fn deliver(
    client: reqwest::Client,
    user: UserId,
    hook_id: String,
    url: String,
    body: Vec<u8>,
    signature: Option<String>,
) {
    let started = Instant::now();
    let mut req = client
        .post(&url)
        .header("Content-Type", "application/json")
        .body(body);
    if let Some(sig) = signature {
        req = req.header(SIGNATURE_HEADER, sig);
    }

    match req.send().await {
        Ok(resp) if resp.status().is_success() => {
            TraceEvent::WebhookDelivered {
                user_id: user.to_string(),
                webhook_id: hook_id,
                status: resp.status().as_u16(),
                duration_ms: started.elapsed().as_millis() as u64,
            }
            .emit();
        }
        Ok(resp) => {
            tracing::warn!(
                user = %user.short(),
                url = %url,
                status = %resp.status(),
                "webhook returned non-success status"
            );
            TraceEvent::WebhookFailed {
                user_id: user.to_string(),
                webhook_id: hook_id,
                error: format!("HTTP {}", resp.status()),
            }
            .emit();
        }
        Err(e) => {
            tracing::warn!(user = %user.short(), url = %url, error = %e, "webhook delivery failed");
            TraceEvent::WebhookFailed {
                user_id: user.to_string(),
                webhook_id: hook_id,
                error: e.to_string(),
            }
            .emit();
        }
    }
}
