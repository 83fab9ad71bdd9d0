//! AppState construction extracted from `main.rs`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use hl_domain::config::{Config, ConfigSeverity, ProtocolBackend};
use hl_protocol::loopback::LoopbackConnector;
use hl_protocol::ClientConnector;
use hl_store::UserStore;

use crate::credentials::FileCredentials;
use crate::runtime::{Runtime, WebhookDispatcher};
use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Protocol backend ─────────────────────────────────────────────
    let connector: Arc<dyn ClientConnector> = match config.protocol.backend {
        ProtocolBackend::Loopback => {
            let connector = match config.protocol.auto_pair_after_secs {
                Some(secs) => {
                    tracing::info!(secs, "loopback devices pair automatically");
                    LoopbackConnector::with_auto_pair(Duration::from_secs(secs))
                }
                None => LoopbackConnector::new(),
            };
            tracing::warn!("protocol backend is loopback, no messages leave this process");
            Arc::new(connector)
        }
    };

    assemble(config, connector).await
}

/// Wire the state around an already-built connector.
pub async fn assemble(
    config: Arc<Config>,
    connector: Arc<dyn ClientConnector>,
) -> anyhow::Result<AppState> {
    // ── Per-user store ───────────────────────────────────────────────
    let users_dir = config.storage.users_dir();
    tokio::fs::create_dir_all(&users_dir)
        .await
        .with_context(|| format!("creating {}", users_dir.display()))?;
    let store = Arc::new(UserStore::new(users_dir.clone()));
    tracing::info!(path = %users_dir.display(), "user store ready");

    // ── Webhook dispatcher ───────────────────────────────────────────
    let dispatcher = Arc::new(
        WebhookDispatcher::new(&config.webhooks).context("initializing webhook dispatcher")?,
    );
    if dispatcher.signs_payloads() {
        tracing::info!(
            env = %config.webhooks.signing_secret_env,
            "webhook payload signing enabled"
        );
    }
    tracing::info!(timeout_secs = config.webhooks.timeout_secs, "webhook dispatcher ready");

    // ── Session runtime ──────────────────────────────────────────────
    let runtime = Arc::new(Runtime::new(&config.sessions, store, connector, dispatcher));
    tracing::info!(
        default_method = config.sessions.default_method.as_str(),
        command_timeout_secs = config.sessions.command_timeout_secs,
        "session runtime ready"
    );

    // ── Credentials ──────────────────────────────────────────────────
    let credentials = Arc::new(FileCredentials::new(config.auth.users_file.clone()));
    tracing::info!(path = %config.auth.users_file.display(), "credential file configured");

    Ok(AppState {
        config,
        runtime,
        credentials,
    })
}
