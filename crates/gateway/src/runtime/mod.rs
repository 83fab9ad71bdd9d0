//! Per-user session runtime.
//!
//! [`Runtime`] is the entry point for everything the HTTP layer does on
//! behalf of a user: reading status and stored data, (re)linking the
//! device, and running outbound protocol commands.

pub mod commands;
pub mod ingest;
pub mod machine;
pub mod qr;
pub mod registry;
pub mod session;
pub mod webhooks;

use std::sync::Arc;
use std::time::Duration;

use hl_domain::config::{LinkMethod, SessionsConfig};
use hl_domain::error::Result;
use hl_domain::model::{Message, Webhook};
use hl_domain::UserId;
use hl_protocol::ClientConnector;
use hl_store::{StatsSnapshot, UserStore, WebhookSelector};

pub use ingest::EventIngestor;
pub use machine::{SessionStatus, StatusSnapshot};
pub use registry::SessionRegistry;
pub use session::Session;
pub use webhooks::WebhookDispatcher;

pub struct Runtime {
    registry: Arc<SessionRegistry>,
    store: Arc<UserStore>,
    ingestor: Arc<EventIngestor>,
    default_method: LinkMethod,
    command_timeout: Duration,
    groups_ttl: Duration,
}

impl Runtime {
    pub fn new(
        settings: &SessionsConfig,
        store: Arc<UserStore>,
        connector: Arc<dyn ClientConnector>,
        dispatcher: Arc<WebhookDispatcher>,
    ) -> Self {
        let ingestor = Arc::new(EventIngestor::new(store.clone(), dispatcher));
        let registry = Arc::new(SessionRegistry::new(connector, ingestor.clone(), settings));
        Self {
            registry,
            store,
            ingestor,
            default_method: settings.default_method,
            command_timeout: Duration::from_secs(settings.command_timeout_secs),
            groups_ttl: Duration::from_secs(settings.groups_ttl_secs),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<UserStore> {
        &self.store
    }

    // ── Session lifecycle ────────────────────────────────────────────

    pub fn status(&self, user: &UserId) -> StatusSnapshot {
        self.registry.get_or_create(user).status()
    }

    /// Start (re)linking. `method` falls back to the configured default.
    pub async fn reconnect(
        &self,
        user: &UserId,
        method: Option<LinkMethod>,
        phone: Option<String>,
    ) -> Result<StatusSnapshot> {
        let method = method.unwrap_or(self.default_method);
        self.registry.reconnect(user, method, phone).await
    }

    pub async fn disconnect(&self, user: &UserId) -> Result<()> {
        self.registry.disconnect(user).await
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }

    // ── Stored data ──────────────────────────────────────────────────

    pub async fn stats(&self, user: &UserId) -> Result<StatsSnapshot> {
        self.store.stats_snapshot(user).await
    }

    pub async fn messages(&self, user: &UserId, limit: usize) -> Result<Vec<Message>> {
        self.store.recent_messages(user, limit).await
    }

    pub async fn webhooks(&self, user: &UserId) -> Result<Vec<Webhook>> {
        self.store.webhooks(user).await
    }

    pub async fn register_webhook(
        &self,
        user: &UserId,
        url: &str,
        name: Option<String>,
    ) -> Result<Webhook> {
        self.store.register_webhook(user, url, name).await
    }

    pub async fn unregister_webhook(
        &self,
        user: &UserId,
        selector: WebhookSelector,
    ) -> Result<Webhook> {
        self.store.unregister_webhook(user, selector).await
    }
}
