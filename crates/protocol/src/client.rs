use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use hl_domain::UserId;

use crate::address::Address;
use crate::error::ProtocolError;
use crate::event::ProtocolEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Value types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Who the linked device is logged in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedIdentity {
    pub push_name: String,
    pub phone: String,
    pub platform: String,
}

/// Items delivered on the QR channel while a QR login is pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrEvent {
    /// A fresh code to render. Codes rotate; only the latest is valid.
    Code(String),
    Success,
    Timeout,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub jid: Address,
    pub name: String,
    pub participants: Vec<Address>,
    /// Only admins may post.
    pub is_announce: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One linked device for one user.
#[async_trait::async_trait]
pub trait ProtocolClient: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Whether stored device credentials exist, i.e. connecting will
    /// authenticate without a QR / pairing-code exchange.
    fn is_paired(&self) -> bool;

    fn identity(&self) -> Option<ConnectedIdentity>;

    async fn connect(&self) -> Result<(), ProtocolError>;

    /// Close the link. Stored credentials are kept.
    async fn disconnect(&self);

    /// Unlink the device on the server side and drop stored credentials.
    async fn logout(&self) -> Result<(), ProtocolError>;

    /// Must be requested before [`connect`](Self::connect) on an unpaired
    /// device.
    async fn qr_channel(&self) -> Result<mpsc::Receiver<QrEvent>, ProtocolError>;

    /// Request a pairing code for `phone`. Requires a live connection.
    async fn pair_phone(&self, phone: &str, client_name: &str) -> Result<String, ProtocolError>;

    async fn send_text(&self, to: &Address, body: &str) -> Result<SendReceipt, ProtocolError>;

    async fn joined_groups(&self) -> Result<Vec<GroupInfo>, ProtocolError>;

    /// Join via an invite link or bare invite code. Returns the group address.
    async fn join_group_with_link(&self, link: &str) -> Result<Address, ProtocolError>;

    async fn leave_group(&self, group: &Address) -> Result<(), ProtocolError>;

    async fn add_participants(
        &self,
        group: &Address,
        participants: &[Address],
    ) -> Result<(), ProtocolError>;
}

/// A freshly opened client plus its event stream.
pub struct ClientHandle {
    pub client: Arc<dyn ProtocolClient>,
    pub events: mpsc::Receiver<ProtocolEvent>,
}

/// Opens the device store for a user and builds a client around it.
#[async_trait::async_trait]
pub trait ClientConnector: Send + Sync {
    async fn open(&self, user: &UserId) -> Result<ClientHandle, ProtocolError>;
}
