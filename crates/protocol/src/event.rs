use chrono::{DateTime, Utc};

use crate::address::Address;

/// Events pushed by a protocol client for one linked device.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    Message(InboundMessage),
    /// The link is up and authenticated.
    Connected,
    /// The link dropped without being asked to.
    Disconnected,
    /// The phone revoked this device. The stored credentials are gone.
    LoggedOut { reason: String },
    /// A pending QR / pairing-code exchange was accepted.
    PairSuccess { id: Address },
}

impl ProtocolEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::LoggedOut { .. } => "logged_out",
            Self::PairSuccess { .. } => "pair_success",
        }
    }
}

/// A raw inbound message as reported by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub id: String,
    /// Sending account, possibly with a device suffix.
    pub sender: Address,
    /// Conversation the message belongs to (the group for group messages).
    pub chat: Address,
    /// Display name set by the sender. May be empty.
    pub push_name: String,
    pub is_from_me: bool,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Conversation(String),
    ExtendedText(String),
    /// Media, reactions, polls and anything else without plain text.
    Other,
}

impl MessageContent {
    /// The text body, if any. Empty text counts as none.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Conversation(t) | Self::ExtendedText(t) if !t.is_empty() => Some(t.as_str()),
            _ => None,
        }
    }
}
