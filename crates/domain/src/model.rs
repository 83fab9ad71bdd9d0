//! Per-user record model.
//!
//! These are the typed shapes persisted in each user's `data.json` and
//! returned over the API. Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Maximum number of messages retained per user. Oldest are evicted first.
pub const MAX_MESSAGES: usize = 500;

/// Body recorded for inbound content that carries no text.
pub const NON_TEXT_PLACEHOLDER: &str = "Media/Other Message";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// A normalized message, either received from the protocol client or sent
/// through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    /// Present iff `is_group`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

impl Message {
    /// Build a direct (non-group) message.
    pub fn direct(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
        direction: Direction,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            body: body.into(),
            timestamp,
            direction,
            contact_name: None,
            is_group: false,
            group_name: None,
        }
    }

    /// Mark this message as belonging to `group_name`.
    pub fn in_group(mut self, group_name: impl Into<String>) -> Self {
        self.is_group = true;
        self.group_name = Some(group_name.into());
        self
    }

    pub fn with_contact_name(mut self, name: impl Into<String>) -> Self {
        self.contact_name = Some(name.into());
        self
    }

    /// Restore the `group_name` iff `is_group` pairing on records that were
    /// written by hand or by older versions.
    pub fn normalize(&mut self) {
        match (self.is_group, &self.group_name) {
            (false, Some(_)) => self.group_name = None,
            (true, None) => self.group_name = Some(String::new()),
            _ => {}
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Groups & webhooks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cached summary of a joined group. Not authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    pub participant_count: usize,
    #[serde(default)]
    pub is_read_only: bool,
}

/// A user-registered callback URL for inbound messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    pub url: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// Create a registration with a fresh id. An empty or missing name
    /// falls back to the URL.
    pub fn new(url: impl Into<String>, name: Option<String>) -> Self {
        let url = url.into();
        let name = name
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| url.clone());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url,
            name,
            created_at: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    #[serde(default)]
    pub messages_sent: u64,
    #[serde(default)]
    pub messages_received: u64,
    #[serde(default)]
    pub groups_joined: u64,
    #[serde(default)]
    pub groups_left: u64,
}

impl Stats {
    /// Increment one counter and return its new value.
    pub fn bump(&mut self, key: StatKey) -> u64 {
        let slot = match key {
            StatKey::MessagesSent => &mut self.messages_sent,
            StatKey::MessagesReceived => &mut self.messages_received,
            StatKey::GroupsJoined => &mut self.groups_joined,
            StatKey::GroupsLeft => &mut self.groups_left,
        };
        *slot = slot.saturating_add(1);
        *slot
    }
}

/// Names of the per-user counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKey {
    MessagesSent,
    MessagesReceived,
    GroupsJoined,
    GroupsLeft,
}

impl StatKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MessagesSent => "messagesSent",
            Self::MessagesReceived => "messagesReceived",
            Self::GroupsJoined => "groupsJoined",
            Self::GroupsLeft => "groupsLeft",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The durable per-user document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<Message>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub groups: Vec<GroupSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_refreshed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub webhooks: Vec<Webhook>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stats: Stats,
}

impl StoreRecord {
    /// Append a message and evict the oldest entries beyond [`MAX_MESSAGES`].
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        if self.messages.len() > MAX_MESSAGES {
            let excess = self.messages.len() - MAX_MESSAGES;
            self.messages.drain(..excess);
        }
    }

    /// Clear everything tied to the linked device. The group cache survives.
    pub fn clear_bot_data(&mut self) {
        self.messages.clear();
        self.webhooks.clear();
        self.stats = Stats::default();
    }

    /// Enforce record invariants after reading from disk.
    pub fn normalize(&mut self) {
        for m in &mut self.messages {
            m.normalize();
        }
        if self.messages.len() > MAX_MESSAGES {
            let excess = self.messages.len() - MAX_MESSAGES;
            self.messages.drain(..excess);
        }
        let mut seen = std::collections::HashSet::new();
        self.webhooks.retain(|h| seen.insert(h.url.clone()));
    }
}

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
