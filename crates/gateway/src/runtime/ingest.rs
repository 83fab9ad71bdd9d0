//! Event ingestion: protocol events into session state, storage and
//! webhook fan-out.

use std::sync::Arc;

use hl_domain::error::Result;
use hl_domain::model::{Direction, GroupSummary, Message, StatKey, NON_TEXT_PLACEHOLDER};
use hl_domain::trace::TraceEvent;
use hl_domain::UserId;
use hl_protocol::{GroupInfo, InboundMessage, ProtocolEvent};
use hl_store::UserStore;

use super::machine::{Input, Transition};
use super::session::Session;
use super::webhooks::WebhookDispatcher;

pub struct EventIngestor {
    store: Arc<UserStore>,
    dispatcher: Arc<WebhookDispatcher>,
}

impl EventIngestor {
    pub fn new(store: Arc<UserStore>, dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub fn store(&self) -> &Arc<UserStore> {
        &self.store
    }

    // ── Messages ─────────────────────────────────────────────────────

    /// Normalize, persist and fan out one inbound message received under
    /// `generation`. Echoes of our own sends, and messages that reach the
    /// lock after the session was reset or relinked, yield `Ok(None)`.
    pub async fn on_inbound_message(
        &self,
        session: &Session,
        generation: u64,
        raw: InboundMessage,
    ) -> Result<Option<Message>> {
        if raw.is_from_me {
            return Ok(None);
        }
        let user = session.user();
        let message = normalize_inbound(user, raw);

        let stored = message.clone();
        let hooks = self
            .store
            .update(user, move |rec| {
                if !session.accepts_events(generation) {
                    return Ok(None);
                }
                rec.push_message(stored);
                rec.stats.bump(StatKey::MessagesReceived);
                Ok(Some(rec.webhooks.clone()))
            })
            .await?;
        let Some(hooks) = hooks else {
            tracing::debug!(user = %user.short(), generation, "dropped message from stale link");
            return Ok(None);
        };

        TraceEvent::MessageIngested {
            user_id: user.to_string(),
            message_id: message.id.clone(),
            direction: "received".into(),
            is_group: message.is_group,
        }
        .emit();

        self.dispatcher.dispatch(user, &message, &hooks);
        Ok(Some(message))
    }

    /// Persist a message we sent. Sent messages are never fanned out.
    /// Nothing is written once `generation` is no longer live.
    pub async fn on_outbound_sent(
        &self,
        session: &Session,
        generation: u64,
        message: Message,
    ) -> Result<()> {
        let user = session.user();
        let id = message.id.clone();
        let is_group = message.is_group;
        let recorded = self
            .store
            .record_message_while(user, message, StatKey::MessagesSent, || {
                session.accepts_events(generation)
            })
            .await?;
        if recorded.is_none() {
            tracing::debug!(user = %user.short(), generation, "sent message not recorded, session was reset");
            return Ok(());
        }
        TraceEvent::MessageIngested {
            user_id: user.to_string(),
            message_id: id,
            direction: "sent".into(),
            is_group,
        }
        .emit();
        Ok(())
    }

    // ── Connection events ────────────────────────────────────────────

    /// Feed one event from the client started under `generation`.
    pub async fn on_connection_event(
        &self,
        session: &Arc<Session>,
        generation: u64,
        event: ProtocolEvent,
    ) {
        let user = session.user();
        let transition = match event {
            ProtocolEvent::Message(raw) => {
                if let Err(e) = self.on_inbound_message(session, generation, raw).await {
                    tracing::error!(user = %user.short(), error = %e, "failed to ingest inbound message");
                }
                None
            }
            ProtocolEvent::Connected => {
                let identity = session.client().and_then(|c| c.identity());
                if let Some(id) = &identity {
                    tracing::info!(
                        user = %user.short(),
                        push_name = %id.push_name,
                        phone = %id.phone,
                        "device connected"
                    );
                }
                session.apply(generation, Input::Authenticated(identity))
            }
            ProtocolEvent::PairSuccess { id } => {
                tracing::info!(user = %user.short(), device = %id, "pairing successful");
                None
            }
            ProtocolEvent::Disconnected => {
                tracing::warn!(user = %user.short(), "device link dropped");
                session.apply(generation, Input::LinkLost)
            }
            ProtocolEvent::LoggedOut { reason } => {
                tracing::warn!(user = %user.short(), reason = %reason, "device logged out by phone");
                let t = session.apply(generation, Input::LoggedOut);
                if t.is_some() {
                    if let Some(client) = session.detach_client(generation) {
                        client.disconnect().await;
                    }
                }
                t
            }
        };

        if let Some(t) = transition {
            self.apply_effects(session, generation, t, "logged_out").await;
        }
    }

    /// Carry out the side effects of a transition.
    pub async fn apply_effects(
        &self,
        session: &Arc<Session>,
        generation: u64,
        transition: Transition,
        reason: &str,
    ) {
        let user = session.user();
        if transition.effects.reset_store {
            match self.store.clear_bot_data(user).await {
                Ok(()) => TraceEvent::StoreReset {
                    user_id: user.to_string(),
                    reason: reason.to_owned(),
                }
                .emit(),
                Err(e) => {
                    tracing::error!(user = %user.short(), error = %e, "store reset failed")
                }
            }
        }
        if transition.effects.refresh_groups {
            let store = self.store.clone();
            let session = session.clone();
            tokio::spawn(async move {
                if let Err(e) = refresh_groups(&store, &session, generation).await {
                    tracing::warn!(user = %session.user().short(), error = %e, "group refresh failed");
                }
            });
        }
    }
}

/// Fetch the joined-group list through the live client and write it to
/// both the session cache and the persisted record.
pub async fn refresh_groups(
    store: &UserStore,
    session: &Session,
    generation: u64,
) -> Result<Vec<GroupSummary>> {
    let Some(client) = session.client() else {
        return Ok(Vec::new());
    };
    let groups: Vec<GroupSummary> = client
        .joined_groups()
        .await?
        .iter()
        .map(summarize_group)
        .collect();
    persist_groups(store, session, generation, groups.clone()).await?;
    Ok(groups)
}

pub(crate) async fn persist_groups(
    store: &UserStore,
    session: &Session,
    generation: u64,
    groups: Vec<GroupSummary>,
) -> Result<()> {
    if !session.set_cached_groups(generation, groups.clone()) {
        return Ok(());
    }
    let count = groups.len();
    store.set_groups(session.user(), groups).await?;
    TraceEvent::GroupsRefreshed {
        user_id: session.user().to_string(),
        count,
    }
    .emit();
    Ok(())
}

pub fn summarize_group(g: &GroupInfo) -> GroupSummary {
    GroupSummary {
        id: g.jid.user.clone(),
        name: g.name.clone(),
        participant_count: g.participants.len(),
        is_read_only: g.is_announce,
    }
}

/// Map a raw protocol message onto the stored shape.
pub fn normalize_inbound(user: &UserId, raw: InboundMessage) -> Message {
    let from = raw.sender.without_device();
    let contact_name = if raw.push_name.trim().is_empty() {
        from.user.clone()
    } else {
        raw.push_name.clone()
    };
    let body = raw
        .content
        .text()
        .unwrap_or(NON_TEXT_PLACEHOLDER)
        .to_owned();

    let message = Message::direct(
        raw.id,
        from.to_string(),
        user.as_str(),
        body,
        raw.timestamp,
        Direction::Received,
    )
    .with_contact_name(contact_name);

    if raw.is_group {
        let name = raw
            .group_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| raw.chat.user.clone());
        message.in_group(name)
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hl_protocol::{Address, MessageContent};

    fn raw(content: MessageContent) -> InboundMessage {
        let sender: Address = "15550001111:3@s.whatsapp.net".parse().unwrap();
        InboundMessage {
            id: "ABC".into(),
            chat: sender.without_device(),
            sender,
            push_name: String::new(),
            is_from_me: false,
            is_group: false,
            group_name: None,
            timestamp: Utc::now(),
            content,
        }
    }

    fn user() -> UserId {
        UserId::parse("u-1").unwrap()
    }

    #[test]
    fn strips_device_and_falls_back_to_number() {
        let m = normalize_inbound(&user(), raw(MessageContent::Conversation("hi".into())));
        assert_eq!(m.from, "15550001111@s.whatsapp.net");
        assert_eq!(m.contact_name.as_deref(), Some("15550001111"));
        assert_eq!(m.to, "u-1");
        assert_eq!(m.body, "hi");
        assert_eq!(m.direction, Direction::Received);
        assert!(!m.is_group && m.group_name.is_none());
    }

    #[test]
    fn non_text_uses_placeholder() {
        let m = normalize_inbound(&user(), raw(MessageContent::Other));
        assert_eq!(m.body, NON_TEXT_PLACEHOLDER);
        let m = normalize_inbound(&user(), raw(MessageContent::ExtendedText("link".into())));
        assert_eq!(m.body, "link");
    }

    fn ingestor(dir: &tempfile::TempDir) -> EventIngestor {
        let store = Arc::new(UserStore::new(dir.path().join("users")));
        let dispatcher = Arc::new(
            WebhookDispatcher::with_secret(std::time::Duration::from_secs(1), "hookline-test", None)
                .unwrap(),
        );
        EventIngestor::new(store, dispatcher)
    }

    #[tokio::test]
    async fn messages_from_a_torn_down_link_are_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(&dir);
        let session = Session::new(user());
        let g = session.begin_connect().generation;
        session.apply(g, Input::Authenticated(None)).unwrap();

        let kept = ingestor
            .on_inbound_message(&session, g, raw(MessageContent::Conversation("one".into())))
            .await
            .unwrap();
        assert!(kept.is_some());

        session.begin_teardown();
        ingestor.store().clear_bot_data(session.user()).await.unwrap();
        let dropped = ingestor
            .on_inbound_message(&session, g, raw(MessageContent::Conversation("two".into())))
            .await
            .unwrap();
        assert!(dropped.is_none());

        let snap = ingestor.store().stats_snapshot(session.user()).await.unwrap();
        assert_eq!(snap.stats.messages_received, 0);
        assert!(ingestor
            .store()
            .recent_messages(session.user(), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn group_messages_carry_a_name() {
        let mut r = raw(MessageContent::Conversation("yo".into()));
        r.is_group = true;
        r.chat = Address::group("120363000000000001").unwrap();
        r.push_name = "Bob".into();
        let m = normalize_inbound(&user(), r.clone());
        assert_eq!(m.group_name.as_deref(), Some("120363000000000001"));
        assert_eq!(m.contact_name.as_deref(), Some("Bob"));

        r.group_name = Some("Family".into());
        let m = normalize_inbound(&user(), r);
        assert_eq!(m.group_name.as_deref(), Some("Family"));
    }
}
