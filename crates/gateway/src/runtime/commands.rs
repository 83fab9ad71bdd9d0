//! Outbound protocol commands.
//!
//! Every command needs a `ready` session. The protocol call and the
//! bookkeeping that follows it (stored message, counters, group refresh)
//! run together in their own task. The caller waits at most
//! `command_timeout`; on timeout the task keeps running detached, still
//! records its result, and the caller gets [`Error::Timeout`].

use std::future::Future;
use std::sync::Arc;

use hl_domain::error::{Error, Result};
use hl_domain::model::{Direction, GroupSummary, Message, StatKey};
use hl_domain::UserId;
use hl_protocol::{Address, ProtocolClient};
use hl_store::UserStore;

use super::ingest::{persist_groups, refresh_groups, summarize_group, EventIngestor};
use super::machine::Input;
use super::session::Session;
use super::Runtime;

/// Sender recorded on outbound messages.
const SELF_SENDER: &str = "me";

impl Runtime {
    /// Run `f` against the session's live client with the command timeout.
    /// `f` also gets the generation the client belongs to.
    async fn run_command<T, F, Fut>(&self, session: &Arc<Session>, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn ProtocolClient>, u64) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (client, generation) = session.ready_client().ok_or(Error::NotConnected)?;
        if !client.is_connected() {
            return Err(Error::NotConnected);
        }

        let task = tokio::spawn(f(client, generation));
        match tokio::time::timeout(self.command_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) if join.is_panic() => {
                tracing::error!(user = %session.user().short(), op, "protocol command panicked");
                session.apply(generation, Input::Failed(format!("internal error during {op}")));
                Err(Error::Protocol(format!("{op} failed unexpectedly")))
            }
            Ok(Err(join)) => Err(Error::Other(format!("{op}: {join}"))),
            Err(_) => {
                tracing::warn!(
                    user = %session.user().short(),
                    op,
                    timeout_secs = self.command_timeout.as_secs(),
                    "protocol command timed out, finishing in background"
                );
                Err(Error::Timeout(format!(
                    "{op} did not complete within {}s",
                    self.command_timeout.as_secs()
                )))
            }
        }
    }

    // ── Messaging ────────────────────────────────────────────────────

    pub async fn send_message(&self, user: &UserId, number: &str, body: &str) -> Result<Message> {
        let number = number.trim().to_owned();
        if number.is_empty() || body.is_empty() {
            return Err(Error::Validation("number and message are required".into()));
        }
        let to = Address::user(&number)?;
        let session = self.registry.get_or_create(user);

        let ingestor = self.ingestor.clone();
        let task_session = session.clone();
        let text = body.to_owned();
        self.run_command(&session, "send message", move |c, generation| async move {
            let receipt = c.send_text(&to, &text).await?;
            let message = Message::direct(
                receipt.id,
                SELF_SENDER,
                to.to_string(),
                text,
                receipt.timestamp,
                Direction::Sent,
            )
            .with_contact_name(number);
            record_sent(&ingestor, &task_session, generation, &message).await;
            Ok::<_, Error>(message)
        })
        .await
    }

    pub async fn send_group_message(
        &self,
        user: &UserId,
        group_id: &str,
        body: &str,
    ) -> Result<Message> {
        if group_id.trim().is_empty() || body.is_empty() {
            return Err(Error::Validation("groupId and message are required".into()));
        }
        let to = Address::group(group_id)?;
        let session = self.registry.get_or_create(user);

        let ingestor = self.ingestor.clone();
        let text = body.to_owned();
        let task_session = session.clone();
        self.run_command(&session, "send group message", move |c, generation| async move {
            let receipt = c.send_text(&to, &text).await?;
            let group_name = task_session
                .cached_group_name(&to.user)
                .unwrap_or_else(|| to.user.clone());
            let message = Message::direct(
                receipt.id,
                SELF_SENDER,
                to.to_string(),
                text,
                receipt.timestamp,
                Direction::Sent,
            )
            .with_contact_name("Group")
            .in_group(group_name);
            record_sent(&ingestor, &task_session, generation, &message).await;
            Ok::<_, Error>(message)
        })
        .await
    }

    // ── Groups ───────────────────────────────────────────────────────

    /// Joined groups. While `ready` this is the live list (cached for
    /// `groups_ttl`); otherwise the last persisted list.
    pub async fn groups(&self, user: &UserId) -> Result<Vec<GroupSummary>> {
        let session = self.registry.get_or_create(user);
        let Some((_, generation)) = session.ready_client() else {
            return Ok(self.store.groups(user).await?.0);
        };
        if let Some(cached) = session.cached_groups(self.groups_ttl) {
            return Ok(cached);
        }

        let infos = self
            .run_command(&session, "list groups", |c, _| async move {
                Ok::<_, Error>(c.joined_groups().await?)
            })
            .await?;
        let groups: Vec<GroupSummary> = infos.iter().map(summarize_group).collect();
        if let Err(e) = persist_groups(&self.store, &session, generation, groups.clone()).await {
            tracing::warn!(user = %user.short(), error = %e, "failed to persist group list");
        }
        Ok(groups)
    }

    /// Join via invite link. Returns the joined group's address.
    pub async fn join_group(&self, user: &UserId, invite_link: &str) -> Result<String> {
        let link = invite_link.trim().to_owned();
        if link.is_empty() {
            return Err(Error::Validation("inviteLink is required".into()));
        }
        let session = self.registry.get_or_create(user);

        let store = self.store.clone();
        let task_session = session.clone();
        self.run_command(&session, "join group", move |c, _| async move {
            let jid = c.join_group_with_link(&link).await?;
            store
                .increment_stat(task_session.user(), StatKey::GroupsJoined)
                .await?;
            refresh_groups_later(store, &task_session);
            Ok::<_, Error>(jid.to_string())
        })
        .await
    }

    pub async fn leave_group(&self, user: &UserId, group_id: &str) -> Result<()> {
        if group_id.trim().is_empty() {
            return Err(Error::Validation("groupId is required".into()));
        }
        let group = Address::group(group_id)?;
        let session = self.registry.get_or_create(user);

        let store = self.store.clone();
        let task_session = session.clone();
        self.run_command(&session, "leave group", move |c, _| async move {
            c.leave_group(&group).await?;
            store
                .increment_stat(task_session.user(), StatKey::GroupsLeft)
                .await?;
            refresh_groups_later(store, &task_session);
            Ok::<_, Error>(())
        })
        .await
    }

    pub async fn add_to_group(
        &self,
        user: &UserId,
        group_id: &str,
        participants: &[String],
    ) -> Result<()> {
        if group_id.trim().is_empty() || participants.is_empty() {
            return Err(Error::Validation("groupId and participants are required".into()));
        }
        let group = Address::group(group_id)?;
        let members = participants
            .iter()
            .map(|p| Address::user(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let session = self.registry.get_or_create(user);

        let store = self.store.clone();
        let task_session = session.clone();
        self.run_command(&session, "add participants", move |c, _| async move {
            c.add_participants(&group, &members).await?;
            refresh_groups_later(store, &task_session);
            Ok::<_, Error>(())
        })
        .await
    }
}

/// The send already went out; a storage failure is logged, not returned.
async fn record_sent(ingestor: &EventIngestor, session: &Session, generation: u64, message: &Message) {
    if let Err(e) = ingestor.on_outbound_sent(session, generation, message.clone()).await {
        tracing::error!(user = %session.user().short(), error = %e, "failed to record sent message");
    }
}

/// Drop the cached group list and fetch a fresh one in the background.
fn refresh_groups_later(store: Arc<UserStore>, session: &Arc<Session>) {
    session.invalidate_groups();
    let Some((_, generation)) = session.ready_client() else {
        return;
    };
    let session = session.clone();
    tokio::spawn(async move {
        if let Err(e) = refresh_groups(&store, &session, generation).await {
            tracing::warn!(user = %session.user().short(), error = %e, "group refresh failed");
        }
    });
}
