//! In-memory session for one user.
//!
//! A session owns the connection state machine, the current protocol-client
//! handle, the cancellation token of the in-flight credential exchange and a
//! short-lived group cache. Every (re)connect bumps a generation counter;
//! events and background tasks carry the generation they were started under
//! and are dropped once it is stale.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use hl_domain::model::GroupSummary;
use hl_domain::trace::TraceEvent;
use hl_domain::UserId;
use hl_protocol::ProtocolClient;

use super::machine::{Input, LinkState, SessionStatus, StatusSnapshot, Transition};

struct GroupCache {
    groups: Vec<GroupSummary>,
    fetched_at: Instant,
}

struct Inner {
    state: LinkState,
    generation: u64,
    client: Option<Arc<dyn ProtocolClient>>,
    cancel: Option<CancellationToken>,
    groups: Option<GroupCache>,
}

pub struct Session {
    user: UserId,
    inner: RwLock<Inner>,
}

/// Handed to the connect path by [`Session::begin_connect`].
pub struct ConnectTicket {
    pub generation: u64,
    pub cancel: CancellationToken,
    /// Client of the superseded attempt, to be disconnected by the caller.
    pub previous: Option<Arc<dyn ProtocolClient>>,
}

impl Session {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            inner: RwLock::new(Inner {
                state: LinkState::Disconnected,
                generation: 0,
                client: None,
                cancel: None,
                groups: None,
            }),
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn status(&self) -> StatusSnapshot {
        self.inner.read().state.snapshot()
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().state.status() == SessionStatus::Ready
    }

    /// Whether results produced under `generation` may still be written.
    /// False once the session was reconnected, disconnected or logged out.
    pub fn accepts_events(&self, generation: u64) -> bool {
        let inner = self.inner.read();
        inner.generation == generation && inner.state.status() != SessionStatus::Disconnected
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Cancel the previous exchange, start a new generation and move to
    /// `initializing`.
    pub fn begin_connect(&self) -> ConnectTicket {
        let cancel = CancellationToken::new();
        let (ticket, transition) = {
            let mut inner = self.inner.write();
            if let Some(old) = inner.cancel.take() {
                old.cancel();
            }
            inner.generation += 1;
            inner.cancel = Some(cancel.clone());
            let previous = inner.client.take();
            let transition = Self::step(&mut inner, Input::Connect);
            (
                ConnectTicket {
                    generation: inner.generation,
                    cancel,
                    previous,
                },
                transition,
            )
        };
        if let Some(t) = transition {
            self.trace(ticket.generation, t);
        }
        ticket
    }

    /// Explicit disconnect: end the generation, hand back the client for
    /// logout and move to `disconnected`.
    pub fn begin_teardown(&self) -> (Option<Arc<dyn ProtocolClient>>, Option<Transition>) {
        let (client, transition, generation) = {
            let mut inner = self.inner.write();
            if let Some(old) = inner.cancel.take() {
                old.cancel();
            }
            inner.generation += 1;
            let client = inner.client.take();
            let transition = Self::step(&mut inner, Input::Disconnect);
            (client, transition, inner.generation)
        };
        if let Some(t) = transition {
            self.trace(generation, t);
        }
        (client, transition)
    }

    /// Process shutdown: stop background work and release the client
    /// without touching state or stored data.
    pub fn release(&self) -> Option<Arc<dyn ProtocolClient>> {
        let mut inner = self.inner.write();
        if let Some(old) = inner.cancel.take() {
            old.cancel();
        }
        inner.generation += 1;
        inner.client.take()
    }

    /// Feed an input produced under `generation`. Stale generations are
    /// ignored.
    pub fn apply(&self, generation: u64, input: Input) -> Option<Transition> {
        let transition = {
            let mut inner = self.inner.write();
            if inner.generation != generation {
                return None;
            }
            Self::step(&mut inner, input)
        };
        if let Some(t) = transition {
            self.trace(generation, t);
        }
        transition
    }

    fn step(inner: &mut Inner, input: Input) -> Option<Transition> {
        let t = inner.state.apply(input)?;
        if t.effects.clear_groups {
            inner.groups = None;
        }
        Some(t)
    }

    fn trace(&self, generation: u64, t: Transition) {
        if t.from == t.to {
            return;
        }
        tracing::info!(
            user = %self.user.short(),
            generation,
            from = t.from.as_str(),
            to = t.to.as_str(),
            "session transition"
        );
        TraceEvent::SessionTransition {
            user_id: self.user.to_string(),
            generation,
            from: t.from.as_str().to_owned(),
            to: t.to.as_str().to_owned(),
        }
        .emit();
    }

    // ── Client handle ────────────────────────────────────────────────

    /// Only the registry installs clients. Returns `false` when
    /// `generation` has been superseded.
    pub(crate) fn install_client(&self, generation: u64, client: Arc<dyn ProtocolClient>) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != generation {
            return false;
        }
        inner.client = Some(client);
        true
    }

    /// Drop the client after the phone logged this device out. Cancels
    /// background work for the generation.
    pub(crate) fn detach_client(&self, generation: u64) -> Option<Arc<dyn ProtocolClient>> {
        let mut inner = self.inner.write();
        if inner.generation != generation {
            return None;
        }
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        inner.client.take()
    }

    pub fn client(&self) -> Option<Arc<dyn ProtocolClient>> {
        self.inner.read().client.clone()
    }

    /// The client and its generation, only while `ready`.
    pub fn ready_client(&self) -> Option<(Arc<dyn ProtocolClient>, u64)> {
        let inner = self.inner.read();
        if inner.state.status() != SessionStatus::Ready {
            return None;
        }
        inner.client.clone().map(|c| (c, inner.generation))
    }

    // ── Group cache ──────────────────────────────────────────────────

    /// Cached groups younger than `ttl`.
    pub fn cached_groups(&self, ttl: Duration) -> Option<Vec<GroupSummary>> {
        let inner = self.inner.read();
        inner
            .groups
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < ttl)
            .map(|c| c.groups.clone())
    }

    /// Look up a group's display name in the cache.
    pub fn cached_group_name(&self, group_id: &str) -> Option<String> {
        let inner = self.inner.read();
        inner
            .groups
            .as_ref()?
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .map(|g| g.name.clone())
    }

    /// Store a fetched list, unless the session moved on meanwhile.
    pub fn set_cached_groups(&self, generation: u64, groups: Vec<GroupSummary>) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != generation || inner.state.status() != SessionStatus::Ready {
            return false;
        }
        inner.groups = Some(GroupCache {
            groups,
            fetched_at: Instant::now(),
        });
        true
    }

    pub fn invalidate_groups(&self) {
        self.inner.write().groups = None;
    }
}
