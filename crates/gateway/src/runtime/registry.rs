//! Session registry and connection lifecycle.
//!
//! The registry maps user ids to their [`Session`] and is the only place
//! that opens protocol clients and installs them on a session. Connecting
//! runs as a detached task; callers observe progress by polling status.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hl_domain::config::{LinkMethod, SessionsConfig};
use hl_domain::error::{Error, Result};
use hl_domain::trace::TraceEvent;
use hl_domain::UserId;
use hl_protocol::{normalize_phone, ClientConnector, ProtocolEvent, QrEvent};

use super::ingest::EventIngestor;
use super::machine::{Input, StatusSnapshot};
use super::qr;
use super::session::Session;

const PHONE_REQUIRED: &str = "Phone number is required for pairing code";

pub struct SessionRegistry {
    sessions: RwLock<HashMap<UserId, Arc<Session>>>,
    connector: Arc<dyn ClientConnector>,
    ingestor: Arc<EventIngestor>,
    pairing_client_name: String,
}

impl SessionRegistry {
    pub fn new(
        connector: Arc<dyn ClientConnector>,
        ingestor: Arc<EventIngestor>,
        settings: &SessionsConfig,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            connector,
            ingestor,
            pairing_client_name: settings.pairing_client_name.clone(),
        }
    }

    // ── Lookup ───────────────────────────────────────────────────────

    /// Return the user's session, creating a fresh `disconnected` one on
    /// first reference. Concurrent callers always get the same instance.
    pub fn get_or_create(&self, user: &UserId) -> Arc<Session> {
        // Fast path: already registered.
        if let Some(s) = self.sessions.read().get(user) {
            return s.clone();
        }

        // Slow path: re-check under the write lock.
        let mut sessions = self.sessions.write();
        if let Some(s) = sessions.get(user) {
            return s.clone();
        }
        let session = Arc::new(Session::new(user.clone()));
        sessions.insert(user.clone(), session.clone());
        drop(sessions);

        TraceEvent::SessionCreated {
            user_id: user.to_string(),
        }
        .emit();
        session
    }

    pub fn get(&self, user: &UserId) -> Option<Arc<Session>> {
        self.sessions.read().get(user).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    // ── Connect ──────────────────────────────────────────────────────

    /// Start linking the user's device. Input problems fail synchronously
    /// and leave the session in `error`; everything else happens in a
    /// background task.
    pub async fn reconnect(
        self: &Arc<Self>,
        user: &UserId,
        method: LinkMethod,
        phone: Option<String>,
    ) -> Result<StatusSnapshot> {
        let session = self.get_or_create(user);
        let ticket = session.begin_connect();
        let generation = ticket.generation;
        if let Some(previous) = ticket.previous {
            previous.disconnect().await;
        }

        let phone = match method {
            LinkMethod::Qr => None,
            LinkMethod::PairingCode => {
                let raw = phone.as_deref().map(str::trim).unwrap_or("");
                if raw.is_empty() {
                    session.apply(generation, Input::Failed(PHONE_REQUIRED.into()));
                    return Err(Error::Validation(PHONE_REQUIRED.into()));
                }
                match normalize_phone(raw) {
                    Some(p) => Some(p),
                    None => {
                        let msg = format!("invalid phone number: {raw}");
                        session.apply(generation, Input::Failed(msg.clone()));
                        return Err(Error::Validation(msg));
                    }
                }
            }
        };

        tracing::info!(
            user = %user.short(),
            generation,
            method = method.as_str(),
            "connecting device"
        );

        let registry = self.clone();
        let task_session = session.clone();
        let cancel = ticket.cancel;
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(registry.establish(
                &task_session,
                generation,
                cancel,
                method,
                phone,
            ))
            .catch_unwind()
            .await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("internal error while connecting".to_owned()),
            };
            if let Some(message) = failure {
                tracing::warn!(
                    user = %task_session.user().short(),
                    generation,
                    error = %message,
                    "connection attempt failed"
                );
                task_session.apply(generation, Input::Failed(message));
            }
        });

        Ok(session.status())
    }

    async fn establish(
        self: &Arc<Self>,
        session: &Arc<Session>,
        generation: u64,
        cancel: CancellationToken,
        method: LinkMethod,
        phone: Option<String>,
    ) -> Result<()> {
        let handle = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            h = self.connector.open(session.user()) => h?,
        };
        let client = handle.client;
        if !session.install_client(generation, client.clone()) {
            client.disconnect().await;
            return Ok(());
        }
        self.spawn_event_pump(session.clone(), generation, cancel.clone(), handle.events);

        if client.is_paired() {
            // Stored credentials: the `Connected` event moves us to ready.
            client.connect().await?;
            return Ok(());
        }

        match method {
            LinkMethod::Qr => {
                let mut codes = client.qr_channel().await?;
                client.connect().await?;
                session.apply(generation, Input::AwaitQr);
                loop {
                    let event = tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        e = codes.recv() => e,
                    };
                    match event {
                        Some(QrEvent::Code(code)) => {
                            let image = qr::render_data_url(&code)?;
                            session.apply(generation, Input::QrCode(image));
                            tracing::info!(user = %session.user().short(), "QR code generated, scan to connect");
                        }
                        Some(QrEvent::Success) | None => return Ok(()),
                        Some(QrEvent::Timeout) => {
                            client.disconnect().await;
                            return Err(Error::Timeout("QR code was not scanned in time".into()));
                        }
                        Some(QrEvent::Error(e)) => return Err(Error::Protocol(e)),
                    }
                }
            }
            LinkMethod::PairingCode => {
                let phone = phone.ok_or_else(|| Error::Validation(PHONE_REQUIRED.into()))?;
                session.apply(generation, Input::AwaitPairingCode);
                client.connect().await?;
                let code = tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    c = client.pair_phone(&phone, &self.pairing_client_name) => c?,
                };
                tracing::info!(user = %session.user().short(), "pairing code issued");
                session.apply(generation, Input::PairingCode(code));
                Ok(())
            }
        }
    }

    /// Forward the client's events to the ingestor until the generation is
    /// cancelled or the stream ends. A panic while handling one event puts
    /// the session in `error` and stops the pump.
    fn spawn_event_pump(
        &self,
        session: Arc<Session>,
        generation: u64,
        cancel: CancellationToken,
        mut events: mpsc::Receiver<ProtocolEvent>,
    ) {
        let ingestor = self.ingestor.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    e = events.recv() => match e {
                        Some(e) => e,
                        None => break,
                    },
                };
                let kind = event.kind();
                let handled = AssertUnwindSafe(ingestor.on_connection_event(
                    &session,
                    generation,
                    event,
                ))
                .catch_unwind()
                .await;
                if handled.is_err() {
                    tracing::error!(
                        user = %session.user().short(),
                        generation,
                        event = kind,
                        "panic while handling protocol event"
                    );
                    session.apply(
                        generation,
                        Input::Failed(format!("internal error while handling {kind} event")),
                    );
                    break;
                }
            }
            tracing::debug!(user = %session.user().short(), generation, "event pump stopped");
        });
    }

    // ── Disconnect ───────────────────────────────────────────────────

    /// Log the device out, move to `disconnected` and wipe the user's
    /// messages, webhooks and counters.
    pub async fn disconnect(&self, user: &UserId) -> Result<()> {
        let session = self.get_or_create(user);
        let (client, transition) = session.begin_teardown();
        if let Some(client) = client {
            if let Err(e) = client.logout().await {
                tracing::warn!(user = %user.short(), error = %e, "logout failed, disconnecting anyway");
            }
            client.disconnect().await;
        }
        if transition.is_some() {
            self.ingestor.store().clear_bot_data(user).await?;
            TraceEvent::StoreReset {
                user_id: user.to_string(),
                reason: "disconnect".into(),
            }
            .emit();
        }
        tracing::info!(user = %user.short(), "device disconnected by user");
        Ok(())
    }

    /// Close every live client without logging out, so devices reconnect
    /// on the next start.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        let mut closed = 0usize;
        for session in sessions {
            if let Some(client) = session.release() {
                client.disconnect().await;
                closed += 1;
            }
        }
        tracing::info!(closed, "protocol clients closed");
    }
}
