//! Connection state machine for one user's linked device.
//!
//! [`LinkState`] carries the data that belongs to each state, so a QR image
//! cannot coexist with a connected identity or an error message. Every
//! accepted input produces a [`Transition`] whose [`Effects`] the caller
//! carries out (store reset, group refresh). Inputs that make no sense in
//! the current state are ignored and return `None`.

use serde::Serialize;

use hl_protocol::ConnectedIdentity;

/// Message recorded when the link drops without being asked to.
pub const LINK_LOST: &str = "connection lost";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Disconnected,
    Initializing,
    Qr,
    PairingCode,
    Ready,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Initializing => "initializing",
            Self::Qr => "qr",
            Self::PairingCode => "pairing_code",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Initializing,
    AwaitingQr {
        /// `data:` URL of the latest QR code, once one has been issued.
        image: Option<String>,
    },
    AwaitingPairingCode {
        code: Option<String>,
    },
    Ready {
        identity: Option<ConnectedIdentity>,
    },
    Error {
        message: String,
    },
}

/// Point-in-time view served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    pub credential_artifact: Option<String>,
    pub connected_identity: Option<ConnectedIdentity>,
    pub last_error: Option<String>,
}

impl LinkState {
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Disconnected => SessionStatus::Disconnected,
            Self::Initializing => SessionStatus::Initializing,
            Self::AwaitingQr { .. } => SessionStatus::Qr,
            Self::AwaitingPairingCode { .. } => SessionStatus::PairingCode,
            Self::Ready { .. } => SessionStatus::Ready,
            Self::Error { .. } => SessionStatus::Error,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let mut snap = StatusSnapshot {
            status: self.status(),
            credential_artifact: None,
            connected_identity: None,
            last_error: None,
        };
        match self {
            Self::AwaitingQr { image } => snap.credential_artifact = image.clone(),
            Self::AwaitingPairingCode { code } => snap.credential_artifact = code.clone(),
            Self::Ready { identity } => snap.connected_identity = identity.clone(),
            Self::Error { message } => snap.last_error = Some(message.clone()),
            Self::Disconnected | Self::Initializing => {}
        }
        snap
    }

    fn is_linking(&self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::AwaitingQr { .. } | Self::AwaitingPairingCode { .. }
        )
    }

    fn is_active(&self) -> bool {
        self.is_linking() || matches!(self, Self::Ready { .. })
    }

    /// Feed one input. Returns the transition taken, or `None` when the
    /// input does not apply to the current state.
    pub fn apply(&mut self, input: Input) -> Option<Transition> {
        let next = match (&*self, input) {
            (_, Input::Connect) => LinkState::Initializing,

            (Self::Initializing, Input::AwaitQr) => Self::AwaitingQr { image: None },
            (Self::Initializing | Self::AwaitingQr { .. }, Input::QrCode(image)) => {
                Self::AwaitingQr { image: Some(image) }
            }

            (Self::Initializing, Input::AwaitPairingCode) => {
                Self::AwaitingPairingCode { code: None }
            }
            (Self::Initializing | Self::AwaitingPairingCode { .. }, Input::PairingCode(code)) => {
                Self::AwaitingPairingCode { code: Some(code) }
            }

            (s, Input::Authenticated(identity)) if s.is_active() => Self::Ready { identity },

            (s, Input::Failed(message)) if s.is_active() => Self::Error { message },
            (s, Input::LinkLost) if s.is_active() => Self::Error {
                message: LINK_LOST.to_owned(),
            },

            (s, Input::LoggedOut) if !matches!(s, Self::Disconnected) => Self::Disconnected,
            (_, Input::Disconnect) => Self::Disconnected,

            _ => return None,
        };

        let from = self.status();
        let to = next.status();
        let was_ready = from == SessionStatus::Ready;
        let effects = Effects {
            refresh_groups: to == SessionStatus::Ready && !was_ready,
            clear_groups: was_ready && to != SessionStatus::Ready,
            reset_store: to == SessionStatus::Disconnected,
        };
        *self = next;
        Some(Transition { from, to, effects })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Explicit (re)connect request.
    Connect,
    AwaitQr,
    QrCode(String),
    AwaitPairingCode,
    PairingCode(String),
    Authenticated(Option<ConnectedIdentity>),
    Failed(String),
    /// The link dropped on its own.
    LinkLost,
    /// The phone unlinked this device.
    LoggedOut,
    /// Explicit disconnect request.
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Effects {
    /// Entered `ready`: fetch the joined-group list.
    pub refresh_groups: bool,
    /// Left `ready`: drop the in-memory group cache.
    pub clear_groups: bool,
    /// Entered `disconnected`: wipe messages, webhooks and counters.
    pub reset_store: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub effects: Effects,
}
