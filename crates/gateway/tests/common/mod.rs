#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hl_domain::config::SessionsConfig;
use hl_domain::UserId;
use hl_gateway::runtime::{Runtime, SessionStatus, StatusSnapshot, WebhookDispatcher};
use hl_protocol::loopback::{LoopbackConnector, LoopbackControl};
use hl_protocol::{Address, ClientConnector, InboundMessage, MessageContent};
use hl_store::UserStore;

pub struct Harness {
    pub runtime: Arc<Runtime>,
    pub connector: Arc<LoopbackConnector>,
    pub store: Arc<UserStore>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_sessions(SessionsConfig {
            command_timeout_secs: 2,
            ..SessionsConfig::default()
        })
    }

    pub fn with_sessions(settings: SessionsConfig) -> Self {
        Self::with_connector(settings, |loopback| loopback as Arc<dyn ClientConnector>)
    }

    /// Build the runtime on a connector derived from the loopback one, e.g.
    /// a wrapper that injects faults. `control` still drives the devices.
    pub fn with_connector<W>(settings: SessionsConfig, wrap: W) -> Self
    where
        W: FnOnce(Arc<LoopbackConnector>) -> Arc<dyn ClientConnector>,
    {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(UserStore::new(dir.path().join("users")));
        let connector = Arc::new(LoopbackConnector::new());
        let dispatcher = Arc::new(
            WebhookDispatcher::with_secret(Duration::from_secs(2), "hookline-test", None).unwrap(),
        );
        let runtime = Arc::new(Runtime::new(
            &settings,
            store.clone(),
            wrap(connector.clone()),
            dispatcher,
        ));
        Self {
            runtime,
            connector,
            store,
            _dir: dir,
        }
    }

    pub fn control(&self, user: &UserId) -> LoopbackControl {
        self.connector.control(user)
    }

    /// Poll until the session reaches `status`.
    pub async fn wait_for(&self, user: &UserId, status: SessionStatus) -> StatusSnapshot {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let snap = self.runtime.status(user);
            if snap.status == status {
                return snap;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {status:?}, last status {snap:?}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Link `user` through the QR flow and wait until ready.
    pub async fn link(&self, user: &UserId) -> StatusSnapshot {
        self.scan_qr(user).await;
        self.wait_for(user, SessionStatus::Ready).await
    }

    /// Start a QR link and confirm it on the phone side.
    pub async fn scan_qr(&self, user: &UserId) {
        self.runtime.reconnect(user, None, None).await.unwrap();
        self.wait_for(user, SessionStatus::Qr).await;
        // The QR code is rendered right after the state flips.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.runtime.status(user).credential_artifact.is_none() {
            assert!(tokio::time::Instant::now() < deadline, "QR never rendered");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(self.control(user).complete_pairing("Ann", "15551234567"));
    }
}

/// Poll `check` until it returns true.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out: {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn uid(s: &str) -> UserId {
    UserId::parse(s).unwrap()
}

pub fn inbound(id: &str, from: &str, text: &str) -> InboundMessage {
    let sender = Address::user(from).unwrap();
    InboundMessage {
        id: id.into(),
        chat: sender.clone(),
        sender,
        push_name: "Bob".into(),
        is_from_me: false,
        is_group: false,
        group_name: None,
        timestamp: chrono::Utc::now(),
        content: MessageContent::Conversation(text.into()),
    }
}
