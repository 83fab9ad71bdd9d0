//! In-process protocol backend.
//!
//! A [`LoopbackConnector`] simulates one phone-linked device per user.
//! Device credentials outlive individual clients, so reopening a paired
//! user connects straight to `Connected`, the same way a real device store
//! does. Nothing leaves the process: sends are recorded, groups are a local
//! list, and pairing completes either through [`LoopbackControl`] or on a
//! timer when `auto_pair_after` is set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use hl_domain::UserId;

use crate::address::{normalize_phone, Address, GROUP_SERVER, USER_SERVER};
use crate::client::{
    ClientConnector, ClientHandle, ConnectedIdentity, GroupInfo, ProtocolClient, QrEvent,
    SendReceipt,
};
use crate::error::ProtocolError;
use crate::event::{InboundMessage, ProtocolEvent};

const EVENT_BUFFER: usize = 256;
const QR_BUFFER: usize = 8;
const PLATFORM: &str = "loopback";
const AUTO_PAIR_NAME: &str = "Loopback";
const AUTO_PAIR_PHONE: &str = "15550000000";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct LoopbackConnector {
    devices: Mutex<HashMap<UserId, Arc<Device>>>,
    auto_pair_after: Option<Duration>,
}

impl LoopbackConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete every pending QR / pairing-code exchange after `delay`.
    pub fn with_auto_pair(delay: Duration) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            auto_pair_after: Some(delay),
        }
    }

    /// Test and operator hooks for `user`'s simulated phone.
    pub fn control(&self, user: &UserId) -> LoopbackControl {
        LoopbackControl {
            device: self.device(user),
        }
    }

    fn device(&self, user: &UserId) -> Arc<Device> {
        self.devices
            .lock()
            .entry(user.clone())
            .or_insert_with(|| {
                Arc::new(Device {
                    user: user.clone(),
                    state: Mutex::new(DeviceState::default()),
                    auto_pair_after: self.auto_pair_after,
                })
            })
            .clone()
    }
}

#[async_trait::async_trait]
impl ClientConnector for LoopbackConnector {
    async fn open(&self, user: &UserId) -> Result<ClientHandle, ProtocolError> {
        let device = self.device(user);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let client = Arc::new(LoopbackClient {
            device: device.clone(),
            events: tx,
            connected: AtomicBool::new(false),
            qr: Mutex::new(None),
        });
        {
            let mut st = device.state.lock();
            st.current = Arc::downgrade(&client);
            st.opened += 1;
        }
        tracing::debug!(user = %user.short(), "loopback client opened");
        Ok(ClientHandle {
            client,
            events: rx,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Device (survives client instances)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Device {
    user: UserId,
    state: Mutex<DeviceState>,
    auto_pair_after: Option<Duration>,
}

#[derive(Default)]
struct DeviceState {
    /// `Some` once paired.
    identity: Option<ConnectedIdentity>,
    groups: Vec<GroupInfo>,
    sent: Vec<SentText>,
    fail_sends: Option<String>,
    send_delay: Option<Duration>,
    current: Weak<LoopbackClient>,
    opened: usize,
}

/// A text recorded by [`ProtocolClient::send_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    pub id: String,
    pub to: Address,
    pub body: String,
}

impl Device {
    fn current(&self) -> Option<Arc<LoopbackClient>> {
        self.state.lock().current.upgrade()
    }

    /// Accept the pending exchange on the live client. Returns `false` when
    /// there is no connected client to pair.
    fn complete_pairing(&self, push_name: &str, phone: &str) -> bool {
        let Some(client) = self.current().filter(|c| c.is_connected()) else {
            return false;
        };
        let identity = ConnectedIdentity {
            push_name: push_name.to_owned(),
            phone: phone.to_owned(),
            platform: PLATFORM.to_owned(),
        };
        self.state.lock().identity = Some(identity);

        if let Some(qr) = client.qr.lock().take() {
            let _ = qr.try_send(QrEvent::Success);
        }
        let mut id = Address::new(phone, USER_SERVER);
        id.device = 1;
        client.emit(ProtocolEvent::PairSuccess { id });
        client.emit(ProtocolEvent::Connected);
        tracing::debug!(user = %self.user.short(), "loopback pairing completed");
        true
    }

    fn schedule_auto_pair(self: &Arc<Self>, client: &Arc<LoopbackClient>, phone: String) {
        let Some(delay) = self.auto_pair_after else {
            return;
        };
        let device = Arc::clone(self);
        let target = Arc::downgrade(client);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Only pair the client that asked; a reconnect in between
            // supersedes it.
            let still_current = match (target.upgrade(), device.current()) {
                (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
                _ => false,
            };
            if still_current && device.state.lock().identity.is_none() {
                device.complete_pairing(AUTO_PAIR_NAME, &phone);
            }
        });
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LoopbackClient {
    device: Arc<Device>,
    events: mpsc::Sender<ProtocolEvent>,
    connected: AtomicBool,
    qr: Mutex<Option<mpsc::Sender<QrEvent>>>,
}

impl LoopbackClient {
    fn emit(&self, event: ProtocolEvent) {
        if let Err(e) = self.events.try_send(event) {
            tracing::warn!(user = %self.device.user.short(), error = %e, "loopback event dropped");
        }
    }

    fn require_link(&self) -> Result<(), ProtocolError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ProtocolError::NotConnected)
        }
    }

    fn self_arc(&self) -> Option<Arc<Self>> {
        self.device
            .current()
            .filter(|c| std::ptr::eq(Arc::as_ptr(c), self))
    }
}

#[async_trait::async_trait]
impl ProtocolClient for LoopbackClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_paired(&self) -> bool {
        self.device.state.lock().identity.is_some()
    }

    fn identity(&self) -> Option<ConnectedIdentity> {
        if !self.is_connected() {
            return None;
        }
        self.device.state.lock().identity.clone()
    }

    async fn connect(&self) -> Result<(), ProtocolError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.is_paired() {
            self.emit(ProtocolEvent::Connected);
            return Ok(());
        }
        let code = format!("2@{}", uuid::Uuid::new_v4().simple());
        let qr_pending = match self.qr.lock().as_ref() {
            Some(tx) => tx.try_send(QrEvent::Code(code)).is_ok(),
            None => false,
        };
        if qr_pending {
            if let Some(me) = self.self_arc() {
                self.device.schedule_auto_pair(&me, AUTO_PAIR_PHONE.to_owned());
            }
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.qr.lock().take();
    }

    async fn logout(&self) -> Result<(), ProtocolError> {
        self.device.state.lock().identity = None;
        self.connected.store(false, Ordering::SeqCst);
        self.qr.lock().take();
        Ok(())
    }

    async fn qr_channel(&self) -> Result<mpsc::Receiver<QrEvent>, ProtocolError> {
        if self.is_paired() {
            return Err(ProtocolError::Rejected("device is already paired".into()));
        }
        if self.is_connected() {
            return Err(ProtocolError::Rejected(
                "QR channel must be requested before connecting".into(),
            ));
        }
        let (tx, rx) = mpsc::channel(QR_BUFFER);
        *self.qr.lock() = Some(tx);
        Ok(rx)
    }

    async fn pair_phone(&self, phone: &str, client_name: &str) -> Result<String, ProtocolError> {
        self.require_link()?;
        let phone = normalize_phone(phone)
            .ok_or_else(|| ProtocolError::Rejected(format!("invalid phone number: {phone}")))?;
        let raw = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        let code = format!("{}-{}", &raw[..4], &raw[4..8]);
        tracing::debug!(
            user = %self.device.user.short(),
            client_name,
            "loopback pairing code issued"
        );
        if let Some(me) = self.self_arc() {
            self.device.schedule_auto_pair(&me, phone);
        }
        Ok(code)
    }

    async fn send_text(&self, to: &Address, body: &str) -> Result<SendReceipt, ProtocolError> {
        self.require_link()?;
        if !self.is_paired() {
            return Err(ProtocolError::NotConnected);
        }
        let delay = self.device.state.lock().send_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut st = self.device.state.lock();
        if let Some(reason) = &st.fail_sends {
            return Err(ProtocolError::Rejected(reason.clone()));
        }
        let id = format!(
            "3EB0{}",
            &uuid::Uuid::new_v4().simple().to_string().to_uppercase()[..16]
        );
        st.sent.push(SentText {
            id: id.clone(),
            to: to.clone(),
            body: body.to_owned(),
        });
        Ok(SendReceipt {
            id,
            timestamp: Utc::now(),
        })
    }

    async fn joined_groups(&self) -> Result<Vec<GroupInfo>, ProtocolError> {
        self.require_link()?;
        Ok(self.device.state.lock().groups.clone())
    }

    async fn join_group_with_link(&self, link: &str) -> Result<Address, ProtocolError> {
        self.require_link()?;
        let code = link.trim().trim_end_matches('/').rsplit('/').next().unwrap_or("");
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ProtocolError::Rejected(format!("invalid invite link: {link}")));
        }
        let mut st = self.device.state.lock();
        let me = st
            .identity
            .as_ref()
            .map(|i| Address::new(i.phone.clone(), USER_SERVER));
        let n = uuid::Uuid::new_v4().as_u128() % 1_000_000_000_000;
        let jid = Address::new(format!("120363{n:012}"), GROUP_SERVER);
        st.groups.push(GroupInfo {
            jid: jid.clone(),
            name: format!("Group {code}"),
            participants: me.into_iter().collect(),
            is_announce: false,
        });
        Ok(jid)
    }

    async fn leave_group(&self, group: &Address) -> Result<(), ProtocolError> {
        self.require_link()?;
        let mut st = self.device.state.lock();
        let pos = st
            .groups
            .iter()
            .position(|g| g.jid.user == group.user)
            .ok_or_else(|| ProtocolError::Rejected(format!("not a participant of {group}")))?;
        st.groups.remove(pos);
        Ok(())
    }

    async fn add_participants(
        &self,
        group: &Address,
        participants: &[Address],
    ) -> Result<(), ProtocolError> {
        self.require_link()?;
        let mut st = self.device.state.lock();
        let info = st
            .groups
            .iter_mut()
            .find(|g| g.jid.user == group.user)
            .ok_or_else(|| ProtocolError::Rejected(format!("not a participant of {group}")))?;
        for p in participants {
            let p = p.without_device();
            if !info.participants.contains(&p) {
                info.participants.push(p);
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Control surface
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drives the simulated phone side of a loopback device.
#[derive(Clone)]
pub struct LoopbackControl {
    device: Arc<Device>,
}

impl LoopbackControl {
    /// Accept the pending QR scan or pairing code.
    pub fn complete_pairing(&self, push_name: &str, phone: &str) -> bool {
        self.device.complete_pairing(push_name, phone)
    }

    /// Mark the device as already paired, as if credentials were on disk.
    pub fn pre_pair(&self, push_name: &str, phone: &str) {
        self.device.state.lock().identity = Some(ConnectedIdentity {
            push_name: push_name.to_owned(),
            phone: phone.to_owned(),
            platform: PLATFORM.to_owned(),
        });
    }

    pub fn is_paired(&self) -> bool {
        self.device.state.lock().identity.is_some()
    }

    /// Deliver `message` on the live client's event stream.
    pub fn inject_message(&self, message: InboundMessage) -> bool {
        match self.device.current().filter(|c| c.is_connected()) {
            Some(client) => {
                client.emit(ProtocolEvent::Message(message));
                true
            }
            None => false,
        }
    }

    /// Simulate the network dropping the link.
    pub fn drop_connection(&self) {
        if let Some(client) = self.device.current() {
            client.connected.store(false, Ordering::SeqCst);
            client.emit(ProtocolEvent::Disconnected);
        }
    }

    /// Simulate the phone unlinking this device.
    pub fn log_out(&self, reason: &str) {
        self.device.state.lock().identity = None;
        if let Some(client) = self.device.current() {
            client.connected.store(false, Ordering::SeqCst);
            client.emit(ProtocolEvent::LoggedOut {
                reason: reason.to_owned(),
            });
        }
    }

    pub fn set_groups(&self, groups: Vec<GroupInfo>) {
        self.device.state.lock().groups = groups;
    }

    /// Make every send fail with `reason` until cleared with `None`.
    pub fn fail_sends(&self, reason: Option<String>) {
        self.device.state.lock().fail_sends = reason;
    }

    /// Hold every send for `delay` before completing it.
    pub fn delay_sends(&self, delay: Option<Duration>) {
        self.device.state.lock().send_delay = delay;
    }

    pub fn sent(&self) -> Vec<SentText> {
        self.device.state.lock().sent.clone()
    }

    /// How many clients have been opened for this device.
    pub fn open_count(&self) -> usize {
        self.device.state.lock().opened
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn qr_login_then_pair() {
        let connector = LoopbackConnector::new();
        let user = uid("u1");
        let ClientHandle { client, mut events } = connector.open(&user).await.unwrap();

        let mut qr = client.qr_channel().await.unwrap();
        client.connect().await.unwrap();
        assert!(matches!(qr.recv().await, Some(QrEvent::Code(_))));
        assert!(client.identity().is_none());

        assert!(connector.control(&user).complete_pairing("Ann", "15551234567"));
        assert_eq!(qr.recv().await, Some(QrEvent::Success));
        assert!(matches!(events.recv().await, Some(ProtocolEvent::PairSuccess { .. })));
        assert_eq!(events.recv().await, Some(ProtocolEvent::Connected));
        assert_eq!(client.identity().unwrap().phone, "15551234567");
    }

    #[tokio::test]
    async fn paired_device_connects_directly() {
        let connector = LoopbackConnector::new();
        let user = uid("u2");
        connector.control(&user).pre_pair("Ann", "15551234567");

        let ClientHandle { client, mut events } = connector.open(&user).await.unwrap();
        assert!(client.qr_channel().await.is_err());
        client.connect().await.unwrap();
        assert_eq!(events.recv().await, Some(ProtocolEvent::Connected));
    }

    #[tokio::test]
    async fn pairing_code_requires_connection_and_valid_phone() {
        let connector = LoopbackConnector::new();
        let ClientHandle { client, .. } = connector.open(&uid("u3")).await.unwrap();
        assert_eq!(
            client.pair_phone("15551234567", "Chrome").await,
            Err(ProtocolError::NotConnected)
        );
        client.connect().await.unwrap();
        assert!(client.pair_phone("abc", "Chrome").await.is_err());
        let code = client.pair_phone("+1 555 123 4567", "Chrome").await.unwrap();
        assert_eq!(code.len(), 9);
        assert_eq!(&code[4..5], "-");
    }

    #[tokio::test]
    async fn auto_pair_completes_qr_exchange() {
        let connector = LoopbackConnector::with_auto_pair(Duration::from_millis(20));
        let user = uid("u4");
        let ClientHandle { client, mut events } = connector.open(&user).await.unwrap();
        let _qr = client.qr_channel().await.unwrap();
        client.connect().await.unwrap();

        assert!(matches!(events.recv().await, Some(ProtocolEvent::PairSuccess { .. })));
        assert_eq!(events.recv().await, Some(ProtocolEvent::Connected));
        assert!(connector.control(&user).is_paired());
    }

    #[tokio::test]
    async fn sends_are_recorded_and_can_fail() {
        let connector = LoopbackConnector::new();
        let user = uid("u5");
        let control = connector.control(&user);
        control.pre_pair("Ann", "15551234567");
        let ClientHandle { client, .. } = connector.open(&user).await.unwrap();

        let to = Address::user("15550001111").unwrap();
        assert_eq!(
            client.send_text(&to, "hi").await,
            Err(ProtocolError::NotConnected)
        );
        client.connect().await.unwrap();
        let receipt = client.send_text(&to, "hi").await.unwrap();
        assert!(receipt.id.starts_with("3EB0"));
        assert_eq!(control.sent().len(), 1);

        control.fail_sends(Some("rate limited".into()));
        assert!(matches!(
            client.send_text(&to, "again").await,
            Err(ProtocolError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn group_membership_round_trip() {
        let connector = LoopbackConnector::new();
        let user = uid("u6");
        connector.control(&user).pre_pair("Ann", "15551234567");
        let ClientHandle { client, .. } = connector.open(&user).await.unwrap();
        client.connect().await.unwrap();

        let jid = client
            .join_group_with_link("https://chat.whatsapp.com/AbC123")
            .await
            .unwrap();
        assert!(jid.is_group());
        client
            .add_participants(&jid, &[Address::user("15550001111").unwrap()])
            .await
            .unwrap();
        let groups = client.joined_groups().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].participants.len(), 2);

        client.leave_group(&jid).await.unwrap();
        assert!(client.leave_group(&jid).await.is_err());
        assert!(client.join_group_with_link("https://chat.whatsapp.com/").await.is_err());
    }

    #[tokio::test]
    async fn control_events_reach_only_the_current_client() {
        let connector = LoopbackConnector::new();
        let user = uid("u7");
        let control = connector.control(&user);
        control.pre_pair("Ann", "15551234567");

        let first = connector.open(&user).await.unwrap();
        first.client.connect().await.unwrap();
        let mut second = connector.open(&user).await.unwrap();
        second.client.connect().await.unwrap();
        assert_eq!(second.events.recv().await, Some(ProtocolEvent::Connected));

        control.drop_connection();
        assert_eq!(second.events.recv().await, Some(ProtocolEvent::Disconnected));
        assert!(first.client.is_connected());
        assert_eq!(control.open_count(), 2);
    }
}
