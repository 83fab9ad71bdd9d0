mod common;

use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::sync::mpsc;

use common::{eventually, inbound, uid, Harness};
use hl_domain::error::Error;
use hl_domain::model::Direction;
use hl_protocol::{Address, GroupInfo};

/// Start a local receiver and return its hook URL plus the payload stream.
async fn receiver() -> (String, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route(
            "/hook",
            post(
                |State(tx): State<mpsc::UnboundedSender<Value>>, Json(body): Json<Value>| async move {
                    let _ = tx.send(body);
                    "ok"
                },
            ),
        )
        .with_state(tx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hook"), rx)
}

/// A URL nothing listens on.
async fn closed_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/hook")
}

#[tokio::test]
async fn inbound_message_reaches_healthy_hook_when_another_fails() {
    let h = Harness::new();
    let user = uid("fan-1");
    h.link(&user).await;

    let dead = closed_url().await;
    let (live, mut payloads) = receiver().await;
    h.runtime.register_webhook(&user, &dead, Some("W1".into())).await.unwrap();
    h.runtime.register_webhook(&user, &live, Some("W2".into())).await.unwrap();

    assert!(h.control(&user).inject_message(inbound("M1", "15550001111", "hello")));

    let body = tokio::time::timeout(Duration::from_secs(5), payloads.recv())
        .await
        .expect("webhook not delivered")
        .unwrap();
    assert_eq!(body["id"], "M1");
    assert_eq!(body["body"], "hello");
    assert_eq!(body["from"], "15550001111@s.whatsapp.net");
    assert_eq!(body["to"], "fan-1");
    assert_eq!(body["direction"], "received");
    assert_eq!(body["contactName"], "Bob");
    assert_eq!(body["isGroup"], false);

    let stats = h.runtime.stats(&user).await.unwrap();
    assert_eq!(stats.stats.messages_received, 1);
    assert_eq!(stats.webhook_count, 2);
}

#[tokio::test]
async fn own_echoes_are_dropped() {
    let h = Harness::new();
    let user = uid("fan-echo");
    h.link(&user).await;

    let mut echo = inbound("E1", "15550001111", "mine");
    echo.is_from_me = true;
    assert!(h.control(&user).inject_message(echo));
    assert!(h.control(&user).inject_message(inbound("M2", "15550001111", "theirs")));

    eventually("second message stored", || async {
        !h.runtime.messages(&user, 10).await.unwrap().is_empty()
    })
    .await;
    let messages = h.runtime.messages(&user, 10).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, "M2");
}

#[tokio::test]
async fn sent_messages_are_recorded_but_not_fanned_out() {
    let h = Harness::new();
    let user = uid("fan-send");
    h.link(&user).await;
    let (live, mut payloads) = receiver().await;
    h.runtime.register_webhook(&user, &live, None).await.unwrap();

    let sent = h
        .runtime
        .send_message(&user, "+1 555 000 1111", "hi there")
        .await
        .unwrap();
    assert!(sent.id.starts_with("3EB0"));
    assert_eq!(sent.direction, Direction::Sent);
    assert_eq!(sent.to, "15550001111@s.whatsapp.net");
    assert_eq!(sent.contact_name.as_deref(), Some("+1 555 000 1111"));

    let recorded = h.control(&user).sent();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].body, "hi there");

    let messages = h.runtime.messages(&user, 10).await.unwrap();
    assert_eq!(messages[0].id, sent.id);
    assert_eq!(h.runtime.stats(&user).await.unwrap().stats.messages_sent, 1);

    let nothing = tokio::time::timeout(Duration::from_millis(300), payloads.recv()).await;
    assert!(nothing.is_err(), "sent message must not be fanned out");
}

#[tokio::test]
async fn group_send_carries_group_name() {
    let h = Harness::new();
    let user = uid("fan-group");
    h.control(&user).set_groups(vec![GroupInfo {
        jid: Address::group("120363000000000001").unwrap(),
        name: "Family".into(),
        participants: vec![],
        is_announce: false,
    }]);
    h.link(&user).await;

    let groups = h.runtime.groups(&user).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].id, "120363000000000001");

    let sent = h
        .runtime
        .send_group_message(&user, "120363000000000001", "hey all")
        .await
        .unwrap();
    assert!(sent.is_group);
    assert_eq!(sent.group_name.as_deref(), Some("Family"));
    assert_eq!(sent.contact_name.as_deref(), Some("Group"));
    assert_eq!(sent.to, "120363000000000001@g.us");
}

#[tokio::test]
async fn commands_require_a_ready_session() {
    let h = Harness::new();
    let user = uid("fan-offline");

    let err = h.runtime.send_message(&user, "15550001111", "hi").await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
    let err = h.runtime.join_group(&user, "https://chat.whatsapp.com/AbC123").await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));

    let err = h.runtime.send_message(&user, "", "hi").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn protocol_rejections_surface_as_protocol_errors() {
    let h = Harness::new();
    let user = uid("fan-reject");
    h.link(&user).await;
    h.control(&user).fail_sends(Some("recipient unavailable".into()));

    let err = h.runtime.send_message(&user, "15550001111", "hi").await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)), "{err:?}");
    assert!(h.runtime.messages(&user, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn slow_commands_time_out_for_the_caller() {
    let h = Harness::new();
    let user = uid("fan-slow");
    h.link(&user).await;
    h.control(&user).delay_sends(Some(Duration::from_secs(4)));

    let err = h.runtime.send_message(&user, "15550001111", "hi").await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{err:?}");
}

#[tokio::test]
async fn timed_out_send_is_recorded_once_it_goes_out() {
    let h = Harness::new();
    let user = uid("fan-late");
    h.link(&user).await;
    h.control(&user).delay_sends(Some(Duration::from_secs(3)));

    let err = h.runtime.send_message(&user, "15550001111", "late hi").await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{err:?}");

    eventually("late send recorded", || async {
        h.runtime.stats(&user).await.unwrap().stats.messages_sent == 1
    })
    .await;
    assert_eq!(h.control(&user).sent().len(), 1);
    let messages = h.runtime.messages(&user, 10).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, "late hi");
    assert_eq!(messages[0].direction, Direction::Sent);
}

#[tokio::test]
async fn timed_out_send_is_not_recorded_after_disconnect() {
    let h = Harness::new();
    let user = uid("fan-late-reset");
    h.link(&user).await;
    h.control(&user).delay_sends(Some(Duration::from_secs(3)));

    let err = h.runtime.send_message(&user, "15550001111", "late hi").await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{err:?}");
    h.runtime.disconnect(&user).await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.runtime.messages(&user, 10).await.unwrap().is_empty());
    assert_eq!(h.runtime.stats(&user).await.unwrap().stats.messages_sent, 0);
}

#[tokio::test]
async fn join_and_leave_update_counters_and_groups() {
    let h = Harness::new();
    let user = uid("fan-join");
    h.link(&user).await;

    let jid = h
        .runtime
        .join_group(&user, "https://chat.whatsapp.com/AbC123")
        .await
        .unwrap();
    assert!(jid.ends_with("@g.us"));
    let group_id = jid.trim_end_matches("@g.us").to_owned();

    eventually("joined group listed", || async {
        h.runtime
            .groups(&user)
            .await
            .unwrap()
            .iter()
            .any(|g| g.id == group_id)
    })
    .await;

    h.runtime
        .add_to_group(&user, &group_id, &["15550002222".to_owned()])
        .await
        .unwrap();
    h.runtime.leave_group(&user, &group_id).await.unwrap();

    let stats = h.runtime.stats(&user).await.unwrap().stats;
    assert_eq!(stats.groups_joined, 1);
    assert_eq!(stats.groups_left, 1);
}

#[tokio::test]
async fn groups_fall_back_to_persisted_list_when_offline() {
    let h = Harness::new();
    let user = uid("fan-persist");
    h.control(&user).set_groups(vec![GroupInfo {
        jid: Address::group("120363000000000009").unwrap(),
        name: "Work".into(),
        participants: vec![],
        is_announce: true,
    }]);
    h.link(&user).await;
    eventually("groups persisted", || async {
        !h.store.groups(&user).await.unwrap().0.is_empty()
    })
    .await;

    h.control(&user).drop_connection();
    h.wait_for(&user, hl_gateway::runtime::SessionStatus::Error).await;

    let groups = h.runtime.groups(&user).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "Work");
    assert!(groups[0].is_read_only);
}
