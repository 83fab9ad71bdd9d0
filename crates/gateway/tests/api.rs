use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use hl_domain::config::Config;
use hl_gateway::api;
use hl_gateway::bootstrap;
use hl_gateway::state::AppState;
use hl_protocol::loopback::LoopbackConnector;

const TOKEN: &str = "test-token-1";

struct TestApp {
    app: Router,
    _state: AppState,
    _dir: tempfile::TempDir,
}

async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let users_file = dir.path().join("auth.json");
    std::fs::write(
        &users_file,
        json!({"users": [{"id": "user-1", "email": "ann@example.com", "token": TOKEN}]})
            .to_string(),
    )
    .unwrap();

    let mut config = Config::default();
    config.storage.data_dir = dir.path().join("data");
    config.auth.users_file = users_file;
    config.sessions.command_timeout_secs = 2;

    let state = bootstrap::assemble(Arc::new(config), Arc::new(LoopbackConnector::new()))
        .await
        .unwrap();
    let app = api::router(state.clone()).with_state(state.clone());
    TestApp {
        app,
        _state: state,
        _dir: dir,
    }
}

fn authed(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));
    match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_is_public() {
    let t = test_app().await;
    let (status, body) = call(
        &t.app,
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn api_requires_a_known_token() {
    let t = test_app().await;

    let (status, body) = call(
        &t.app,
        Request::get("/api/status").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = call(
        &t.app,
        Request::get("/api/status")
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cookie_authenticates_too() {
    let t = test_app().await;
    let (status, body) = call(
        &t.app,
        Request::get("/auth/me")
            .header(header::COOKIE, format!("hl_token={TOKEN}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "user-1");
    assert_eq!(body["email"], "ann@example.com");
}

#[tokio::test]
async fn setup_reports_existing_accounts() {
    let t = test_app().await;
    let (status, body) = call(
        &t.app,
        Request::get("/auth/setup").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["setupRequired"], false);
}

#[tokio::test]
async fn fresh_user_status_and_stats() {
    let t = test_app().await;

    let (status, body) = call(&t.app, authed(Method::GET, "/api/status", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "disconnected");
    assert!(body["credentialArtifact"].is_null());
    assert!(body["connectedIdentity"].is_null());
    assert!(body["lastError"].is_null());

    let (status, body) = call(&t.app, authed(Method::GET, "/api/stats", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messagesSent"], 0);
    assert_eq!(body["webhookCount"], 0);

    let (status, body) = call(&t.app, authed(Method::GET, "/api/messages?limit=abc", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn webhook_registration_lifecycle() {
    let t = test_app().await;
    let hook = json!({"url": "https://example.com/hook", "name": "main"});

    let (status, body) = call(
        &t.app,
        authed(Method::POST, "/api/hooks/register", Some(hook.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["webhook"]["name"], "main");

    let (status, _) = call(&t.app, authed(Method::POST, "/api/hooks/register", Some(hook))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &t.app,
        authed(
            Method::POST,
            "/api/hooks/register",
            Some(json!({"url": "ftp://example.com"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = call(&t.app, authed(Method::GET, "/api/hooks", None)).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let unregister = json!({"url": "https://example.com/hook"});
    let (status, _) = call(
        &t.app,
        authed(Method::DELETE, "/api/hooks/unregister", Some(unregister.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(
        &t.app,
        authed(Method::DELETE, "/api/hooks/unregister", Some(unregister)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &t.app,
        authed(Method::DELETE, "/api/hooks/unregister", Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn send_requires_connection_and_valid_input() {
    let t = test_app().await;

    let (status, body) = call(
        &t.app,
        authed(
            Method::POST,
            "/api/send-message",
            Some(json!({"number": "15550001111", "message": "hi"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, _) = call(
        &t.app,
        authed(Method::POST, "/api/send-message", Some(json!({"number": "15550001111"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = Request::post("/api/send-message")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(&t.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid JSON");
}

#[tokio::test]
async fn reconnect_validates_pairing_input() {
    let t = test_app().await;

    let (status, body) = call(
        &t.app,
        authed(Method::POST, "/api/reconnect", Some(json!({"method": "pairing_code"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Phone number is required for pairing code");

    let (_, body) = call(&t.app, authed(Method::GET, "/api/status", None)).await;
    assert_eq!(body["status"], "error");

    let (status, body) = call(&t.app, authed(Method::POST, "/api/reconnect", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Reconnecting via qr...");
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let t = test_app().await;
    for _ in 0..2 {
        let (status, body) = call(&t.app, authed(Method::POST, "/api/disconnect", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }
    let (_, body) = call(&t.app, authed(Method::GET, "/api/status", None)).await;
    assert_eq!(body["status"], "disconnected");
}
