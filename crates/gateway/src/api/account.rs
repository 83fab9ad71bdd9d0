//! Health probe and account introspection.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde_json::{json, Value};

use crate::credentials::AuthIdentity;
use crate::state::AppState;

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": state.config.server.name,
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.runtime.registry().len(),
    }))
}

/// `GET /auth/setup`: whether the first account still has to be created.
pub async fn setup(State(state): State<AppState>) -> Json<Value> {
    let setup_required = !state.credentials.user_exists_any().await;
    Json(json!({ "setupRequired": setup_required }))
}

/// `GET /auth/me`
pub async fn me(Extension(who): Extension<AuthIdentity>) -> Json<AuthIdentity> {
    Json(who)
}

/// `POST /auth/logout`: expire the session cookie.
pub async fn logout(State(state): State<AppState>) -> Response {
    let cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        state.config.auth.cookie_name
    );
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true })),
    )
        .into_response()
}
