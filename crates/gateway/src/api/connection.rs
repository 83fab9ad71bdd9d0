//! Device link control.
//!
//! - `POST /api/disconnect`: log the device out and wipe bot data
//! - `POST /api/reconnect`: `{method?, phoneNumber?}`; returns at once,
//!   progress is observed through `GET /api/status`

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Json;
use axum::Extension;
use serde::{Deserialize, Serialize};

use hl_domain::config::LinkMethod;

use crate::api::error::{ApiError, ApiResult};
use crate::credentials::AuthIdentity;
use crate::runtime::StatusSnapshot;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectRequest {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReconnectResponse {
    success: bool,
    message: String,
    status: StatusSnapshot,
}

fn parse_method(raw: Option<&str>) -> Result<Option<LinkMethod>, ApiError> {
    match raw.map(str::trim).filter(|m| !m.is_empty()) {
        None => Ok(None),
        Some("qr") => Ok(Some(LinkMethod::Qr)),
        Some("pairing_code") | Some("code") => Ok(Some(LinkMethod::PairingCode)),
        Some(other) => Err(ApiError::BadRequest(format!(
            "unknown method \"{other}\", expected qr or pairing_code"
        ))),
    }
}

/// An empty body means "reconnect with defaults".
fn parse_body(body: &[u8]) -> Result<ReconnectRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ReconnectRequest::default());
    }
    serde_json::from_slice(body).map_err(|_| ApiError::BadRequest("Invalid JSON".into()))
}

pub async fn disconnect(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
) -> ApiResult<Json<serde_json::Value>> {
    state.runtime.disconnect(&who.id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Device disconnected",
    })))
}

pub async fn reconnect(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
    body: Bytes,
) -> ApiResult<Json<ReconnectResponse>> {
    let req = parse_body(&body)?;
    let method = parse_method(req.method.as_deref())?;
    let status = state
        .runtime
        .reconnect(&who.id, method, req.phone_number)
        .await?;
    let label = method.unwrap_or(state.config.sessions.default_method).as_str();
    Ok(Json(ReconnectResponse {
        success: true,
        message: format!("Reconnecting via {label}..."),
        status,
    }))
}
