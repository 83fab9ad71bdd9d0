//! Outbound message endpoints.
//!
//! - `POST /api/send-message`       : `{number, body}` to a phone number
//! - `POST /api/send-group-message` : `{groupId, body}` to a joined group
//!
//! Both accept `message` as an alias for `body`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use axum::Extension;
use serde::{Deserialize, Serialize};

use hl_domain::model::Message;

use crate::api::error::ApiResult;
use crate::credentials::AuthIdentity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    number: String,
    #[serde(default, alias = "message")]
    body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendGroupMessageRequest {
    #[serde(default)]
    group_id: String,
    #[serde(default, alias = "message")]
    body: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    success: bool,
    message: Message,
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
    req: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<Json<SendResponse>> {
    let Json(req) = req?;
    let message = state
        .runtime
        .send_message(&who.id, &req.number, &req.body)
        .await?;
    Ok(Json(SendResponse {
        success: true,
        message,
    }))
}

pub async fn send_group_message(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
    req: Result<Json<SendGroupMessageRequest>, JsonRejection>,
) -> ApiResult<Json<SendResponse>> {
    let Json(req) = req?;
    let message = state
        .runtime
        .send_group_message(&who.id, &req.group_id, &req.body)
        .await?;
    Ok(Json(SendResponse {
        success: true,
        message,
    }))
}
