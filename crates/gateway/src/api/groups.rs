//! Group endpoints.
//!
//! - `GET  /api/groups`       : joined groups
//! - `POST /api/join-group`   : `{inviteLink}`
//! - `POST /api/leave-group`  : `{groupId}`
//! - `POST /api/add-to-group` : `{groupId, participants[]}`

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use axum::Extension;
use serde::Deserialize;
use serde_json::{json, Value};

use hl_domain::model::GroupSummary;

use crate::api::error::ApiResult;
use crate::credentials::AuthIdentity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupRequest {
    #[serde(default)]
    invite_link: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveGroupRequest {
    #[serde(default)]
    group_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToGroupRequest {
    #[serde(default)]
    group_id: String,
    #[serde(default)]
    participants: Vec<String>,
}

pub async fn list_groups(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
) -> ApiResult<Json<Vec<GroupSummary>>> {
    Ok(Json(state.runtime.groups(&who.id).await?))
}

pub async fn join_group(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
    req: Result<Json<JoinGroupRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = req?;
    let group_id = state.runtime.join_group(&who.id, &req.invite_link).await?;
    Ok(Json(json!({
        "success": true,
        "result": { "success": true, "groupId": group_id },
    })))
}

pub async fn leave_group(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
    req: Result<Json<LeaveGroupRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = req?;
    state.runtime.leave_group(&who.id, &req.group_id).await?;
    Ok(Json(json!({
        "success": true,
        "result": { "success": true, "groupId": req.group_id },
    })))
}

pub async fn add_to_group(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
    req: Result<Json<AddToGroupRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = req?;
    state
        .runtime
        .add_to_group(&who.id, &req.group_id, &req.participants)
        .await?;
    Ok(Json(json!({
        "success": true,
        "result": { "success": true },
    })))
}
