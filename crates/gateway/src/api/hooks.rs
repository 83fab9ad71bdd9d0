//! Webhook registration.
//!
//! - `GET    /api/hooks`            : registered webhooks
//! - `POST   /api/hooks/register`   : `{url, name?}`
//! - `DELETE /api/hooks/unregister` : `{id}` or `{url}`

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use axum::Extension;
use serde::{Deserialize, Serialize};

use hl_domain::model::Webhook;
use hl_store::WebhookSelector;

use crate::api::error::{ApiError, ApiResult};
use crate::credentials::AuthIdentity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    url: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnregisterRequest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl UnregisterRequest {
    fn selector(self) -> Option<WebhookSelector> {
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        match (non_empty(self.id), non_empty(self.url)) {
            (Some(id), _) => Some(WebhookSelector::Id(id)),
            (None, Some(url)) => Some(WebhookSelector::Url(url)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    success: bool,
    webhook: Webhook,
}

pub async fn list_hooks(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
) -> ApiResult<Json<Vec<Webhook>>> {
    Ok(Json(state.runtime.webhooks(&who.id).await?))
}

pub async fn register_hook(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
    req: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Json<WebhookResponse>> {
    let Json(req) = req?;
    let name = req.name.filter(|n| !n.trim().is_empty());
    let webhook = state
        .runtime
        .register_webhook(&who.id, req.url.trim(), name)
        .await?;
    tracing::info!(user = %who.id.short(), webhook_id = %webhook.id, "webhook registered");
    Ok(Json(WebhookResponse {
        success: true,
        webhook,
    }))
}

pub async fn unregister_hook(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
    req: Result<Json<UnregisterRequest>, JsonRejection>,
) -> ApiResult<Json<WebhookResponse>> {
    let Json(req) = req?;
    let selector = req
        .selector()
        .ok_or_else(|| ApiError::BadRequest("id or url is required".into()))?;
    let webhook = state.runtime.unregister_webhook(&who.id, selector).await?;
    tracing::info!(user = %who.id.short(), webhook_id = %webhook.id, "webhook removed");
    Ok(Json(WebhookResponse {
        success: true,
        webhook,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(id: Option<&str>, url: Option<&str>) -> UnregisterRequest {
        UnregisterRequest {
            id: id.map(str::to_owned),
            url: url.map(str::to_owned),
        }
    }

    #[test]
    fn selector_prefers_id() {
        assert_eq!(
            req(Some("w1"), Some("http://x")).selector(),
            Some(WebhookSelector::Id("w1".into()))
        );
        assert_eq!(
            req(Some(" "), Some("http://x")).selector(),
            Some(WebhookSelector::Url("http://x".into()))
        );
        assert_eq!(req(None, None).selector(), None);
    }
}
