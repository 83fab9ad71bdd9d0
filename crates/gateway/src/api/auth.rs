//! API authentication middleware.
//!
//! Every protected request must identify a user, either with
//! `Authorization: Bearer <token>` or with the session cookie named by
//! `auth.cookie_name`. The resolved [`AuthIdentity`] is attached to the
//! request as an extension for handlers to extract.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::state::AppState;

/// Axum middleware that resolves the caller on protected routes. Attach via
/// `axum::middleware::from_fn_with_state`.
pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = presented_token(req.headers(), &state.config.auth.cookie_name);
    let Some(token) = token else {
        return ApiError::Unauthorized.into_response();
    };

    match state.credentials.verify_token(&token).await {
        Some(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        None => {
            tracing::debug!(path = %req.uri().path(), "rejected unknown token");
            ApiError::Unauthorized.into_response()
        }
    }
}

/// The bearer token wins over the cookie.
pub fn presented_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(t) = bearer {
        return Some(t.to_owned());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_owned())
        .filter(|v| !v.is_empty())
}
