use axum::extract::{Query, State};
use axum::response::Json;
use axum::Extension;
use serde::Deserialize;

use hl_domain::model::Message;

use crate::api::error::ApiResult;
use crate::credentials::AuthIdentity;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    /// Kept as text so a malformed value falls back to the default
    /// instead of rejecting the request.
    limit: Option<String>,
}

impl MessagesQuery {
    fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse().ok())
            .unwrap_or(DEFAULT_LIMIT)
    }
}

/// `GET /api/messages?limit=N`: the most recent messages, newest first.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(who): Extension<AuthIdentity>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state.runtime.messages(&who.id, query.limit()).await?;
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(limit: Option<&str>) -> MessagesQuery {
        MessagesQuery {
            limit: limit.map(str::to_owned),
        }
    }

    #[test]
    fn limit_parsing() {
        assert_eq!(q(None).limit(), 50);
        assert_eq!(q(Some("10")).limit(), 10);
        assert_eq!(q(Some("abc")).limit(), 50);
        assert_eq!(q(Some("-3")).limit(), 50);
        assert_eq!(q(Some("0")).limit(), 0);
    }
}
