use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use hl_domain::error::Error;

/// Handler error: wraps the shared error type and renders it as
/// `{ "error": "<message>" }` with a matching status code.
#[derive(Debug)]
pub enum ApiError {
    Domain(Error),
    BadRequest(String),
    Unauthorized,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Domain(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected request body");
        Self::BadRequest("Invalid JSON".into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Domain(e) => match e {
                Error::Validation(_) | Error::InvalidUserId => StatusCode::BAD_REQUEST,
                Error::Auth(_) => StatusCode::UNAUTHORIZED,
                Error::NotConnected | Error::DuplicateWebhook(_) => StatusCode::CONFLICT,
                Error::WebhookNotFound(_) => StatusCode::NOT_FOUND,
                Error::Protocol(_) => StatusCode::BAD_GATEWAY,
                Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Other(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(m) => m.clone(),
            Self::Unauthorized => "Unauthorized, please log in".into(),
            Self::Domain(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.message(), "request failed");
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::InvalidUserId, StatusCode::BAD_REQUEST),
            (Error::NotConnected, StatusCode::CONFLICT),
            (Error::DuplicateWebhook("u".into()), StatusCode::CONFLICT),
            (Error::WebhookNotFound("u".into()), StatusCode::NOT_FOUND),
            (Error::Protocol("p".into()), StatusCode::BAD_GATEWAY),
            (Error::Timeout("t".into()), StatusCode::GATEWAY_TIMEOUT),
            (Error::Other("o".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}
