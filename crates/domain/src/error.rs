/// Shared error type used across all Hookline crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid user ID format")]
    InvalidUserId,

    #[error("{0}")]
    Validation(String),

    #[error("client is not connected")]
    NotConnected,

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("webhook already registered for {0}")]
    DuplicateWebhook(String),

    #[error("webhook not found: {0}")]
    WebhookNotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
