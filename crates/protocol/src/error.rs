use hl_domain::Error;

/// Failures reported by a protocol client.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("client is not connected")]
    NotConnected,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("event stream closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::NotConnected => Error::NotConnected,
            ProtocolError::InvalidAddress(a) => Error::Validation(format!("invalid address: {a}")),
            other => Error::Protocol(other.to_string()),
        }
    }
}
