use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("authentication failed ({0})")]
    Auth(StatusCode),

    #[error("HTTP status: {0}")]
    HttpStatus(StatusCode),

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("request timed out")]
    Timeout,
}

impl TransportError {
    /// 5xx and network are retriable; 401/403 map to `Auth` and are not
    /// blindly retried; other 4xx are non-retriable (spec.md §4.1).
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.status().is_none(),
            Self::HttpStatus(status) => status.is_server_error(),
            Self::Timeout => true,
            Self::Auth(_) | Self::Protocol(_) => false,
        }
    }
}

impl From<TransportError> for signage_core::Error {
    fn from(e: TransportError) -> Self {
        match &e {
            TransportError::Auth(status) => signage_core::Error::Auth(status.to_string()),
            TransportError::Protocol(msg) => signage_core::Error::Protocol(msg.clone()),
            TransportError::Network(_) | TransportError::Timeout => {
                signage_core::Error::Transient(e.to_string())
            }
            TransportError::HttpStatus(status) if status.is_server_error() => {
                signage_core::Error::Transient(e.to_string())
            }
            TransportError::HttpStatus(_) => signage_core::Error::Protocol(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
