use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("integrity mismatch: declared {declared}, actual {actual}")]
    Integrity { declared: String, actual: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("download cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<signage_store::StoreError> for DownloadError {
    fn from(e: signage_store::StoreError) -> Self {
        Self::Store(e.to_string())
    }
}

impl DownloadError {
    /// Whether a fetch attempt that failed with this error is worth
    /// retrying (spec.md §4.1: network errors and 5xx are retriable by the
    /// transport layer; everything else is not).
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::HttpStatus(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
            Self::Integrity { .. } | Self::Store(_) | Self::Cancelled => false,
        }
    }
}

impl From<DownloadError> for signage_core::Error {
    fn from(e: DownloadError) -> Self {
        match e {
            DownloadError::Network(msg) => signage_core::Error::Transient(msg),
            DownloadError::HttpStatus(code) if (500..600).contains(&code) => {
                signage_core::Error::Transient(format!("http {code}"))
            }
            DownloadError::HttpStatus(code) => signage_core::Error::Protocol(format!("http {code}")),
            DownloadError::Integrity { declared, actual } => {
                signage_core::Error::Integrity { declared, actual }
            }
            DownloadError::Store(msg) => signage_core::Error::Protocol(msg),
            DownloadError::Cancelled => signage_core::Error::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
