//! Shared error type (spec.md §7, "Error handling design").
//!
//! Every crate in the workspace may define a narrower local error for its
//! own internals, but converts into [`Error`] at its public boundary, the
//! way the teacher's per-crate error enums all ultimately surface through
//! `thiserror`.

use thiserror::Error;

/// The seven error kinds spec.md §7 names, realized as a single enum.
#[derive(Debug, Error)]
pub enum Error {
    /// Network, 5xx, or timeout. Retriable by the transport layer; only
    /// surfaced once retries are exhausted.
    #[error("transient error: {0}")]
    Transient(String),

    /// 401/403, or token expiry.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Malformed response or schema mismatch. Non-retriable.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// MD5 or size mismatch between declared and observed content.
    #[error("integrity mismatch: declared {declared}, actual {actual}")]
    Integrity { declared: String, actual: String },

    /// Store write failed due to quota.
    #[error("storage capacity exceeded")]
    Capacity,

    /// Explicit clear/shutdown.
    #[error("operation cancelled")]
    Cancelled,

    /// Resource absent.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether the transport layer should retry a call that failed with
    /// this error (spec.md §4.1, "Retry & backoff").
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::Io(_) => true,
            Self::Auth(_)
            | Self::Protocol(_)
            | Self::Integrity { .. }
            | Self::Capacity
            | Self::Cancelled
            | Self::NotFound(_)
            | Self::Json(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retriable() {
        assert!(Error::Transient("timeout".into()).should_retry());
    }

    #[test]
    fn auth_is_not_retriable() {
        assert!(!Error::Auth("bad key".into()).should_retry());
    }

    #[test]
    fn protocol_is_not_retriable() {
        assert!(!Error::Protocol("bad json".into()).should_retry());
    }
}
