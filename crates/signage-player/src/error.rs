use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Core(#[from] signage_core::Error),

    #[error("persisted identity at {path} is corrupt: {source}")]
    CorruptIdentity {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<signage_transport::TransportError> for PlayerError {
    fn from(e: signage_transport::TransportError) -> Self {
        Self::Core(e.into())
    }
}

impl From<signage_manifest::ManifestError> for PlayerError {
    fn from(e: signage_manifest::ManifestError) -> Self {
        Self::Core(e.into())
    }
}

impl From<signage_download::DownloadError> for PlayerError {
    fn from(e: signage_download::DownloadError) -> Self {
        Self::Core(e.into())
    }
}

impl From<signage_store::StoreError> for PlayerError {
    fn from(e: signage_store::StoreError) -> Self {
        Self::Core(e.into())
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
