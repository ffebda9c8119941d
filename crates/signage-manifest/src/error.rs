use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("malformed layout XLF: {0}")]
    Xlf(String),

    #[error("store error: {0}")]
    Store(#[from] signage_store::StoreError),
}

impl From<ManifestError> for signage_core::Error {
    fn from(e: ManifestError) -> Self {
        match e {
            ManifestError::Xlf(msg) => signage_core::Error::Protocol(msg),
            ManifestError::Store(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ManifestError>;
