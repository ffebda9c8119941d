use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("range out of bounds: requested {start}..={end}, entry size {size}")]
    RangeOutOfBounds { start: u64, end: u64, size: u64 },

    #[error("range overlaps an uncommitted chunk")]
    UncommittedRange,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata corrupt: {0}")]
    CorruptMetadata(String),

    #[error("quota exceeded")]
    Capacity,
}

impl From<StoreError> for signage_core::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(s) => signage_core::Error::NotFound(s),
            StoreError::Capacity => signage_core::Error::Capacity,
            StoreError::RangeOutOfBounds { .. } | StoreError::UncommittedRange => {
                signage_core::Error::NotFound(e.to_string())
            }
            StoreError::Io(io) => signage_core::Error::Io(io),
            StoreError::CorruptMetadata(s) => signage_core::Error::Protocol(s),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
