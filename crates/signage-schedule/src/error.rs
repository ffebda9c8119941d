use thiserror::Error;

/// The schedule document itself can fail to parse; the decision algorithm
/// that runs over an already-parsed [`crate::types::ScheduleModel`] is
/// total and never errors (spec.md §4.5 ambient note: "resolver cannot
/// block").
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("malformed schedule document: {0}")]
    Parse(String),
}

impl From<ScheduleError> for signage_core::Error {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::Parse(msg) => signage_core::Error::Protocol(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
