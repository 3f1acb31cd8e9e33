//! Lifecycle errors for background loops

use tally_domain::TallyError;
use thiserror::Error;

use crate::errors::InfraError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("background loop is already running")]
    AlreadyRunning,

    #[error("background loop is not running")]
    NotRunning,

    /// The loop ignored cancellation for longer than the join timeout.
    #[error("background loop did not stop within {seconds}s")]
    Timeout { seconds: u64 },

    /// The loop panicked or was aborted.
    #[error("background loop failed: {0}")]
    TaskJoinFailed(String),
}

impl From<SchedulerError> for TallyError {
    fn from(err: SchedulerError) -> Self {
        let message = err.to_string();
        match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                TallyError::InvalidInput(message)
            }
            SchedulerError::Timeout { .. } => TallyError::Timeout(message),
            SchedulerError::TaskJoinFailed(_) => TallyError::Internal(message),
        }
    }
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        InfraError(err.into())
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
