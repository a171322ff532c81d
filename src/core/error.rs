use thiserror::Error;

use crate::journal::JournalError;

/// Failure signals of queue operations.
///
/// `NotFound` and `Empty` are distinct on purpose: an empty queue still
/// exists, a missing one was never created or has been deleted.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue {0:?} does not exist")]
    NotFound(String),

    #[error("queue {0:?} is empty")]
    Empty(String),

    #[error("queue {0:?} is full")]
    CapacityExhausted(String),

    #[error("operation could not be journaled: {0}")]
    DurabilityFailure(#[source] JournalError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type QueueResult<T> = Result<T, QueueError>;
