use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal overload: {0}")]
    Backpressure(String),

    #[error("journal writer stopped")]
    WriterStopped,

    #[error("malformed journal record: {reason}")]
    MalformedRecord { reason: String },

    #[error("recovery directory {path:?} is unreadable: {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl JournalError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        JournalError::MalformedRecord {
            reason: reason.into(),
        }
    }
}
