//! Error types for eventline
//!
//! The error taxonomy mirrors the split the storage core lives by: fatal
//! inconsistencies (a corrupt log or a misbehaving writer, after which the
//! index can no longer be trusted) versus ordinary negative outcomes, which
//! are typed results on the read path and never surface here.

use thiserror::Error;

/// Result type alias for eventline operations
pub type Result<T> = std::result::Result<T, EventlineError>;

/// Errors raised by the storage core.
///
/// Every variant except `Io` and `LogReader` indicates that the durable log
/// and the index have diverged or would diverge; callers must treat those as
/// fatal and stop index construction rather than retry.
#[derive(Debug, Error)]
pub enum EventlineError {
    /// A prepare arrived whose expected version does not match the tracked
    /// last event number for its stream within the open transaction.
    #[error(
        "sequence violation on stream '{stream}' in transaction at {transaction_position}: \
         expected version {expected}, prepare carried {actual}"
    )]
    SequenceViolation {
        stream: String,
        transaction_position: u64,
        expected: i64,
        actual: i64,
    },

    /// A record of an unexpected kind was read at a position where the
    /// tailing protocol required something else.
    #[error("unexpected record at position {position}: {detail}")]
    UnexpectedRecord { position: u64, detail: String },

    /// An explicit commit record could not be resolved against the prepares
    /// of its transaction.
    #[error("commit for transaction at {transaction_position} cannot be resolved: no matching prepares")]
    InvalidCommit { transaction_position: u64 },

    /// The sequential log reader failed or was used after close.
    #[error("log reader: {0}")]
    LogReader(String),

    /// An index mutation failed.
    #[error("index {operation}: {detail}")]
    Index { operation: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EventlineError {
    pub fn index(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Index {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    /// Whether this error means the log and index are (or would become)
    /// inconsistent, requiring the chaser to fault rather than continue.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::SequenceViolation { .. } | Self::UnexpectedRecord { .. } | Self::InvalidCommit { .. }
        )
    }
}
