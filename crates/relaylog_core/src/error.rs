//! Error types for the replication buffer.

use crate::types::LogPosition;
use thiserror::Error;

/// Result type for buffer operations.
pub type CoreResult<T> = Result<T, ReplicationError>;

/// Fatal errors surfaced by the replication buffer.
///
/// Transient conditions (a short read, a replay callback waiting for more
/// bytes) and the within-grace-period rotation stall are not errors: the
/// pump simply reports no progress and the driver retries later. What
/// reaches this enum is terminal - the buffer cannot make progress and an
/// external restart or re-seek is required. Bookkeeping invariant
/// violations (crossing a seek point mid-stream, rotation state mismatch)
/// are programming errors and abort instead of passing through here.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// The replica source failed at the OS or provider level.
    #[error("source error: {0}")]
    Source(#[from] relaylog_source::SourceError),

    /// No successor file appeared within the rotation grace period.
    #[error("rotation stalled after {file_name} at {position}: no next file for {waited_secs}s")]
    RotationStalled {
        /// Name of the exhausted file.
        file_name: String,
        /// Logical position of the rotation boundary.
        position: LogPosition,
        /// Seconds spent waiting for the successor.
        waited_secs: i64,
    },

    /// The replay callback reported an unrecoverable failure.
    #[error("replay failed at {position}: {message}")]
    Replay {
        /// Logical position of the failed span.
        position: LogPosition,
        /// Description from the callback.
        message: String,
    },

    /// Operation not permitted in the current buffer state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl ReplicationError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
