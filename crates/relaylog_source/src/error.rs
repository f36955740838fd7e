//! Error types for replica source operations.

use std::io;
use thiserror::Error;

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors that can occur while opening or reading replica files.
#[derive(Debug, Error)]
pub enum SourceError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No replica file covers the requested logical position.
    #[error("no replica file covers logical position {position}")]
    NoSuchPosition {
        /// The logical position that was requested.
        position: i64,
    },

    /// A replica file is corrupted.
    #[error("replica file corrupted: {0}")]
    Corrupted(String),

    /// Stream cipher setup failed.
    #[error("cipher error: {0}")]
    Cipher(String),
}

impl SourceError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates a cipher error.
    pub fn cipher(message: impl Into<String>) -> Self {
        Self::Cipher(message.into())
    }
}
