//! Centralized error types for spamsift.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the spamsift library.
#[derive(Error, Debug)]
pub enum IngestError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The input directory does not exist.
    #[error("Input directory not found: {0}")]
    InputNotFound(PathBuf),

    /// The input path exists but is not a directory.
    #[error("Input path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The byte stream cannot be interpreted as an email at all.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// The file exceeds the configured maximum message size.
    #[error("Message too large: {size} bytes (limit {limit})")]
    MessageTooLarge { size: u64, limit: u64 },

    /// A corpus snapshot could not be read or written.
    #[error("Corpus error for '{path}': {reason}")]
    Corpus { path: PathBuf, reason: String },

    /// The worker pool could not be started.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

/// Convenience alias for `Result<T, IngestError>`.
pub type Result<T> = std::result::Result<T, IngestError>;

impl IngestError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Corpus` variant from a path and any displayable reason.
    pub fn corpus(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Corpus {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
