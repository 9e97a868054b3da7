//! Error types for persistence operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to read from file system.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write to file system.
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize data to JSON.
    #[error("failed to serialize: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// Failed to create directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted record exists but cannot be understood.
    ///
    /// This is never recovered from by resetting state.
    #[error("corrupt record {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Item not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },
}

impl PersistenceError {
    /// Shorthand for a missing session.
    pub fn session_not_found(folder: impl std::fmt::Display, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: "session".to_string(),
            id: format!("{}#{}", folder, id),
        }
    }

    /// Returns true for `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
