//! Error taxonomy surfaced to the command router.

use std::path::PathBuf;

use loam_models::FolderPathError;
use loam_persistence::PersistenceError;
use thiserror::Error;

use crate::agent::AgentError;

/// Errors returned by vault and context operations.
///
/// Every variant is recoverable at the handler boundary.
#[derive(Debug, Error)]
pub enum LoamError {
    /// A folder path or note name was rejected before touching the vault.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A folder, session or note no longer exists.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// The user has not selected a folder yet.
    #[error("no folder selected")]
    NoContext,

    /// The agent call failed; the user turn is kept.
    #[error("agent failed: {0}")]
    Agent(#[from] AgentError),

    /// Session store failure.
    #[error("storage error: {0}")]
    Storage(PersistenceError),

    /// File system failure inside the vault.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoamError {
    /// Wraps a rejected folder path.
    pub fn invalid_path(path: impl Into<String>, err: FolderPathError) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Shorthand for a folder missing from the vault.
    pub fn folder_not_found(folder: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: "folder".to_string(),
            id: folder.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<PersistenceError> for LoamError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Storage(other),
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, LoamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: LoamError = PersistenceError::session_not_found("philosophy", "s-1").into();
        match err {
            LoamError::NotFound { kind, id } => {
                assert_eq!(kind, "session");
                assert_eq!(id, "philosophy#s-1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_path_display() {
        let err = LoamError::invalid_path("../etc", FolderPathError::Traversal("../etc".into()));
        assert!(err.to_string().starts_with("invalid path '../etc'"));
    }
}
