//! Core data models for Loam.
//!
//! This crate provides the fundamental data types shared by every Loam
//! crate: identifiers, validated vault folder paths, sessions with their
//! turn history, and the per-user record that persists a user's current
//! pointer and session lists.

pub mod folder;
pub mod ids;
pub mod record;
pub mod session;

// Re-export main types
pub use folder::{FolderPath, FolderPathError, RESERVED_NAMES};
pub use ids::{NoteId, SessionId, UserId};
pub use record::{FolderSessions, Pointer, UserRecord, RECORD_VERSION};
pub use session::{Role, Session, SessionSummary, Turn};
