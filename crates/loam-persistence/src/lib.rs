//! Persistence layer for Loam.
//!
//! This crate stores one JSON record per user using atomic file operations
//! (write to temp file, then rename) and exposes the session store contract
//! on top of it: current pointer, session creation, star/rename, turn
//! appends and retention-driven eviction.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use loam_models::{FolderPath, UserId};
//! use loam_persistence::{JsonRecordStore, SessionStore};
//!
//! let records = JsonRecordStore::open("/home/user/.loam").unwrap();
//! let store = SessionStore::new(Arc::new(records));
//!
//! let folder = FolderPath::parse("philosophy").unwrap();
//! let id = store.create_session(UserId(42), &folder, None).unwrap();
//! assert_eq!(store.get_current(UserId(42)).unwrap().unwrap().session, id);
//! ```

pub mod atomic;
pub mod error;
pub mod record_store;
pub mod retention;
pub mod session_store;

pub use error::{PersistenceError, Result};
pub use record_store::{JsonRecordStore, MemoryRecordStore, RecordStore};
pub use retention::RetentionPolicy;
pub use session_store::SessionStore;
