//! Per-user durable record.
//!
//! One record per user holds the current (folder, session) pointer and the
//! sessions of every folder the user has worked in. The record is the unit
//! of persistence: it is loaded, mutated and written back as a whole.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::folder::FolderPath;
use crate::ids::{SessionId, UserId};
use crate::session::{Session, SessionSummary};

/// Current on-disk record format.
pub const RECORD_VERSION: u32 = 1;

/// A user's current (folder, session) selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pointer {
    /// Selected folder.
    pub folder: FolderPath,
    /// Selected session within the folder.
    pub session: SessionId,
}

/// Sessions a user has in one folder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderSessions {
    /// The folder's active session, if any.
    #[serde(default)]
    pub active: Option<SessionId>,

    /// Sessions in creation order.
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// Everything persisted for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Record format version.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Owner of the record.
    pub user_id: UserId,

    /// When the record was first created.
    pub created_at: DateTime<Utc>,

    /// Current pointer; `None` until a folder is selected for the first time.
    #[serde(default)]
    pub current: Option<Pointer>,

    /// Per-folder session lists.
    #[serde(default)]
    pub folders: BTreeMap<FolderPath, FolderSessions>,
}

fn default_version() -> u32 {
    RECORD_VERSION
}

impl UserRecord {
    /// Creates an empty record in the `Unselected` state.
    pub fn new(user_id: UserId) -> Self {
        Self {
            version: RECORD_VERSION,
            user_id,
            created_at: Utc::now(),
            current: None,
            folders: BTreeMap::new(),
        }
    }

    /// Returns the current pointer.
    pub fn current(&self) -> Option<&Pointer> {
        self.current.as_ref()
    }

    /// Finds a session.
    pub fn session(&self, folder: &FolderPath, id: &SessionId) -> Option<&Session> {
        self.folders
            .get(folder)?
            .sessions
            .iter()
            .find(|s| &s.id == id)
    }

    /// Finds a session for mutation.
    pub fn session_mut(&mut self, folder: &FolderPath, id: &SessionId) -> Option<&mut Session> {
        self.folders
            .get_mut(folder)?
            .sessions
            .iter_mut()
            .find(|s| &s.id == id)
    }

    /// Returns true if the (folder, session) pair exists.
    pub fn contains(&self, folder: &FolderPath, id: &SessionId) -> bool {
        self.session(folder, id).is_some()
    }

    /// Returns true if the pair is the current pointer.
    pub fn is_current(&self, folder: &FolderPath, id: &SessionId) -> bool {
        self.current
            .as_ref()
            .is_some_and(|p| &p.folder == folder && &p.session == id)
    }

    /// Creates a session in `folder` and makes it both the folder's active
    /// session and the user's current session.
    pub fn create_session(&mut self, folder: &FolderPath, title: Option<String>) -> SessionId {
        let entry = self.folders.entry(folder.clone()).or_default();

        let mut id = SessionId::generate();
        while entry.sessions.iter().any(|s| s.id == id) {
            id = SessionId::generate();
        }

        entry.sessions.push(Session::new(id.clone(), title));
        entry.active = Some(id.clone());
        self.current = Some(Pointer {
            folder: folder.clone(),
            session: id.clone(),
        });
        id
    }

    /// Makes an existing session current. Returns false if it does not exist.
    pub fn select(&mut self, folder: &FolderPath, id: &SessionId) -> bool {
        let Some(entry) = self.folders.get_mut(folder) else {
            return false;
        };
        if !entry.sessions.iter().any(|s| &s.id == id) {
            return false;
        }
        entry.active = Some(id.clone());
        self.current = Some(Pointer {
            folder: folder.clone(),
            session: id.clone(),
        });
        true
    }

    /// Most recently active session in a folder.
    pub fn latest_in(&self, folder: &FolderPath) -> Option<&Session> {
        self.folders
            .get(folder)?
            .sessions
            .iter()
            .max_by_key(|s| s.last_active_at)
    }

    /// Summaries of every session, optionally restricted to one folder,
    /// most recently active first.
    pub fn summaries(&self, folder: Option<&FolderPath>) -> Vec<SessionSummary> {
        let mut out: Vec<SessionSummary> = self
            .folders
            .iter()
            .filter(|(path, _)| folder.map_or(true, |f| *path == f))
            .flat_map(|(path, entry)| entry.sessions.iter().map(move |s| s.summary(path)))
            .collect();
        out.sort_by(|a, b| {
            b.last_active_at
                .cmp(&a.last_active_at)
                .then_with(|| a.folder.cmp(&b.folder))
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    /// Removes a session. The current session is never removed.
    pub fn remove_session(&mut self, folder: &FolderPath, id: &SessionId) -> Option<Session> {
        if self.is_current(folder, id) {
            return None;
        }
        let entry = self.folders.get_mut(folder)?;
        let index = entry.sessions.iter().position(|s| &s.id == id)?;
        let removed = entry.sessions.remove(index);
        if entry.active.as_ref() == Some(id) {
            entry.active = None;
        }
        if entry.sessions.is_empty() {
            self.folders.remove(folder);
        }
        Some(removed)
    }
}
