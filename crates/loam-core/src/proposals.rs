//! Notes proposed by the agent and waiting for the user's approval.
//!
//! Pending notes live in memory only. A restart drops them, which leaves
//! the vault untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use loam_models::{FolderPath, SessionId, UserId};

use crate::agent::NoteProposal;

/// Oldest proposals are dropped past this many per user.
pub const MAX_PENDING_PER_USER: usize = 10;

/// A proposed note bound to the place it was proposed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNote {
    pub id: u64,
    /// Folder that was current when the note was proposed.
    pub folder: FolderPath,
    pub session: SessionId,
    pub file: String,
    pub body: String,
    /// URL from the message that led to the proposal.
    pub source: Option<String>,
    pub proposed_at: DateTime<Utc>,
}

/// Per-user queue of pending notes.
#[derive(Debug, Default)]
pub struct PendingNotes {
    next_id: AtomicU64,
    by_user: Mutex<HashMap<UserId, Vec<PendingNote>>>,
}

impl PendingNotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a proposal and returns it with its id.
    pub fn add(
        &self,
        user: UserId,
        folder: &FolderPath,
        session: &SessionId,
        proposal: NoteProposal,
        source: Option<String>,
    ) -> PendingNote {
        let pending = PendingNote {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            folder: folder.clone(),
            session: session.clone(),
            file: proposal.file,
            body: proposal.body,
            source,
            proposed_at: Utc::now(),
        };

        let mut by_user = self.by_user.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = by_user.entry(user).or_default();
        queue.push(pending.clone());
        if queue.len() > MAX_PENDING_PER_USER {
            let excess = queue.len() - MAX_PENDING_PER_USER;
            queue.drain(..excess);
        }
        pending
    }

    /// Removes and returns one of the user's pending notes.
    pub fn take(&self, user: UserId, id: u64) -> Option<PendingNote> {
        let mut by_user = self.by_user.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = by_user.get_mut(&user)?;
        let index = queue.iter().position(|p| p.id == id)?;
        let pending = queue.remove(index);
        if queue.is_empty() {
            by_user.remove(&user);
        }
        Some(pending)
    }

    /// The user's pending notes, oldest first.
    pub fn list(&self, user: UserId) -> Vec<PendingNote> {
        self.by_user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(file: &str) -> NoteProposal {
        NoteProposal {
            file: file.to_string(),
            body: "body".to_string(),
        }
    }

    #[test]
    fn test_take_is_per_user() {
        let pending = PendingNotes::new();
        let folder = FolderPath::parse("ideas").unwrap();
        let session = SessionId::from_string("s-1");
        let alice = UserId(1);
        let bob = UserId(2);

        let note = pending.add(alice, &folder, &session, proposal("a.md"), None);
        assert!(pending.take(bob, note.id).is_none());

        let taken = pending.take(alice, note.id).unwrap();
        assert_eq!(taken.file, "a.md");
        assert_eq!(taken.folder, folder);
        assert!(pending.take(alice, note.id).is_none());
        assert!(pending.list(alice).is_empty());
    }

    #[test]
    fn test_oldest_dropped_past_limit() {
        let pending = PendingNotes::new();
        let folder = FolderPath::parse("ideas").unwrap();
        let session = SessionId::from_string("s-1");
        let user = UserId(1);

        let first = pending.add(user, &folder, &session, proposal("0.md"), None);
        for i in 1..=MAX_PENDING_PER_USER {
            pending.add(user, &folder, &session, proposal(&format!("{}.md", i)), None);
        }

        let listed = pending.list(user);
        assert_eq!(listed.len(), MAX_PENDING_PER_USER);
        assert_eq!(listed[0].file, "1.md");
        assert!(pending.take(user, first.id).is_none());
    }
}
