//! Context manager: routes a user's messages and commands to the right
//! (folder, session) and keeps session state consistent with the vault.
//!
//! The session store lock is only held inside store calls. Appending the
//! user turn and appending the agent turn are two separate critical
//! sections with the agent call in between.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use loam_models::{FolderPath, NoteId, Pointer, SessionId, SessionSummary, Turn, UserId};
use loam_persistence::{RetentionPolicy, SessionStore};
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentReply, ContextBundle, ReferencedNote};
use crate::error::{LoamError, Result};
use crate::note::{extract_wikilinks, first_url, NoteMetadata, NoteWrite};
use crate::proposals::{PendingNote, PendingNotes};
use crate::vault::{NoteMeta, VaultIndex};

/// Maximum results returned by a fuzzy session search.
const SEARCH_LIMIT: usize = 10;

/// Maximum notes pulled in through wikilinks per message.
const MAX_REFERENCED_NOTES: usize = 5;

/// A completed message exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub pointer: Pointer,
    pub reply: AgentReply,
    /// Notes from the reply, now waiting for approval.
    pub proposals: Vec<PendingNote>,
}

/// Where a `/new` or `/create` left the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    pub folder: FolderPath,
    pub session: SessionId,
    /// True if the folder directory was created by this call.
    pub folder_created: bool,
    /// True if an existing session was resumed instead of created.
    pub resumed: bool,
}

/// What `/list` shows.
#[derive(Debug, Clone)]
pub struct Listing {
    pub folders: Vec<FolderPath>,
    pub current: Option<Pointer>,
    /// Notes of the current folder; empty when nothing is selected.
    pub notes: Vec<NoteMeta>,
}

/// Coordinates the vault, the session store and the agent.
pub struct ContextManager {
    vault: Arc<VaultIndex>,
    store: Arc<SessionStore>,
    agent: Arc<dyn Agent>,
    pending: PendingNotes,
    context_window: usize,
}

impl ContextManager {
    pub fn new(vault: Arc<VaultIndex>, store: Arc<SessionStore>, agent: Arc<dyn Agent>) -> Self {
        Self {
            vault,
            store,
            agent,
            pending: PendingNotes::new(),
            context_window: crate::config::DEFAULT_CONTEXT_WINDOW,
        }
    }

    /// Sets how many prior turns go into each bundle.
    pub fn with_context_window(mut self, window: usize) -> Self {
        self.context_window = window;
        self
    }

    pub fn vault(&self) -> &VaultIndex {
        &self.vault
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Current pointer or `NoContext`.
    fn require_current(&self, user: UserId) -> Result<Pointer> {
        self.store.get_current(user)?.ok_or(LoamError::NoContext)
    }

    /// Current pointer whose folder still exists in the vault.
    fn require_live_current(&self, user: UserId) -> Result<Pointer> {
        let pointer = self.require_current(user)?;
        if !self.vault.folder_exists(&pointer.folder) {
            warn!(user = %user, folder = %pointer.folder, "Current folder is gone from the vault");
            return Err(LoamError::folder_not_found(&pointer.folder));
        }
        Ok(pointer)
    }

    /// Handles a plain message: records it, asks the agent, records the reply.
    ///
    /// If the agent fails the user turn stays recorded and the error is
    /// returned; nothing is retried here.
    pub async fn handle_message(&self, user: UserId, text: &str) -> Result<Exchange> {
        let pointer = self.require_live_current(user)?;

        let mut session = self
            .store
            .append_turn(user, &pointer.folder, &pointer.session, Turn::user(text))?;

        // The just-appended user turn is sent as `message`, not as history
        session.turns.pop();
        let history = session.recent_turns(Some(self.context_window)).to_vec();

        let notes = if self.agent.wants_folder_listing() {
            Some(self.vault.list_notes(&pointer.folder)?)
        } else {
            None
        };

        let bundle = ContextBundle {
            user,
            folder: pointer.folder.clone(),
            session: pointer.session.clone(),
            session_title: session.title.clone(),
            history,
            message: text.to_string(),
            notes,
            referenced: self.referenced_notes(&pointer.folder, text),
        };

        debug!(
            user = %user,
            folder = %pointer.folder,
            session = %pointer.session,
            history = bundle.history.len(),
            referenced = bundle.referenced.len(),
            "Calling agent"
        );

        let reply = match self.agent.respond(&bundle).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(user = %user, session = %pointer.session, error = %e, "Agent call failed");
                return Err(e.into());
            }
        };

        self.store.append_turn(
            user,
            &pointer.folder,
            &pointer.session,
            Turn::agent(reply.text.clone()),
        )?;

        let source = first_url(text);
        let proposals: Vec<PendingNote> = reply
            .proposals
            .iter()
            .cloned()
            .map(|proposal| {
                self.pending
                    .add(user, &pointer.folder, &pointer.session, proposal, source.clone())
            })
            .collect();
        if !proposals.is_empty() {
            info!(user = %user, session = %pointer.session, count = proposals.len(), "Notes proposed");
        }

        Ok(Exchange {
            pointer,
            reply,
            proposals,
        })
    }

    /// Notes waiting for this user's approval, oldest first.
    pub fn pending_notes(&self, user: UserId) -> Vec<PendingNote> {
        self.pending.list(user)
    }

    /// Writes a pending note into the folder it was proposed in.
    ///
    /// A file name with a subfolder creates that subfolder. On failure the
    /// proposal is gone and the vault is unchanged.
    pub fn approve_note(&self, user: UserId, id: u64) -> Result<(NoteId, NoteWrite)> {
        let pending = self.take_pending(user, id)?;
        let meta = NoteMetadata {
            session: Some(pending.session.clone()),
            source: pending.source.clone(),
            tags: Vec::new(),
        };

        let file = pending.file.trim().trim_start_matches('/');
        let (folder, name) = match file.rsplit_once('/') {
            Some((dir, name)) => {
                if !self.vault.folder_exists(&pending.folder) {
                    return Err(LoamError::folder_not_found(&pending.folder));
                }
                let nested = pending.folder.join(dir).map_err(|e| LoamError::invalid_path(file, e))?;
                (self.vault.ensure_folder(nested.as_str())?.path, name)
            }
            None => (pending.folder.clone(), file),
        };

        let written = self.vault.write_note(&folder, name, &pending.body, &meta)?;
        info!(user = %user, note = %written.0, outcome = ?written.1, "Approved note");
        Ok(written)
    }

    /// Drops a pending note without writing it.
    pub fn cancel_note(&self, user: UserId, id: u64) -> Result<PendingNote> {
        let pending = self.take_pending(user, id)?;
        info!(user = %user, file = %pending.file, "Discarded proposed note");
        Ok(pending)
    }

    fn take_pending(&self, user: UserId, id: u64) -> Result<PendingNote> {
        self.pending.take(user, id).ok_or_else(|| LoamError::NotFound {
            kind: "note proposal".to_string(),
            id: id.to_string(),
        })
    }

    /// Reads the notes a message links to. Unresolvable links are skipped.
    fn referenced_notes(&self, folder: &FolderPath, text: &str) -> Vec<ReferencedNote> {
        extract_wikilinks(text)
            .into_iter()
            .filter_map(|target| self.vault.resolve_link(folder, &target))
            .take(MAX_REFERENCED_NOTES)
            .filter_map(|id| match self.vault.read_note(&id) {
                Ok(content) => Some(ReferencedNote { id, content }),
                Err(e) => {
                    debug!(note = %id, error = %e, "Linked note unreadable");
                    None
                }
            })
            .collect()
    }

    /// `/new`: opens a fresh session, in `folder` if given or in the current
    /// folder otherwise.
    pub fn new_session(&self, user: UserId, folder: Option<&str>) -> Result<Opened> {
        let (folder, folder_created) = match folder.map(str::trim).filter(|f| !f.is_empty()) {
            Some(raw) => {
                let folder = self.vault.ensure_folder(raw)?;
                (folder.path, folder.created)
            }
            None => (self.require_live_current(user)?.folder, false),
        };

        let session = self.store.create_session(user, &folder, None)?;
        info!(user = %user, folder = %folder, session = %session, "Opened new session");
        Ok(Opened {
            folder,
            session,
            folder_created,
            resumed: false,
        })
    }

    /// `/create`: ensures the folder, then resumes its most recently active
    /// session or opens one if it has none.
    pub fn create_folder(&self, user: UserId, raw: &str) -> Result<Opened> {
        let folder = self.vault.ensure_folder(raw)?;

        if let Some(latest) = self.store.latest_in(user, &folder.path)? {
            self.store.set_current(user, &folder.path, &latest.id)?;
            info!(user = %user, folder = %folder.path, session = %latest.id, "Resumed session");
            return Ok(Opened {
                folder: folder.path,
                session: latest.id,
                folder_created: folder.created,
                resumed: true,
            });
        }

        let session = self.store.create_session(user, &folder.path, None)?;
        Ok(Opened {
            folder: folder.path,
            session,
            folder_created: folder.created,
            resumed: false,
        })
    }

    /// Sessions offered by `/switch`: the current folder's, or every folder's
    /// when `all` is set.
    pub fn switch_candidates(&self, user: UserId, all: bool) -> Result<Vec<SessionSummary>> {
        if all {
            return Ok(self.store.sessions(user, None)?);
        }
        let pointer = self.require_current(user)?;
        Ok(self.store.sessions(user, Some(&pointer.folder))?)
    }

    /// Starred sessions across every folder, grouped by folder name.
    pub fn starred(&self, user: UserId) -> Result<Vec<SessionSummary>> {
        let mut starred: Vec<SessionSummary> = self
            .store
            .sessions(user, None)?
            .into_iter()
            .filter(|s| s.starred)
            .collect();
        // Stable sort keeps recency order within a folder
        starred.sort_by(|a, b| a.folder.as_str().cmp(b.folder.as_str()));
        Ok(starred)
    }

    /// Selects the session named by a `folder#id` handle.
    pub fn switch(&self, user: UserId, handle: &str) -> Result<SessionSummary> {
        let (raw_folder, raw_id) = handle.trim().rsplit_once('#').ok_or_else(|| LoamError::NotFound {
            kind: "session".to_string(),
            id: handle.trim().to_string(),
        })?;
        let folder = FolderPath::parse(raw_folder).map_err(|e| LoamError::invalid_path(raw_folder, e))?;
        let id = SessionId::from_string(raw_id.trim());

        if !self.vault.folder_exists(&folder) {
            return Err(LoamError::folder_not_found(&folder));
        }
        self.store.set_current(user, &folder, &id)?;
        info!(user = %user, folder = %folder, session = %id, "Switched session");

        Ok(self.store.session(user, &folder, &id)?.summary(&folder))
    }

    /// Fuzzy-searches session titles and folder names across all folders.
    pub fn search(&self, user: UserId, query: &str) -> Result<Vec<SessionSummary>> {
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, SessionSummary)> = self
            .store
            .sessions(user, None)?
            .into_iter()
            .filter_map(|s| {
                let haystack = format!("{} {}", s.folder, s.title.as_deref().unwrap_or(""));
                matcher.fuzzy_match(&haystack, query).map(|score| (score, s))
            })
            .collect();
        // Stable sort keeps recency order among equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(SEARCH_LIMIT).map(|(_, s)| s).collect())
    }

    /// `/session`: the current session, `None` before any folder was chosen.
    pub fn status(&self, user: UserId) -> Result<Option<SessionSummary>> {
        let Some(pointer) = self.store.get_current(user)? else {
            return Ok(None);
        };
        let session = self.store.session(user, &pointer.folder, &pointer.session)?;
        Ok(Some(session.summary(&pointer.folder)))
    }

    /// `/rename`: retitles the current session.
    pub fn rename(&self, user: UserId, title: &str) -> Result<Pointer> {
        let pointer = self.require_current(user)?;
        self.store.rename(user, &pointer.folder, &pointer.session, title.trim())?;
        Ok(pointer)
    }

    /// `/star`: protects the current session from eviction.
    pub fn star(&self, user: UserId) -> Result<Pointer> {
        let pointer = self.require_current(user)?;
        self.store.star(user, &pointer.folder, &pointer.session)?;
        Ok(pointer)
    }

    /// `/unstar`: makes the current session evictable again.
    pub fn unstar(&self, user: UserId) -> Result<Pointer> {
        let pointer = self.require_current(user)?;
        self.store.unstar(user, &pointer.folder, &pointer.session)?;
        Ok(pointer)
    }

    /// `/list`: vault folders plus the current folder's notes.
    pub fn list(&self, user: UserId) -> Result<Listing> {
        let folders = self.vault.list_folders()?;
        let current = self.store.get_current(user)?;
        let notes = match &current {
            Some(pointer) if self.vault.folder_exists(&pointer.folder) => {
                self.vault.list_notes(&pointer.folder)?
            }
            _ => Vec::new(),
        };
        Ok(Listing {
            folders,
            current,
            notes,
        })
    }

    /// Stores an uploaded file in the current folder's attachments.
    ///
    /// Returns the pointer and the attachment path relative to the folder.
    pub fn save_attachment(&self, user: UserId, file_name: &str, data: &[u8]) -> Result<(Pointer, String)> {
        let pointer = self.require_live_current(user)?;
        let path = self.vault.save_attachment(&pointer.folder, file_name, data)?;
        Ok((pointer, path))
    }

    /// Applies the retention policy to every known user.
    ///
    /// Returns the number of evicted sessions. A failure for one user is
    /// logged and does not stop the sweep.
    pub fn apply_retention(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<usize> {
        if policy.is_noop() {
            return Ok(0);
        }
        let mut total = 0;
        for user in self.store.users()? {
            match self.store.evict(user, policy, now) {
                Ok(evicted) => total += evicted.len(),
                Err(e) => warn!(user = %user, error = %e, "Retention sweep failed for user"),
            }
        }
        Ok(total)
    }
}
