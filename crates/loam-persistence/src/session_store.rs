//! Session store: the user-facing contract over per-user records.
//!
//! Every mutation is a load-modify-save of the user's whole record under a
//! store-wide lock and is durable before the call returns. Reads never
//! create a record.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use loam_models::{FolderPath, Pointer, Session, SessionId, SessionSummary, Turn, UserId, UserRecord};
use tracing::{debug, info};

use crate::error::{PersistenceError, Result};
use crate::record_store::{MemoryRecordStore, RecordStore};
use crate::retention::RetentionPolicy;

/// Maps `(user, folder)` to sessions and tracks each user's current pointer.
pub struct SessionStore {
    records: Arc<dyn RecordStore>,
    lock: Mutex<()>,
}

impl SessionStore {
    /// Creates a store over the given record backend.
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self {
            records,
            lock: Mutex::new(()),
        }
    }

    /// Creates a store backed by memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRecordStore::new()))
    }

    fn load_or_new(&self, user: UserId) -> Result<UserRecord> {
        Ok(self
            .records
            .load(user)?
            .unwrap_or_else(|| UserRecord::new(user)))
    }

    /// Runs `f` on the user's record and saves it if `f` succeeds.
    fn update<R>(&self, user: UserId, f: impl FnOnce(&mut UserRecord) -> Result<R>) -> Result<R> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut record = self.load_or_new(user)?;
        let out = f(&mut record)?;
        self.records.save(&record)?;
        Ok(out)
    }

    /// Reads the user's record without creating it.
    fn read<R>(&self, user: UserId, f: impl FnOnce(&UserRecord) -> Result<R>) -> Result<R> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let record = self.load_or_new(user)?;
        f(&record)
    }

    /// Persists an empty record for a user seen for the first time.
    ///
    /// Returns true if the record was created.
    pub fn register(&self, user: UserId) -> Result<bool> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.records.load(user)?.is_some() {
            return Ok(false);
        }
        self.records.save(&UserRecord::new(user))?;
        info!(user = %user, "Registered new user");
        Ok(true)
    }

    /// Returns the user's current pointer, `None` before any folder was chosen.
    pub fn get_current(&self, user: UserId) -> Result<Option<Pointer>> {
        self.read(user, |record| Ok(record.current().cloned()))
    }

    /// Points the user at an existing session.
    pub fn set_current(&self, user: UserId, folder: &FolderPath, id: &SessionId) -> Result<()> {
        self.update(user, |record| {
            if record.select(folder, id) {
                debug!(user = %user, folder = %folder, session = %id, "Current session changed");
                Ok(())
            } else {
                Err(PersistenceError::session_not_found(folder, id))
            }
        })
    }

    /// Creates a fresh session in `folder` and makes it current.
    pub fn create_session(
        &self,
        user: UserId,
        folder: &FolderPath,
        title: Option<String>,
    ) -> Result<SessionId> {
        self.update(user, |record| {
            let id = record.create_session(folder, title);
            info!(user = %user, folder = %folder, session = %id, "Created session");
            Ok(id)
        })
    }

    /// Stars a session. Idempotent.
    pub fn star(&self, user: UserId, folder: &FolderPath, id: &SessionId) -> Result<()> {
        self.set_starred(user, folder, id, true)
    }

    /// Unstars a session. Idempotent.
    pub fn unstar(&self, user: UserId, folder: &FolderPath, id: &SessionId) -> Result<()> {
        self.set_starred(user, folder, id, false)
    }

    fn set_starred(&self, user: UserId, folder: &FolderPath, id: &SessionId, starred: bool) -> Result<()> {
        self.update(user, |record| {
            let session = record
                .session_mut(folder, id)
                .ok_or_else(|| PersistenceError::session_not_found(folder, id))?;
            session.starred = starred;
            Ok(())
        })
    }

    /// Overwrites a session's title.
    pub fn rename(&self, user: UserId, folder: &FolderPath, id: &SessionId, title: &str) -> Result<()> {
        self.update(user, |record| {
            let session = record
                .session_mut(folder, id)
                .ok_or_else(|| PersistenceError::session_not_found(folder, id))?;
            session.title = Some(title.to_string());
            Ok(())
        })
    }

    /// Returns a full copy of a session, turns included.
    pub fn session(&self, user: UserId, folder: &FolderPath, id: &SessionId) -> Result<Session> {
        self.read(user, |record| {
            record
                .session(folder, id)
                .cloned()
                .ok_or_else(|| PersistenceError::session_not_found(folder, id))
        })
    }

    /// Lists session summaries, most recently active first.
    pub fn sessions(&self, user: UserId, folder: Option<&FolderPath>) -> Result<Vec<SessionSummary>> {
        self.read(user, |record| Ok(record.summaries(folder)))
    }

    /// Most recently active session in a folder.
    pub fn latest_in(&self, user: UserId, folder: &FolderPath) -> Result<Option<SessionSummary>> {
        self.read(user, |record| Ok(record.latest_in(folder).map(|s| s.summary(folder))))
    }

    /// Appends a turn to a session and returns the updated session.
    ///
    /// History is never truncated here; only whole sessions leave the store,
    /// through [`SessionStore::evict`].
    pub fn append_turn(
        &self,
        user: UserId,
        folder: &FolderPath,
        id: &SessionId,
        turn: Turn,
    ) -> Result<Session> {
        self.update(user, |record| {
            let session = record
                .session_mut(folder, id)
                .ok_or_else(|| PersistenceError::session_not_found(folder, id))?;
            session.push_turn(turn);
            debug!(user = %user, session = %id, turns = session.turns.len(), "Appended turn");
            Ok(session.clone())
        })
    }

    /// Removes the sessions `policy` selects and returns their summaries.
    pub fn evict(
        &self,
        user: UserId,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionSummary>> {
        if policy.is_noop() {
            return Ok(Vec::new());
        }
        self.update(user, |record| {
            let mut evicted = Vec::new();
            for (folder, id) in policy.select(record, now) {
                if let Some(session) = record.remove_session(&folder, &id) {
                    evicted.push(session.summary(&folder));
                }
            }
            if !evicted.is_empty() {
                info!(user = %user, count = evicted.len(), "Evicted inactive sessions");
            }
            Ok(evicted)
        })
    }

    /// Every user with a record.
    pub fn users(&self) -> Result<Vec<UserId>> {
        self.records.users()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_store::JsonRecordStore;
    use chrono::Duration;
    use tempfile::tempdir;

    const USER: UserId = UserId(42);

    fn folder(name: &str) -> FolderPath {
        FolderPath::parse(name).unwrap()
    }

    #[test]
    fn test_get_current_none_before_selection() {
        let store = SessionStore::in_memory();
        assert!(store.get_current(USER).unwrap().is_none());
        // Reading does not create a record
        assert!(store.users().unwrap().is_empty());
    }

    #[test]
    fn test_create_session_becomes_current() {
        let store = SessionStore::in_memory();
        let id = store.create_session(USER, &folder("philosophy"), None).unwrap();

        let pointer = store.get_current(USER).unwrap().unwrap();
        assert_eq!(pointer.folder, folder("philosophy"));
        assert_eq!(pointer.session, id);
        assert!(store.session(USER, &folder("philosophy"), &id).unwrap().turns.is_empty());
    }

    #[test]
    fn test_set_current_rejects_missing_pair() {
        let store = SessionStore::in_memory();
        let id = store.create_session(USER, &folder("philosophy"), None).unwrap();

        let err = store
            .set_current(USER, &folder("science"), &id)
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.get_current(USER).unwrap().unwrap().session, id);
    }

    #[test]
    fn test_set_current_switches_between_sessions() {
        let store = SessionStore::in_memory();
        let first = store.create_session(USER, &folder("philosophy"), None).unwrap();
        let second = store.create_session(USER, &folder("science"), None).unwrap();
        assert_eq!(store.get_current(USER).unwrap().unwrap().session, second);

        store.set_current(USER, &folder("philosophy"), &first).unwrap();
        let pointer = store.get_current(USER).unwrap().unwrap();
        assert_eq!(pointer.folder, folder("philosophy"));
        assert_eq!(pointer.session, first);
    }

    #[test]
    fn test_star_is_idempotent() {
        let store = SessionStore::in_memory();
        let f = folder("philosophy");
        let id = store.create_session(USER, &f, None).unwrap();

        store.star(USER, &f, &id).unwrap();
        store.star(USER, &f, &id).unwrap();
        assert!(store.session(USER, &f, &id).unwrap().starred);

        store.unstar(USER, &f, &id).unwrap();
        store.unstar(USER, &f, &id).unwrap();
        assert!(!store.session(USER, &f, &id).unwrap().starred);
    }

    #[test]
    fn test_rename_stale_session() {
        let store = SessionStore::in_memory();
        let f = folder("philosophy");
        let id = store.create_session(USER, &f, None).unwrap();

        store.rename(USER, &f, &id, "Free will").unwrap();
        assert_eq!(
            store.session(USER, &f, &id).unwrap().title.as_deref(),
            Some("Free will")
        );

        let stale = SessionId::from_string("s-gone0000");
        assert!(store.rename(USER, &f, &stale, "x").unwrap_err().is_not_found());
    }

    #[test]
    fn test_append_turn_is_monotonic() {
        let store = SessionStore::in_memory();
        let f = folder("philosophy");
        let id = store.create_session(USER, &f, None).unwrap();

        let mut last_len = 0;
        for i in 0..5 {
            let session = store.append_turn(USER, &f, &id, Turn::user(format!("m{}", i))).unwrap();
            assert!(session.turns.len() > last_len);
            last_len = session.turns.len();
        }
    }

    #[test]
    fn test_append_turn_keeps_every_turn() {
        let store = SessionStore::in_memory();
        let f = folder("philosophy");
        let id = store.create_session(USER, &f, None).unwrap();

        store.append_turn(USER, &f, &id, Turn::user("precious idea")).unwrap();
        for i in 0..100 {
            store.append_turn(USER, &f, &id, Turn::agent(format!("reply {}", i))).unwrap();
        }

        let session = store.session(USER, &f, &id).unwrap();
        assert_eq!(session.turns.len(), 101);
        assert_eq!(session.turns[0].text, "precious idea");
    }

    #[test]
    fn test_evict_keeps_starred_sessions() {
        let store = SessionStore::in_memory();
        let f = folder("philosophy");
        let starred = store.create_session(USER, &f, Some("keep".to_string())).unwrap();
        store.append_turn(USER, &f, &starred, Turn::user("important")).unwrap();
        store.star(USER, &f, &starred).unwrap();
        let plain = store.create_session(USER, &f, None).unwrap();
        let current = store.create_session(USER, &f, None).unwrap();

        let policy = RetentionPolicy {
            max_unstarred_per_folder: None,
            archive_after: Some(Duration::days(7)),
        };
        let evicted = store
            .evict(USER, &policy, Utc::now() + Duration::days(30))
            .unwrap();

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, plain);
        let remaining: Vec<_> = store.sessions(USER, None).unwrap().into_iter().map(|s| s.id).collect();
        assert!(remaining.contains(&starred));
        assert!(remaining.contains(&current));
        assert_eq!(store.session(USER, &f, &starred).unwrap().turns.len(), 1);
    }

    #[test]
    fn test_pointer_survives_restart() {
        let dir = tempdir().unwrap();
        let f = folder("philosophy");
        let id = {
            let store = SessionStore::new(Arc::new(JsonRecordStore::open(dir.path()).unwrap()));
            let id = store.create_session(USER, &f, None).unwrap();
            store.append_turn(USER, &f, &id, Turn::user("Does free will exist?")).unwrap();
            id
        };

        let store = SessionStore::new(Arc::new(JsonRecordStore::open(dir.path()).unwrap()));
        let pointer = store.get_current(USER).unwrap().unwrap();
        assert_eq!(pointer.session, id);
        assert_eq!(store.session(USER, &f, &id).unwrap().turns.len(), 1);
    }

    #[test]
    fn test_register_only_once() {
        let store = SessionStore::in_memory();
        assert!(store.register(USER).unwrap());
        assert!(!store.register(USER).unwrap());
        assert_eq!(store.users().unwrap(), vec![USER]);
    }
}
