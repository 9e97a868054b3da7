//! Storage backends for per-user records.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use loam_models::{UserId, UserRecord};
use tracing::{debug, info, warn};

use crate::atomic::{atomic_write_json, read_json_optional};
use crate::error::{PersistenceError, Result};

/// Loads and saves whole user records.
pub trait RecordStore: Send + Sync {
    /// Loads a user's record, `None` if the user has never been seen.
    fn load(&self, user: UserId) -> Result<Option<UserRecord>>;

    /// Durably saves a record, replacing any previous version.
    fn save(&self, record: &UserRecord) -> Result<()>;

    /// Lists every user that has a record.
    fn users(&self) -> Result<Vec<UserId>>;
}

/// Stores one JSON file per user.
///
/// ```text
/// base_path/
/// └── users/
///     ├── 1234567.json
///     └── 7654321.json
/// ```
pub struct JsonRecordStore {
    users_dir: PathBuf,
}

impl JsonRecordStore {
    /// Opens the store under `base_path`, creating the directory if needed.
    ///
    /// Every existing record is parsed before the store is returned, so a
    /// corrupt record halts startup instead of surfacing mid-conversation.
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        let users_dir = base_path.into().join("users");
        if !users_dir.exists() {
            fs::create_dir_all(&users_dir).map_err(|source| PersistenceError::DirectoryError {
                path: users_dir.clone(),
                source,
            })?;
        }

        let store = Self { users_dir };
        let count = store.verify()?;
        info!(count, dir = %store.users_dir.display(), "Opened user records");
        Ok(store)
    }

    /// Returns the directory holding the records.
    pub fn users_dir(&self) -> &Path {
        &self.users_dir
    }

    fn record_path(&self, user: UserId) -> PathBuf {
        self.users_dir.join(format!("{}.json", user))
    }

    /// Parses every record, failing on the first corrupt one.
    pub fn verify(&self) -> Result<usize> {
        let users = self.users()?;
        for user in &users {
            self.load(*user)?;
        }
        Ok(users.len())
    }
}

impl RecordStore for JsonRecordStore {
    fn load(&self, user: UserId) -> Result<Option<UserRecord>> {
        let path = self.record_path(user);
        let record: Option<UserRecord> = read_json_optional(&path)?;
        match record {
            Some(record) if record.user_id != user => Err(PersistenceError::Corrupt {
                path,
                reason: format!("record belongs to user {}", record.user_id),
            }),
            other => Ok(other),
        }
    }

    fn save(&self, record: &UserRecord) -> Result<()> {
        let path = self.record_path(record.user_id);
        atomic_write_json(&path, record)?;
        debug!(user = %record.user_id, path = %path.display(), "Saved user record");
        Ok(())
    }

    fn users(&self) -> Result<Vec<UserId>> {
        let entries = fs::read_dir(&self.users_dir).map_err(|source| PersistenceError::ReadError {
            path: self.users_dir.clone(),
            source,
        })?;

        let mut users = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| PersistenceError::ReadError {
                path: self.users_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()).map(str::parse::<i64>) {
                Some(Ok(id)) => users.push(UserId(id)),
                _ => warn!(path = %path.display(), "Ignoring file with non-numeric name in users dir"),
            }
        }
        users.sort();
        Ok(users)
    }
}

/// Keeps records in memory, for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<UserId, UserRecord>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn load(&self, user: UserId) -> Result<Option<UserRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(&user).cloned())
    }

    fn save(&self, record: &UserRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.user_id, record.clone());
        Ok(())
    }

    fn users(&self) -> Result<Vec<UserId>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut users: Vec<UserId> = records.keys().copied().collect();
        users.sort();
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_models::FolderPath;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_record() {
        let dir = tempdir().unwrap();
        let store = JsonRecordStore::open(dir.path()).unwrap();

        let mut record = UserRecord::new(UserId(42));
        record.create_session(&FolderPath::parse("philosophy").unwrap(), None);
        store.save(&record).unwrap();

        let loaded = store.load(UserId(42)).unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(store.users().unwrap(), vec![UserId(42)]);
    }

    #[test]
    fn test_load_unknown_user() {
        let dir = tempdir().unwrap();
        let store = JsonRecordStore::open(dir.path()).unwrap();
        assert!(store.load(UserId(1)).unwrap().is_none());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let folder = FolderPath::parse("science").unwrap();
        let mut record = UserRecord::new(UserId(5));
        let id = record.create_session(&folder, None);

        JsonRecordStore::open(dir.path()).unwrap().save(&record).unwrap();

        let reopened = JsonRecordStore::open(dir.path()).unwrap();
        let loaded = reopened.load(UserId(5)).unwrap().unwrap();
        assert_eq!(loaded.current().unwrap().session, id);
    }

    #[test]
    fn test_open_fails_on_corrupt_record() {
        let dir = tempdir().unwrap();
        let users_dir = dir.path().join("users");
        fs::create_dir_all(&users_dir).unwrap();
        fs::write(users_dir.join("9.json"), "{\"user_id\": ").unwrap();

        let result = JsonRecordStore::open(dir.path());
        assert!(matches!(result, Err(PersistenceError::Corrupt { .. })));
    }

    #[test]
    fn test_mismatched_owner_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = JsonRecordStore::open(dir.path()).unwrap();
        store.save(&UserRecord::new(UserId(1))).unwrap();
        fs::rename(
            store.users_dir().join("1.json"),
            store.users_dir().join("2.json"),
        )
        .unwrap();

        assert!(matches!(
            store.load(UserId(2)),
            Err(PersistenceError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_users_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        let store = JsonRecordStore::open(dir.path()).unwrap();
        store.save(&UserRecord::new(UserId(3))).unwrap();
        fs::write(store.users_dir().join("notes.txt"), "x").unwrap();
        fs::write(store.users_dir().join("backup.json"), "{}").unwrap();

        assert_eq!(store.users().unwrap(), vec![UserId(3)]);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryRecordStore::new();
        assert!(store.load(UserId(1)).unwrap().is_none());
        store.save(&UserRecord::new(UserId(1))).unwrap();
        assert!(store.load(UserId(1)).unwrap().is_some());
        assert_eq!(store.users().unwrap(), vec![UserId(1)]);
    }
}
