//! Retention policy for unstarred sessions.
//!
//! Two independent limits decide which sessions are evicted: a cap on the
//! number of unstarred sessions kept per folder, and an inactivity age.
//! Starred sessions and the user's current session are always kept.

use chrono::{DateTime, Duration, Utc};
use loam_models::{FolderPath, SessionId, UserRecord};

/// Default number of unstarred sessions kept per folder.
pub const DEFAULT_MAX_UNSTARRED: usize = 10;

/// Limits applied when evicting old sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Keep at most this many unstarred sessions per folder (newest activity wins).
    pub max_unstarred_per_folder: Option<usize>,
    /// Evict unstarred sessions idle for longer than this.
    pub archive_after: Option<Duration>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_unstarred_per_folder: Some(DEFAULT_MAX_UNSTARRED),
            archive_after: None,
        }
    }
}

impl RetentionPolicy {
    /// A policy that never evicts anything.
    pub fn keep_all() -> Self {
        Self {
            max_unstarred_per_folder: None,
            archive_after: None,
        }
    }

    /// Returns true if the policy can never evict a session.
    pub fn is_noop(&self) -> bool {
        self.max_unstarred_per_folder.is_none() && self.archive_after.is_none()
    }

    /// Selects the sessions of `record` that this policy evicts at `now`.
    pub fn select(&self, record: &UserRecord, now: DateTime<Utc>) -> Vec<(FolderPath, SessionId)> {
        let mut evicted = Vec::new();
        if self.is_noop() {
            return evicted;
        }

        for (folder, entry) in &record.folders {
            let mut unstarred: Vec<_> = entry.sessions.iter().filter(|s| !s.starred).collect();
            unstarred.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));

            for (rank, session) in unstarred.into_iter().enumerate() {
                if record.is_current(folder, &session.id) {
                    continue;
                }
                let over_count = self
                    .max_unstarred_per_folder
                    .is_some_and(|max| rank >= max);
                let too_old = self
                    .archive_after
                    .is_some_and(|age| now - session.last_active_at > age);
                if over_count || too_old {
                    evicted.push((folder.clone(), session.id.clone()));
                }
            }
        }

        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loam_models::UserId;

    fn folder() -> FolderPath {
        FolderPath::parse("philosophy").unwrap()
    }

    fn record_with_sessions(count: usize) -> (UserRecord, Vec<SessionId>) {
        let mut record = UserRecord::new(UserId(1));
        let mut ids = Vec::new();
        for i in 0..count {
            let id = record.create_session(&folder(), None);
            // Spread activity so ordering is deterministic: later sessions are newer
            let session = record.session_mut(&folder(), &id).unwrap();
            session.last_active_at = session.created_at + Duration::minutes(i as i64);
            ids.push(id);
        }
        (record, ids)
    }

    #[test]
    fn test_count_limit_evicts_oldest() {
        let (record, ids) = record_with_sessions(4);
        let policy = RetentionPolicy {
            max_unstarred_per_folder: Some(2),
            archive_after: None,
        };

        let evicted: Vec<_> = policy
            .select(&record, Utc::now())
            .into_iter()
            .map(|(_, id)| id)
            .collect();
        assert_eq!(evicted, vec![ids[1].clone(), ids[0].clone()]);
    }

    #[test]
    fn test_starred_and_current_are_kept() {
        let (mut record, ids) = record_with_sessions(3);
        record.session_mut(&folder(), &ids[0]).unwrap().starred = true;

        let policy = RetentionPolicy {
            max_unstarred_per_folder: Some(0),
            archive_after: Some(Duration::seconds(0)),
        };
        let far_future = Utc::now() + Duration::days(365);

        let evicted: Vec<_> = policy
            .select(&record, far_future)
            .into_iter()
            .map(|(_, id)| id)
            .collect();
        // ids[2] is current, ids[0] is starred
        assert_eq!(evicted, vec![ids[1].clone()]);
    }

    #[test]
    fn test_age_limit() {
        let (record, ids) = record_with_sessions(2);
        let policy = RetentionPolicy {
            max_unstarred_per_folder: None,
            archive_after: Some(Duration::days(30)),
        };

        assert!(policy.select(&record, Utc::now()).is_empty());

        let later = Utc::now() + Duration::days(31);
        let evicted = policy.select(&record, later);
        assert_eq!(evicted, vec![(folder(), ids[0].clone())]);
    }

    #[test]
    fn test_keep_all_is_noop() {
        let (record, _) = record_with_sessions(20);
        assert!(RetentionPolicy::keep_all().is_noop());
        assert!(RetentionPolicy::keep_all()
            .select(&record, Utc::now() + Duration::days(1000))
            .is_empty());
    }
}
