//! Shared state for the Telegram bot.

use std::collections::BTreeSet;
use std::sync::Arc;

use loam_core::ContextManager;
use loam_models::UserId;
use loam_persistence::RetentionPolicy;
use tracing::{info, warn};

use crate::queue::{Job, UserQueues};

/// Shared state for the Telegram bot, accessible across all handlers.
pub struct LoamState {
    manager: ContextManager,
    /// Users allowed to talk to the bot.
    allowed_users: BTreeSet<UserId>,
    retention: RetentionPolicy,
    queues: UserQueues,
}

impl LoamState {
    pub fn new(manager: ContextManager, allowed_users: BTreeSet<UserId>, retention: RetentionPolicy) -> Self {
        if allowed_users.is_empty() {
            warn!("No allowed users configured - every message will be refused");
        }
        Self {
            manager,
            allowed_users,
            retention,
            queues: UserQueues::new(),
        }
    }

    pub fn manager(&self) -> &ContextManager {
        &self.manager
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// Returns true if `user` is on the allow-list.
    pub fn is_authorized(&self, user: UserId) -> bool {
        self.allowed_users.contains(&user)
    }

    /// Records a first-time user. Failures are logged, not surfaced.
    pub fn register(&self, user: UserId) {
        match self.manager.store().register(user) {
            Ok(true) => info!(user = %user, "First interaction from user"),
            Ok(false) => {}
            Err(e) => warn!(user = %user, error = %e, "Failed to register user"),
        }
    }

    /// Queues work behind the user's earlier updates.
    pub fn enqueue(&self, user: UserId, job: Job) {
        self.queues.enqueue(user, job);
    }
}

/// Create shared state wrapped in Arc.
pub fn create_shared_state(
    manager: ContextManager,
    allowed_users: BTreeSet<UserId>,
    retention: RetentionPolicy,
) -> Arc<LoamState> {
    Arc::new(LoamState::new(manager, allowed_users, retention))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::FutureExt;
    use loam_core::{AgentError, AgentReply, ContextBundle, VaultIndex};
    use loam_models::FolderPath;
    use loam_persistence::SessionStore;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    struct EchoAgent;

    #[async_trait]
    impl loam_core::Agent for EchoAgent {
        async fn respond(&self, bundle: &ContextBundle) -> Result<AgentReply, AgentError> {
            // Slow enough that a later job would overtake it without the queue
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(AgentReply::text(bundle.message.clone()))
        }
    }

    fn state(allowed: &[i64]) -> (TempDir, LoamState) {
        let dir = TempDir::new().unwrap();
        let vault = Arc::new(VaultIndex::open(dir.path().join("vault")).unwrap());
        let manager = ContextManager::new(vault, Arc::new(SessionStore::in_memory()), Arc::new(EchoAgent));
        let allowed = allowed.iter().copied().map(UserId).collect();
        (dir, LoamState::new(manager, allowed, RetentionPolicy::default()))
    }

    #[test]
    fn test_only_allowed_users_are_authorized() {
        let (_dir, state) = state(&[42]);
        assert!(state.is_authorized(UserId(42)));
        assert!(!state.is_authorized(UserId(7)));
    }

    #[test]
    fn test_empty_allow_list_refuses_everyone() {
        let (_dir, state) = state(&[]);
        assert!(!state.is_authorized(UserId(42)));
    }

    #[test]
    fn test_register_records_user_once() {
        let (_dir, state) = state(&[42]);
        state.register(UserId(42));
        state.register(UserId(42));
        assert_eq!(state.manager().store().users().unwrap(), vec![UserId(42)]);
    }

    #[tokio::test]
    async fn test_new_waits_for_earlier_message() {
        let (_dir, state) = state(&[42]);
        let state = Arc::new(state);
        let user = UserId(42);
        let first = state.manager().create_folder(user, "ideas").unwrap().session;
        let (done_tx, done_rx) = oneshot::channel();

        let job_state = Arc::clone(&state);
        state.enqueue(
            user,
            async move {
                job_state.manager().handle_message(user, "slow thought").await.unwrap();
            }
            .boxed(),
        );
        let job_state = Arc::clone(&state);
        state.enqueue(
            user,
            async move {
                job_state.manager().new_session(user, None).unwrap();
                let _ = done_tx.send(());
            }
            .boxed(),
        );

        tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .unwrap()
            .unwrap();
        let folder = FolderPath::parse("ideas").unwrap();
        let session = state.manager().store().session(user, &folder, &first).unwrap();
        assert_eq!(session.turns.len(), 2);
        assert_eq!(session.turns[0].text, "slow thought");
        let current = state.manager().store().get_current(user).unwrap().unwrap();
        assert_ne!(current.session, first);
    }
}
