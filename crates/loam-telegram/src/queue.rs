//! Per-user sequential work queues.
//!
//! Every update from a user becomes a job on that user's queue. One worker
//! task per user runs the jobs in arrival order, so a user's messages and
//! commands never interleave, while different users proceed independently.
//! Messages arriving during a slow agent call wait their turn.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;
use loam_models::UserId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A unit of work for one user.
pub type Job = BoxFuture<'static, ()>;

/// Routes jobs to one sequential worker per user.
#[derive(Default)]
pub struct UserQueues {
    senders: Mutex<HashMap<UserId, mpsc::UnboundedSender<Job>>>,
}

impl UserQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `job` behind the user's earlier jobs.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, user: UserId, job: Job) {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);

        let job = match senders.get(&user) {
            Some(tx) => match tx.send(job) {
                Ok(()) => return,
                // Worker is gone; start a new one with the returned job
                Err(mpsc::error::SendError(job)) => {
                    warn!(user = %user, "User worker stopped, restarting");
                    job
                }
            },
            None => job,
        };

        let tx = spawn_worker(user);
        if tx.send(job).is_err() {
            warn!(user = %user, "Dropped job for user: worker unavailable");
        }
        senders.insert(user, tx);
    }

    /// Number of users with a worker.
    pub fn len(&self) -> usize {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn spawn_worker(user: UserId) -> mpsc::UnboundedSender<Job> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    tokio::spawn(async move {
        debug!(user = %user, "User worker started");
        while let Some(job) = rx.recv().await {
            job.await;
        }
        debug!(user = %user, "User worker stopped");
    });
    tx
}
