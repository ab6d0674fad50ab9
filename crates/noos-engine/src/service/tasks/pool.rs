//! A single named pool (upload, download, or compute): bounded worker
//! concurrency via `tokio::sync::Semaphore`, plus the admission capacity
//! (`workers * queue_depth_multiplier`) the engine checks before enqueueing
//! (§4.1 "Pools").

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::PoolConfig;

#[derive(Clone)]
pub(super) struct Pool {
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
}

impl Pool {
    pub(super) fn new(config: PoolConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.workers));
        Self { config, semaphore }
    }

    /// Admission ceiling: how many tasks of this category may be
    /// PENDING ∪ RUNNING at once.
    pub(super) fn capacity(&self) -> u64 {
        self.config.queue_depth() as u64
    }

    pub(super) fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// A cheap handle carrying just what a spawned worker task needs,
    /// avoiding a reference back into the (non-'static) `TaskEngine`.
    pub(super) fn clone_handle(&self) -> PoolHandle {
        PoolHandle {
            semaphore: Arc::clone(&self.semaphore),
            timeout: self.timeout(),
        }
    }
}

pub(super) struct PoolHandle {
    semaphore: Arc<Semaphore>,
    timeout: Duration,
}

impl PoolHandle {
    pub(super) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Blocks until a worker slot is free. Bounds concurrent handler
    /// execution to `workers` even though more tasks may be admitted
    /// (queue depth allows PENDING backlog beyond the concurrency bound).
    pub(super) async fn acquire(&self) -> OwnedSemaphorePermit {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("pool semaphore is never closed")
    }
}
