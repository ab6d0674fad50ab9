//! The Task Engine (§4.1): three fixed worker pools (upload, download,
//! compute), admission control, cooperative cancellation, progress
//! publishing, timeouts, and crash recovery.
//!
//! Grounded on `service/tasks/tabular_expiration_queue.rs` /
//! `task_log_cleanup_queue.rs`'s poll-loop shape, generalized from the
//! teacher's dynamic `TaskQueueName` registry to three fixed named pools
//! (§4.1.1) since this system's `taskType` enum is closed.

mod handler;
mod pool;

pub use handler::{TaskContext, TaskHandler};

use std::collections::HashMap;
use std::sync::{Arc, RwLock as SyncRwLock};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::config::EngineConfig;
use crate::entities::{Task, TaskCategory, TaskStatus, TaskType};
use crate::error::{EngineError, EngineResult};
use crate::service::progress::ThrottledProgressSink;
use crate::service::storage::{Storage, TaskFilter};
use crate::CancellationToken;

use pool::Pool;

/// Per-task bookkeeping the engine needs outside of what's durable in
/// Storage: the cancellation handle a running handler observes.
struct RunningTask {
    cancellation: CancellationToken,
}

pub struct TaskEngine<S: Storage> {
    storage: Arc<S>,
    config: Arc<EngineConfig>,
    pools: HashMap<TaskCategory, Pool>,
    running: Arc<AsyncMutex<HashMap<i64, RunningTask>>>,
    /// One handler per `TaskType`, registered during wiring (by
    /// `noos-server::serve`) so that both fresh submissions and
    /// startup recovery can dispatch without the caller re-supplying it.
    handlers: SyncRwLock<HashMap<TaskType, Arc<dyn TaskHandler<S>>>>,
}

impl<S: Storage> std::fmt::Debug for TaskEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine").finish_non_exhaustive()
    }
}

impl<S: Storage> TaskEngine<S> {
    #[must_use]
    pub fn new(storage: Arc<S>, config: Arc<EngineConfig>) -> Self {
        let mut pools = HashMap::new();
        pools.insert(TaskCategory::Upload, Pool::new(config.pools.upload.clone()));
        pools.insert(TaskCategory::Download, Pool::new(config.pools.download.clone()));
        pools.insert(TaskCategory::Compute, Pool::new(config.pools.compute.clone()));
        Self {
            storage,
            config,
            pools,
            running: Arc::new(AsyncMutex::new(HashMap::new())),
            handlers: SyncRwLock::new(HashMap::new()),
        }
    }

    /// Registers the handler that runs whenever `task_type` is submitted or
    /// recovered after a restart. Call during startup wiring, before
    /// [`TaskEngine::recover_on_startup`] and before accepting submissions.
    pub fn register_handler(&self, task_type: TaskType, handler: Arc<dyn TaskHandler<S>>) {
        self.handlers
            .write()
            .expect("handler registry mutex poisoned")
            .insert(task_type, handler);
    }

    fn handler_for(&self, task_type: TaskType) -> EngineResult<Arc<dyn TaskHandler<S>>> {
        self.handlers
            .read()
            .expect("handler registry mutex poisoned")
            .get(&task_type)
            .cloned()
            .ok_or_else(|| EngineError::internal(format!("no handler registered for {task_type}")))
    }

    fn pool(&self, category: TaskCategory) -> &Pool {
        self.pools.get(&category).expect("a pool exists for every TaskCategory variant")
    }

    /// Admission control: the submission fails `BUSY` without creating a
    /// Task row if the category's (PENDING ∪ RUNNING) count is already at
    /// capacity (§4.1 "Operations: submit").
    async fn admit(&self, category: TaskCategory) -> EngineResult<()> {
        let pool = self.pool(category);
        let pending = self
            .storage
            .count_tasks(TaskFilter { status: Some(TaskStatus::Pending), category: Some(category) })
            .await?;
        let running = self
            .storage
            .count_tasks(TaskFilter { status: Some(TaskStatus::Running), category: Some(category) })
            .await?;
        if pending + running >= pool.capacity() {
            return Err(EngineError::busy(format!("{category} pool is at capacity")));
        }
        Ok(())
    }

    /// Submits a new Task and, on success, schedules it onto its category's
    /// pool. Dispatches to whatever handler is registered for `task_type`
    /// (the seam into Ingestion/NOOS, §4.1.1).
    pub async fn submit(
        &self,
        task_type: TaskType,
        file_name: Option<String>,
        parameters: Option<serde_json::Value>,
    ) -> EngineResult<Task> {
        let handler = self.handler_for(task_type)?;
        let category = task_type.category();
        self.admit(category).await?;

        let mut task = Task::new_pending(0, task_type, file_name);
        task.parameters = parameters;
        let task = self.storage.create_task(task).await?;

        self.schedule(task.clone(), handler).await;
        Ok(task)
    }

    async fn schedule(&self, task: Task, handler: Arc<dyn TaskHandler<S>>) {
        let cancellation = CancellationToken::new();
        self.running.lock().await.insert(task.id, RunningTask { cancellation: cancellation.clone() });

        let storage = Arc::clone(&self.storage);
        let config = Arc::clone(&self.config);
        let running = Arc::clone(&self.running);
        let pool = self.pool(task.task_type.category()).clone_handle();
        let timeout = pool.timeout();
        let task_id = task.id;

        tokio::spawn(async move {
            let _permit = pool.acquire().await;
            run_task(storage, config, task, handler, cancellation, timeout).await;
            running.lock().await.remove(&task_id);
        });
    }

    pub async fn get(&self, id: i64) -> EngineResult<Task> {
        self.storage.get_task(id).await?.ok_or_else(|| EngineError::not_found(format!("task {id}")))
    }

    /// Best-effort, idempotent (§4.1 "requestCancel"). Has no effect on
    /// already-terminal tasks.
    pub async fn request_cancel(&self, id: i64) -> EngineResult<()> {
        if !self.storage.request_cancel(id).await? {
            return Err(EngineError::not_found(format!("task {id}")));
        }
        if let Some(running) = self.running.lock().await.get(&id) {
            running.cancellation.cancel();
        }
        Ok(())
    }

    /// Re-enqueues PENDING tasks and marks RUNNING ones INTERRUPTED, per
    /// §4.1 "Persistence and recovery". Must run before the first submission
    /// is accepted; `noos-server::serve` calls this during startup.
    pub async fn recover_on_startup(&self) -> EngineResult<()> {
        for orphan in self.storage.list_orphaned_tasks().await? {
            match orphan.status {
                TaskStatus::Running => {
                    let mut task = orphan;
                    task.status = TaskStatus::Failed;
                    task.error_message = Some("process restarted while task was running".into());
                    task.end_time = Some(chrono::Utc::now());
                    self.storage.update_task(task).await?;
                }
                TaskStatus::Pending => {
                    tracing::info!(task_id = orphan.id, "re-enqueueing pending task after restart");
                    match self.handler_for(orphan.task_type) {
                        Ok(handler) => self.schedule(orphan, handler).await,
                        Err(err) => tracing::error!(task_id = orphan.id, error = %err, "no handler for orphaned task type"),
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

async fn run_task<S: Storage>(
    storage: Arc<S>,
    config: Arc<EngineConfig>,
    mut task: Task,
    handler: Arc<dyn TaskHandler<S>>,
    cancellation: CancellationToken,
    timeout: Duration,
) {
    task.status = TaskStatus::Running;
    task.start_time = Some(chrono::Utc::now());
    if let Err(err) = storage.update_task(task.clone()).await {
        tracing::error!(task_id = task.id, error = %err, "failed to mark task running");
        return;
    }

    let task_id = task.id;
    let progress_storage = Arc::clone(&storage);
    let sink = Arc::new(ThrottledProgressSink::new(
        config.progress.min_percent_delta,
        Duration::from_millis(config.progress.min_interval_ms),
        move |percentage, message| {
            let storage = Arc::clone(&progress_storage);
            let message_owned = message;
            tokio::spawn(async move {
                if let Ok(Some(mut t)) = storage.get_task(task_id).await {
                    t.progress_percentage = percentage;
                    t.progress_message = Some(message_owned);
                    let _ = storage.update_task(t).await;
                }
            });
        },
    ));

    let ctx = TaskContext {
        task_id,
        storage: Arc::clone(&storage),
        config: Arc::clone(&config),
        progress: sink,
        cancellation: cancellation.clone(),
    };

    let outcome = tokio::time::timeout(timeout, handler.run(ctx)).await;

    let mut task = match storage.get_task(task_id).await {
        Ok(Some(t)) => t,
        _ => task,
    };
    task.end_time = Some(chrono::Utc::now());

    match outcome {
        Ok(Ok(result)) => {
            task.status = TaskStatus::Completed;
            task.progress_percentage = 100;
            task.parameters = Some(result);
        }
        Ok(Err(err)) if err.kind() == crate::error::ErrorKind::Cancelled => {
            task.status = TaskStatus::Cancelled;
        }
        Ok(Err(err)) => {
            task.status = TaskStatus::Failed;
            task.error_message = Some(err.as_task_summary());
        }
        Err(_elapsed) => {
            task.status = TaskStatus::Failed;
            task.error_message = Some("TIMEOUT: handler exceeded its wall-clock budget".into());
            cancellation.cancel();
        }
    }

    if let Err(err) = storage.update_task(task).await {
        tracing::error!(task_id, error = %err, "failed to persist terminal task state");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::{EngineConfig, PoolConfig};
    use crate::entities::TaskType;
    use crate::error::ErrorKind;
    use crate::service::storage::memory::MemoryStorage;
    use crate::test_support;

    use super::TaskEngine;

    async fn wait_for_terminal<S: crate::service::storage::Storage>(
        engine: &TaskEngine<S>,
        task_id: i64,
    ) -> crate::entities::Task {
        for _ in 0..200 {
            let task = engine.get(task_id).await.unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn submit_and_get_round_trips_a_task() {
        let state = test_support::engine_state();
        let task = state.tasks.submit(TaskType::UploadStyles, Some("styles.tsv".into()), None).await.unwrap();
        assert_eq!(task.status, crate::entities::TaskStatus::Pending);
        let fetched = state.tasks.get(task.id).await.unwrap();
        assert_eq!(fetched.id, task.id);
    }

    #[tokio::test]
    async fn get_missing_task_is_not_found() {
        let state = test_support::engine_state();
        let err = state.tasks.get(999).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn admission_control_rejects_over_capacity_submissions() {
        // A single-worker, zero-backlog compute pool admits exactly one
        // outstanding RunNoos task at a time (§4.1 "Admission").
        let storage = Arc::new(MemoryStorage::new());
        let mut config = EngineConfig::default();
        config.pools.compute = PoolConfig { workers: 1, queue_depth_multiplier: 1, timeout_secs: 5 };
        let config = Arc::new(config);
        let engine = Arc::new(TaskEngine::new(Arc::clone(&storage), config));

        struct NeverFinishes;
        #[crate::async_trait::async_trait]
        impl<S: crate::service::storage::Storage> super::TaskHandler<S> for NeverFinishes {
            async fn run(&self, ctx: super::TaskContext<S>) -> crate::error::EngineResult<serde_json::Value> {
                loop {
                    if ctx.is_cancelled() {
                        return Err(crate::error::EngineError::cancelled("stopped"));
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            }
        }
        engine.register_handler(TaskType::RunNoos, Arc::new(NeverFinishes));

        let first = engine.submit(TaskType::RunNoos, None, None).await.unwrap();
        // Give the worker a moment to pick up the first task so the pool is
        // visibly at capacity (PENDING ∪ RUNNING == capacity).
        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = engine.submit(TaskType::RunNoos, None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);

        engine.request_cancel(first.id).await.unwrap();
        let terminal = wait_for_terminal(&engine, first.id).await;
        assert_eq!(terminal.status, crate::entities::TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn request_cancel_on_unknown_task_is_not_found() {
        let state = test_support::engine_state();
        let err = state.tasks.request_cancel(12345).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn request_cancel_is_idempotent_and_has_no_effect_after_completion() {
        let state = test_support::engine_state();
        // UploadStyles with no staged file fails fast (INTERNAL), giving a
        // deterministic terminal state to cancel against.
        let task = state.tasks.submit(TaskType::UploadStyles, None, None).await.unwrap();
        let terminal = wait_for_terminal(&state.tasks, task.id).await;
        assert!(terminal.status.is_terminal());

        state.tasks.request_cancel(task.id).await.unwrap();
        state.tasks.request_cancel(task.id).await.unwrap();
        let after = state.tasks.get(task.id).await.unwrap();
        assert_eq!(after.status, terminal.status, "cancelling a terminal task must not change its status");
    }

    #[tokio::test]
    async fn recover_on_startup_fails_orphaned_running_tasks() {
        let storage = Arc::new(MemoryStorage::new());
        let config = Arc::new(EngineConfig::default());
        let mut orphan = crate::entities::Task::new_pending(0, TaskType::RunNoos, None);
        orphan.status = crate::entities::TaskStatus::Running;
        orphan.start_time = Some(chrono::Utc::now());
        let orphan = storage.create_task(orphan).await.unwrap();

        let engine = TaskEngine::new(Arc::clone(&storage), config);
        engine.recover_on_startup().await.unwrap();

        let recovered = engine.get(orphan.id).await.unwrap();
        assert_eq!(recovered.status, crate::entities::TaskStatus::Failed);
        assert!(recovered.error_message.unwrap().contains("restarted"));
    }

    #[tokio::test]
    async fn recover_on_startup_reschedules_pending_tasks() {
        let state = test_support::engine_state();
        let mut pending = crate::entities::Task::new_pending(0, TaskType::UploadStyles, None);
        pending.status = crate::entities::TaskStatus::Pending;
        let pending = state.storage.create_task(pending).await.unwrap();

        state.tasks.recover_on_startup().await.unwrap();
        let terminal = wait_for_terminal(&state.tasks, pending.id).await;
        // No staged file: the handler fails fast, but the important thing is
        // that recovery actually dispatched it rather than leaving it stuck
        // PENDING forever (§4.1 "Persistence and recovery").
        assert_eq!(terminal.status, crate::entities::TaskStatus::Failed);
    }
}
