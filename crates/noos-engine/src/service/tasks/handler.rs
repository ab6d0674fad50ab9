//! The seam between the Task Engine and Ingestion/NOOS (§4.1.1):
//! `TaskHandler::run` receives a [`TaskContext`] bundling storage access,
//! the cancellation flag, and a progress sink, and returns whatever JSON
//! summary becomes `Task.parameters` on completion.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::service::progress::ProgressSink;
use crate::service::storage::Storage;
use crate::CancellationToken;

pub struct TaskContext<S: Storage> {
    pub task_id: i64,
    pub storage: Arc<S>,
    pub config: Arc<EngineConfig>,
    pub progress: Arc<dyn ProgressSink>,
    pub cancellation: CancellationToken,
}

impl<S: Storage> TaskContext<S> {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn report(&self, percentage: u8, message: impl Into<String>) {
        self.progress.report(percentage, message.into());
    }
}

#[crate::async_trait::async_trait]
pub trait TaskHandler<S: Storage>: Send + Sync + 'static {
    async fn run(&self, ctx: TaskContext<S>) -> EngineResult<serde_json::Value>;
}
