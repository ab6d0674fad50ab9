//! Wires the NOOS algorithm onto the Task Engine as the `RUN_NOOS` handler
//! (§4.1.1, §4.3). Resolves which `AlgorithmParameters` to use — an
//! explicit named override from the submission, else whatever is active —
//! before delegating to [`super::run`].

use crate::error::EngineResult;
use crate::service::parameters::ParameterStore;
use crate::service::storage::Storage;
use crate::service::tasks::{TaskContext, TaskHandler};

#[derive(Debug, Default)]
pub struct NoosRunHandler;

impl NoosRunHandler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[crate::async_trait::async_trait]
impl<S: Storage> TaskHandler<S> for NoosRunHandler {
    async fn run(&self, ctx: TaskContext<S>) -> EngineResult<serde_json::Value> {
        let task = ctx
            .storage
            .get_task(ctx.task_id)
            .await?
            .ok_or_else(|| crate::error::EngineError::not_found(format!("task {}", ctx.task_id)))?;

        let parameter_set_name = task
            .parameters
            .as_ref()
            .and_then(|p| p.get("parameterSetName"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        let store = ParameterStore::new(ctx.storage.as_ref());
        let params = match parameter_set_name {
            Some(name) => store.get_by_name(&name).await?,
            None => store.get_active().await?,
        };

        super::run(ctx.storage.as_ref(), params, ctx.task_id, ctx.progress.as_ref(), &ctx.cancellation).await
    }
}
