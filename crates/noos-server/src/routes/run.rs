//! `POST /api/run/noos/async` (§6) — submits a `RunNoos` task against either
//! the active parameter set or a caller-named one.

use axum::extract::State;
use axum::Json;
use noos_engine::service::storage::Storage;
use noos_engine::service::EngineState;
use noos_engine::{Task, TaskType};
use serde::Deserialize;

use crate::error_response::ApiError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RunNoosRequest {
    parameter_set_name: Option<String>,
}

pub(crate) async fn run_noos<S: Storage>(
    State(state): State<EngineState<S>>,
    Json(request): Json<RunNoosRequest>,
) -> Result<Json<Task>, ApiError> {
    let parameters = request
        .parameter_set_name
        .map(|name| serde_json::json!({ "parameterSetName": name }));
    let task = state.tasks.submit(TaskType::RunNoos, None, parameters).await?;
    Ok(Json(task))
}
