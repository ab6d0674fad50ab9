//! `/api/tasks/*` — status polling, cancellation, and result retrieval
//! (§6).

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use noos_engine::service::storage::Storage;
use noos_engine::service::EngineState;
use noos_engine::{EngineError, Task, TaskStatus};

use crate::error_response::ApiError;

pub(crate) async fn get_task<S: Storage>(
    State(state): State<EngineState<S>>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.tasks.get(id).await?))
}

pub(crate) async fn cancel<S: Storage>(
    State(state): State<EngineState<S>>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, ApiError> {
    state.tasks.request_cancel(id).await?;
    Ok(Json(state.tasks.get(id).await?))
}

/// Streams the artifact a completed task produced (§4.1 "result(taskId)",
/// valid only when `status=COMPLETED` and `resultUrl` is set — a download's
/// exported TSV, or a failed upload's `all_failed_with_errors.tsv`).
pub(crate) async fn result<S: Storage>(
    State(state): State<EngineState<S>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let task = state.tasks.get(id).await?;
    if task.status != TaskStatus::Completed {
        return Err(EngineError::conflict(format!("task {id} has not completed")).into());
    }
    let Some(result_url) = task.result_url else {
        return Err(EngineError::not_found(format!("task {id} has no result artifact")).into());
    };
    let bytes = tokio::fs::read(&result_url)
        .await
        .map_err(|e| EngineError::internal("failed to read result artifact").with_detail(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/tab-separated-values")],
        axum::body::Body::from(bytes),
    )
        .into_response())
}
