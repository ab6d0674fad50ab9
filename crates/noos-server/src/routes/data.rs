//! `DELETE /api/data/clear-all` (§6).

use axum::extract::State;
use axum::Json;
use noos_engine::service::storage::{ClearAllCounts, Storage};
use noos_engine::service::EngineState;

use crate::error_response::ApiError;

pub(crate) async fn clear_all<S: Storage>(
    State(state): State<EngineState<S>>,
) -> Result<Json<ClearAllCounts>, ApiError> {
    Ok(Json(state.storage.clear_all().await?))
}
