//! `/api/report/report1` and `/api/report/report2` (§6).

use axum::extract::State;
use axum::Json;
use noos_engine::service::reports::{self, NoosAnalyticsEntry, SystemHealthEntry};
use noos_engine::service::storage::Storage;
use noos_engine::service::EngineState;

use crate::error_response::ApiError;

pub(crate) async fn report1<S: Storage>(
    State(state): State<EngineState<S>>,
) -> Result<Json<Vec<NoosAnalyticsEntry>>, ApiError> {
    Ok(Json(reports::report1(state.storage.as_ref()).await?))
}

pub(crate) async fn report2<S: Storage>(
    State(state): State<EngineState<S>>,
) -> Result<Json<Vec<SystemHealthEntry>>, ApiError> {
    Ok(Json(reports::report2(state.storage.as_ref()).await?))
}
