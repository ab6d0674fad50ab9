//! `GET /api/updates` — dashboard tiles (§6).

use axum::extract::State;
use axum::Json;
use noos_engine::service::reports::{self, DashboardTiles};
use noos_engine::service::storage::Storage;
use noos_engine::service::EngineState;

use crate::error_response::ApiError;

pub(crate) async fn updates<S: Storage>(
    State(state): State<EngineState<S>>,
) -> Result<Json<DashboardTiles>, ApiError> {
    Ok(Json(reports::dashboard_tiles(state.storage.as_ref()).await?))
}
