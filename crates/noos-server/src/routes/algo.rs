//! `/api/algo/*` — the Parameter-Set Manager's wire surface (§4.4, §6).

use axum::extract::{Path, Query, State};
use axum::Json;
use noos_engine::service::parameters::{ParameterFields, ParameterStore};
use noos_engine::service::storage::Storage;
use noos_engine::service::EngineState;
use noos_engine::AlgorithmParameters;
use serde::Deserialize;

use crate::error_response::ApiError;

pub(crate) async fn current<S: Storage>(
    State(state): State<EngineState<S>>,
) -> Result<Json<AlgorithmParameters>, ApiError> {
    let store = ParameterStore::new(state.storage.as_ref());
    Ok(Json(store.get_active().await?))
}

pub(crate) async fn defaults() -> Json<AlgorithmParameters> {
    Json(AlgorithmParameters::defaults("default"))
}

pub(crate) async fn update_active<S: Storage>(
    State(state): State<EngineState<S>>,
    Json(fields): Json<ParameterFields>,
) -> Result<Json<AlgorithmParameters>, ApiError> {
    let store = ParameterStore::new(state.storage.as_ref());
    Ok(Json(store.update_active(&fields).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateQuery {
    name: String,
}

pub(crate) async fn create<S: Storage>(
    State(state): State<EngineState<S>>,
    Query(query): Query<CreateQuery>,
    Json(fields): Json<ParameterFields>,
) -> Result<Json<AlgorithmParameters>, ApiError> {
    let store = ParameterStore::new(state.storage.as_ref());
    Ok(Json(store.create(&query.name, &fields).await?))
}

pub(crate) async fn get_by_name<S: Storage>(
    State(state): State<EngineState<S>>,
    Path(name): Path<String>,
) -> Result<Json<AlgorithmParameters>, ApiError> {
    let store = ParameterStore::new(state.storage.as_ref());
    Ok(Json(store.get_by_name(&name).await?))
}

pub(crate) async fn update_by_name<S: Storage>(
    State(state): State<EngineState<S>>,
    Path(name): Path<String>,
    Json(fields): Json<ParameterFields>,
) -> Result<Json<AlgorithmParameters>, ApiError> {
    let store = ParameterStore::new(state.storage.as_ref());
    Ok(Json(store.update_by_name(&name, &fields).await?))
}

pub(crate) async fn activate<S: Storage>(
    State(state): State<EngineState<S>>,
    Path(name): Path<String>,
) -> Result<Json<AlgorithmParameters>, ApiError> {
    let store = ParameterStore::new(state.storage.as_ref());
    Ok(Json(store.activate(&name).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecentQuery {
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    10
}

pub(crate) async fn recent<S: Storage>(
    State(state): State<EngineState<S>>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<AlgorithmParameters>>, ApiError> {
    let store = ParameterStore::new(state.storage.as_ref());
    Ok(Json(store.list_recent(query.limit).await?))
}
