//! Wire API router (§6). One thin axum handler per table row; all domain
//! logic stays in `noos_engine`. Handlers are generic over the storage
//! backend so the same router body serves both `EngineState<PostgresStorage>`
//! and `EngineState<MemoryStorage>` (§4.5.1).

mod algo;
mod data;
mod file;
mod report;
mod run;
mod tasks;
mod updates;

use axum::routing::{delete, get, post};
use axum::Router;
use noos_engine::service::storage::Storage;
use noos_engine::service::EngineState;

pub(crate) fn router<S: Storage>(state: EngineState<S>) -> Router {
    Router::new()
        .route("/api/file/upload/{kind}/async", post(file::upload::<S>))
        .route("/api/file/status", get(file::status::<S>))
        .route("/api/file/download/{kind}/async", post(file::download::<S>))
        .route("/api/tasks/{id}", get(tasks::get_task::<S>))
        .route("/api/tasks/{id}/cancel", post(tasks::cancel::<S>))
        .route("/api/tasks/{id}/result", get(tasks::result::<S>))
        .route("/api/algo/current", get(algo::current::<S>))
        .route("/api/algo/defaults", get(algo::defaults))
        .route("/api/algo/update", post(algo::update_active::<S>))
        .route("/api/algo/create", post(algo::create::<S>))
        .route(
            "/api/algo/set/{name}",
            get(algo::get_by_name::<S>).put(algo::update_by_name::<S>),
        )
        .route("/api/algo/set/{name}/activate", post(algo::activate::<S>))
        .route("/api/algo/sets/recent", get(algo::recent::<S>))
        .route("/api/run/noos/async", post(run::run_noos::<S>))
        .route("/api/report/report1", get(report::report1::<S>))
        .route("/api/report/report2", get(report::report2::<S>))
        .route("/api/updates", get(updates::updates::<S>))
        .route("/api/data/clear-all", delete(data::clear_all::<S>))
        .with_state(state)
}
