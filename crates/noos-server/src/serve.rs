//! `serve` subcommand: wires a concrete [`noos_engine::service::storage::Storage`]
//! backend into an [`noos_engine::service::EngineState`], registers every
//! `TaskHandler`, recovers orphaned tasks, and binds the axum router.
//!
//! Grounded on the teacher's `serve.rs` (build pools, wire the router, bind
//! the listener) but without the authn/authz/event-publisher machinery,
//! which is out of scope here.

use std::net::SocketAddr;
use std::sync::Arc;

use noos_engine::entities::TaskType;
use noos_engine::service::ingestion::pipeline::IngestKind;
use noos_engine::service::ingestion::{DownloadHandler, IngestUploadHandler};
use noos_engine::service::storage::Storage;
use noos_engine::service::tasks::TaskHandler;
use noos_engine::service::EngineState;
use noos_engine::service::algorithm::NoosRunHandler;
use noos_engine::CONFIG;

use crate::request_tracing::{MakeRequestFastId, NoosMakeSpan};

fn register_handlers<S: Storage>(state: &EngineState<S>) {
    let uploads: [(TaskType, IngestKind); 4] = [
        (TaskType::UploadStyles, IngestKind::Styles),
        (TaskType::UploadStores, IngestKind::Stores),
        (TaskType::UploadSkus, IngestKind::Skus),
        (TaskType::UploadSales, IngestKind::Sales),
    ];
    for (task_type, kind) in uploads {
        state.tasks.register_handler(task_type, Arc::new(IngestUploadHandler::new(kind)));
    }

    let downloads: [(TaskType, IngestKind); 4] = [
        (TaskType::DownloadStyles, IngestKind::Styles),
        (TaskType::DownloadStores, IngestKind::Stores),
        (TaskType::DownloadSkus, IngestKind::Skus),
        (TaskType::DownloadSales, IngestKind::Sales),
    ];
    for (task_type, kind) in downloads {
        state.tasks.register_handler(task_type, Arc::new(DownloadHandler::new(kind)));
    }

    let noos_handler: Arc<dyn TaskHandler<S>> = Arc::new(NoosRunHandler::new());
    state.tasks.register_handler(TaskType::RunNoos, noos_handler);
}

async fn build_router<S: Storage>(state: EngineState<S>) -> anyhow::Result<axum::Router> {
    register_handlers(&state);
    state.tasks.recover_on_startup().await?;

    use tower::ServiceBuilder;
    use tower_http::ServiceBuilderExt;

    let router = crate::routes::router(state).layer(
        ServiceBuilder::new()
            .set_x_request_id(MakeRequestFastId)
            .layer(tower_http::trace::TraceLayer::new_for_http().make_span_with(NoosMakeSpan))
            .layer(tower_http::catch_panic::CatchPanicLayer::new())
            .propagate_x_request_id(),
    );
    Ok(router)
}

#[cfg(feature = "sqlx-postgres")]
async fn postgres_router() -> anyhow::Result<axum::Router> {
    let storage = Arc::new(
        noos_engine::service::storage::postgres::PostgresStorage::connect(
            &CONFIG.storage.database_url,
            CONFIG.storage.max_connections,
        )
        .await?,
    );
    let state = EngineState::new(storage, Arc::new(CONFIG.clone()));
    build_router(state).await
}

#[cfg(feature = "storage-in-memory")]
async fn memory_router() -> anyhow::Result<axum::Router> {
    let storage = Arc::new(noos_engine::service::storage::memory::MemoryStorage::new());
    let state = EngineState::new(storage, Arc::new(CONFIG.clone()));
    build_router(state).await
}

pub(crate) async fn serve(bind_addr: SocketAddr) -> anyhow::Result<()> {
    #[cfg(feature = "storage-in-memory")]
    if crate::config::CONFIG_BIN.memory {
        tracing::warn!("serving with the in-memory storage backend; data will not persist");
        let router = memory_router().await?;
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        tracing::info!(%bind_addr, "listening");
        axum::serve(listener, router).await?;
        return Ok(());
    }

    #[cfg(feature = "sqlx-postgres")]
    {
        let router = postgres_router().await?;
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        tracing::info!(%bind_addr, "listening");
        axum::serve(listener, router).await?;
        return Ok(());
    }

    #[allow(unreachable_code)]
    {
        anyhow::bail!("no storage backend available: build with sqlx-postgres or storage-in-memory")
    }
}
