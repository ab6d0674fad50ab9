//! Shared test fixtures, built on the in-memory backend. Grounded on the
//! teacher's `implementations/postgres/catalog/test_io.rs` builder-function
//! style — plain constructor functions rather than a trait or macro.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::config::EngineConfig;
use crate::entities::{Sales, Sku, Store, Style};
use crate::service::algorithm::NoosRunHandler;
use crate::service::ingestion::pipeline::IngestKind;
use crate::service::ingestion::{DownloadHandler, IngestUploadHandler};
use crate::service::storage::memory::MemoryStorage;
use crate::service::tasks::TaskHandler;
use crate::service::EngineState;
use crate::entities::TaskType;

/// Builds an `EngineState<MemoryStorage>` with every task handler registered
/// the way `noos-server::serve` wires a real process, so engine-level tests
/// can exercise `submit`/`recover_on_startup` end to end.
#[must_use]
pub fn engine_state() -> EngineState<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    let config = Arc::new(EngineConfig::default());
    let state = EngineState::new(storage, config);

    register_handlers(&state);
    state
}

pub fn register_handlers(state: &EngineState<MemoryStorage>) {
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

    let noos_handler: Arc<dyn TaskHandler<MemoryStorage>> = Arc::new(NoosRunHandler::new());
    state.tasks.register_handler(TaskType::RunNoos, noos_handler);
}

#[must_use]
pub fn style(code: &str, mrp: impl Into<Decimal>) -> Style {
    let now = Utc::now();
    Style {
        style: code.into(),
        brand: "TESTBRAND".into(),
        category: "SHIRTS".into(),
        sub_category: "CASUAL".into(),
        mrp: mrp.into(),
        gender: "M".into(),
        created_at: now,
        updated_at: now,
    }
}

#[must_use]
pub fn store(branch: &str) -> Store {
    let now = Utc::now();
    Store {
        branch: branch.into(),
        city: "Pune".into(),
        created_at: now,
        updated_at: now,
    }
}

#[must_use]
pub fn sku(code: &str, style: &str) -> Sku {
    let now = Utc::now();
    Sku {
        sku: code.into(),
        style: style.into(),
        size: "M".into(),
        created_at: now,
        updated_at: now,
    }
}

#[must_use]
pub fn sale(day: NaiveDate, sku: &str, channel: &str, quantity: i64, discount: impl Into<Decimal>, revenue: impl Into<Decimal>) -> Sales {
    Sales {
        day,
        sku: sku.into(),
        channel: channel.into(),
        quantity,
        discount: discount.into(),
        revenue: revenue.into(),
        created_at: Utc::now(),
    }
}
