//! The Storage Adapter (§4.5): transactional CRUD and query primitives over
//! the entities in §3. Shaped after the teacher's `CatalogTaskOps` trait
//! (`service/catalog_store/tasks.rs`) — an async trait with one method per
//! operation the rest of the engine needs, implemented once per backend.
//!
//! Two backends ship: [`postgres`] (default, `sqlx`) and [`memory`] (feature
//! `storage-in-memory`, used by tests and `noos-server --memory`).

#[cfg(feature = "sqlx-postgres")]
pub mod postgres;

#[cfg(any(test, feature = "storage-in-memory"))]
pub mod memory;

use chrono::{DateTime, NaiveDate, Utc};

use crate::entities::{
    AlgorithmParameters, NoosResult, Sales, Sku, Store, Style, Task, TaskCategory, TaskStatus,
    TaskType,
};
use crate::error::EngineResult;

/// A bounded date window for Sales queries. `None` on either end means
/// unbounded in that direction (§4.3 Stage 1: "If either date is null,
/// select all sales").
#[derive(Debug, Clone, Copy, Default)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub category: Option<TaskCategory>,
}

/// Aggregate counts backing report2 / System Health (§6).
#[derive(Debug, Clone, Default)]
pub struct TaskTypeStats {
    pub task_type: Option<TaskType>,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub avg_execution_secs: f64,
}

/// A running transaction scope covering one ingestion batch (clear + insert)
/// or one parameter-activation swap (§4.5 "explicit transaction scope").
///
/// Consuming `self: Box<Self>` in `commit`/`rollback` mirrors the standard
/// `sqlx::Transaction::commit(self)` shape so a transaction can only be
/// finalized once.
#[crate::async_trait::async_trait]
pub trait StorageTransaction: Send {
    async fn clear_sales(&mut self) -> EngineResult<u64>;
    async fn clear_skus(&mut self) -> EngineResult<u64>;
    async fn clear_styles(&mut self) -> EngineResult<u64>;
    async fn clear_stores(&mut self) -> EngineResult<u64>;

    async fn insert_styles(&mut self, rows: Vec<Style>) -> EngineResult<()>;
    async fn insert_stores(&mut self, rows: Vec<Store>) -> EngineResult<()>;
    async fn insert_skus(&mut self, rows: Vec<Sku>) -> EngineResult<()>;
    async fn insert_sales(&mut self, rows: Vec<Sales>) -> EngineResult<()>;

    /// Within-transaction lookups, needed so the ingestion pipeline can
    /// validate foreign keys against rows already inserted in this same
    /// batch (earlier chunks) as well as previously committed state.
    async fn style_exists(&mut self, style: &str) -> EngineResult<bool>;
    async fn sku_exists(&mut self, sku: &str) -> EngineResult<bool>;
    async fn store_exists(&mut self, branch: &str) -> EngineResult<bool>;

    async fn deactivate_all_parameters(&mut self) -> EngineResult<()>;
    async fn upsert_parameters(&mut self, params: AlgorithmParameters) -> EngineResult<()>;

    async fn delete_noos_results(&mut self) -> EngineResult<u64>;
    async fn insert_noos_results(&mut self, rows: Vec<NoosResult>) -> EngineResult<()>;

    async fn commit(self: Box<Self>) -> EngineResult<()>;
    async fn rollback(self: Box<Self>) -> EngineResult<()>;
}

#[crate::async_trait::async_trait]
pub trait Storage: Send + Sync + 'static {
    async fn begin(&self) -> EngineResult<Box<dyn StorageTransaction>>;

    // -- master/transactional data reads --
    async fn get_style(&self, style: &str) -> EngineResult<Option<Style>>;
    async fn list_styles(&self) -> EngineResult<Vec<Style>>;
    async fn count_styles(&self) -> EngineResult<u64>;

    async fn get_store(&self, branch: &str) -> EngineResult<Option<Store>>;
    async fn list_stores(&self) -> EngineResult<Vec<Store>>;
    async fn count_stores(&self) -> EngineResult<u64>;

    async fn get_sku(&self, sku: &str) -> EngineResult<Option<Sku>>;
    async fn list_skus(&self) -> EngineResult<Vec<Sku>>;
    async fn count_skus(&self) -> EngineResult<u64>;

    async fn sales_in_window(&self, window: DateWindow) -> EngineResult<Vec<Sales>>;
    async fn count_sales(&self) -> EngineResult<u64>;

    // -- tasks --
    async fn create_task(&self, task: Task) -> EngineResult<Task>;
    async fn get_task(&self, id: i64) -> EngineResult<Option<Task>>;
    async fn update_task(&self, task: Task) -> EngineResult<()>;
    async fn request_cancel(&self, id: i64) -> EngineResult<bool>;
    async fn list_tasks(&self, filter: TaskFilter) -> EngineResult<Vec<Task>>;
    async fn count_tasks(&self, filter: TaskFilter) -> EngineResult<u64>;
    async fn task_type_stats(&self, since: DateTime<Utc>) -> EngineResult<Vec<TaskTypeStats>>;
    /// Tasks left `PENDING`/`RUNNING` from a previous process (§4.1 recovery).
    async fn list_orphaned_tasks(&self) -> EngineResult<Vec<Task>>;

    // -- parameter store --
    async fn get_active_parameters(&self) -> EngineResult<Option<AlgorithmParameters>>;
    async fn get_parameters_by_name(&self, name: &str) -> EngineResult<Option<AlgorithmParameters>>;
    async fn list_recent_parameters(&self, limit: u32) -> EngineResult<Vec<AlgorithmParameters>>;
    async fn parameter_name_exists(&self, name: &str) -> EngineResult<bool>;
    async fn update_parameters(&self, params: AlgorithmParameters) -> EngineResult<()>;

    /// Clears every entity (`DELETE /api/data/clear-all`). Returns the
    /// per-entity row counts deleted, in dependency order.
    async fn clear_all(&self) -> EngineResult<ClearAllCounts>;
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ClearAllCounts {
    pub sales: u64,
    pub skus: u64,
    pub stores: u64,
    pub styles: u64,
    pub noos_results: u64,
    pub tasks: u64,
}
