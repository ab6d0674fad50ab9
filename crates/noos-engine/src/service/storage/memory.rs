//! In-memory storage backend (`storage-in-memory` feature), grounded on the
//! teacher's `test-utils` feature which swaps an in-memory storage profile
//! into tests without a live database. Used by `noos-engine`'s own test
//! suite and by `noos-server --memory` for local development.
//!
//! Transactions are modeled by cloning the committed state into a working
//! copy, mutating the copy, and merging its domain tables back in atomically
//! on commit — there is no concurrent-writer conflict detection because the
//! engine only ever runs one ingestion/activation transaction at a time per
//! process, and the writer mutex held across a transaction's lifetime
//! already serializes writers. `tasks`/`next_task_id` are outside any
//! transaction's scope (§4.5) and are written live through `create_task`/
//! `update_task` even while a transaction is open (progress ticks during a
//! batch insert, in particular), so commit merges field-by-field instead of
//! replacing the whole `State` — a whole-struct swap would silently revert
//! those concurrent task writes to the pre-transaction snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::entities::{
    AlgorithmParameters, NoosResult, Sales, Sku, Store, Style, Task, TaskCategory, TaskStatus,
    TaskType,
};
use crate::error::EngineResult;

use super::{ClearAllCounts, DateWindow, Storage, StorageTransaction, TaskFilter, TaskTypeStats};

#[derive(Debug, Clone, Default)]
struct State {
    styles: HashMap<String, Style>,
    stores: HashMap<String, Store>,
    skus: HashMap<String, Sku>,
    sales: Vec<Sales>,
    tasks: HashMap<i64, Task>,
    next_task_id: i64,
    parameters: HashMap<String, AlgorithmParameters>,
    noos_results: HashMap<i64, Vec<NoosResult>>,
}

/// In-memory [`Storage`] implementation. A single writer mutex serializes
/// transactions (mirroring the single-threaded-per-transaction guarantee a
/// real database connection pool gives us); readers take a cheap snapshot
/// clone under a `RwLock` read guard.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<RwLock<State>>,
    writer: Arc<Mutex<()>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            writer: Arc::new(Mutex::new(())),
        }
    }
}

/// A transaction: holds the writer lock for its lifetime, working on a
/// private copy of [`State`] that is swapped in on `commit`.
struct MemoryTransaction {
    state: Arc<RwLock<State>>,
    _writer_guard: OwnedMutexGuard<()>,
    working: State,
}

#[crate::async_trait::async_trait]
impl StorageTransaction for MemoryTransaction {
    async fn clear_sales(&mut self) -> EngineResult<u64> {
        let n = self.working.sales.len() as u64;
        self.working.sales.clear();
        Ok(n)
    }

    async fn clear_skus(&mut self) -> EngineResult<u64> {
        let n = self.working.skus.len() as u64;
        self.working.skus.clear();
        Ok(n)
    }

    async fn clear_styles(&mut self) -> EngineResult<u64> {
        let n = self.working.styles.len() as u64;
        self.working.styles.clear();
        Ok(n)
    }

    async fn clear_stores(&mut self) -> EngineResult<u64> {
        let n = self.working.stores.len() as u64;
        self.working.stores.clear();
        Ok(n)
    }

    async fn insert_styles(&mut self, rows: Vec<Style>) -> EngineResult<()> {
        for row in rows {
            self.working.styles.insert(row.style.clone(), row);
        }
        Ok(())
    }

    async fn insert_stores(&mut self, rows: Vec<Store>) -> EngineResult<()> {
        for row in rows {
            self.working.stores.insert(row.branch.clone(), row);
        }
        Ok(())
    }

    async fn insert_skus(&mut self, rows: Vec<Sku>) -> EngineResult<()> {
        for row in rows {
            self.working.skus.insert(row.sku.clone(), row);
        }
        Ok(())
    }

    async fn insert_sales(&mut self, rows: Vec<Sales>) -> EngineResult<()> {
        self.working.sales.extend(rows);
        Ok(())
    }

    async fn style_exists(&mut self, style: &str) -> EngineResult<bool> {
        Ok(self.working.styles.contains_key(style))
    }

    async fn sku_exists(&mut self, sku: &str) -> EngineResult<bool> {
        Ok(self.working.skus.contains_key(sku))
    }

    async fn store_exists(&mut self, branch: &str) -> EngineResult<bool> {
        Ok(self.working.stores.contains_key(branch))
    }

    async fn deactivate_all_parameters(&mut self) -> EngineResult<()> {
        for params in self.working.parameters.values_mut() {
            params.is_active = false;
        }
        Ok(())
    }

    async fn upsert_parameters(&mut self, params: AlgorithmParameters) -> EngineResult<()> {
        self.working
            .parameters
            .insert(params.name.clone(), params);
        Ok(())
    }

    async fn delete_noos_results(&mut self) -> EngineResult<u64> {
        let n = self.working.noos_results.values().map(Vec::len).sum::<usize>() as u64;
        self.working.noos_results.clear();
        Ok(n)
    }

    async fn insert_noos_results(&mut self, rows: Vec<NoosResult>) -> EngineResult<()> {
        for row in rows {
            self.working
                .noos_results
                .entry(row.algorithm_run_id)
                .or_default()
                .push(row);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> EngineResult<()> {
        // Merge only the domain tables this transaction can touch
        // (§4.5 "explicit transaction scope" covers styles/stores/skus/
        // sales/parameters/noos_results). `tasks`/`next_task_id` are never
        // part of that scope and are mutated live (outside any transaction)
        // by the owning worker and the progress sink while this transaction
        // is open; swapping in the whole snapshot here would clobber those
        // writes back to the state as of `begin()`.
        let mut guard = self.state.write().await;
        guard.styles = self.working.styles;
        guard.stores = self.working.stores;
        guard.skus = self.working.skus;
        guard.sales = self.working.sales;
        guard.parameters = self.working.parameters;
        guard.noos_results = self.working.noos_results;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> EngineResult<()> {
        Ok(())
    }
}

#[crate::async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn begin(&self) -> EngineResult<Box<dyn StorageTransaction>> {
        let writer_guard = Arc::clone(&self.writer).lock_owned().await;
        let working = self.state.read().await.clone();
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            _writer_guard: writer_guard,
            working,
        }))
    }

    async fn get_style(&self, style: &str) -> EngineResult<Option<Style>> {
        Ok(self.state.read().await.styles.get(style).cloned())
    }

    async fn list_styles(&self) -> EngineResult<Vec<Style>> {
        Ok(self.state.read().await.styles.values().cloned().collect())
    }

    async fn count_styles(&self) -> EngineResult<u64> {
        Ok(self.state.read().await.styles.len() as u64)
    }

    async fn get_store(&self, branch: &str) -> EngineResult<Option<Store>> {
        Ok(self.state.read().await.stores.get(branch).cloned())
    }

    async fn list_stores(&self) -> EngineResult<Vec<Store>> {
        Ok(self.state.read().await.stores.values().cloned().collect())
    }

    async fn count_stores(&self) -> EngineResult<u64> {
        Ok(self.state.read().await.stores.len() as u64)
    }

    async fn get_sku(&self, sku: &str) -> EngineResult<Option<Sku>> {
        Ok(self.state.read().await.skus.get(sku).cloned())
    }

    async fn list_skus(&self) -> EngineResult<Vec<Sku>> {
        Ok(self.state.read().await.skus.values().cloned().collect())
    }

    async fn count_skus(&self) -> EngineResult<u64> {
        Ok(self.state.read().await.skus.len() as u64)
    }

    async fn sales_in_window(&self, window: DateWindow) -> EngineResult<Vec<Sales>> {
        let guard = self.state.read().await;
        Ok(guard
            .sales
            .iter()
            .filter(|s| {
                window.start.is_none_or(|start| s.day >= start)
                    && window.end.is_none_or(|end| s.day <= end)
            })
            .cloned()
            .collect())
    }

    async fn count_sales(&self) -> EngineResult<u64> {
        Ok(self.state.read().await.sales.len() as u64)
    }

    async fn create_task(&self, mut task: Task) -> EngineResult<Task> {
        let mut guard = self.state.write().await;
        guard.next_task_id += 1;
        task.id = guard.next_task_id;
        guard.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: i64) -> EngineResult<Option<Task>> {
        Ok(self.state.read().await.tasks.get(&id).cloned())
    }

    async fn update_task(&self, task: Task) -> EngineResult<()> {
        let mut guard = self.state.write().await;
        guard.tasks.insert(task.id, task);
        Ok(())
    }

    async fn request_cancel(&self, id: i64) -> EngineResult<bool> {
        let mut guard = self.state.write().await;
        match guard.tasks.get_mut(&id) {
            Some(task) => {
                if !task.status.is_terminal() {
                    task.cancellation_requested = true;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_tasks(&self, filter: TaskFilter) -> EngineResult<Vec<Task>> {
        let guard = self.state.read().await;
        let mut tasks: Vec<Task> = guard
            .tasks
            .values()
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| filter.category.is_none_or(|c| t.task_type.category() == c))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_date.cmp(&a.created_date));
        Ok(tasks)
    }

    async fn count_tasks(&self, filter: TaskFilter) -> EngineResult<u64> {
        Ok(self.list_tasks(filter).await?.len() as u64)
    }

    async fn task_type_stats(&self, since: DateTime<Utc>) -> EngineResult<Vec<TaskTypeStats>> {
        let guard = self.state.read().await;
        let mut by_type: HashMap<TaskType, TaskTypeStats> = HashMap::new();
        for task in guard.tasks.values().filter(|t| t.created_date >= since) {
            let entry = by_type.entry(task.task_type).or_insert_with(|| TaskTypeStats {
                task_type: Some(task.task_type),
                ..Default::default()
            });
            entry.total += 1;
            match task.status {
                TaskStatus::Completed => entry.successful += 1,
                TaskStatus::Failed | TaskStatus::Cancelled => entry.failed += 1,
                _ => {}
            }
            if let (Some(start), Some(end)) = (task.start_time, task.end_time) {
                let secs = (end - start).num_milliseconds().max(0) as f64 / 1000.0;
                let n = entry.total as f64;
                entry.avg_execution_secs += (secs - entry.avg_execution_secs) / n;
            }
        }
        Ok(by_type.into_values().collect())
    }

    async fn list_orphaned_tasks(&self) -> EngineResult<Vec<Task>> {
        let guard = self.state.read().await;
        Ok(guard
            .tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Running))
            .cloned()
            .collect())
    }

    async fn get_active_parameters(&self) -> EngineResult<Option<AlgorithmParameters>> {
        Ok(self
            .state
            .read()
            .await
            .parameters
            .values()
            .find(|p| p.is_active)
            .cloned())
    }

    async fn get_parameters_by_name(&self, name: &str) -> EngineResult<Option<AlgorithmParameters>> {
        Ok(self.state.read().await.parameters.get(name).cloned())
    }

    async fn list_recent_parameters(&self, limit: u32) -> EngineResult<Vec<AlgorithmParameters>> {
        let guard = self.state.read().await;
        let mut all: Vec<AlgorithmParameters> = guard.parameters.values().cloned().collect();
        all.sort_by(|a, b| {
            b.is_active
                .cmp(&a.is_active)
                .then_with(|| b.last_updated.cmp(&a.last_updated))
        });
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn parameter_name_exists(&self, name: &str) -> EngineResult<bool> {
        Ok(self.state.read().await.parameters.contains_key(name))
    }

    async fn update_parameters(&self, params: AlgorithmParameters) -> EngineResult<()> {
        let mut guard = self.state.write().await;
        guard.parameters.insert(params.name.clone(), params);
        Ok(())
    }

    async fn clear_all(&self) -> EngineResult<ClearAllCounts> {
        let mut guard = self.state.write().await;
        let counts = ClearAllCounts {
            sales: guard.sales.len() as u64,
            skus: guard.skus.len() as u64,
            stores: guard.stores.len() as u64,
            styles: guard.styles.len() as u64,
            noos_results: guard.noos_results.values().map(Vec::len).sum::<usize>() as u64,
            tasks: guard.tasks.len() as u64,
        };
        guard.sales.clear();
        guard.skus.clear();
        guard.stores.clear();
        guard.styles.clear();
        guard.noos_results.clear();
        guard.tasks.clear();
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::TaskType;

    #[tokio::test]
    async fn transaction_rollback_leaves_prior_state() {
        let storage = MemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        tx.insert_stores(vec![Store {
            branch: "B1".into(),
            city: "Pune".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }])
        .await
        .unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(storage.count_stores().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn transaction_commit_persists() {
        let storage = MemoryStorage::new();
        let mut tx = storage.begin().await.unwrap();
        tx.insert_stores(vec![Store {
            branch: "B1".into(),
            city: "Pune".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }])
        .await
        .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(storage.count_stores().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn create_task_assigns_monotonic_ids() {
        let storage = MemoryStorage::new();
        let t1 = storage
            .create_task(Task::new_pending(0, TaskType::UploadStyles, None))
            .await
            .unwrap();
        let t2 = storage
            .create_task(Task::new_pending(0, TaskType::UploadStores, None))
            .await
            .unwrap();
        assert_eq!(t1.id, 1);
        assert_eq!(t2.id, 2);
    }

    #[tokio::test]
    async fn cancel_request_is_idempotent_and_ignored_when_terminal() {
        let storage = MemoryStorage::new();
        let task = storage
            .create_task(Task::new_pending(0, TaskType::UploadStyles, None))
            .await
            .unwrap();
        assert!(storage.request_cancel(task.id).await.unwrap());
        assert!(storage.request_cancel(task.id).await.unwrap());
        let mut completed = storage.get_task(task.id).await.unwrap().unwrap();
        completed.status = TaskStatus::Completed;
        completed.cancellation_requested = false;
        storage.update_task(completed).await.unwrap();
        storage.request_cancel(task.id).await.unwrap();
        let reloaded = storage.get_task(task.id).await.unwrap().unwrap();
        assert!(!reloaded.cancellation_requested);
    }
}
