//! PostgreSQL backend (`sqlx-postgres` feature, default), grounded on
//! `implementations/postgres/*` — one module per entity family in the
//! teacher, collapsed here into a single `mod.rs` + `transaction.rs` pair
//! given the smaller entity set. Embedded migrations run via
//! `sqlx::migrate!`, matching the `migrate` CLI subcommand in
//! `lakekeeper-bin/src/main.rs`.

mod dbutils;
mod transaction;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::Row;
use std::str::FromStr;

use crate::entities::{
    AlgorithmParameters, Sales, Sku, Store, Style, Task, TaskStatus, TaskType,
};
use crate::error::{EngineError, EngineResult};

use self::dbutils::DBErrorHandler;
use self::transaction::PostgresTransaction;
use super::{ClearAllCounts, DateWindow, Storage, StorageTransaction, TaskFilter, TaskTypeStats};

#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn connect(database_url: &str, max_connections: u32) -> EngineResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| e.into_engine_error("failed to connect to postgres"))?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> EngineResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EngineError::internal("migration failed").with_detail(e.to_string()))
    }

    pub async fn wait_for_db(&self, attempts: u32) -> EngineResult<()> {
        for attempt in 0..attempts {
            if sqlx::query("SELECT 1").execute(&self.pool).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            tracing::warn!(attempt, "database not yet reachable, retrying");
        }
        Err(EngineError::internal("database did not become reachable"))
    }
}

fn task_type_to_str(t: TaskType) -> &'static str {
    match t {
        TaskType::UploadStyles => "upload_styles",
        TaskType::UploadStores => "upload_stores",
        TaskType::UploadSkus => "upload_skus",
        TaskType::UploadSales => "upload_sales",
        TaskType::DownloadStyles => "download_styles",
        TaskType::DownloadStores => "download_stores",
        TaskType::DownloadSkus => "download_skus",
        TaskType::DownloadSales => "download_sales",
        TaskType::RunNoos => "run_noos",
    }
}

fn task_status_to_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "PENDING",
        TaskStatus::Running => "RUNNING",
        TaskStatus::Completed => "COMPLETED",
        TaskStatus::Failed => "FAILED",
        TaskStatus::Cancelled => "CANCELLED",
    }
}

fn row_to_task(row: &sqlx::postgres::PgRow) -> EngineResult<Task> {
    let task_type: String = row.try_get("task_type").map_err(|e| e.into_engine_error("row decode"))?;
    let status: String = row.try_get("status").map_err(|e| e.into_engine_error("row decode"))?;
    Ok(Task {
        id: row.try_get("id").map_err(|e| e.into_engine_error("row decode"))?,
        task_type: TaskType::from_str(&task_type)
            .map_err(|_| EngineError::internal("unknown task_type in storage"))?,
        status: TaskStatus::from_str(&status)
            .map_err(|_| EngineError::internal("unknown status in storage"))?,
        file_name: row.try_get("file_name").map_err(|e| e.into_engine_error("row decode"))?,
        parameters: row.try_get("parameters").map_err(|e| e.into_engine_error("row decode"))?,
        progress_percentage: row
            .try_get::<i16, _>("progress_percentage")
            .map_err(|e| e.into_engine_error("row decode"))? as u8,
        progress_message: row
            .try_get("progress_message")
            .map_err(|e| e.into_engine_error("row decode"))?,
        cancellation_requested: row
            .try_get("cancellation_requested")
            .map_err(|e| e.into_engine_error("row decode"))?,
        error_message: row.try_get("error_message").map_err(|e| e.into_engine_error("row decode"))?,
        result_url: row.try_get("result_url").map_err(|e| e.into_engine_error("row decode"))?,
        created_date: row.try_get("created_date").map_err(|e| e.into_engine_error("row decode"))?,
        start_time: row.try_get("start_time").map_err(|e| e.into_engine_error("row decode"))?,
        end_time: row.try_get("end_time").map_err(|e| e.into_engine_error("row decode"))?,
    })
}

#[crate::async_trait::async_trait]
impl Storage for PostgresStorage {
    async fn begin(&self) -> EngineResult<Box<dyn StorageTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| e.into_engine_error("failed to start transaction"))?;
        Ok(Box::new(PostgresTransaction::new(tx)))
    }

    async fn get_style(&self, style: &str) -> EngineResult<Option<Style>> {
        sqlx::query_as!(
            Style,
            r#"SELECT style, brand, category, sub_category, mrp, gender, created_at, updated_at
               FROM styles WHERE style = $1"#,
            style
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("get_style"))
    }

    async fn list_styles(&self) -> EngineResult<Vec<Style>> {
        sqlx::query_as!(
            Style,
            r#"SELECT style, brand, category, sub_category, mrp, gender, created_at, updated_at
               FROM styles ORDER BY style"#
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("list_styles"))
    }

    async fn count_styles(&self) -> EngineResult<u64> {
        let row = sqlx::query!("SELECT COUNT(*) AS count FROM styles")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.into_engine_error("count_styles"))?;
        Ok(row.count.unwrap_or(0) as u64)
    }

    async fn get_store(&self, branch: &str) -> EngineResult<Option<Store>> {
        sqlx::query_as!(
            Store,
            r#"SELECT branch, city, created_at, updated_at FROM stores WHERE branch = $1"#,
            branch
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("get_store"))
    }

    async fn list_stores(&self) -> EngineResult<Vec<Store>> {
        sqlx::query_as!(Store, r#"SELECT branch, city, created_at, updated_at FROM stores ORDER BY branch"#)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.into_engine_error("list_stores"))
    }

    async fn count_stores(&self) -> EngineResult<u64> {
        let row = sqlx::query!("SELECT COUNT(*) AS count FROM stores")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.into_engine_error("count_stores"))?;
        Ok(row.count.unwrap_or(0) as u64)
    }

    async fn get_sku(&self, sku: &str) -> EngineResult<Option<Sku>> {
        sqlx::query_as!(
            Sku,
            r#"SELECT sku, style, size, created_at, updated_at FROM skus WHERE sku = $1"#,
            sku
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("get_sku"))
    }

    async fn list_skus(&self) -> EngineResult<Vec<Sku>> {
        sqlx::query_as!(Sku, r#"SELECT sku, style, size, created_at, updated_at FROM skus ORDER BY sku"#)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.into_engine_error("list_skus"))
    }

    async fn count_skus(&self) -> EngineResult<u64> {
        let row = sqlx::query!("SELECT COUNT(*) AS count FROM skus")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.into_engine_error("count_skus"))?;
        Ok(row.count.unwrap_or(0) as u64)
    }

    async fn sales_in_window(&self, window: DateWindow) -> EngineResult<Vec<Sales>> {
        sqlx::query_as!(
            Sales,
            r#"SELECT day, sku, channel, quantity, discount, revenue, created_at
               FROM sales
               WHERE ($1::date IS NULL OR day >= $1)
                 AND ($2::date IS NULL OR day <= $2)
               ORDER BY day, sku"#,
            window.start,
            window.end
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("sales_in_window"))
    }

    async fn count_sales(&self) -> EngineResult<u64> {
        let row = sqlx::query!("SELECT COUNT(*) AS count FROM sales")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.into_engine_error("count_sales"))?;
        Ok(row.count.unwrap_or(0) as u64)
    }

    async fn create_task(&self, task: Task) -> EngineResult<Task> {
        let row = sqlx::query(
            r#"INSERT INTO tasks (task_type, status, file_name, parameters, created_date)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, task_type, status, file_name, parameters, progress_percentage,
                         progress_message, cancellation_requested, error_message, result_url,
                         created_date, start_time, end_time"#,
        )
        .bind(task_type_to_str(task.task_type))
        .bind(task_status_to_str(task.status))
        .bind(&task.file_name)
        .bind(&task.parameters)
        .bind(task.created_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("create_task"))?;
        row_to_task(&row)
    }

    async fn get_task(&self, id: i64) -> EngineResult<Option<Task>> {
        let row = sqlx::query(
            r#"SELECT id, task_type, status, file_name, parameters, progress_percentage,
                      progress_message, cancellation_requested, error_message, result_url,
                      created_date, start_time, end_time
               FROM tasks WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("get_task"))?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn update_task(&self, task: Task) -> EngineResult<()> {
        sqlx::query(
            r#"UPDATE tasks SET
                 status = $2, progress_percentage = $3, progress_message = $4,
                 cancellation_requested = $5, error_message = $6, result_url = $7,
                 parameters = $8, start_time = $9, end_time = $10
               WHERE id = $1"#,
        )
        .bind(task.id)
        .bind(task_status_to_str(task.status))
        .bind(i16::from(task.progress_percentage))
        .bind(&task.progress_message)
        .bind(task.cancellation_requested)
        .bind(&task.error_message)
        .bind(&task.result_url)
        .bind(&task.parameters)
        .bind(task.start_time)
        .bind(task.end_time)
        .execute(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("update_task"))?;
        Ok(())
    }

    async fn request_cancel(&self, id: i64) -> EngineResult<bool> {
        let result = sqlx::query(
            r#"UPDATE tasks SET cancellation_requested = TRUE
               WHERE id = $1 AND status IN ('PENDING', 'RUNNING')"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("request_cancel"))?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        let exists = sqlx::query("SELECT 1 FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.into_engine_error("request_cancel exists check"))?;
        Ok(exists.is_some())
    }

    async fn list_tasks(&self, filter: TaskFilter) -> EngineResult<Vec<Task>> {
        let status = filter.status.map(task_status_to_str);
        let categories: Option<Vec<&'static str>> = filter.category.map(|c| {
            TaskType::all_in_category(c)
                .into_iter()
                .map(task_type_to_str)
                .collect()
        });
        let rows = sqlx::query(
            r#"SELECT id, task_type, status, file_name, parameters, progress_percentage,
                      progress_message, cancellation_requested, error_message, result_url,
                      created_date, start_time, end_time
               FROM tasks
               WHERE ($1::text IS NULL OR status = $1)
                 AND ($2::text[] IS NULL OR task_type = ANY($2))
               ORDER BY created_date DESC"#,
        )
        .bind(status)
        .bind(categories)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("list_tasks"))?;
        rows.iter().map(row_to_task).collect()
    }

    async fn count_tasks(&self, filter: TaskFilter) -> EngineResult<u64> {
        Ok(self.list_tasks(filter).await?.len() as u64)
    }

    async fn task_type_stats(&self, since: DateTime<Utc>) -> EngineResult<Vec<TaskTypeStats>> {
        let rows = sqlx::query(
            r#"SELECT task_type,
                      COUNT(*) AS total,
                      COUNT(*) FILTER (WHERE status = 'COMPLETED') AS successful,
                      COUNT(*) FILTER (WHERE status IN ('FAILED', 'CANCELLED')) AS failed,
                      AVG(EXTRACT(EPOCH FROM (end_time - start_time)))
                          FILTER (WHERE start_time IS NOT NULL AND end_time IS NOT NULL) AS avg_secs
               FROM tasks
               WHERE created_date >= $1
               GROUP BY task_type"#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("task_type_stats"))?;
        rows.into_iter()
            .map(|row| -> EngineResult<TaskTypeStats> {
                let task_type: String = row.try_get("task_type").map_err(|e| e.into_engine_error("row decode"))?;
                Ok(TaskTypeStats {
                    task_type: TaskType::from_str(&task_type).ok(),
                    total: row.try_get::<i64, _>("total").map_err(|e| e.into_engine_error("row decode"))? as u64,
                    successful: row
                        .try_get::<i64, _>("successful")
                        .map_err(|e| e.into_engine_error("row decode"))? as u64,
                    failed: row.try_get::<i64, _>("failed").map_err(|e| e.into_engine_error("row decode"))? as u64,
                    avg_execution_secs: row
                        .try_get::<Option<f64>, _>("avg_secs")
                        .map_err(|e| e.into_engine_error("row decode"))?
                        .unwrap_or(0.0),
                })
            })
            .collect()
    }

    async fn list_orphaned_tasks(&self) -> EngineResult<Vec<Task>> {
        let rows = sqlx::query(
            r#"SELECT id, task_type, status, file_name, parameters, progress_percentage,
                      progress_message, cancellation_requested, error_message, result_url,
                      created_date, start_time, end_time
               FROM tasks WHERE status IN ('PENDING', 'RUNNING')"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("list_orphaned_tasks"))?;
        rows.iter().map(row_to_task).collect()
    }

    async fn get_active_parameters(&self) -> EngineResult<Option<AlgorithmParameters>> {
        sqlx::query_as!(
            AlgorithmParameters,
            r#"SELECT name, is_active, liquidation_threshold, bestseller_multiplier,
                      min_volume_threshold, consistency_threshold, core_duration_months,
                      bestseller_duration_days, analysis_start_date, analysis_end_date,
                      last_updated
               FROM algorithm_parameters WHERE is_active"#
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("get_active_parameters"))
    }

    async fn get_parameters_by_name(&self, name: &str) -> EngineResult<Option<AlgorithmParameters>> {
        sqlx::query_as!(
            AlgorithmParameters,
            r#"SELECT name, is_active, liquidation_threshold, bestseller_multiplier,
                      min_volume_threshold, consistency_threshold, core_duration_months,
                      bestseller_duration_days, analysis_start_date, analysis_end_date,
                      last_updated
               FROM algorithm_parameters WHERE name = $1"#,
            name
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("get_parameters_by_name"))
    }

    async fn list_recent_parameters(&self, limit: u32) -> EngineResult<Vec<AlgorithmParameters>> {
        sqlx::query_as!(
            AlgorithmParameters,
            r#"SELECT name, is_active, liquidation_threshold, bestseller_multiplier,
                      min_volume_threshold, consistency_threshold, core_duration_months,
                      bestseller_duration_days, analysis_start_date, analysis_end_date,
                      last_updated
               FROM algorithm_parameters
               ORDER BY is_active DESC, last_updated DESC
               LIMIT $1"#,
            i64::from(limit)
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("list_recent_parameters"))
    }

    async fn parameter_name_exists(&self, name: &str) -> EngineResult<bool> {
        let row = sqlx::query!("SELECT 1 AS one FROM algorithm_parameters WHERE name = $1", name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.into_engine_error("parameter_name_exists"))?;
        Ok(row.is_some())
    }

    async fn update_parameters(&self, params: AlgorithmParameters) -> EngineResult<()> {
        sqlx::query!(
            r#"UPDATE algorithm_parameters SET
                 liquidation_threshold = $2, bestseller_multiplier = $3,
                 min_volume_threshold = $4, consistency_threshold = $5,
                 core_duration_months = $6, bestseller_duration_days = $7,
                 analysis_start_date = $8, analysis_end_date = $9,
                 last_updated = $10
               WHERE name = $1"#,
            params.name,
            params.liquidation_threshold,
            params.bestseller_multiplier,
            params.min_volume_threshold,
            params.consistency_threshold,
            params.core_duration_months,
            params.bestseller_duration_days,
            params.analysis_start_date,
            params.analysis_end_date,
            params.last_updated,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| e.into_engine_error("update_parameters"))?;
        Ok(())
    }

    async fn clear_all(&self) -> EngineResult<ClearAllCounts> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| e.into_engine_error("clear_all begin"))?;
        let counts = sqlx::query!(
            r#"SELECT
                 (SELECT COUNT(*) FROM sales) AS sales,
                 (SELECT COUNT(*) FROM skus) AS skus,
                 (SELECT COUNT(*) FROM stores) AS stores,
                 (SELECT COUNT(*) FROM styles) AS styles,
                 (SELECT COUNT(*) FROM noos_results) AS noos_results,
                 (SELECT COUNT(*) FROM tasks) AS tasks"#
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.into_engine_error("clear_all counts"))?;
        for stmt in [
            "DELETE FROM noos_results",
            "DELETE FROM sales",
            "DELETE FROM skus",
            "DELETE FROM styles",
            "DELETE FROM stores",
            "DELETE FROM tasks",
        ] {
            sqlx::query(stmt)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.into_engine_error("clear_all delete"))?;
        }
        tx.commit().await.map_err(|e| e.into_engine_error("clear_all commit"))?;
        Ok(ClearAllCounts {
            sales: counts.sales.unwrap_or(0) as u64,
            skus: counts.skus.unwrap_or(0) as u64,
            stores: counts.stores.unwrap_or(0) as u64,
            styles: counts.styles.unwrap_or(0) as u64,
            noos_results: counts.noos_results.unwrap_or(0) as u64,
            tasks: counts.tasks.unwrap_or(0) as u64,
        })
    }
}

impl TaskType {
    fn all_in_category(category: crate::entities::TaskCategory) -> Vec<TaskType> {
        use crate::entities::TaskCategory as C;
        [
            TaskType::UploadStyles,
            TaskType::UploadStores,
            TaskType::UploadSkus,
            TaskType::UploadSales,
            TaskType::DownloadStyles,
            TaskType::DownloadStores,
            TaskType::DownloadSkus,
            TaskType::DownloadSales,
            TaskType::RunNoos,
        ]
        .into_iter()
        .filter(|t| match category {
            C::Upload => matches!(
                t,
                TaskType::UploadStyles | TaskType::UploadStores | TaskType::UploadSkus | TaskType::UploadSales
            ),
            C::Download => matches!(
                t,
                TaskType::DownloadStyles
                    | TaskType::DownloadStores
                    | TaskType::DownloadSkus
                    | TaskType::DownloadSales
            ),
            C::Compute => matches!(t, TaskType::RunNoos),
        })
        .collect()
    }
}
