//! Reports & Metrics (§6): dashboard tiles plus the two analytics report
//! endpoints. Thin read-only aggregate queries over Storage and the Task
//! log, grounded on the teacher's simple aggregate-query style in
//! `implementations/postgres/tasks/list_tasks.rs` (fetch, fold in Rust
//! rather than push every aggregation into SQL).

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::entities::{TaskCategory, TaskStatus, TaskType};
use crate::error::EngineResult;
use crate::service::storage::{Storage, TaskFilter};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardTiles {
    pub total_sales_records: u64,
    pub sales_data_status: &'static str,
    pub total_skus: u64,
    pub total_stores: u64,
    pub total_styles: u64,
    pub master_data_status: &'static str,
    pub recent_uploads: u64,
    pub upload_success_rate: f64,
    pub recent_activity_status: &'static str,
    pub active_tasks: u64,
    pub pending_tasks: u64,
    pub processing_status: &'static str,
}

fn sales_data_status(total: u64) -> &'static str {
    match total {
        0 => "No data available",
        1..=999 => "Limited data",
        1_000..=99_999 => "Good data volume",
        _ => "Rich data",
    }
}

fn master_data_status(styles: u64, stores: u64, skus: u64) -> &'static str {
    if styles == 0 && stores == 0 && skus == 0 {
        "Setup required"
    } else if styles > 0 && stores > 0 && skus > 0 {
        "Complete setup"
    } else {
        "Partial setup"
    }
}

fn processing_status(running: u64, pending: u64) -> &'static str {
    if running > 0 {
        "Running"
    } else if pending > 0 {
        "Backlog"
    } else {
        "System idle"
    }
}

/// Builds the `/api/updates` dashboard tile payload from current Storage and
/// Task-table state (§6 "Dashboard tiles").
pub async fn dashboard_tiles(storage: &dyn Storage) -> EngineResult<DashboardTiles> {
    let total_sales_records = storage.count_sales().await?;
    let total_skus = storage.count_skus().await?;
    let total_stores = storage.count_stores().await?;
    let total_styles = storage.count_styles().await?;

    let since = Utc::now() - Duration::days(7);
    let recent = storage
        .list_tasks(TaskFilter {
            status: None,
            category: Some(TaskCategory::Upload),
        })
        .await?
        .into_iter()
        .filter(|t| t.created_date >= since)
        .collect::<Vec<_>>();
    let recent_uploads = recent.len() as u64;
    let successful = recent.iter().filter(|t| t.status == TaskStatus::Completed).count() as u64;
    let upload_success_rate = if recent_uploads == 0 {
        1.0
    } else {
        successful as f64 / recent_uploads as f64
    };
    let recent_activity_status = if recent_uploads == 0 {
        "No recent activity"
    } else if upload_success_rate >= 0.95 {
        "Healthy"
    } else {
        "Degraded"
    };

    let active_tasks = storage
        .count_tasks(TaskFilter { status: Some(TaskStatus::Running), category: None })
        .await?;
    let pending_tasks = storage
        .count_tasks(TaskFilter { status: Some(TaskStatus::Pending), category: None })
        .await?;

    Ok(DashboardTiles {
        total_sales_records,
        sales_data_status: sales_data_status(total_sales_records),
        total_skus,
        total_stores,
        total_styles,
        master_data_status: master_data_status(total_styles, total_stores, total_skus),
        recent_uploads,
        upload_success_rate,
        recent_activity_status,
        active_tasks,
        pending_tasks,
        processing_status: processing_status(active_tasks, pending_tasks),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoosAnalyticsEntry {
    pub execution_date: DateTime<Utc>,
    pub algorithm_label: String,
    pub execution_status: TaskStatus,
    pub total_styles_processed: u64,
    pub core_styles: u64,
    pub bestseller_styles: u64,
    pub fashion_styles: u64,
    pub execution_time_minutes: f64,
    pub parameters: Option<serde_json::Value>,
}

/// `report1`: one row per `RunNoos` task, newest first (§6 "NOOS analytics").
/// Counts come straight from the summary JSON the algorithm wrote to
/// `Task.parameters` on completion (§4.3 Stage 7), so this report never
/// re-derives them from `NoosResult` rows.
pub async fn report1(storage: &dyn Storage) -> EngineResult<Vec<NoosAnalyticsEntry>> {
    let tasks = storage
        .list_tasks(TaskFilter { status: None, category: Some(TaskCategory::Compute) })
        .await?;

    let mut entries = Vec::new();
    for task in tasks {
        if task.task_type != TaskType::RunNoos {
            continue;
        }
        let summary = task.parameters.clone().unwrap_or(serde_json::Value::Null);
        let get_u64 = |key: &str| summary.get(key).and_then(serde_json::Value::as_u64).unwrap_or(0);
        let minutes = match (task.start_time, task.end_time) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 60_000.0,
            _ => 0.0,
        };
        entries.push(NoosAnalyticsEntry {
            execution_date: task.created_date,
            algorithm_label: format!("noos-run-{}", task.id),
            execution_status: task.status,
            total_styles_processed: get_u64("totalStylesProcessed"),
            core_styles: get_u64("coreStyles"),
            bestseller_styles: get_u64("bestsellerStyles"),
            fashion_styles: get_u64("fashionStyles"),
            execution_time_minutes: minutes,
            parameters: task.parameters,
        });
    }
    entries.sort_by(|a, b| b.execution_date.cmp(&a.execution_date));
    Ok(entries)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealthEntry {
    pub date: DateTime<Utc>,
    pub task_type: String,
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub success_rate: f64,
    pub average_execution_time: f64,
    pub system_status: &'static str,
}

fn system_status(success_rate: f64) -> &'static str {
    if success_rate >= 0.95 {
        "Healthy"
    } else if success_rate >= 0.75 {
        "Degraded"
    } else {
        "Unhealthy"
    }
}

/// `report2`: per-`taskType` health over the trailing 30 days (§6 "System
/// health").
pub async fn report2(storage: &dyn Storage) -> EngineResult<Vec<SystemHealthEntry>> {
    let since = Utc::now() - Duration::days(30);
    let stats = storage.task_type_stats(since).await?;
    Ok(stats
        .into_iter()
        .filter_map(|s| {
            let task_type = s.task_type?;
            let success_rate = if s.total == 0 { 0.0 } else { s.successful as f64 / s.total as f64 };
            Some(SystemHealthEntry {
                date: since,
                task_type: task_type.to_string(),
                total_tasks: s.total,
                successful_tasks: s.successful,
                failed_tasks: s.failed,
                success_rate,
                average_execution_time: s.avg_execution_secs,
                system_status: system_status(success_rate),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Store, Task, TaskType};
    use crate::service::storage::memory::MemoryStorage;

    #[tokio::test]
    async fn empty_system_reports_no_data_and_idle() {
        let storage = MemoryStorage::new();
        let tiles = dashboard_tiles(&storage).await.unwrap();
        assert_eq!(tiles.sales_data_status, "No data available");
        assert_eq!(tiles.master_data_status, "Setup required");
        assert_eq!(tiles.processing_status, "System idle");
    }

    #[tokio::test]
    async fn partial_master_data_is_reported_as_partial_setup() {
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
        let tiles = dashboard_tiles(&storage).await.unwrap();
        assert_eq!(tiles.master_data_status, "Partial setup");
    }

    #[tokio::test]
    async fn report1_only_includes_run_noos_tasks() {
        let storage = MemoryStorage::new();
        storage
            .create_task(Task::new_pending(0, TaskType::UploadStyles, None))
            .await
            .unwrap();
        let mut noos_task = Task::new_pending(0, TaskType::RunNoos, None);
        noos_task.parameters = Some(serde_json::json!({"totalStylesProcessed": 3, "coreStyles": 1}));
        storage.create_task(noos_task).await.unwrap();
        let entries = report1(&storage).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].total_styles_processed, 3);
        assert_eq!(entries[0].core_styles, 1);
    }
}
