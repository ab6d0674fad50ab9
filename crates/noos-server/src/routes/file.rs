//! `/api/file/upload/{kind}/async`, `/api/file/status`, and
//! `/api/file/download/{kind}/async` (§6). Uploads are staged to disk
//! before submission — `TaskHandler`s read the staged path themselves
//! (§4.1.1 "Handlers suspend at I/O boundaries").

use std::collections::HashMap;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use noos_engine::service::storage::{Storage, TaskFilter};
use noos_engine::service::EngineState;
use noos_engine::{EngineError, Task, TaskCategory, TaskStatus, TaskType};
use serde::Serialize;

use crate::error_response::ApiError;

fn upload_task_type(kind: &str) -> Result<TaskType, ApiError> {
    match kind {
        "styles" => Ok(TaskType::UploadStyles),
        "stores" => Ok(TaskType::UploadStores),
        "skus" => Ok(TaskType::UploadSkus),
        "sales" => Ok(TaskType::UploadSales),
        other => Err(EngineError::validation(format!("unknown upload kind '{other}'")).into()),
    }
}

fn download_task_type(kind: &str) -> Result<TaskType, ApiError> {
    match kind {
        "styles" => Ok(TaskType::DownloadStyles),
        "stores" => Ok(TaskType::DownloadStores),
        "skus" => Ok(TaskType::DownloadSkus),
        "sales" => Ok(TaskType::DownloadSales),
        other => Err(EngineError::validation(format!("unknown download kind '{other}'")).into()),
    }
}

pub(crate) async fn upload<S: Storage>(
    State(state): State<EngineState<S>>,
    Path(kind): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Task>, ApiError> {
    let task_type = upload_task_type(&kind)?;

    let mut file_name = None;
    let mut data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| EngineError::validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(str::to_string);
            data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| EngineError::validation(format!("failed to read upload body: {e}")))?,
            );
        }
    }
    let data = data.ok_or_else(|| EngineError::validation("multipart body is missing a 'file' field"))?;

    let staging_dir = std::path::Path::new(&state.config.ingestion.artifact_dir).join("uploads");
    tokio::fs::create_dir_all(&staging_dir)
        .await
        .map_err(|e| EngineError::internal("failed to create staging directory").with_detail(e.to_string()))?;
    let staging_path = staging_dir.join(format!("{:016x}.tsv", fastrand::u64(..)));
    tokio::fs::write(&staging_path, &data)
        .await
        .map_err(|e| EngineError::internal("failed to stage upload").with_detail(e.to_string()))?;

    let parameters = serde_json::json!({ "stagingPath": staging_path.display().to_string() });
    let task = state.tasks.submit(task_type, file_name, Some(parameters)).await?;
    Ok(Json(task))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileStatus {
    exists: bool,
    count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    processing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress_percentage: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_files: Option<Vec<String>>,
}

/// Most recently created upload task of `task_type`, used to surface the
/// in-flight/failed state of a file kind (§6 "GET /api/file/status").
fn latest_upload(tasks: &[Task], task_type: TaskType) -> Option<&Task> {
    tasks
        .iter()
        .filter(|t| t.task_type == task_type)
        .max_by_key(|t| t.created_date)
}

fn error_files_for(task: &Task) -> Option<Vec<String>> {
    let artifacts = task.parameters.as_ref()?.get("artifacts")?;
    let files = ["validationErrors", "skippedRows", "allFailedWithErrors", "errorSummary"]
        .iter()
        .filter_map(|key| artifacts.get(key).and_then(serde_json::Value::as_str).map(str::to_string))
        .collect::<Vec<_>>();
    if files.is_empty() {
        None
    } else {
        Some(files)
    }
}

/// `GET /api/file/status` (§6): one entry per file kind describing whether
/// data exists, how much, and the in-flight/failed state of its most recent
/// upload.
pub(crate) async fn status<S: Storage>(
    State(state): State<EngineState<S>>,
) -> Result<Json<HashMap<&'static str, FileStatus>>, ApiError> {
    let uploads = state
        .storage
        .list_tasks(TaskFilter { status: None, category: Some(TaskCategory::Upload) })
        .await?;

    let kinds: [(&'static str, TaskType, u64); 4] = [
        ("styles", TaskType::UploadStyles, state.storage.count_styles().await?),
        ("stores", TaskType::UploadStores, state.storage.count_stores().await?),
        ("skus", TaskType::UploadSkus, state.storage.count_skus().await?),
        ("sales", TaskType::UploadSales, state.storage.count_sales().await?),
    ];

    let mut out = HashMap::new();
    for (name, task_type, count) in kinds {
        let latest = latest_upload(&uploads, task_type);
        let entry = FileStatus {
            exists: count > 0,
            count,
            processing: latest.map(|t| t.status == TaskStatus::Running),
            failed: latest.map(|t| t.status == TaskStatus::Failed),
            progress_percentage: latest.map(|t| t.progress_percentage),
            progress_message: latest.and_then(|t| t.progress_message.clone()),
            error_files: latest.and_then(error_files_for),
        };
        out.insert(name, entry);
    }
    Ok(Json(out))
}

pub(crate) async fn download<S: Storage>(
    State(state): State<EngineState<S>>,
    Path(kind): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task_type = download_task_type(&kind)?;
    let task = state.tasks.submit(task_type, None, None).await?;
    Ok(Json(task))
}
