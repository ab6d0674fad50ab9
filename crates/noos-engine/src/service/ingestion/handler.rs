//! Wires the ingestion pipeline and TSV export onto the Task Engine
//! (§4.1.1 "Handlers suspend at I/O boundaries"). The wire layer stages an
//! uploaded file to disk and hands the handler its path via
//! `Task.parameters.stagingPath`; the handler itself owns the
//! read-file/parse/persist/cleanup sequence.

use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::service::storage::Storage;
use crate::service::tasks::{TaskContext, TaskHandler};

use super::pipeline::{self, IngestKind};

fn task_dir(artifact_root: &str, task_id: i64) -> PathBuf {
    Path::new(artifact_root).join(task_id.to_string())
}

/// `UPLOAD_*` task types (§4.2). One instance per `IngestKind`, registered
/// against its matching `TaskType` during server wiring.
pub struct IngestUploadHandler {
    kind: IngestKind,
}

impl IngestUploadHandler {
    #[must_use]
    pub fn new(kind: IngestKind) -> Self {
        Self { kind }
    }
}

#[crate::async_trait::async_trait]
impl<S: Storage> TaskHandler<S> for IngestUploadHandler {
    async fn run(&self, ctx: TaskContext<S>) -> EngineResult<serde_json::Value> {
        let task = ctx
            .storage
            .get_task(ctx.task_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("task {}", ctx.task_id)))?;

        let staging_path = task
            .parameters
            .as_ref()
            .and_then(|p| p.get("stagingPath"))
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| EngineError::internal("upload task is missing its staged file path"))?
            .to_string();

        let data = tokio::fs::read(&staging_path)
            .await
            .map_err(|e| EngineError::internal("failed to read staged upload").with_detail(e.to_string()))?;

        let artifact_dir = Path::new(&ctx.config.ingestion.artifact_dir).to_path_buf();
        let outcome = pipeline::ingest(
            ctx.storage.as_ref(),
            &ctx.config.ingestion,
            ctx.progress.as_ref(),
            &ctx.cancellation,
            self.kind,
            &data,
            ctx.task_id,
            &artifact_dir,
        )
        .await?;

        let _ = tokio::fs::remove_file(&staging_path).await;

        let artifact_paths = outcome.artifacts.as_ref().map(|a| {
            serde_json::json!({
                "validationErrors": a.validation_errors.as_ref().map(|p| p.display().to_string()),
                "skippedRows": a.skipped_rows.as_ref().map(|p| p.display().to_string()),
                "allFailedWithErrors": a.all_failed_with_errors.as_ref().map(|p| p.display().to_string()),
                "errorSummary": a.error_summary.as_ref().map(|p| p.display().to_string()),
            })
        });

        let summary = serde_json::json!({
            "success": outcome.success,
            "recordCount": outcome.record_count,
            "errorCount": outcome.error_count,
            "skippedCount": outcome.skipped_count,
            "messages": outcome.messages,
            "warnings": outcome.warnings,
            "errors": outcome.errors,
            "artifacts": artifact_paths,
        });

        if !outcome.success {
            if let Some(artifacts) = &outcome.artifacts {
                if let Some(path) = &artifacts.all_failed_with_errors {
                    let mut task = task;
                    task.result_url = Some(path.display().to_string());
                    ctx.storage.update_task(task).await?;
                }
            }
            return Err(EngineError::validation(format!(
                "{} ingest rejected: {} row error(s)",
                self.kind.label(),
                outcome.error_count
            ))
            .with_detail(outcome.errors.first().cloned().unwrap_or_default()));
        }

        Ok(summary)
    }
}

fn render_tsv<T>(header: &[&str], rows: &[T], row: impl Fn(&T) -> Vec<String>) -> String {
    let mut out = header.join("\t");
    out.push('\n');
    for r in rows {
        out.push_str(&row(r).join("\t"));
        out.push('\n');
    }
    out
}

/// `DOWNLOAD_*` task types (§6): renders the current table contents back out
/// as TSV and points `Task.resultUrl` at the generated file.
pub struct DownloadHandler {
    kind: IngestKind,
}

impl DownloadHandler {
    #[must_use]
    pub fn new(kind: IngestKind) -> Self {
        Self { kind }
    }
}

#[crate::async_trait::async_trait]
impl<S: Storage> TaskHandler<S> for DownloadHandler {
    async fn run(&self, ctx: TaskContext<S>) -> EngineResult<serde_json::Value> {
        ctx.report(10, format!("loading {}", self.kind.label()));

        let (content, count) = match self.kind {
            IngestKind::Styles => {
                let rows = ctx.storage.list_styles().await?;
                let content = render_tsv(self.kind.header(), &rows, |s| {
                    vec![
                        s.style.clone(),
                        s.brand.clone(),
                        s.category.clone(),
                        s.sub_category.clone(),
                        s.mrp.to_string(),
                        s.gender.clone(),
                    ]
                });
                (content, rows.len())
            }
            IngestKind::Stores => {
                let rows = ctx.storage.list_stores().await?;
                let content = render_tsv(self.kind.header(), &rows, |s| vec![s.branch.clone(), s.city.clone()]);
                (content, rows.len())
            }
            IngestKind::Skus => {
                let rows = ctx.storage.list_skus().await?;
                let content = render_tsv(self.kind.header(), &rows, |s| {
                    vec![s.sku.clone(), s.style.clone(), s.size.clone()]
                });
                (content, rows.len())
            }
            IngestKind::Sales => {
                let rows = ctx
                    .storage
                    .sales_in_window(crate::service::storage::DateWindow::default())
                    .await?;
                let content = render_tsv(self.kind.header(), &rows, |s| {
                    vec![
                        s.day.to_string(),
                        s.sku.clone(),
                        s.channel.clone(),
                        s.quantity.to_string(),
                        s.discount.to_string(),
                        s.revenue.to_string(),
                    ]
                });
                (content, rows.len())
            }
        };

        if ctx.is_cancelled() {
            return Err(EngineError::cancelled("download cancelled"));
        }

        let dir = task_dir(&ctx.config.ingestion.artifact_dir, ctx.task_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| EngineError::internal("failed to create download directory").with_detail(e.to_string()))?;
        let path = dir.join(format!("{}.tsv", self.kind.label()));
        tokio::fs::write(&path, &content)
            .await
            .map_err(|e| EngineError::internal("failed to write download file").with_detail(e.to_string()))?;

        let mut task = ctx
            .storage
            .get_task(ctx.task_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("task {}", ctx.task_id)))?;
        task.result_url = Some(path.display().to_string());
        ctx.storage.update_task(task).await?;

        ctx.report(100, format!("{} rows exported", count));
        Ok(serde_json::json!({ "recordCount": count, "resultUrl": path.display().to_string() }))
    }
}
