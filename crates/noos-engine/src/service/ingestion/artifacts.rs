//! Error artifacts produced on failed ingestion (§6 "Error artifacts"):
//! `validation_errors.tsv`, `skipped_rows.tsv` (Sales only), plus a combined
//! `all_failed_with_errors.tsv` and a per-error-kind `error_summary.tsv`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};

/// One rejected or skipped row: its 1-indexed file line, the raw tab-joined
/// field values as read (empty if the row's field count didn't match the
/// header), and the reason string (`"<kind>:<field>"` or `"missing_sku"`).
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestionArtifacts {
    pub validation_errors: Option<PathBuf>,
    pub skipped_rows: Option<PathBuf>,
    pub all_failed_with_errors: Option<PathBuf>,
    pub error_summary: Option<PathBuf>,
}

fn error_kind(reason: &str) -> &str {
    reason.split(':').next().unwrap_or(reason)
}

fn render_rows(rows: &[RowError]) -> String {
    let mut out = String::from("line\trow\terror\n");
    for row in rows {
        out.push_str(&format!("{}\t{}\t{}\n", row.line, row.raw, row.reason));
    }
    out
}

fn render_summary(errors: &[RowError]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in errors {
        *counts.entry(error_kind(&row.reason)).or_insert(0) += 1;
    }
    let mut out = String::from("error_kind\tcount\n");
    for (kind, count) in counts {
        out.push_str(&format!("{kind}\t{count}\n"));
    }
    out
}

/// Writes the applicable artifacts under `dir/{task_id}/` and returns their
/// paths. `errors` are hard validation failures; `skipped` are Sales rows
/// skipped for an unknown SKU (§4.2 "partial-skip").
pub async fn write_artifacts(
    dir: &Path,
    task_id: i64,
    errors: &[RowError],
    skipped: &[RowError],
) -> EngineResult<IngestionArtifacts> {
    let task_dir = dir.join(task_id.to_string());
    tokio::fs::create_dir_all(&task_dir)
        .await
        .map_err(|e| EngineError::internal("failed to create artifact directory").with_detail(e.to_string()))?;

    let mut artifacts = IngestionArtifacts::default();

    if !errors.is_empty() {
        let path = task_dir.join("validation_errors.tsv");
        write_file(&path, &render_rows(errors)).await?;
        artifacts.validation_errors = Some(path);

        let summary_path = task_dir.join("error_summary.tsv");
        write_file(&summary_path, &render_summary(errors)).await?;
        artifacts.error_summary = Some(summary_path);
    }

    if !skipped.is_empty() {
        let path = task_dir.join("skipped_rows.tsv");
        write_file(&path, &render_rows(skipped)).await?;
        artifacts.skipped_rows = Some(path);
    }

    if !errors.is_empty() || !skipped.is_empty() {
        let mut all: Vec<RowError> = errors.to_vec();
        all.extend(skipped.to_vec());
        all.sort_by_key(|r| r.line);
        let path = task_dir.join("all_failed_with_errors.tsv");
        write_file(&path, &render_rows(&all)).await?;
        artifacts.all_failed_with_errors = Some(path);
    }

    Ok(artifacts)
}

async fn write_file(path: &Path, content: &str) -> EngineResult<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| EngineError::internal("failed to write artifact file").with_detail(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_groups_by_error_kind() {
        let errors = vec![
            RowError { line: 2, raw: "a".into(), reason: "empty:style".into() },
            RowError { line: 3, raw: "b".into(), reason: "empty:style".into() },
            RowError { line: 4, raw: "c".into(), reason: "number:mrp".into() },
        ];
        let summary = render_summary(&errors);
        assert!(summary.contains("empty\t2"));
        assert!(summary.contains("number\t1"));
    }
}
