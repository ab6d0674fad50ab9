//! Orchestrates one upload: TSV parse → per-row validation (+ in-batch
//! duplicate and foreign-key checks) → dependency-ordered clearing →
//! chunked transactional persistence (§4.2). One transaction covers the
//! whole batch; a rejected batch is rolled back in full (property 2).

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;

use crate::config::IngestionConfig;
use crate::entities::Sales;
use crate::error::{EngineError, EngineResult};
use crate::service::progress::ProgressSink;
use crate::service::storage::Storage;
use crate::CancellationToken;

use super::artifacts::{self, RowError};
use super::clearing;
use super::tsv::{self, ParsedRow};
use super::validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestKind {
    Styles,
    Stores,
    Skus,
    Sales,
}

impl IngestKind {
    pub fn header(self) -> &'static [&'static str] {
        match self {
            IngestKind::Styles => &["style", "brand", "category", "sub_category", "mrp", "gender"],
            IngestKind::Stores => &["branch", "city"],
            IngestKind::Skus => &["sku", "style", "size"],
            IngestKind::Sales => &["day", "sku", "channel", "quantity", "discount", "revenue"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IngestKind::Styles => "styles",
            IngestKind::Stores => "stores",
            IngestKind::Skus => "skus",
            IngestKind::Sales => "sales",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub success: bool,
    pub record_count: u64,
    pub error_count: u64,
    pub skipped_count: u64,
    pub messages: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub artifacts: Option<artifacts::IngestionArtifacts>,
}

fn raw_line(row: &ParsedRow, header: &[&str]) -> String {
    if row.fields.is_empty() {
        return String::new();
    }
    header
        .iter()
        .map(|h| row.fields.get(*h).cloned().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\t")
}

/// Runs the full ingest for one file. `data` is the raw TSV bytes; `task_id`
/// and `artifact_dir` address where failure artifacts land (§6).
pub async fn ingest(
    storage: &dyn Storage,
    config: &IngestionConfig,
    progress: &dyn ProgressSink,
    cancellation: &CancellationToken,
    kind: IngestKind,
    data: &[u8],
    task_id: i64,
    artifact_dir: &Path,
) -> EngineResult<IngestOutcome> {
    let header = kind.header();
    let rows = tsv::parse(header, data, config.max_rows_per_file)?;
    let total_rows = rows.len() as u64;
    progress.report(10, format!("parsed {total_rows} rows"));

    let mut tx = storage.begin().await?;

    let mut errors: Vec<RowError> = Vec::new();
    let mut skipped: Vec<RowError> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let now = Utc::now();

    let insert_count = match kind {
        IngestKind::Styles => {
            let mut seen = HashSet::new();
            let mut valid = Vec::new();
            for row in &rows {
                if row.fields.is_empty() {
                    errors.push(RowError { line: row.line, raw: String::new(), reason: "empty:row".into() });
                    continue;
                }
                match validate::validate_style(&row.fields, now) {
                    Ok(style) => {
                        if !seen.insert(style.style.clone()) {
                            errors.push(RowError {
                                line: row.line,
                                raw: raw_line(row, header),
                                reason: "duplicate:style".into(),
                            });
                        } else {
                            valid.push(style);
                        }
                    }
                    Err(reason) => errors.push(RowError { line: row.line, raw: raw_line(row, header), reason }),
                }
            }
            if !errors.is_empty() {
                rollback_with_artifacts(tx, artifact_dir, task_id, &errors, &skipped, total_rows).await?
            } else {
                let cleared = clearing::clear_for(IngestKind::Styles, tx.as_mut()).await?;
                warnings.push(format!(
                    "cleared {} sales, {} skus, {} styles",
                    cleared.sales, cleared.skus, cleared.styles
                ));
                let count = valid.len() as u64;
                persist_chunks(tx.as_mut(), valid, config.batch_chunk_size, progress, cancellation, |t, chunk| {
                    Box::pin(t.insert_styles(chunk))
                })
                .await?;
                tx.commit().await?;
                count
            }
        }
        IngestKind::Stores => {
            let mut seen = HashSet::new();
            let mut valid = Vec::new();
            for row in &rows {
                if row.fields.is_empty() {
                    errors.push(RowError { line: row.line, raw: String::new(), reason: "empty:row".into() });
                    continue;
                }
                match validate::validate_store(&row.fields, now) {
                    Ok(store) => {
                        if !seen.insert(store.branch.clone()) {
                            errors.push(RowError {
                                line: row.line,
                                raw: raw_line(row, header),
                                reason: "duplicate:branch".into(),
                            });
                        } else {
                            valid.push(store);
                        }
                    }
                    Err(reason) => errors.push(RowError { line: row.line, raw: raw_line(row, header), reason }),
                }
            }
            if !errors.is_empty() {
                rollback_with_artifacts(tx, artifact_dir, task_id, &errors, &skipped, total_rows).await?
            } else {
                let cleared = clearing::clear_for(IngestKind::Stores, tx.as_mut()).await?;
                warnings.push(format!("cleared {} sales, {} stores", cleared.sales, cleared.stores));
                let count = valid.len() as u64;
                persist_chunks(tx.as_mut(), valid, config.batch_chunk_size, progress, cancellation, |t, chunk| {
                    Box::pin(t.insert_stores(chunk))
                })
                .await?;
                tx.commit().await?;
                count
            }
        }
        IngestKind::Skus => {
            let mut seen = HashSet::new();
            let mut valid = Vec::new();
            for row in &rows {
                if row.fields.is_empty() {
                    errors.push(RowError { line: row.line, raw: String::new(), reason: "empty:row".into() });
                    continue;
                }
                match validate::validate_sku(&row.fields, now) {
                    Ok(sku) => {
                        if !seen.insert(sku.sku.clone()) {
                            errors.push(RowError {
                                line: row.line,
                                raw: raw_line(row, header),
                                reason: "duplicate:sku".into(),
                            });
                            continue;
                        }
                        if !tx.style_exists(&sku.style).await? {
                            errors.push(RowError {
                                line: row.line,
                                raw: raw_line(row, header),
                                reason: "dependency:style".into(),
                            });
                            continue;
                        }
                        valid.push(sku);
                    }
                    Err(reason) => errors.push(RowError { line: row.line, raw: raw_line(row, header), reason }),
                }
            }
            if !errors.is_empty() {
                rollback_with_artifacts(tx, artifact_dir, task_id, &errors, &skipped, total_rows).await?
            } else {
                let cleared = clearing::clear_for(IngestKind::Skus, tx.as_mut()).await?;
                warnings.push(format!("cleared {} sales, {} skus", cleared.sales, cleared.skus));
                let count = valid.len() as u64;
                persist_chunks(tx.as_mut(), valid, config.batch_chunk_size, progress, cancellation, |t, chunk| {
                    Box::pin(t.insert_skus(chunk))
                })
                .await?;
                tx.commit().await?;
                count
            }
        }
        IngestKind::Sales => {
            let mut seen = HashSet::new();
            let mut valid: Vec<Sales> = Vec::new();
            for row in &rows {
                if row.fields.is_empty() {
                    errors.push(RowError { line: row.line, raw: String::new(), reason: "empty:row".into() });
                    continue;
                }
                match validate::validate_sales(&row.fields) {
                    Ok(parsed) => {
                        let key = (parsed.day, parsed.sku.clone(), parsed.channel.clone());
                        if !seen.insert(key) {
                            errors.push(RowError {
                                line: row.line,
                                raw: raw_line(row, header),
                                reason: "duplicate:sales_key".into(),
                            });
                            continue;
                        }
                        // Unknown SKU is a skip, not a hard error (§4.2 "partial-skip for
                        // missing SKU only"); check it before the Store FK so a row with
                        // both an unknown SKU and an unknown Store is skipped, not rejected.
                        if !tx.sku_exists(&parsed.sku).await? {
                            skipped.push(RowError {
                                line: row.line,
                                raw: raw_line(row, header),
                                reason: "missing_sku".into(),
                            });
                            continue;
                        }
                        if !tx.store_exists(&parsed.channel).await? {
                            errors.push(RowError {
                                line: row.line,
                                raw: raw_line(row, header),
                                reason: "dependency:channel".into(),
                            });
                            continue;
                        }
                        valid.push(Sales {
                            day: parsed.day,
                            sku: parsed.sku,
                            channel: parsed.channel,
                            quantity: parsed.quantity,
                            discount: parsed.discount,
                            revenue: parsed.revenue,
                            created_at: now,
                        });
                    }
                    Err(reason) => errors.push(RowError { line: row.line, raw: raw_line(row, header), reason }),
                }
            }
            if !errors.is_empty() {
                rollback_with_artifacts(tx, artifact_dir, task_id, &errors, &skipped, total_rows).await?
            } else {
                let cleared = clearing::clear_for(IngestKind::Sales, tx.as_mut()).await?;
                warnings.push(format!("cleared {} sales", cleared.sales));
                if !skipped.is_empty() {
                    warnings.push(format!("skipped {} rows with unknown SKU", skipped.len()));
                }
                let count = valid.len() as u64;
                persist_chunks(tx.as_mut(), valid, config.batch_chunk_size, progress, cancellation, |t, chunk| {
                    Box::pin(t.insert_sales(chunk))
                })
                .await?;
                tx.commit().await?;
                count
            }
        }
    };

    if !errors.is_empty() {
        let written = artifacts::write_artifacts(artifact_dir, task_id, &errors, &skipped).await?;
        return Ok(IngestOutcome {
            success: false,
            record_count: 0,
            error_count: errors.len() as u64,
            skipped_count: skipped.len() as u64,
            messages: vec![format!("{} rejected: {} row error(s)", kind.label(), errors.len())],
            warnings,
            errors: errors.iter().map(|e| format!("Row {}: {}", e.line, e.reason)).collect(),
            artifacts: Some(written),
        });
    }

    progress.report(100, format!("{} ingest complete", kind.label()));

    let artifacts_written = if !skipped.is_empty() {
        Some(artifacts::write_artifacts(artifact_dir, task_id, &[], &skipped).await?)
    } else {
        None
    };

    Ok(IngestOutcome {
        success: true,
        record_count: insert_count,
        error_count: 0,
        skipped_count: skipped.len() as u64,
        messages: vec![format!("{} row(s) ingested", insert_count)],
        warnings,
        errors: Vec::new(),
        artifacts: artifacts_written,
    })
}

/// Rolls back the open transaction and returns 0 — used by each kind's error
/// branch so the match arm still type-checks as a row count.
async fn rollback_with_artifacts(
    tx: Box<dyn crate::service::storage::StorageTransaction>,
    _artifact_dir: &Path,
    _task_id: i64,
    _errors: &[RowError],
    _skipped: &[RowError],
    _total_rows: u64,
) -> EngineResult<u64> {
    tx.rollback().await?;
    Ok(0)
}

/// Inserts `rows` in chunks of `chunk_size`, checking cancellation and
/// publishing a progress tick between chunks (§4.2 "Batch persistence").
async fn persist_chunks<T, F>(
    tx: &mut dyn crate::service::storage::StorageTransaction,
    rows: Vec<T>,
    chunk_size: usize,
    progress: &dyn ProgressSink,
    cancellation: &CancellationToken,
    insert: F,
) -> EngineResult<()>
where
    T: Clone,
    F: for<'a> Fn(
        &'a mut dyn crate::service::storage::StorageTransaction,
        Vec<T>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = EngineResult<()>> + Send + 'a>>,
{
    let total = rows.len();
    if total == 0 {
        return Ok(());
    }
    let chunks: Vec<Vec<T>> = rows.chunks(chunk_size.max(1)).map(<[T]>::to_vec).collect();
    let mut loaded = 0usize;
    for chunk in chunks {
        if cancellation.is_cancelled() {
            return Err(EngineError::cancelled("ingestion cancelled mid-batch"));
        }
        let n = chunk.len();
        insert(tx, chunk).await?;
        loaded += n;
        let pct = ((loaded as f64 / total as f64) * 85.0 + 10.0).round() as u8;
        progress.report(pct.min(95), format!("persisted {loaded}/{total} rows"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_matches_wire_contract() {
        assert_eq!(IngestKind::Sales.header(), &["day", "sku", "channel", "quantity", "discount", "revenue"]);
        assert_eq!(IngestKind::Styles.header().len(), 6);
    }
}
