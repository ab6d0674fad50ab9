//! The NOOS classification algorithm (§4.3): a seven-stage analytic over
//! Sales that labels every style Core, Bestseller, or Fashion.
//!
//! No direct teacher counterpart (Iceberg has no retail analytics);
//! grounded on the teacher's checkpoint-and-cancellation idiom in
//! `service/tasks/tabular_expiration_queue.rs`'s per-item loop, applied here
//! to per-style aggregation and classification stages.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::entities::{AlgorithmParameters, NoosLabel, NoosResult, Sales};
use crate::error::{EngineError, EngineResult};
use crate::service::progress::ProgressSink;
use crate::service::storage::{DateWindow, Storage};
use crate::CancellationToken;

mod handler;
pub use handler::NoosRunHandler;

/// A style's accumulated metrics across Stage 4, carried into Stage 5/6.
struct StyleAccumulator {
    category: String,
    mrp: Decimal,
    total_quantity: i64,
    total_revenue: Decimal,
    weighted_discount_sum: Decimal,
    distinct_days: HashSet<NaiveDate>,
}

/// Replaces invalid (negative, zero-where-positive-required, or
/// out-of-declared-range) parameter fields with the documented defaults
/// (§4.3 Stage 6, "Invalid parameter values..."). Returns the sanitized
/// parameters plus a human-readable note per substitution, recorded into
/// `Task.parameters` by the caller.
fn sanitize_parameters(params: &AlgorithmParameters) -> (AlgorithmParameters, Vec<String>) {
    let defaults = AlgorithmParameters::defaults(&params.name);
    let mut sanitized = params.clone();
    let mut notes = Vec::new();

    let unit_interval = |value: Decimal| value >= Decimal::ZERO && value <= Decimal::ONE;

    if !unit_interval(sanitized.liquidation_threshold) {
        notes.push(format!(
            "liquidationThreshold {} out of [0,1], substituted default {}",
            sanitized.liquidation_threshold, defaults.liquidation_threshold
        ));
        sanitized.liquidation_threshold = defaults.liquidation_threshold;
    }
    if sanitized.bestseller_multiplier < Decimal::ONE {
        notes.push(format!(
            "bestsellerMultiplier {} is below the declared minimum 1.0, substituted default {}",
            sanitized.bestseller_multiplier, defaults.bestseller_multiplier
        ));
        sanitized.bestseller_multiplier = defaults.bestseller_multiplier;
    }
    if sanitized.min_volume_threshold < Decimal::ZERO {
        notes.push(format!(
            "minVolumeThreshold {} is negative, substituted default {}",
            sanitized.min_volume_threshold, defaults.min_volume_threshold
        ));
        sanitized.min_volume_threshold = defaults.min_volume_threshold;
    }
    if !unit_interval(sanitized.consistency_threshold) {
        notes.push(format!(
            "consistencyThreshold {} out of [0,1], substituted default {}",
            sanitized.consistency_threshold, defaults.consistency_threshold
        ));
        sanitized.consistency_threshold = defaults.consistency_threshold;
    }
    if sanitized.core_duration_months <= 0 {
        notes.push("coreDurationMonths is not positive, substituted default".into());
        sanitized.core_duration_months = defaults.core_duration_months;
    }
    if sanitized.bestseller_duration_days <= 0 {
        notes.push("bestsellerDurationDays is not positive, substituted default".into());
        sanitized.bestseller_duration_days = defaults.bestseller_duration_days;
    }

    (sanitized, notes)
}

fn effective_discount_rate(discount: Decimal, revenue: Decimal) -> Decimal {
    let denominator = revenue + discount;
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        discount / denominator
    }
}

fn days_available(window: DateWindow, sales: &[Sales]) -> EngineResult<i32> {
    if let (Some(start), Some(end)) = (window.start, window.end) {
        return Ok(((end - start).num_days() + 1) as i32);
    }
    let min = sales.iter().map(|s| s.day).min();
    let max = sales.iter().map(|s| s.day).max();
    match (min, max) {
        (Some(min), Some(max)) => Ok(((max - min).num_days() + 1) as i32),
        _ => Ok(0),
    }
}

/// Runs the full algorithm and persists the result set. `params` is used
/// as-is by the caller after sanitization; `task_id` becomes
/// `algorithmRunId`. Returns the JSON summary stored on `Task.parameters`.
pub async fn run(
    storage: &dyn Storage,
    params: AlgorithmParameters,
    task_id: i64,
    progress: &dyn ProgressSink,
    cancellation: &CancellationToken,
) -> EngineResult<serde_json::Value> {
    let (params, substitutions) = sanitize_parameters(&params);

    // Stage 1 — Load & filter.
    let window = DateWindow { start: params.analysis_start_date, end: params.analysis_end_date };
    let sales = storage.sales_in_window(window).await?;
    if sales.is_empty() {
        return Err(EngineError::new(crate::error::ErrorKind::NotFound, "NO_DATA")
            .with_detail("no sales rows in the requested analysis window"));
    }
    let days_available = days_available(window, &sales)?;
    progress.report(10, format!("loaded {} sales rows", sales.len()));
    if cancellation.is_cancelled() {
        return Err(EngineError::cancelled("cancelled after load"));
    }

    // Stage 2 — Liquidation cleanup.
    let mut discarded = 0usize;
    let cleaned: Vec<Sales> = sales
        .into_iter()
        .filter(|s| {
            if params.liquidation_threshold.is_zero() {
                return true;
            }
            let rate = effective_discount_rate(s.discount, s.revenue);
            let keep = rate <= params.liquidation_threshold;
            if !keep {
                discarded += 1;
            }
            keep
        })
        .collect();
    progress.report(25, format!("discarded {discarded} liquidation sales"));
    if cancellation.is_cancelled() {
        return Err(EngineError::cancelled("cancelled after liquidation cleanup"));
    }

    // Stage 3 — Join Sales -> Sku -> Style.
    let mut unresolved = 0usize;
    let mut joined = Vec::with_capacity(cleaned.len());
    for sale in cleaned {
        let Some(sku) = storage.get_sku(&sale.sku).await? else {
            unresolved += 1;
            continue;
        };
        let Some(style) = storage.get_style(&sku.style).await? else {
            unresolved += 1;
            continue;
        };
        joined.push((sale, style));
    }
    progress.report(40, format!("{unresolved} sales rows dropped for unresolved sku/style"));
    if cancellation.is_cancelled() {
        return Err(EngineError::cancelled("cancelled after join"));
    }

    // Stage 4 — Per-style aggregation.
    let mut by_style: HashMap<String, StyleAccumulator> = HashMap::new();
    for (sale, style) in &joined {
        let acc = by_style.entry(style.style.clone()).or_insert_with(|| StyleAccumulator {
            category: style.category.clone(),
            mrp: style.mrp,
            total_quantity: 0,
            total_revenue: Decimal::ZERO,
            weighted_discount_sum: Decimal::ZERO,
            distinct_days: HashSet::new(),
        });
        acc.total_quantity += sale.quantity;
        acc.total_revenue += sale.revenue;
        acc.weighted_discount_sum += sale.discount * Decimal::from(sale.quantity);
        acc.distinct_days.insert(sale.day);
    }
    progress.report(65, format!("aggregated {} styles", by_style.len()));
    if cancellation.is_cancelled() {
        return Err(EngineError::cancelled("cancelled after aggregation"));
    }

    // Stage 5 — Category benchmarks.
    let days_available_decimal = Decimal::from(days_available.max(1));
    struct StyleMetrics {
        style_code: String,
        category: String,
        mrp: Decimal,
        total_quantity: i64,
        total_revenue: Decimal,
        days_with_sales: i32,
        avg_discount: Decimal,
        style_ros: Decimal,
    }
    let mut metrics: Vec<StyleMetrics> = by_style
        .into_iter()
        .map(|(style_code, acc)| {
            let avg_discount = if acc.total_quantity == 0 {
                Decimal::ZERO
            } else {
                acc.weighted_discount_sum / Decimal::from(acc.total_quantity)
            };
            StyleMetrics {
                style_code,
                category: acc.category,
                mrp: acc.mrp,
                total_quantity: acc.total_quantity,
                total_revenue: acc.total_revenue,
                days_with_sales: acc.distinct_days.len() as i32,
                avg_discount,
                style_ros: Decimal::from(acc.total_quantity) / days_available_decimal,
            }
        })
        .collect();

    let mut category_revenue: HashMap<String, Decimal> = HashMap::new();
    let mut category_ros_sum: HashMap<String, (Decimal, usize)> = HashMap::new();
    for m in &metrics {
        *category_revenue.entry(m.category.clone()).or_insert(Decimal::ZERO) += m.total_revenue;
        let entry = category_ros_sum.entry(m.category.clone()).or_insert((Decimal::ZERO, 0));
        entry.0 += m.style_ros;
        entry.1 += 1;
    }
    let category_avg_ros: HashMap<String, Decimal> = category_ros_sum
        .into_iter()
        .map(|(category, (sum, count))| (category, if count == 0 { Decimal::ZERO } else { sum / Decimal::from(count) }))
        .collect();
    progress.report(80, format!("computed benchmarks for {} categories", category_revenue.len()));
    if cancellation.is_cancelled() {
        return Err(EngineError::cancelled("cancelled after benchmarking"));
    }

    // Stage 6 — Classification.
    let min_volume = params.min_volume_threshold;
    let mut results = Vec::with_capacity(metrics.len());
    let now = Utc::now();
    for m in metrics.drain(..) {
        let category_revenue_total = *category_revenue.get(&m.category).unwrap_or(&Decimal::ZERO);
        let style_rev_contribution = if category_revenue_total.is_zero() {
            Decimal::ZERO
        } else {
            Decimal::from(100) * m.total_revenue / category_revenue_total
        };
        let category_avg = *category_avg_ros.get(&m.category).unwrap_or(&Decimal::ZERO);

        let consistency = if days_available == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(m.days_with_sales) / days_available_decimal
        };
        let total_quantity_decimal = Decimal::from(m.total_quantity);

        let label = if consistency >= params.consistency_threshold
            && total_quantity_decimal >= min_volume
            && m.avg_discount <= params.liquidation_threshold * m.mrp
        {
            NoosLabel::Core
        } else if m.style_ros >= params.bestseller_multiplier * category_avg && total_quantity_decimal >= min_volume {
            NoosLabel::Bestseller
        } else {
            NoosLabel::Fashion
        };

        results.push(NoosResult {
            algorithm_run_id: task_id,
            style_code: m.style_code,
            category: m.category,
            label,
            total_quantity: m.total_quantity,
            total_revenue: m.total_revenue,
            style_ros: m.style_ros,
            days_available,
            days_with_sales: m.days_with_sales,
            avg_discount: m.avg_discount,
            style_rev_contribution,
            calculated_date: now,
        });
    }
    results.sort_by(|a, b| a.style_code.cmp(&b.style_code));
    progress.report(92, format!("classified {} styles", results.len()));
    if cancellation.is_cancelled() {
        return Err(EngineError::cancelled("cancelled before persist"));
    }

    // Stage 7 — Persist.
    let mut counts = HashMap::new();
    for r in &results {
        *counts.entry(r.label).or_insert(0u64) += 1;
    }
    let mut tx = storage.begin().await?;
    tx.delete_noos_results().await?;
    tx.insert_noos_results(results.clone()).await?;
    tx.commit().await?;
    progress.report(100, "noos run complete".into());

    Ok(serde_json::json!({
        "algorithmRunId": task_id,
        "totalStylesProcessed": results.len(),
        "coreStyles": counts.get(&NoosLabel::Core).copied().unwrap_or(0),
        "bestsellerStyles": counts.get(&NoosLabel::Bestseller).copied().unwrap_or(0),
        "fashionStyles": counts.get(&NoosLabel::Fashion).copied().unwrap_or(0),
        "liquidationDiscarded": discarded,
        "unresolvedSalesRows": unresolved,
        "parameterSubstitutions": substitutions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn effective_discount_rate_zero_denominator_is_zero() {
        assert_eq!(effective_discount_rate(Decimal::ZERO, Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn effective_discount_rate_matches_ratio() {
        assert_eq!(effective_discount_rate(dec!(10), dec!(90)), dec!(0.1));
    }

    #[test]
    fn sanitize_replaces_out_of_range_thresholds() {
        let mut params = AlgorithmParameters::defaults("test");
        params.liquidation_threshold = dec!(-1);
        params.bestseller_multiplier = dec!(0);
        let (sanitized, notes) = sanitize_parameters(&params);
        assert_eq!(sanitized.liquidation_threshold, dec!(0.25));
        assert_eq!(sanitized.bestseller_multiplier, dec!(1.20));
        assert_eq!(notes.len(), 2);
    }

    #[test]
    fn sanitize_replaces_below_one_bestseller_multiplier() {
        let mut params = AlgorithmParameters::defaults("test");
        params.bestseller_multiplier = dec!(0.5);
        let (sanitized, notes) = sanitize_parameters(&params);
        assert_eq!(sanitized.bestseller_multiplier, dec!(1.20));
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn sanitize_leaves_valid_parameters_untouched() {
        let params = AlgorithmParameters::defaults("test");
        let (sanitized, notes) = sanitize_parameters(&params);
        assert!(notes.is_empty());
        assert_eq!(sanitized, params);
    }
}
