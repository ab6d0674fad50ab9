//! Domain entities (§3). Plain data, `serde`-derived for storage round-trips
//! and wire responses alike; validation lives with the subsystem that owns
//! the write path (ingestion for master/transactional rows, the parameter
//! store for `AlgorithmParameters`), not here.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    pub style: String,
    pub brand: String,
    pub category: String,
    pub sub_category: String,
    pub mrp: Decimal,
    pub gender: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub branch: String,
    pub city: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    pub sku: String,
    pub style: String,
    pub size: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sales {
    pub day: NaiveDate,
    pub sku: String,
    pub channel: String,
    pub quantity: i64,
    pub discount: Decimal,
    pub revenue: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TaskType {
    UploadStyles,
    UploadStores,
    UploadSkus,
    UploadSales,
    DownloadStyles,
    DownloadStores,
    DownloadSkus,
    DownloadSales,
    RunNoos,
}

impl TaskType {
    /// The admission-control / worker-pool bucket this task type belongs to
    /// (§4.1 "Pool identity derives from `taskType`").
    #[must_use]
    pub fn category(self) -> TaskCategory {
        match self {
            TaskType::UploadStyles
            | TaskType::UploadStores
            | TaskType::UploadSkus
            | TaskType::UploadSales => TaskCategory::Upload,
            TaskType::DownloadStyles
            | TaskType::DownloadStores
            | TaskType::DownloadSkus
            | TaskType::DownloadSales => TaskCategory::Download,
            TaskType::RunNoos => TaskCategory::Compute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TaskCategory {
    Upload,
    Download,
    Compute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub file_name: Option<String>,
    /// Free-form JSON: request parameters on submission, classification
    /// counts / substituted-default notes on completion (§4.3 Stage 6-7).
    pub parameters: Option<serde_json::Value>,
    pub progress_percentage: u8,
    pub progress_message: Option<String>,
    pub cancellation_requested: bool,
    pub error_message: Option<String>,
    pub result_url: Option<String>,
    pub created_date: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Task {
    #[must_use]
    pub fn new_pending(id: i64, task_type: TaskType, file_name: Option<String>) -> Self {
        Self {
            id,
            task_type,
            status: TaskStatus::Pending,
            file_name,
            parameters: None,
            progress_percentage: 0,
            progress_message: None,
            cancellation_requested: false,
            error_message: None,
            result_url: None,
            created_date: Utc::now(),
            start_time: None,
            end_time: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmParameters {
    pub name: String,
    pub is_active: bool,
    pub liquidation_threshold: Decimal,
    pub bestseller_multiplier: Decimal,
    pub min_volume_threshold: Decimal,
    pub consistency_threshold: Decimal,
    pub core_duration_months: i32,
    pub bestseller_duration_days: i32,
    /// `None` means "select all sales" in Stage 1 (§4.3).
    pub analysis_start_date: Option<NaiveDate>,
    pub analysis_end_date: Option<NaiveDate>,
    pub last_updated: DateTime<Utc>,
}

impl AlgorithmParameters {
    /// Built-in seed values (§4.4 "Defaults"). The analysis window is left
    /// open (both bounds `None`) until a caller narrows it explicitly.
    #[must_use]
    pub fn defaults(name: impl Into<String>) -> Self {
        use rust_decimal_macros::dec;
        Self {
            name: name.into(),
            is_active: true,
            liquidation_threshold: dec!(0.25),
            bestseller_multiplier: dec!(1.20),
            min_volume_threshold: dec!(25.0),
            consistency_threshold: dec!(0.75),
            core_duration_months: 6,
            bestseller_duration_days: 90,
            analysis_start_date: None,
            analysis_end_date: None,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NoosLabel {
    Core,
    Bestseller,
    Fashion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoosResult {
    pub algorithm_run_id: i64,
    pub style_code: String,
    pub category: String,
    pub label: NoosLabel,
    pub total_quantity: i64,
    pub total_revenue: Decimal,
    pub style_ros: Decimal,
    pub days_available: i32,
    pub days_with_sales: i32,
    pub avg_discount: Decimal,
    pub style_rev_contribution: Decimal,
    pub calculated_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_category_mapping_matches_pools() {
        assert_eq!(TaskType::UploadSales.category(), TaskCategory::Upload);
        assert_eq!(TaskType::DownloadSkus.category(), TaskCategory::Download);
        assert_eq!(TaskType::RunNoos.category(), TaskCategory::Compute);
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }
}
