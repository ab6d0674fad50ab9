//! The Parameter-Set Manager (§4.4): a named store of `AlgorithmParameters`
//! with exactly one "active" record at any observable instant.
//!
//! Grounded on the teacher's warehouse-status transactional swap idiom
//! (`service/mod.rs`'s `WarehouseStatus`, and the `Storage::begin()` pattern
//! already used by ingestion for clear+insert) — here the same transaction
//! shape enforces "deactivate current, activate new" as a single atomic
//! step rather than two independent writes a reader could observe between.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::AlgorithmParameters;
use crate::error::{EngineError, EngineResult};
use crate::service::storage::Storage;

/// Caller-supplied fields for `create`/`updateActive`/`updateByName`. `None`
/// (an omitted key) leaves a field unchanged (on update) or falls back to
/// the documented default (on create); the two date fields additionally
/// distinguish an explicit `null` (clear the stored value) from an omitted
/// key, via `serde_with`'s `double_option`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterFields {
    pub liquidation_threshold: Option<Decimal>,
    pub bestseller_multiplier: Option<Decimal>,
    pub min_volume_threshold: Option<Decimal>,
    pub consistency_threshold: Option<Decimal>,
    pub core_duration_months: Option<i32>,
    pub bestseller_duration_days: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_with::rust::double_option")]
    pub analysis_start_date: Option<Option<chrono::NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_with::rust::double_option")]
    pub analysis_end_date: Option<Option<chrono::NaiveDate>>,
}

/// Rejects out-of-range fields with `VALIDATION` (§4.4.1) rather than
/// silently clamping — clamp-to-default is reserved for algorithm runs
/// (§4.3 Stage 6), not for this write path.
fn validate_fields(fields: &ParameterFields) -> EngineResult<()> {
    let unit_interval = |v: Decimal| v >= Decimal::ZERO && v <= Decimal::ONE;
    if let Some(v) = fields.liquidation_threshold {
        if !unit_interval(v) {
            return Err(EngineError::validation("liquidationThreshold must be within [0,1]"));
        }
    }
    if let Some(v) = fields.bestseller_multiplier {
        if v < Decimal::ONE {
            return Err(EngineError::validation("bestsellerMultiplier must be >= 1.0"));
        }
    }
    if let Some(v) = fields.min_volume_threshold {
        if v < Decimal::ZERO {
            return Err(EngineError::validation("minVolumeThreshold must be >= 0"));
        }
    }
    if let Some(v) = fields.consistency_threshold {
        if !unit_interval(v) {
            return Err(EngineError::validation("consistencyThreshold must be within [0,1]"));
        }
    }
    if let Some(v) = fields.core_duration_months {
        if !(1..=24).contains(&v) {
            return Err(EngineError::validation("coreDurationMonths must be within [1,24]"));
        }
    }
    if let Some(v) = fields.bestseller_duration_days {
        if !(1..=365).contains(&v) {
            return Err(EngineError::validation("bestsellerDurationDays must be within [1,365]"));
        }
    }
    if let (Some(Some(start)), Some(Some(end))) = (fields.analysis_start_date, fields.analysis_end_date) {
        if start >= end {
            return Err(EngineError::validation("analysisStartDate must precede analysisEndDate"));
        }
    }
    Ok(())
}

fn apply_fields(mut base: AlgorithmParameters, fields: &ParameterFields) -> AlgorithmParameters {
    if let Some(v) = fields.liquidation_threshold {
        base.liquidation_threshold = v;
    }
    if let Some(v) = fields.bestseller_multiplier {
        base.bestseller_multiplier = v;
    }
    if let Some(v) = fields.min_volume_threshold {
        base.min_volume_threshold = v;
    }
    if let Some(v) = fields.consistency_threshold {
        base.consistency_threshold = v;
    }
    if let Some(v) = fields.core_duration_months {
        base.core_duration_months = v;
    }
    if let Some(v) = fields.bestseller_duration_days {
        base.bestseller_duration_days = v;
    }
    if let Some(v) = fields.analysis_start_date {
        base.analysis_start_date = v;
    }
    if let Some(v) = fields.analysis_end_date {
        base.analysis_end_date = v;
    }
    base.last_updated = Utc::now();
    base
}

pub struct ParameterStore<'a> {
    storage: &'a dyn Storage,
}

impl<'a> ParameterStore<'a> {
    #[must_use]
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    /// Returns the unique active set, seeding built-in defaults under the
    /// reserved name `default` if none exists yet (§4.4 "getActive").
    pub async fn get_active(&self) -> EngineResult<AlgorithmParameters> {
        if let Some(active) = self.storage.get_active_parameters().await? {
            return Ok(active);
        }
        let defaults = AlgorithmParameters::defaults("default");
        let mut tx = self.storage.begin().await?;
        tx.upsert_parameters(defaults.clone()).await?;
        tx.commit().await?;
        Ok(defaults)
    }

    pub async fn get_by_name(&self, name: &str) -> EngineResult<AlgorithmParameters> {
        self.storage
            .get_parameters_by_name(name)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("parameter set {name}")))
    }

    pub async fn list_recent(&self, limit: u32) -> EngineResult<Vec<AlgorithmParameters>> {
        self.storage.list_recent_parameters(limit).await
    }

    /// Persists a new named set, deactivating whatever was previously
    /// active in the same transaction (§4.4 "create").
    pub async fn create(&self, name: &str, fields: &ParameterFields) -> EngineResult<AlgorithmParameters> {
        validate_fields(fields)?;
        if self.storage.parameter_name_exists(name).await? {
            return Err(EngineError::conflict(format!("parameter set {name} already exists")));
        }
        let created = apply_fields(AlgorithmParameters::defaults(name), fields);
        let mut tx = self.storage.begin().await?;
        tx.deactivate_all_parameters().await?;
        tx.upsert_parameters(created.clone()).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// In-place update of whichever set is currently active; does not touch
    /// `is_active` (§4.4 "updateActive").
    pub async fn update_active(&self, fields: &ParameterFields) -> EngineResult<AlgorithmParameters> {
        validate_fields(fields)?;
        let active = self.get_active().await?;
        let updated = apply_fields(active, fields);
        self.storage.update_parameters(updated.clone()).await?;
        Ok(updated)
    }

    /// Updates a named set without toggling activity (§4.4 "updateByName").
    pub async fn update_by_name(&self, name: &str, fields: &ParameterFields) -> EngineResult<AlgorithmParameters> {
        validate_fields(fields)?;
        let existing = self.get_by_name(name).await?;
        let updated = apply_fields(existing, fields);
        self.storage.update_parameters(updated.clone()).await?;
        Ok(updated)
    }

    /// Atomically deactivates the current active set and activates `name`
    /// (§4.4 "activate"). Fails `NOT_FOUND` if `name` is absent.
    pub async fn activate(&self, name: &str) -> EngineResult<AlgorithmParameters> {
        let mut target = self.get_by_name(name).await?;
        target.is_active = true;
        target.last_updated = Utc::now();
        let mut tx = self.storage.begin().await?;
        tx.deactivate_all_parameters().await?;
        tx.upsert_parameters(target.clone()).await?;
        tx.commit().await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::storage::memory::MemoryStorage;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn get_active_seeds_defaults_when_empty() {
        let storage = MemoryStorage::new();
        let store = ParameterStore::new(&storage);
        let active = store.get_active().await.unwrap();
        assert_eq!(active.name, "default");
        assert!(active.is_active);
    }

    #[tokio::test]
    async fn create_deactivates_previous_active_set() {
        let storage = MemoryStorage::new();
        let store = ParameterStore::new(&storage);
        let first = store.create("a", &ParameterFields::default()).await.unwrap();
        assert!(first.is_active);
        let second = store.create("b", &ParameterFields::default()).await.unwrap();
        assert!(second.is_active);
        let reloaded_first = store.get_by_name("a").await.unwrap();
        assert!(!reloaded_first.is_active);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_name() {
        let storage = MemoryStorage::new();
        let store = ParameterStore::new(&storage);
        store.create("a", &ParameterFields::default()).await.unwrap();
        let err = store.create("a", &ParameterFields::default()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn activate_swaps_active_flag_atomically() {
        let storage = MemoryStorage::new();
        let store = ParameterStore::new(&storage);
        store.create("a", &ParameterFields::default()).await.unwrap();
        store.create("b", &ParameterFields::default()).await.unwrap();
        store.activate("a").await.unwrap();
        assert!(store.get_by_name("a").await.unwrap().is_active);
        assert!(!store.get_by_name("b").await.unwrap().is_active);
    }

    #[tokio::test]
    async fn activate_unknown_name_is_not_found() {
        let storage = MemoryStorage::new();
        let store = ParameterStore::new(&storage);
        let err = store.activate("missing").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn update_active_rejects_out_of_range_fields() {
        let storage = MemoryStorage::new();
        let store = ParameterStore::new(&storage);
        store.get_active().await.unwrap();
        let fields = ParameterFields {
            liquidation_threshold: Some(dec!(1.5)),
            ..Default::default()
        };
        let err = store.update_active(&fields).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn list_recent_orders_active_first_then_by_last_updated() {
        let storage = MemoryStorage::new();
        let store = ParameterStore::new(&storage);
        store.create("a", &ParameterFields::default()).await.unwrap();
        store.create("b", &ParameterFields::default()).await.unwrap();
        let recent = store.list_recent(10).await.unwrap();
        assert_eq!(recent[0].name, "b");
        assert!(recent[0].is_active);
    }
}
