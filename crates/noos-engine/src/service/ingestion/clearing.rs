//! Dependency-ordered data clearing (§4.2 "Data clearing (pre-persist)").
//! Runs inside the same transaction as the subsequent insert so a rollback
//! restores the prior state atomically.

use crate::error::EngineResult;
use crate::service::storage::StorageTransaction;

use super::IngestKind;

/// Row counts cleared, broken out per entity, in the order clearing ran.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ClearedCounts {
    pub sales: u64,
    pub skus: u64,
    pub stores: u64,
    pub styles: u64,
}

pub async fn clear_for(
    kind: IngestKind,
    tx: &mut dyn StorageTransaction,
) -> EngineResult<ClearedCounts> {
    let mut cleared = ClearedCounts::default();
    match kind {
        IngestKind::Styles => {
            cleared.sales = tx.clear_sales().await?;
            cleared.skus = tx.clear_skus().await?;
            cleared.styles = tx.clear_styles().await?;
        }
        IngestKind::Stores => {
            cleared.sales = tx.clear_sales().await?;
            cleared.stores = tx.clear_stores().await?;
        }
        IngestKind::Skus => {
            cleared.sales = tx.clear_sales().await?;
            cleared.skus = tx.clear_skus().await?;
        }
        IngestKind::Sales => {
            cleared.sales = tx.clear_sales().await?;
        }
    }
    Ok(cleared)
}
