/// Read-side verification: from a content hash to the values the ledger
/// holds under that hash's batch key.
use serde::Serialize;

use crate::error::{AnchorError, Result};
use crate::ledger::Ledger;
use crate::state::models::EntityKind;
use crate::state::AnchorStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupResult {
    pub entity: EntityKind,
    pub batch_key: String,
    /// Raw values stored on the ledger under `batch_key`.
    pub values: Vec<String>,
    /// Decimal block number reported by the contract.
    pub block_number: String,
    /// Whether `values` contains the queried hash.
    pub contains_hash: bool,
}

pub async fn lookup_by_content_hash<S: AnchorStore + ?Sized>(
    store: &S,
    ledger: Option<&dyn Ledger>,
    content_hash: &str,
) -> Result<LookupResult> {
    let ledger = ledger.ok_or(AnchorError::LedgerUnavailable)?;

    let (entity, batch_key) = store
        .find_batch_key(content_hash)
        .await?
        .ok_or_else(|| AnchorError::NotFound(format!("no anchored row with hash {content_hash}")))?;

    let value = ledger.get(&batch_key).await?;
    let contains_hash = value.values.iter().any(|v| v == content_hash);

    Ok(LookupResult {
        entity,
        batch_key,
        values: value.values,
        block_number: value.block_number.to_string(),
        contains_hash,
    })
}
