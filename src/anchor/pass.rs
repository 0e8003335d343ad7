/// Anchoring passes.
///
/// One pass handles one entity type:
///
/// ```text
/// scan unanchored ──▶ batch key ──▶ hash rows ──▶ ledger save ──▶ settle + audit
/// ```
///
/// A failed ledger write leaves the store untouched, so the same rows are
/// picked up again on the next tick. A tick runs Project, Resume and
/// Interview passes in that order and stops at the first failure.
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::batch_key::BatchKeyGenerator;
use super::canonical::canonical_hash;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::state::models::{BatchSettlement, EntityKind, RowSettlement};
use crate::state::AnchorStore;

/// What a completed pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing was waiting; no ledger call was made.
    Idle { kind: EntityKind },
    Anchored(BatchReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub kind: EntityKind,
    pub batch_key: String,
    pub ledger_tx_ref: String,
    /// Rows written back as anchored.
    pub settled: usize,
    /// Rows that changed between scan and settle and stay unanchored.
    pub superseded: Vec<i64>,
}

/// Drives anchoring passes against a store and a ledger.
pub struct Reconciler {
    store: Arc<dyn AnchorStore>,
    ledger: Arc<dyn Ledger>,
    keys: BatchKeyGenerator,
}

impl Reconciler {
    pub fn new(store: Arc<dyn AnchorStore>, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            store,
            ledger,
            keys: BatchKeyGenerator::new(),
        }
    }

    /// Anchor every currently unanchored row of `kind` as one batch.
    pub async fn run_pass(&self, kind: EntityKind) -> Result<PassOutcome> {
        let rows = self.store.scan_unanchored(kind).await?;
        if rows.is_empty() {
            debug!(entity = %kind, "Nothing to anchor");
            return Ok(PassOutcome::Idle { kind });
        }

        let batch_key = self.keys.next_key(kind);

        let mut hashes = Vec::with_capacity(rows.len());
        let mut settlements = Vec::with_capacity(rows.len());
        for row in &rows {
            let content_hash = canonical_hash(row)?;
            hashes.push(content_hash.clone());
            settlements.push(RowSettlement {
                id: row.id(),
                revision: row.revision(),
                content_hash,
            });
        }

        info!(
            entity = %kind,
            rows = rows.len(),
            batch_key = %batch_key,
            ledger = self.ledger.name(),
            "Submitting batch to ledger"
        );

        let receipt = match self.ledger.save(&batch_key, &hashes, kind.type_tag()).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(
                    entity = %kind,
                    batch_key = %batch_key,
                    error = %e,
                    "Ledger write failed, rows stay unanchored"
                );
                return Err(e);
            }
        };

        let batch = BatchSettlement {
            kind,
            batch_key: batch_key.clone(),
            ledger_tx_ref: receipt.tx_ref.clone(),
            anchored_at: receipt.block_timestamp,
            rows: settlements,
        };

        let outcome = match self.store.settle_batch(&batch).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The hashes are on the ledger; the rows get a second write later.
                error!(
                    entity = %kind,
                    tx_ref = %receipt.tx_ref,
                    error = %e,
                    "Settlement failed after ledger write"
                );
                return Err(e);
            }
        };

        if !outcome.superseded.is_empty() {
            warn!(
                entity = %kind,
                ids = ?outcome.superseded,
                "Rows changed during the pass, deferring to next tick"
            );
        }

        info!(
            entity = %kind,
            tx_ref = %receipt.tx_ref,
            block = receipt.block_number,
            settled = outcome.settled,
            "Batch anchored"
        );

        Ok(PassOutcome::Anchored(BatchReport {
            kind,
            batch_key,
            ledger_tx_ref: receipt.tx_ref,
            settled: outcome.settled,
            superseded: outcome.superseded,
        }))
    }

    /// Run every pass in order, stopping at the first error.
    pub async fn run_tick(&self) -> Result<Vec<PassOutcome>> {
        let mut outcomes = Vec::with_capacity(EntityKind::ALL.len());

        for kind in EntityKind::ALL {
            match self.run_pass(kind).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(
                        failed = %kind,
                        completed = outcomes.len(),
                        "Tick aborted, remaining passes skipped"
                    );
                    return Err(e);
                }
            }
        }

        Ok(outcomes)
    }
}
