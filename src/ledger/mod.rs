/// Client side of the notarization contract.
///
/// The contract exposes two operations: `get(key)` returning the string
/// values stored under a key together with a block number, and
/// `save(key, values, typeTag)` appending a batch. The [`Ledger`] trait
/// mirrors exactly that surface so the reconciler can be driven by the EVM
/// client in production and by scripted ledgers in tests.
pub mod evm;

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AnchorError, Result};

/// Values stored under one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerValue {
    pub values: Vec<String>,
    pub block_number: U256,
}

/// Returned once a `save` transaction has been included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    /// Transaction hash, 0x-prefixed.
    pub tx_ref: String,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Short description used in logs (e.g. the RPC endpoint).
    fn name(&self) -> &str;

    /// Read-only query of the values stored under `key`.
    async fn get(&self, key: &str) -> Result<LedgerValue>;

    /// Sign and submit a write, returning after inclusion.
    async fn save(&self, key: &str, values: &[String], type_tag: u64) -> Result<LedgerReceipt>;
}

/// Bounds every call on the wrapped ledger by a fixed deadline.
///
/// An elapsed deadline surfaces as [`AnchorError::Timeout`]; the underlying
/// future is dropped, which abandons any in-flight receipt polling.
pub struct Deadline {
    inner: Arc<dyn Ledger>,
    limit: Duration,
}

impl Deadline {
    pub fn new(inner: Arc<dyn Ledger>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl Ledger for Deadline {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<LedgerValue> {
        tokio::time::timeout(self.limit, self.inner.get(key))
            .await
            .map_err(|_| AnchorError::Timeout {
                operation: "get",
                after: self.limit,
            })?
    }

    async fn save(&self, key: &str, values: &[String], type_tag: u64) -> Result<LedgerReceipt> {
        tokio::time::timeout(self.limit, self.inner.save(key, values, type_tag))
            .await
            .map_err(|_| AnchorError::Timeout {
                operation: "save",
                after: self.limit,
            })?
    }
}

/// Key and value of the liveness sentinel written on first start.
pub const PROBE_KEY: &str = "start";

/// Verify a read/write round-trip against the contract.
///
/// Reads the sentinel; if it is missing, writes it once and reads it back.
/// Anything other than a first value of `"start"` fails the probe.
pub async fn probe(ledger: &dyn Ledger) -> Result<()> {
    let existing = ledger.get(PROBE_KEY).await?;
    if existing.values.first().map(String::as_str) == Some(PROBE_KEY) {
        info!(ledger = ledger.name(), "Ledger sentinel present");
        return Ok(());
    }

    let receipt = ledger
        .save(PROBE_KEY, &[PROBE_KEY.to_string()], 0)
        .await?;
    info!(tx_ref = %receipt.tx_ref, "Ledger sentinel written");

    let readback = ledger.get(PROBE_KEY).await?;
    match readback.values.first() {
        Some(v) if v == PROBE_KEY => Ok(()),
        other => {
            warn!(got = ?other, "Ledger sentinel mismatch");
            Err(AnchorError::Connection(
                "contract did not return the sentinel it was given".into(),
            ))
        }
    }
}
