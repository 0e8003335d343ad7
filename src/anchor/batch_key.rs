/// Batch key generation.
///
/// A batch key names one ledger write. The preimage joins the entity label
/// and type tag, wall-clock nanoseconds, a per-generator counter and a random
/// per-generator instance nonce; the digest of that string is the key.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::crypto::hash::hash_hex;
use crate::state::models::EntityKind;

pub struct BatchKeyGenerator {
    counter: AtomicU64,
    instance: u64,
}

impl BatchKeyGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            instance: rand::random(),
        }
    }

    /// Fresh 64-hex-char key for one pass over `kind`.
    pub fn next_key(&self, kind: EntityKind) -> String {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let preimage = format!(
            "{}:{}:{}:{}:{:016x}",
            kind.label(),
            kind.type_tag(),
            nanos,
            count,
            self.instance
        );
        hash_hex(preimage.as_bytes())
    }
}

impl Default for BatchKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}
