/// Content hash of an anchorable row.
///
/// The row is cloned, its anchoring columns are zeroed on the clone, and the
/// result is serialized to JSON and digested with BLAKE3. Whatever state the
/// anchoring columns are in, identical content always hashes identically.
use crate::crypto::hash::hash_hex;
use crate::error::{AnchorError, Result};
use crate::state::models::AnchorRecord;

/// Deterministic encoding of the row content, anchoring columns excluded.
pub fn canonical_bytes(record: &AnchorRecord) -> Result<Vec<u8>> {
    let mut clean = record.clone();
    clean.anchor_mut().clear();

    let encoded = match &clean {
        AnchorRecord::Project(p) => serde_json::to_vec(p),
        AnchorRecord::Resume(r) => serde_json::to_vec(r),
        AnchorRecord::Interview(i) => serde_json::to_vec(i),
    };

    encoded.map_err(|e| AnchorError::Serialization(format!("row {}: {e}", record.id())))
}

/// Hex-encoded 256-bit digest of [`canonical_bytes`].
pub fn canonical_hash(record: &AnchorRecord) -> Result<String> {
    Ok(hash_hex(&canonical_bytes(record)?))
}
