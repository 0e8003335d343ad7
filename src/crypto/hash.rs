/// BLAKE3 hashing utilities.
///
/// BLAKE3 is used for:
/// - Canonical content hashes of anchorable records
/// - Fixed-width batch keys derived from a counter/time preimage

/// Hash arbitrary data with BLAKE3.
pub fn hash(data: &[u8]) -> [u8; 32] {
    blake3::hash(data).into()
}

/// Hash arbitrary data and return the lowercase hex digest (64 chars).
pub fn hash_hex(data: &[u8]) -> String {
    hex::encode(hash(data))
}

/// Check that a string looks like a digest produced by [`hash_hex`].
pub fn is_digest_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
