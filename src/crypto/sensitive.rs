/// Wrapper for signing-key material that is zeroized on drop and never
/// printed.
use std::fmt;
use std::str::FromStr;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A hex-encoded secret (e.g. an account private key).
///
/// An optional `0x` prefix is stripped on construction.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretHex(String);

impl SecretHex {
    pub fn new(value: impl Into<String>) -> Self {
        let mut raw: String = value.into();
        let trimmed = raw.trim().trim_start_matches("0x").to_string();
        raw.zeroize();
        Self(trimmed)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the secret is a 32-byte value in hex.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 64 && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl FromStr for SecretHex {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Debug for SecretHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("SecretHex(<empty>)")
        } else {
            f.write_str("SecretHex(<redacted>)")
        }
    }
}
