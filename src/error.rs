use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnchorError {
    /// The ledger client never initialized, so on-chain reads are impossible.
    #[error("Ledger not configured")]
    LedgerUnavailable,

    #[error("Ledger connection failed: {0}")]
    Connection(String),

    #[error("Ledger read failed: {0}")]
    LedgerRead(String),

    #[error("Ledger write failed: {0}")]
    LedgerWrite(String),

    #[error("Transaction signing failed: {0}")]
    Signing(String),

    #[error("Ledger {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnchorError>;
