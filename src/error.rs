//! Failure taxonomy shared by the ledger engine, its stores and the HTTP layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("invalid address format: {0}")]
    InvalidAddressFormat(String),

    #[error("insufficient funds: {address} holds {balance}, transfer needs {required}")]
    InsufficientFunds {
        address: String,
        balance: u64,
        required: u64,
    },

    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("previous block {submitted} does not match chain tip {tip}")]
    PrevBlockMismatch { submitted: String, tip: String },

    #[error("block hash {submitted} does not match computed hash {expected}")]
    InvalidBlockHash { submitted: String, expected: String },

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Fatal for the current request. Never retried by the engine.
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl LedgerError {
    /// Stable tag rendered next to the human-readable message.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidAddressFormat(_) => "invalid_address_format",
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::InvalidRecipient(_) => "invalid_recipient",
            LedgerError::PrevBlockMismatch { .. } => "prev_block_mismatch",
            LedgerError::InvalidBlockHash { .. } => "invalid_block_hash",
            LedgerError::MalformedRequest(_) => "malformed_request",
            LedgerError::StorageFailure(_) => "storage_failure",
        }
    }

    pub fn is_validation(&self) -> bool {
        !matches!(self, LedgerError::StorageFailure(_))
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::StorageFailure(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::StorageFailure(format!("corrupt record: {}", err))
    }
}
