//! Error types for the store module

use crate::sample::LogId;
use sled::transaction::TransactionError;
use thiserror::Error;

/// Persistence boundary failures. Never swallowed: the pipeline rolls back
/// and reports them.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Log not found: {0}")]
    NotFound(LogId),

    #[error("Log already exists: {0}")]
    AlreadyExists(LogId),

    #[error("Log has been deleted: {0}")]
    Deleted(LogId),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(error: TransactionError<StoreError>) -> Self {
        match error {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => StoreError::Database(e),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
