//! Error types for the ingestion module

use crate::parser::FormatError;
use crate::sample::{LogId, LogState};
use crate::selector::SelectorSyntaxError;
use crate::stats::StatsError;
use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by ingestion and query operations
#[derive(Error, Debug)]
pub enum IngestionError {
    /// The content could not be parsed as a whole
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Malformed selector text
    #[error("{0}")]
    Selector(#[from] SelectorSyntaxError),

    /// Persistence failure; the in-flight log was rolled back
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid window parameters or an oversized aggregation
    #[error("Aggregation error: {0}")]
    Stats(#[from] StatsError),

    /// Parsing exceeded its time bound
    #[error("Parsing timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the ingestion
    #[error("Ingestion cancelled")]
    Cancelled,

    #[error("Log not found: {0}")]
    NotFound(LogId),

    /// The operation does not apply to the log's current state
    #[error("Cannot {action} log {id} in state {state}")]
    InvalidState {
        id: LogId,
        state: LogState,
        action: String,
    },

    /// Configuration errors (bad values, unreadable files, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A blocking worker panicked or was aborted
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl IngestionError {
    /// Create a new configuration error
    pub fn configuration_error(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state(id: LogId, state: LogState, action: impl Into<String>) -> Self {
        Self::InvalidState {
            id,
            state,
            action: action.into(),
        }
    }
}

impl From<tokio::task::JoinError> for IngestionError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Worker(error.to_string())
    }
}

/// Result type for ingestion operations
pub type IngestionResult<T> = std::result::Result<T, IngestionError>;
