//! Error types for the selector module

use thiserror::Error;

/// Malformed selector text. Rejected before any evaluation happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid selector at position {position}: {message}")]
pub struct SelectorSyntaxError {
    /// Byte offset into the selector text
    pub position: usize,
    pub message: String,
}

impl SelectorSyntaxError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Result type for selector parsing
pub type SelectorResult<T> = Result<T, SelectorSyntaxError>;
