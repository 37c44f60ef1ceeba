//! Error types for the parser module

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single malformed row. Recoverable: the row is skipped and reported.
///
/// `line` counts data lines, so the header row (if any) is line 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub line: u64,
    pub reason: String,
}

impl RowError {
    pub fn new(line: u64, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

impl std::error::Error for RowError {}

/// Errors that make a whole parse fail
#[derive(Error, Debug)]
pub enum FormatError {
    /// A required column could not be located
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Rows do not have enough columns for the configured mapping
    #[error("Expected at least {expected} columns but found {found}")]
    ColumnCount { expected: usize, found: usize },

    /// The header row itself could not be read
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Too many rows were malformed
    #[error("{failed} of {total} rows failed to parse ({ratio:.1}% exceeds the {threshold:.1}% limit)")]
    ErrorThresholdExceeded {
        failed: u64,
        total: u64,
        ratio: f64,
        threshold: f64,
    },

    /// Configuration that can never match any input
    #[error("Invalid parser configuration: {0}")]
    InvalidConfig(String),

    /// Reading the input failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormatError {
    pub fn missing_column(name: impl Into<String>) -> Self {
        Self::MissingColumn(name.into())
    }

    pub fn malformed_header(msg: impl Into<String>) -> Self {
        Self::MalformedHeader(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Result type for parser operations
pub type ParseResult<T> = Result<T, FormatError>;
