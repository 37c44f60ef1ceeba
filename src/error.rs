//! Crate-level error type.
//!
//! Components keep their own error enums; [`PerfLogError`] gathers them for
//! callers that drive several components at once, such as the CLI.

use crate::ingestion::IngestionError;
use crate::logging::LoggingError;
use crate::parser::FormatError;
use crate::selector::SelectorSyntaxError;
use crate::stats::StatsError;
use crate::store::StoreError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PerfLogError {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Selector(#[from] SelectorSyntaxError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    /// Errors related to configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to IO operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PerfLogError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias for operations that can result in a PerfLogError
pub type PerfLogResult<T> = Result<T, PerfLogError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::LogId;

    #[test]
    fn test_component_errors_convert() {
        let id = LogId::new();
        let err: PerfLogError = IngestionError::NotFound(id).into();
        assert!(matches!(err, PerfLogError::Ingestion(_)));
        assert_eq!(err.to_string(), format!("Log not found: {}", id));

        let err: PerfLogError = StoreError::corrupt("bad bytes").into();
        assert!(matches!(err, PerfLogError::Store(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_config_error_message() {
        let err = PerfLogError::config("storage_path is empty");
        assert_eq!(err.to_string(), "Configuration error: storage_path is empty");
    }
}
