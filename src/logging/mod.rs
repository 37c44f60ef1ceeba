//! # Logging
//!
//! Library code only talks to the `log` facade, under the per-component
//! targets in [`features`]. Binaries call [`init`] once to install
//! `env_logger`; `RUST_LOG` takes precedence over the configured level.

pub mod features;

pub use features::{LogFeature, PerformanceTimer};

/// Logging setup errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logging system already initialized")]
    AlreadyInitialized,
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),
}

/// Parse a level name such as `info` or `DEBUG`.
pub fn parse_level(level: &str) -> Result<log::LevelFilter, LoggingError> {
    match level.trim().to_ascii_uppercase().as_str() {
        "OFF" => Ok(log::LevelFilter::Off),
        "TRACE" => Ok(log::LevelFilter::Trace),
        "DEBUG" => Ok(log::LevelFilter::Debug),
        "INFO" => Ok(log::LevelFilter::Info),
        "WARN" | "WARNING" => Ok(log::LevelFilter::Warn),
        "ERROR" => Ok(log::LevelFilter::Error),
        _ => Err(LoggingError::InvalidLevel(level.to_string())),
    }
}

/// Install `env_logger` with `level` as the default filter.
pub fn init(level: &str) -> Result<(), LoggingError> {
    let filter = parse_level(level)?;
    env_logger::Builder::new()
        .filter_level(filter)
        .parse_env("RUST_LOG")
        .format_timestamp_millis()
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("info").unwrap(), log::LevelFilter::Info);
        assert_eq!(parse_level("WARNING").unwrap(), log::LevelFilter::Warn);
        assert!(matches!(
            parse_level("loud"),
            Err(LoggingError::InvalidLevel(_))
        ));
    }

    #[test]
    fn test_feature_targets() {
        assert_eq!(LogFeature::Parser.target(), "perflog::parser");
        assert_eq!(LogFeature::Ingestion.target(), "perflog::ingestion");
    }
}
