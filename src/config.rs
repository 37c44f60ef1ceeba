//! Top-level configuration: where data lives, how loud to log, and the
//! ingestion settings.
//!
//! ```toml
//! storage_path = "/var/lib/perflog"
//! log_level = "debug"
//!
//! [ingestion]
//! parse_timeout_secs = 120
//! eager_group_by = ["none", "label"]
//!
//! [ingestion.parser]
//! maxErrorRatio = 0.1
//! ```

use crate::error::{PerfLogError, PerfLogResult};
use crate::ingestion::IngestionConfig;
use crate::logging;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory used when no storage path is configured.
pub fn default_storage_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("perflog")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfLogConfig {
    /// Directory of the sled database
    pub storage_path: PathBuf,
    /// Default level for `logging::init`; `RUST_LOG` wins when set
    pub log_level: String,
    pub ingestion: IngestionConfig,
}

impl Default for PerfLogConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            log_level: "info".to_string(),
            ingestion: IngestionConfig::default(),
        }
    }
}

impl PerfLogConfig {
    /// Read a TOML file. Missing keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> PerfLogResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PerfLogError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Load from `path` when given, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> PerfLogResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// `PERFLOG_STORAGE_PATH`, `PERFLOG_LOG_LEVEL`, then the ingestion
    /// variables.
    pub fn apply_env_vars(&mut self) -> PerfLogResult<()> {
        if let Ok(path) = env::var("PERFLOG_STORAGE_PATH") {
            self.storage_path = PathBuf::from(path);
        }
        if let Ok(level) = env::var("PERFLOG_LOG_LEVEL") {
            self.log_level = level;
        }
        self.ingestion.apply_env_vars()?;
        Ok(())
    }

    pub fn validate(&self) -> PerfLogResult<()> {
        if self.storage_path.as_os_str().is_empty() {
            return Err(PerfLogError::config("storage_path must not be empty"));
        }
        logging::parse_level(&self.log_level)?;
        self.ingestion.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::GroupBy;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_validate() {
        let config = PerfLogConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.storage_path.ends_with("perflog"));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("perflog.toml");
        fs::write(
            &path,
            r#"
            storage_path = "/tmp/perflog-test"
            log_level = "debug"

            [ingestion]
            parse_timeout_secs = 30
            eager_group_by = ["code"]

            [ingestion.parser]
            maxErrorRatio = 0.25
            "#,
        )
        .unwrap();

        let config = PerfLogConfig::from_file(&path).unwrap();
        assert_eq!(config.storage_path, PathBuf::from("/tmp/perflog-test"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.ingestion.parse_timeout_secs, 30);
        assert_eq!(config.ingestion.eager_group_by, vec![GroupBy::ResponseCode]);
        assert_eq!(config.ingestion.parser.max_error_ratio, 0.25);
    }

    #[test]
    fn test_invalid_level_rejected() {
        let config = PerfLogConfig {
            log_level: "chatty".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PerfLogError::Logging(_))));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempdir().unwrap();
        let result = PerfLogConfig::from_file(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(PerfLogError::Config(_))));
    }
}
