//! Configuration for the ingestion module

use super::error::{IngestionError, IngestionResult};
use crate::parser::ParserConfig;
use crate::stats::{GroupBy, WindowSpec};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the ingestion pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Upper bound on parsing one log, in seconds
    pub parse_timeout_secs: u64,
    /// Window size of the stats computed right after parsing
    pub default_window_ms: u64,
    /// Groupings computed right after parsing at `default_window_ms`
    pub eager_group_by: Vec<GroupBy>,
    /// How many pipelines may run at once
    pub max_concurrent_ingestions: usize,
    /// Default parser options; requests may override them
    pub parser: ParserConfig,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            parse_timeout_secs: 300,
            default_window_ms: 60_000,
            eager_group_by: vec![GroupBy::None, GroupBy::Label],
            max_concurrent_ingestions: 4,
            parser: ParserConfig::default(),
        }
    }
}

fn override_value<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> IngestionResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            IngestionError::configuration_error(format!("{}='{}': {}", name, raw, e))
        }),
        None => Ok(None),
    }
}

impl IngestionConfig {
    /// Defaults overridden by `PERFLOG_*` environment variables.
    pub fn from_env() -> IngestionResult<Self> {
        let mut config = Self::default();
        config.apply_env_vars()?;
        Ok(config)
    }

    /// Override fields from `PERFLOG_*` environment variables.
    pub fn apply_env_vars(&mut self) -> IngestionResult<()> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    /// Override fields from `PERFLOG_*` variables resolved through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> IngestionResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secs) = override_value(&lookup, "PERFLOG_PARSE_TIMEOUT_SECS")? {
            self.parse_timeout_secs = secs;
        }
        if let Some(window) = override_value(&lookup, "PERFLOG_DEFAULT_WINDOW_MS")? {
            self.default_window_ms = window;
        }
        if let Some(limit) = override_value(&lookup, "PERFLOG_MAX_CONCURRENT_INGESTIONS")? {
            self.max_concurrent_ingestions = limit;
        }
        if let Some(ratio) = override_value(&lookup, "PERFLOG_MAX_ERROR_RATIO")? {
            self.parser.max_error_ratio = ratio;
        }
        if let Some(raw) = lookup("PERFLOG_EAGER_GROUP_BY") {
            self.eager_group_by = raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.parse::<GroupBy>())
                .collect::<Result<_, _>>()
                .map_err(|e| {
                    IngestionError::configuration_error(format!("PERFLOG_EAGER_GROUP_BY: {}", e))
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> IngestionResult<()> {
        if self.parse_timeout_secs == 0 {
            return Err(IngestionError::configuration_error(
                "parse_timeout_secs must be positive",
            ));
        }
        if self.max_concurrent_ingestions == 0 {
            return Err(IngestionError::configuration_error(
                "max_concurrent_ingestions must be positive",
            ));
        }
        WindowSpec::new(self.default_window_ms, GroupBy::None)?;
        self.parser.validate()?;
        Ok(())
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_secs(self.parse_timeout_secs)
    }

    /// Specs computed and persisted right after parsing.
    pub fn eager_specs(&self) -> Vec<WindowSpec> {
        self.eager_group_by
            .iter()
            .map(|group_by| WindowSpec {
                window_ms: self.default_window_ms,
                group_by: *group_by,
            })
            .collect()
    }
}
