//! Request and status types exchanged with callers.

use crate::parser::{LogFormat, ParserConfig, RowError};
use crate::sample::{Labels, Log, LogId, LogState};
use crate::stats::GroupBy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One upload to ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub name: String,
    pub content: Vec<u8>,
    /// Declared format; sniffed from the content when unset
    pub format: Option<LogFormat>,
    pub labels: Labels,
    /// Replaces the service's parser options for this upload
    pub parser: Option<ParserConfig>,
    /// Replaces the service's parse timeout for this upload
    pub parse_timeout: Option<Duration>,
}

impl IngestRequest {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            format: None,
            labels: Labels::new(),
            parser: None,
            parse_timeout: None,
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels.extend(labels);
        self
    }

    pub fn with_parser_config(mut self, parser: ParserConfig) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_parse_timeout(mut self, timeout: Duration) -> Self {
        self.parse_timeout = Some(timeout);
        self
    }
}

/// What callers see of an ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestStatus {
    pub id: LogId,
    pub name: String,
    pub state: LogState,
    pub format: Option<LogFormat>,
    pub sample_count: u64,
    pub row_error_count: u64,
    /// Malformed rows in line order, possibly truncated
    pub row_errors: Vec<RowError>,
    /// Why the log ended in `ParseFailed` or `Failed`
    pub failure: Option<String>,
}

impl From<&Log> for IngestStatus {
    fn from(log: &Log) -> Self {
        Self {
            id: log.id,
            name: log.name.clone(),
            state: log.state,
            format: log.format,
            sample_count: log.sample_count,
            row_error_count: log.row_error_count,
            row_errors: log.row_errors.clone(),
            failure: log.failure.clone(),
        }
    }
}

/// Stats query over the logs a selector picks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Selector over log labels
    pub selector: String,
    pub window_ms: u64,
    #[serde(default)]
    pub group_by: GroupBy,
    /// Selector over sample labels (`label`, `success`, `code`); results are
    /// computed on the fly and never cached
    #[serde(default)]
    pub sample_selector: Option<String>,
}

impl QueryRequest {
    pub fn new(selector: impl Into<String>, window_ms: u64) -> Self {
        Self {
            selector: selector.into(),
            window_ms,
            group_by: GroupBy::None,
            sample_selector: None,
        }
    }

    pub fn group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn filter_samples(mut self, selector: impl Into<String>) -> Self {
        self.sample_selector = Some(selector.into());
        self
    }
}
