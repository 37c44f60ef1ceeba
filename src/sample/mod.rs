//! # Sample Model
//!
//! Canonical in-memory representation of parsed measurements and of the logs
//! that own them.
//!
//! * `Sample` - one measurement row
//! * `Log` - one uploaded raw artifact, its lifecycle state and parse outcome
//! * `LogState` - the ingestion state machine

pub mod logfile;
pub mod state;

pub use logfile::{Log, LogId};
pub use state::LogState;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key/value labels attached to a log.
pub type Labels = BTreeMap<String, String>;

/// One measurement row.
///
/// Samples are immutable once parsed and always belong to exactly one log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp as written in the raw log, in milliseconds
    pub timestamp_ms: i64,
    /// Sampler label (non-unique)
    pub label: String,
    /// Elapsed time in milliseconds
    pub elapsed_ms: u64,
    /// Whether the sample succeeded
    pub success: bool,
    /// Response size in bytes, if the log records it
    pub bytes: Option<u64>,
    /// Response code, if the log records it
    pub response_code: Option<String>,
    /// Set when a numeric field overflowed and was clamped
    #[serde(default)]
    pub clamped: bool,
}

impl Sample {
    /// Create a sample with no optional fields.
    pub fn new(timestamp_ms: i64, label: impl Into<String>, elapsed_ms: u64, success: bool) -> Self {
        Self {
            timestamp_ms,
            label: label.into(),
            elapsed_ms,
            success,
            bytes: None,
            response_code: None,
            clamped: false,
        }
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = Some(bytes);
        self
    }

    pub fn with_response_code(mut self, code: impl Into<String>) -> Self {
        self.response_code = Some(code.into());
        self
    }

    /// Milliseconds elapsed between `start_ms` and this sample.
    pub fn offset_from(&self, start_ms: i64) -> i64 {
        self.timestamp_ms.saturating_sub(start_ms)
    }
}
