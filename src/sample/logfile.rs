//! The `Log` record: one uploaded raw artifact.

use super::{Labels, LogState};
use crate::parser::{LogFormat, RowError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of an ingested log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(Uuid);

impl LogId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LogId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LogId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One uploaded raw artifact and its parse outcome.
///
/// The raw content itself lives in the store; the record keeps its hash and
/// size. Status transitions are the only mutation after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub id: LogId,
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
    /// Hex SHA-256 of the raw content
    pub content_sha256: String,
    pub content_len: u64,
    #[serde(default)]
    pub labels: Labels,
    pub state: LogState,
    /// Format used to parse the content, once known
    pub format: Option<LogFormat>,
    /// Smallest sample timestamp; window offsets are relative to it
    pub start_ms: Option<i64>,
    pub sample_count: u64,
    /// Total number of malformed rows
    pub row_error_count: u64,
    /// Malformed rows in line order, possibly truncated
    #[serde(default)]
    pub row_errors: Vec<RowError>,
    /// Reason for a terminal failure
    pub failure: Option<String>,
}

impl Log {
    /// Create a record for freshly received content.
    pub fn received(name: impl Into<String>, content: &[u8], labels: Labels) -> Self {
        Self {
            id: LogId::new(),
            name: name.into(),
            uploaded_at: Utc::now(),
            content_sha256: hex::encode(Sha256::digest(content)),
            content_len: content.len() as u64,
            labels,
            state: LogState::Received,
            format: None,
            start_ms: None,
            sample_count: 0,
            row_error_count: 0,
            row_errors: Vec::new(),
            failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_log_hashes_content() {
        let log = Log::received("run-1", b"abc", Labels::new());
        assert_eq!(log.state, LogState::Received);
        assert_eq!(log.content_len, 3);
        assert_eq!(
            log.content_sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_log_id_round_trips_through_string() {
        let id = LogId::new();
        let parsed: LogId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<LogId>().is_err());
    }
}
