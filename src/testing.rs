//! Helpers for building throwaway services and sample logs in tests.

use crate::ingestion::{IngestionConfig, IngestionResult, IngestionService};
use crate::store::SledLogStore;
use std::sync::Arc;

/// One row of a generated log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row<'a> {
    pub timestamp_ms: i64,
    pub label: &'a str,
    pub elapsed_ms: u64,
    pub success: bool,
    pub response_code: &'a str,
}

impl<'a> Row<'a> {
    pub fn ok(timestamp_ms: i64, label: &'a str, elapsed_ms: u64) -> Self {
        Self {
            timestamp_ms,
            label,
            elapsed_ms,
            success: true,
            response_code: "200",
        }
    }

    pub fn failed(timestamp_ms: i64, label: &'a str, elapsed_ms: u64) -> Self {
        Self {
            timestamp_ms,
            label,
            elapsed_ms,
            success: false,
            response_code: "500",
        }
    }
}

/// Service over a temporary sled database.
pub fn temporary_service(config: IngestionConfig) -> IngestionResult<IngestionService> {
    let store = SledLogStore::temporary()?;
    IngestionService::new(Arc::new(store), config)
}

/// Comma separated log with a `timestamp,label,elapsed,success,responseCode`
/// header.
pub fn csv_log(rows: &[Row<'_>]) -> String {
    let mut out = String::from("timestamp,label,elapsed,success,responseCode\n");
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            row.timestamp_ms, row.label, row.elapsed_ms, row.success, row.response_code
        ));
    }
    out
}

/// Headerless log in JMeter's default twelve-column layout.
pub fn jtl_log(rows: &[Row<'_>]) -> String {
    let mut out = String::new();
    for row in rows {
        let message = if row.success { "OK" } else { "Internal Server Error" };
        out.push_str(&format!(
            "{},{},{},{},{},Thread Group 1-1,text,{},512,1,1,{}\n",
            row.timestamp_ms,
            row.elapsed_ms,
            row.label,
            row.response_code,
            message,
            row.success,
            row.elapsed_ms / 2
        ));
    }
    out
}
