use super::percentile::{self, P25, P50, P75, P90, P95, P99};
use crate::sample::LogId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Percentile table of elapsed times, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p25: Option<u64>,
    pub p50: Option<u64>,
    pub p75: Option<u64>,
    pub p90: Option<u64>,
    pub p95: Option<u64>,
    pub p99: Option<u64>,
}

impl Percentiles {
    /// Table for an ascending slice.
    pub fn from_sorted(sorted: &[u64]) -> Self {
        Self {
            p25: percentile::percentile(sorted, P25),
            p50: percentile::percentile(sorted, P50),
            p75: percentile::percentile(sorted, P75),
            p90: percentile::percentile(sorted, P90),
            p95: percentile::percentile(sorted, P95),
            p99: percentile::percentile(sorted, P99),
        }
    }
}

/// Aggregate over the samples of one window and one group.
///
/// Window bounds are offsets in milliseconds from the log start, half-open.
/// Every derived value is `None` when the window has no samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub log_id: LogId,
    /// Group key, `None` for ungrouped stats
    pub group: Option<String>,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
    pub count: u64,
    pub error_count: u64,
    pub min_ms: Option<u64>,
    pub max_ms: Option<u64>,
    pub mean_ms: Option<f64>,
    pub percentiles: Percentiles,
    /// Samples per second over the window duration
    pub throughput: Option<f64>,
    pub total_bytes: u64,
    /// Sample count per response code
    #[serde(default)]
    pub response_codes: BTreeMap<String, u64>,
}

impl Stat {
    /// Stat for a window that received no samples.
    pub fn empty(log_id: LogId, group: Option<String>, window_start_ms: i64, window_end_ms: i64) -> Self {
        Self {
            log_id,
            group,
            window_start_ms,
            window_end_ms,
            count: 0,
            error_count: 0,
            min_ms: None,
            max_ms: None,
            mean_ms: None,
            percentiles: Percentiles::default(),
            throughput: None,
            total_bytes: 0,
            response_codes: BTreeMap::new(),
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.window_end_ms.saturating_sub(self.window_start_ms)
    }

    /// Share of failed samples, `None` for an empty window.
    pub fn error_rate(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.error_count as f64 / self.count as f64)
        }
    }
}
