//! Windowed aggregation.
//!
//! The aggregator makes a single forward pass and buffers every sample's
//! elapsed time in its (window, group) bucket, so memory is O(samples).
//! Input order does not matter: samples are bucketed by timestamp alone.
//! Buckets are finalized (sorted, percentiles taken) once the pass is done.

use super::error::{StatsError, StatsResult};
use super::stat::{Percentiles, Stat};
use super::window::WindowSpec;
use crate::log_aggregator_debug;
use crate::sample::{LogId, Sample};
use std::collections::{BTreeMap, BTreeSet};

/// Upper bound on windows times groups in one aggregation.
pub const MAX_STATS: u64 = 1_000_000;

#[derive(Debug, Default)]
struct Bucket {
    elapsed: Vec<u64>,
    error_count: u64,
    total_bytes: u64,
    response_codes: BTreeMap<String, u64>,
}

impl Bucket {
    fn add(&mut self, sample: &Sample) {
        self.elapsed.push(sample.elapsed_ms);
        if !sample.success {
            self.error_count += 1;
        }
        self.total_bytes = self.total_bytes.saturating_add(sample.bytes.unwrap_or(0));
        if let Some(code) = &sample.response_code {
            *self.response_codes.entry(code.clone()).or_insert(0) += 1;
        }
    }

    fn into_stat(mut self, log_id: LogId, group: Option<String>, start: i64, end: i64) -> Stat {
        if self.elapsed.is_empty() {
            return Stat::empty(log_id, group, start, end);
        }
        self.elapsed.sort_unstable();
        let count = self.elapsed.len() as u64;
        let sum: u128 = self.elapsed.iter().map(|v| u128::from(*v)).sum();
        let duration_ms = end.saturating_sub(start);
        Stat {
            log_id,
            group,
            window_start_ms: start,
            window_end_ms: end,
            count,
            error_count: self.error_count,
            min_ms: self.elapsed.first().copied(),
            max_ms: self.elapsed.last().copied(),
            mean_ms: Some(sum as f64 / count as f64),
            percentiles: Percentiles::from_sorted(&self.elapsed),
            throughput: (duration_ms > 0).then(|| count as f64 * 1000.0 / duration_ms as f64),
            total_bytes: self.total_bytes,
            response_codes: self.response_codes,
        }
    }
}

/// Computes [`Stat`]s for one log under one [`WindowSpec`].
#[derive(Debug, Clone)]
pub struct Aggregator {
    spec: WindowSpec,
    /// Timestamp window 0 starts at; the log's smallest timestamp
    origin_ms: i64,
}

impl Aggregator {
    pub fn new(spec: WindowSpec, origin_ms: i64) -> StatsResult<Self> {
        spec.validate()?;
        Ok(Self { spec, origin_ms })
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    fn window_index(&self, sample: &Sample) -> i64 {
        sample
            .offset_from(self.origin_ms)
            .div_euclid(self.spec.window_ms_i64())
    }

    /// One stat per (window, group), ordered by window start then group.
    ///
    /// Windows run from the first to the last occupied window with no gaps;
    /// every group seen anywhere gets a stat in every window.
    pub fn aggregate<'a, I>(&self, log_id: LogId, samples: I) -> StatsResult<Vec<Stat>>
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let mut buckets: BTreeMap<(i64, Option<String>), Bucket> = BTreeMap::new();
        let mut groups: BTreeSet<Option<String>> = BTreeSet::new();
        let mut first_window = i64::MAX;
        let mut last_window = i64::MIN;

        for sample in samples {
            let window = self.window_index(sample);
            let group = self.spec.group_by.key_of(sample);
            first_window = first_window.min(window);
            last_window = last_window.max(window);
            groups.insert(group.clone());
            buckets.entry((window, group)).or_default().add(sample);
        }

        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let windows = (last_window as i128 - first_window as i128 + 1) as u128;
        let total = windows.saturating_mul(groups.len() as u128);
        if total > u128::from(MAX_STATS) {
            return Err(StatsError::TooManyStats {
                stats: u64::try_from(total).unwrap_or(u64::MAX),
                limit: MAX_STATS,
            });
        }

        let width = self.spec.window_ms_i64();
        let mut stats = Vec::with_capacity(total as usize);
        for window in first_window..=last_window {
            let start = window.saturating_mul(width);
            let end = start.saturating_add(width);
            for group in &groups {
                let stat = match buckets.remove(&(window, group.clone())) {
                    Some(bucket) => bucket.into_stat(log_id, group.clone(), start, end),
                    None => Stat::empty(log_id, group.clone(), start, end),
                };
                stats.push(stat);
            }
        }

        log_aggregator_debug!(
            "Aggregated log {} at {} into {} stats",
            log_id,
            self.spec,
            stats.len()
        );
        Ok(stats)
    }

    /// One stat per group spanning the whole input.
    ///
    /// The span runs from the smallest offset to one past the largest, so a
    /// single sample still has a non-empty span.
    pub fn summarize<'a, I>(&self, log_id: LogId, samples: I) -> Vec<Stat>
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let mut buckets: BTreeMap<Option<String>, Bucket> = BTreeMap::new();
        let mut first = i64::MAX;
        let mut last = i64::MIN;
        for sample in samples {
            let offset = sample.offset_from(self.origin_ms);
            first = first.min(offset);
            last = last.max(offset);
            buckets
                .entry(self.spec.group_by.key_of(sample))
                .or_default()
                .add(sample);
        }
        let end = last.saturating_add(1);
        buckets
            .into_iter()
            .map(|(group, bucket)| bucket.into_stat(log_id, group, first, end))
            .collect()
    }
}
