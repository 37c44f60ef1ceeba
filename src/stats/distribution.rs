//! Latency distribution of a whole log: a log-scaled histogram plus the
//! percentile curve, both read off an HDR histogram of elapsed times.

use super::error::{StatsError, StatsResult};
use super::window::GroupBy;
use crate::log_aggregator_debug;
use crate::sample::{LogId, Sample};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Significant decimal digits kept by the histogram. Values below 2048 ms
/// are recorded exactly.
pub const SIGNIFICANT_DIGITS: u8 = 3;

/// Upper bound of the first histogram bucket, in milliseconds.
pub const FIRST_BUCKET_MS: u64 = 1;

/// Growth factor between consecutive bucket bounds.
pub const BUCKET_LOG_BASE: f64 = 1.1;

/// Percentile steps per halving of the remaining distance to 100%.
pub const PERCENTILE_TICKS_PER_HALF_DISTANCE: u32 = 5;

/// Samples whose elapsed time is at most `upper_ms` and above the previous
/// bucket's bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub upper_ms: u64,
    pub count: u64,
}

/// One point of the percentile curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentilePoint {
    /// Share of samples at or below `value_ms`, 0 to 100
    pub percentile: f64,
    pub value_ms: u64,
    /// Samples added since the previous point
    pub count: u64,
}

/// Latency distribution for one group of a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub log_id: LogId,
    /// Group key, `None` for the whole log
    pub group: Option<String>,
    pub count: u64,
    pub histogram: Vec<HistogramBucket>,
    pub percentiles: Vec<PercentilePoint>,
}

impl Distribution {
    fn from_histogram(log_id: LogId, group: Option<String>, hist: &Histogram<u64>) -> Self {
        let mut histogram: Vec<HistogramBucket> = Vec::new();
        for step in hist.iter_log(FIRST_BUCKET_MS, BUCKET_LOG_BASE) {
            let upper_ms = step.value_iterated_to();
            let count = step.count_since_last_iteration();
            // Small values map several steps onto one bound; keep the first.
            if count == 0 && histogram.last().map_or(false, |b| b.upper_ms == upper_ms) {
                continue;
            }
            histogram.push(HistogramBucket { upper_ms, count });
        }

        let percentiles = hist
            .iter_quantiles(PERCENTILE_TICKS_PER_HALF_DISTANCE)
            .map(|step| PercentilePoint {
                percentile: step.quantile() * 100.0,
                value_ms: step.value_iterated_to(),
                count: step.count_since_last_iteration(),
            })
            .collect();

        Self {
            log_id,
            group,
            count: hist.len(),
            histogram,
            percentiles,
        }
    }

    /// Number of samples counted across the histogram buckets.
    pub fn histogram_total(&self) -> u64 {
        self.histogram.iter().map(|b| b.count).sum()
    }
}

/// One distribution per group, ordered by group key. No samples, no
/// distributions.
pub fn distributions<'a, I>(log_id: LogId, group_by: GroupBy, samples: I) -> StatsResult<Vec<Distribution>>
where
    I: IntoIterator<Item = &'a Sample>,
{
    let mut groups: BTreeMap<Option<String>, Histogram<u64>> = BTreeMap::new();
    for sample in samples {
        let hist = match groups.entry(group_by.key_of(sample)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(
                Histogram::new(SIGNIFICANT_DIGITS)
                    .map_err(|e| StatsError::Histogram(e.to_string()))?,
            ),
        };
        hist.record(sample.elapsed_ms)
            .map_err(|e| StatsError::Histogram(format!("{} ms: {}", sample.elapsed_ms, e)))?;
    }

    let result: Vec<Distribution> = groups
        .iter()
        .map(|(group, hist)| Distribution::from_histogram(log_id, group.clone(), hist))
        .collect();
    log_aggregator_debug!(
        "Built {} latency distributions for log {} by {}",
        result.len(),
        log_id,
        group_by
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(values: impl IntoIterator<Item = u64>, label: &str) -> Vec<Sample> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, elapsed)| Sample::new(i as i64, label, elapsed, true))
            .collect()
    }

    #[test]
    fn test_no_samples_no_distribution() {
        let none: Vec<Sample> = Vec::new();
        assert!(distributions(LogId::new(), GroupBy::None, &none).unwrap().is_empty());
    }

    #[test]
    fn test_histogram_counts_every_sample() {
        let samples = uniform(1..=1_000, "a");
        let dist = &distributions(LogId::new(), GroupBy::None, &samples).unwrap()[0];

        assert_eq!(dist.count, 1_000);
        assert_eq!(dist.histogram_total(), 1_000);
        for pair in dist.histogram.windows(2) {
            assert!(pair[0].upper_ms < pair[1].upper_ms);
        }
        assert!(dist.histogram.last().unwrap().upper_ms >= 1_000);
        // Log-scaled: far fewer buckets than distinct values.
        assert!(dist.histogram.len() < 200);
    }

    #[test]
    fn test_constant_latency_lands_in_one_bucket() {
        let samples = uniform(std::iter::repeat(250).take(40), "a");
        let dist = &distributions(LogId::new(), GroupBy::None, &samples).unwrap()[0];

        let occupied: Vec<&HistogramBucket> = dist.histogram.iter().filter(|b| b.count > 0).collect();
        assert_eq!(occupied.len(), 1);
        assert_eq!(occupied[0].count, 40);
        assert!(occupied[0].upper_ms >= 250);
    }

    #[test]
    fn test_percentile_curve_of_uniform_values() {
        let samples = uniform(1..=100, "a");
        let dist = &distributions(LogId::new(), GroupBy::None, &samples).unwrap()[0];

        let curve = &dist.percentiles;
        assert!(!curve.is_empty());
        for pair in curve.windows(2) {
            assert!(pair[0].percentile <= pair[1].percentile);
            assert!(pair[0].value_ms <= pair[1].value_ms);
        }
        let last = curve.last().unwrap();
        assert_eq!(last.percentile, 100.0);
        assert_eq!(last.value_ms, 100);
        assert_eq!(curve.iter().map(|p| p.count).sum::<u64>(), 100);

        // Exact below 2048 ms, so the median sits at 50.
        let median = curve.iter().find(|p| p.percentile >= 50.0).unwrap();
        assert!((50..=52).contains(&median.value_ms));
    }

    #[test]
    fn test_grouped_by_label() {
        let mut samples = uniform(1..=10, "login");
        samples.extend(uniform(vec![500, 700], "search"));
        let dists = distributions(LogId::new(), GroupBy::Label, &samples).unwrap();

        assert_eq!(dists.len(), 2);
        assert_eq!(dists[0].group.as_deref(), Some("login"));
        assert_eq!(dists[0].count, 10);
        assert_eq!(dists[1].group.as_deref(), Some("search"));
        assert_eq!(dists[1].count, 2);
        assert_eq!(dists[1].percentiles.last().unwrap().value_ms, 700);
    }
}
