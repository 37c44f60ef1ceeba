//! Nearest-rank percentiles.
//!
//! Percentiles are given in thousandths of a percent (`95_000` is p95) so the
//! rank is computed exactly in integer arithmetic.

/// One hundred percent, in thousandths of a percent.
pub const HUNDRED_PERCENT: u32 = 100_000;

pub const P25: u32 = 25_000;
pub const P50: u32 = 50_000;
pub const P75: u32 = 75_000;
pub const P90: u32 = 90_000;
pub const P95: u32 = 95_000;
pub const P99: u32 = 99_000;

/// 1-based nearest rank `ceil(p/100 * n)`, at least 1.
pub fn nearest_rank(p_milli: u32, n: usize) -> usize {
    let p = u128::from(p_milli.min(HUNDRED_PERCENT));
    let n_wide = n as u128;
    let rank = (p * n_wide + u128::from(HUNDRED_PERCENT) - 1) / u128::from(HUNDRED_PERCENT);
    (rank as usize).clamp(1, n.max(1))
}

/// Value at the nearest rank of an ascending slice; `None` when empty.
pub fn percentile(sorted: &[u64], p_milli: u32) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    Some(sorted[nearest_rank(p_milli, sorted.len()) - 1])
}
