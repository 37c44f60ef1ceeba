//! # Aggregator
//!
//! Windowed statistics over a log's samples.
//!
//! * `window` - [`WindowSpec`] and [`GroupBy`], the key stats are cached under
//! * `stat` - the [`Stat`] record and its [`Percentiles`] table
//! * `percentile` - exact nearest-rank percentiles
//! * `aggregator` - the single-pass [`Aggregator`]
//! * `distribution` - log-scaled latency histogram and percentile curve

pub mod aggregator;
pub mod distribution;
pub mod error;
pub mod percentile;
pub mod stat;
pub mod window;

pub use aggregator::Aggregator;
pub use distribution::{distributions, Distribution, HistogramBucket, PercentilePoint};
pub use error::{StatsError, StatsResult};
pub use stat::{Percentiles, Stat};
pub use window::{GroupBy, WindowSpec};
