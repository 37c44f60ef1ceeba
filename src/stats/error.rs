//! Error types for the stats module

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    /// The window size is zero or too large to do arithmetic with
    #[error("Invalid window size: {0} ms")]
    InvalidWindow(u64),

    /// Unknown grouping name
    #[error("Unknown grouping: {0}")]
    UnknownGrouping(String),

    /// The span divided by the window size produces too many stats
    #[error("{stats} stats would be produced, more than the limit of {limit}")]
    TooManyStats { stats: u64, limit: u64 },

    /// The latency histogram could not be built or could not take a value
    #[error("Histogram error: {0}")]
    Histogram(String),
}

pub type StatsResult<T> = Result<T, StatsError>;
