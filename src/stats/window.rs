//! Window and grouping parameters for an aggregation.

use super::error::{StatsError, StatsResult};
use crate::sample::Sample;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How samples are split into groups inside each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// One group per window
    None,
    /// One group per sampler label
    Label,
    /// One group per response code
    ResponseCode,
}

/// Group used for samples without a response code.
pub const NO_RESPONSE_CODE: &str = "-";

impl GroupBy {
    /// Group key of a sample; `None` for ungrouped aggregation.
    pub fn key_of(self, sample: &Sample) -> Option<String> {
        match self {
            GroupBy::None => None,
            GroupBy::Label => Some(sample.label.clone()),
            GroupBy::ResponseCode => Some(
                sample
                    .response_code
                    .clone()
                    .unwrap_or_else(|| NO_RESPONSE_CODE.to_string()),
            ),
        }
    }
}

impl Default for GroupBy {
    fn default() -> Self {
        GroupBy::None
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupBy::None => "none",
            GroupBy::Label => "label",
            GroupBy::ResponseCode => "response_code",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for GroupBy {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(GroupBy::None),
            "label" => Ok(GroupBy::Label),
            "code" | "response_code" | "responsecode" => Ok(GroupBy::ResponseCode),
            other => Err(StatsError::UnknownGrouping(other.to_string())),
        }
    }
}

/// Window size plus grouping; the cache key for persisted stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSpec {
    pub window_ms: u64,
    #[serde(default)]
    pub group_by: GroupBy,
}

impl WindowSpec {
    pub fn new(window_ms: u64, group_by: GroupBy) -> StatsResult<Self> {
        let spec = Self {
            window_ms,
            group_by,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> StatsResult<()> {
        if self.window_ms == 0 || self.window_ms > i64::MAX as u64 {
            return Err(StatsError::InvalidWindow(self.window_ms));
        }
        Ok(())
    }

    /// Stable storage key, e.g. `60000ms/label`.
    pub fn cache_key(&self) -> String {
        format!("{}ms/{}", self.window_ms, self.group_by)
    }

    pub(crate) fn window_ms_i64(&self) -> i64 {
        i64::try_from(self.window_ms).unwrap_or(i64::MAX)
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cache_key())
    }
}
