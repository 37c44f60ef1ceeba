//! Lifecycle states of an ingested log.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State machine for one ingested log.
///
/// ```text
/// Received -> Parsing -> Parsed -> Aggregating -> Ready -> Deleted
///                     \-> ParseFailed           \-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogState {
    Received,
    Parsing,
    Parsed,
    ParseFailed,
    Aggregating,
    Ready,
    /// Post-parse failure (store error or cancellation), rolled back
    Failed,
    Deleted,
}

impl LogState {
    /// Whether the pipeline may move from `self` to `next`.
    pub fn can_transition_to(self, next: LogState) -> bool {
        use LogState::*;
        matches!(
            (self, next),
            (Received, Parsing)
                | (Received, ParseFailed)
                | (Parsing, Parsed)
                | (Parsing, ParseFailed)
                | (Parsed, Aggregating)
                | (Parsed, Failed)
                | (Aggregating, Ready)
                | (Aggregating, Failed)
                | (Ready, Deleted)
                | (ParseFailed, Deleted)
                | (Failed, Deleted)
        )
    }

    /// No further pipeline transitions happen from a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LogState::Ready | LogState::ParseFailed | LogState::Failed | LogState::Deleted
        )
    }

    /// Whether derived samples and stats may be read.
    pub fn is_queryable(self) -> bool {
        self == LogState::Ready
    }
}

impl fmt::Display for LogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogState::Received => "RECEIVED",
            LogState::Parsing => "PARSING",
            LogState::Parsed => "PARSED",
            LogState::ParseFailed => "PARSE_FAILED",
            LogState::Aggregating => "AGGREGATING",
            LogState::Ready => "READY",
            LogState::Failed => "FAILED",
            LogState::Deleted => "DELETED",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::LogState::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Received.can_transition_to(Parsing));
        assert!(Parsing.can_transition_to(Parsed));
        assert!(Parsed.can_transition_to(Aggregating));
        assert!(Aggregating.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Deleted));
    }

    #[test]
    fn test_aggregation_only_reachable_from_parsed() {
        assert!(!Parsing.can_transition_to(Aggregating));
        assert!(!ParseFailed.can_transition_to(Aggregating));
        assert!(!Received.can_transition_to(Ready));
        assert!(!Parsing.can_transition_to(Ready));
    }

    #[test]
    fn test_parse_failed_is_terminal() {
        assert!(ParseFailed.is_terminal());
        assert!(!ParseFailed.can_transition_to(Parsing));
        assert!(!ParseFailed.can_transition_to(Parsed));
    }

    #[test]
    fn test_display_matches_serde() {
        assert_eq!(ParseFailed.to_string(), "PARSE_FAILED");
        assert_eq!(
            serde_json::to_string(&ParseFailed).unwrap(),
            "\"PARSE_FAILED\""
        );
    }
}
