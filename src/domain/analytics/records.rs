//! Routing analytics record types.
//!
//! The wire/storage shapes here are part of the persisted-state interface:
//! field names and the `outcome` enum values must stay stable for report
//! compatibility.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::catalog::Domain;
use crate::domain::foundation::Timestamp;

/// Outcome label stored on every routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingOutcome {
    Success,
    Failure,
    /// Auto-corrected by the routing validator.
    Correction,
    /// Low confidence.
    Uncertain,
    /// Cross-domain query.
    Mixed,
}

impl RoutingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingOutcome::Success => "success",
            RoutingOutcome::Failure => "failure",
            RoutingOutcome::Correction => "correction",
            RoutingOutcome::Uncertain => "uncertain",
            RoutingOutcome::Mixed => "mixed",
        }
    }
}

impl fmt::Display for RoutingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error parsing an outcome string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown routing outcome: {0}")]
pub struct ParseOutcomeError(String);

impl FromStr for RoutingOutcome {
    type Err = ParseOutcomeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RoutingOutcome::Success),
            "failure" => Ok(RoutingOutcome::Failure),
            "correction" => Ok(RoutingOutcome::Correction),
            "uncertain" => Ok(RoutingOutcome::Uncertain),
            "mixed" => Ok(RoutingOutcome::Mixed),
            other => Err(ParseOutcomeError(other.to_string())),
        }
    }
}

/// A stored routing decision row. Append-only.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingRecord {
    pub id: i64,
    pub timestamp: Timestamp,
    pub query: String,
    pub query_length: usize,
    pub detected_domain: Option<Domain>,
    pub routed_tool: String,
    pub confidence: Option<f64>,
    pub parser_used: bool,
    pub validator_used: bool,
    pub cross_domain: bool,
    pub outcome: RoutingOutcome,
    pub execution_time_ms: Option<f64>,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
}

/// A stored correction row, foreign-keyed to a routing decision.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionRecord {
    pub id: i64,
    pub routing_decision_id: i64,
    pub timestamp: Timestamp,
    pub original_tool: String,
    pub corrected_tool: String,
    pub reason: String,
    pub validator_confidence: Option<f64>,
}

/// An aggregated misrouting pattern, upserted by pattern hash.
#[derive(Debug, Clone, Serialize)]
pub struct MisroutingPattern {
    pub query_pattern: String,
    pub wrong_tool: String,
    pub correct_tool: String,
    pub occurrences: i64,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub avg_confidence: Option<f64>,
    pub resolved: bool,
}

/// Hash identifying a misrouting pattern.
pub fn pattern_hash(query_pattern: &str, wrong_tool: &str, correct_tool: &str) -> String {
    format!("{}|{}|{}", query_pattern, wrong_tool, correct_tool)
}

/// Aggregate routing metrics over a look-back window.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoutingMetrics {
    pub period_days: i64,
    pub total_routings: i64,
    pub successful_routings: i64,
    pub failed_routings: i64,
    pub corrected_routings: i64,
    /// successful / total over the window.
    pub accuracy: f64,
    pub avg_confidence: f64,
    pub avg_execution_time_ms: f64,
    pub parser_usage_rate: f64,
    pub validator_usage_rate: f64,
    pub cross_domain_rate: f64,
}

/// Per-day rollup row for the `daily_metrics` relation.
#[derive(Debug, Clone, Serialize)]
pub struct DailyRollup {
    pub date: chrono::NaiveDate,
    pub total_routings: i64,
    pub successful_routings: i64,
    pub failed_routings: i64,
    pub corrected_routings: i64,
    pub avg_confidence: f64,
    pub avg_execution_time_ms: f64,
    pub parser_usage_rate: f64,
    pub validator_usage_rate: f64,
    pub cross_domain_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_strings_are_stable() {
        assert_eq!(RoutingOutcome::Success.as_str(), "success");
        assert_eq!(RoutingOutcome::Correction.as_str(), "correction");
        assert_eq!(RoutingOutcome::Mixed.as_str(), "mixed");
    }

    #[test]
    fn outcome_round_trips() {
        for outcome in [
            RoutingOutcome::Success,
            RoutingOutcome::Failure,
            RoutingOutcome::Correction,
            RoutingOutcome::Uncertain,
            RoutingOutcome::Mixed,
        ] {
            assert_eq!(outcome.as_str().parse::<RoutingOutcome>().unwrap(), outcome);
        }
        assert!("sideways".parse::<RoutingOutcome>().is_err());
    }

    #[test]
    fn pattern_hash_is_pipe_separated() {
        assert_eq!(
            pattern_hash("What tasks...", "calendar", "tasks"),
            "What tasks...|calendar|tasks"
        );
    }
}
