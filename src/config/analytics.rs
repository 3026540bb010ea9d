//! Routing analytics configuration.

use serde::Deserialize;

use super::error::ValidationError;

/// Storage location and reporting knobs for the analytics store.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// SQLite database URL for the durable store.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Default look-back window for metrics queries, in days.
    #[serde(default = "default_period_days")]
    pub default_period_days: i64,

    /// Minimum occurrences for a misrouting pattern to be reported.
    #[serde(default = "default_min_pattern_occurrences")]
    pub min_pattern_occurrences: i64,

    /// Queries longer than this are truncated before storage.
    #[serde(default = "default_max_stored_query_len")]
    pub max_stored_query_len: usize,

    /// Width of the rendered text report.
    #[serde(default = "default_report_width")]
    pub report_width: usize,

    /// Number of histogram bins for the confidence distribution.
    #[serde(default = "default_confidence_bins")]
    pub confidence_bins: usize,
}

fn default_database_url() -> String {
    "sqlite://data/routing_analytics.db".to_string()
}
fn default_period_days() -> i64 {
    7
}
fn default_min_pattern_occurrences() -> i64 {
    2
}
fn default_max_stored_query_len() -> usize {
    500
}
fn default_report_width() -> usize {
    60
}
fn default_confidence_bins() -> usize {
    10
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            default_period_days: default_period_days(),
            min_pattern_occurrences: default_min_pattern_occurrences(),
            max_stored_query_len: default_max_stored_query_len(),
            report_width: default_report_width(),
            confidence_bins: default_confidence_bins(),
        }
    }
}

impl AnalyticsConfig {
    /// Validates reporting knobs.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.database_url.is_empty() {
            return Err(ValidationError::Invalid {
                field: "database_url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.confidence_bins == 0 {
            return Err(ValidationError::Zero {
                field: "confidence_bins".to_string(),
            });
        }
        Ok(())
    }
}
