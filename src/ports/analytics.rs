//! Analytics store port - durable, append-only recorder of routing
//! decisions, corrections, and misrouting patterns, with aggregate
//! queries for offline accuracy measurement.
//!
//! Analytics failures never block a request: callers log and continue.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::domain::analytics::{
    render_report, MisroutingPattern, RoutingMetrics, RoutingOutcome,
};
use crate::domain::catalog::Domain;
use crate::domain::foundation::Timestamp;

/// Errors from the analytics store.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("analytics store unavailable: {0}")]
    Unavailable(String),

    #[error("analytics serialization failed: {0}")]
    Serialization(String),

    #[error("analytics io failed: {0}")]
    Io(String),
}

/// A routing decision to record. Append-only; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewRoutingRecord {
    pub query: String,
    pub routed_tool: String,
    pub detected_domain: Option<Domain>,
    pub confidence: Option<f64>,
    pub outcome: RoutingOutcome,
    pub parser_used: bool,
    pub validator_used: bool,
    pub cross_domain: bool,
    pub execution_time_ms: Option<f64>,
    pub error_message: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub user_id: Option<i64>,
    pub session_id: Option<String>,
}

impl NewRoutingRecord {
    pub fn new(
        query: impl Into<String>,
        routed_tool: impl Into<String>,
        outcome: RoutingOutcome,
    ) -> Self {
        Self {
            query: query.into(),
            routed_tool: routed_tool.into(),
            detected_domain: None,
            confidence: None,
            outcome,
            parser_used: false,
            validator_used: false,
            cross_domain: false,
            execution_time_ms: None,
            error_message: None,
            metadata: None,
            user_id: None,
            session_id: None,
        }
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.detected_domain = Some(domain);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_parser_used(mut self, used: bool) -> Self {
        self.parser_used = used;
        self
    }

    pub fn with_validator_used(mut self, used: bool) -> Self {
        self.validator_used = used;
        self
    }

    pub fn with_cross_domain(mut self, cross: bool) -> Self {
        self.cross_domain = cross;
        self
    }

    pub fn with_execution_time_ms(mut self, ms: f64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_user(mut self, user_id: Option<i64>, session_id: Option<&str>) -> Self {
        self.user_id = user_id;
        self.session_id = session_id.map(str::to_string);
        self
    }
}

/// Filter for aggregate metrics queries.
#[derive(Debug, Clone)]
pub struct MetricsFilter {
    pub days: i64,
    pub domain: Option<Domain>,
    pub tool: Option<String>,
}

impl MetricsFilter {
    pub fn last_days(days: i64) -> Self {
        Self {
            days,
            domain: None,
            tool: None,
        }
    }
}

/// Port for the durable routing-analytics store.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Records a routing decision, returning its id.
    async fn record_routing(&self, record: NewRoutingRecord) -> Result<i64, AnalyticsError>;

    /// Records an auto-correction, foreign-keyed to a decision.
    async fn record_correction(
        &self,
        decision_id: i64,
        original_tool: &str,
        corrected_tool: &str,
        reason: &str,
        validator_confidence: Option<f64>,
    ) -> Result<(), AnalyticsError>;

    /// Records or increments a misrouting pattern.
    async fn record_misrouting_pattern(
        &self,
        query_pattern: &str,
        wrong_tool: &str,
        correct_tool: &str,
        confidence: Option<f64>,
    ) -> Result<(), AnalyticsError>;

    /// Aggregate metrics over the filter window.
    async fn get_metrics(&self, filter: &MetricsFilter) -> Result<RoutingMetrics, AnalyticsError>;

    /// Misrouting patterns at or above the occurrence floor.
    async fn get_misrouting_patterns(
        &self,
        min_occurrences: i64,
        unresolved_only: bool,
    ) -> Result<Vec<MisroutingPattern>, AnalyticsError>;

    /// Per-domain accuracy over the window.
    async fn get_domain_accuracy(&self, days: i64) -> Result<BTreeMap<String, f64>, AnalyticsError>;

    /// Tool usage counts over the window, most used first.
    async fn get_tool_usage(&self, days: i64) -> Result<Vec<(String, i64)>, AnalyticsError>;

    /// Histogram of confidence scores over the window.
    async fn get_confidence_distribution(
        &self,
        days: i64,
        bins: usize,
    ) -> Result<BTreeMap<String, i64>, AnalyticsError>;

    /// Upserts the daily rollup row for a date from the decisions table.
    async fn aggregate_daily(&self, date: chrono::NaiveDate) -> Result<(), AnalyticsError>;

    /// Thin wrapper recording a validation check as a routing decision.
    async fn record_domain_validation(
        &self,
        query: &str,
        detected_domain: Domain,
        target_tool: &str,
        validation_valid: bool,
        validation_confidence: f64,
        detection_confidence: f64,
    ) -> Result<i64, AnalyticsError> {
        let outcome = if validation_valid {
            RoutingOutcome::Success
        } else {
            RoutingOutcome::Failure
        };
        let record = NewRoutingRecord::new(query, target_tool, outcome)
            .with_domain(detected_domain)
            .with_confidence(validation_confidence)
            .with_validator_used(true)
            .with_metadata(serde_json::json!({
                "detected_confidence": detection_confidence,
                "validation_confidence": validation_confidence,
            }));
        self.record_routing(record).await
    }

    /// Exports the metrics bundle as JSON for dashboards.
    async fn export_metrics(&self, path: &Path, days: i64) -> Result<(), AnalyticsError> {
        let bundle = serde_json::json!({
            "generated_at": Timestamp::now(),
            "period_days": days,
            "overall_metrics": self.get_metrics(&MetricsFilter::last_days(days)).await?,
            "domain_accuracy": self.get_domain_accuracy(days).await?,
            "tool_usage": self.get_tool_usage(days).await?,
            "confidence_distribution": self.get_confidence_distribution(days, 10).await?,
            "misrouting_patterns": self.get_misrouting_patterns(2, true).await?,
        });

        let rendered = serde_json::to_string_pretty(&bundle)
            .map_err(|e| AnalyticsError::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AnalyticsError::Io(e.to_string()))?;
        }
        tokio::fs::write(path, rendered)
            .await
            .map_err(|e| AnalyticsError::Io(e.to_string()))?;

        Ok(())
    }

    /// Renders the text analytics report.
    async fn generate_report(&self, days: i64) -> Result<String, AnalyticsError> {
        let metrics = self.get_metrics(&MetricsFilter::last_days(days)).await?;
        let domain_accuracy = self.get_domain_accuracy(days).await?;
        let tool_usage = self.get_tool_usage(days).await?;
        let patterns = self.get_misrouting_patterns(2, true).await?;
        Ok(render_report(
            days,
            &metrics,
            &domain_accuracy,
            &tool_usage,
            &patterns,
            60,
        ))
    }
}
