//! In-memory analytics store for tests and single-process use.
//!
//! Implements the full store contract over mutex-guarded vectors, with the
//! same aggregation semantics as the durable SQLite adapter.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::domain::analytics::{
    pattern_hash, CorrectionRecord, DailyRollup, MisroutingPattern, RoutingMetrics, RoutingOutcome,
    RoutingRecord,
};
use crate::domain::foundation::Timestamp;
use crate::ports::analytics::{AnalyticsError, AnalyticsStore, MetricsFilter, NewRoutingRecord};

const MAX_STORED_QUERY_LEN: usize = 500;

#[derive(Default)]
struct Inner {
    decisions: Vec<RoutingRecord>,
    corrections: Vec<CorrectionRecord>,
    patterns: HashMap<String, MisroutingPattern>,
    daily: BTreeMap<chrono::NaiveDate, DailyRollup>,
    next_decision_id: i64,
    next_correction_id: i64,
}

/// Mutex-guarded in-memory analytics store.
#[derive(Default)]
pub struct InMemoryAnalyticsStore {
    inner: Mutex<Inner>,
}

impl InMemoryAnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded decisions, in insertion order.
    pub async fn decisions(&self) -> Vec<RoutingRecord> {
        self.inner.lock().await.decisions.clone()
    }

    /// All recorded corrections, in insertion order.
    pub async fn corrections(&self) -> Vec<CorrectionRecord> {
        self.inner.lock().await.corrections.clone()
    }

    /// All misrouting patterns.
    pub async fn misrouting_patterns(&self) -> Vec<MisroutingPattern> {
        self.inner.lock().await.patterns.values().cloned().collect()
    }

    /// The daily rollup for a date, if aggregated.
    pub async fn daily_rollup(&self, date: chrono::NaiveDate) -> Option<DailyRollup> {
        self.inner.lock().await.daily.get(&date).cloned()
    }

    fn in_window(record: &RoutingRecord, since: Timestamp) -> bool {
        !record.timestamp.is_before(&since)
    }
}

#[async_trait]
impl AnalyticsStore for InMemoryAnalyticsStore {
    async fn record_routing(&self, record: NewRoutingRecord) -> Result<i64, AnalyticsError> {
        let mut inner = self.inner.lock().await;
        inner.next_decision_id += 1;
        let id = inner.next_decision_id;

        let query: String = record.query.chars().take(MAX_STORED_QUERY_LEN).collect();
        inner.decisions.push(RoutingRecord {
            id,
            timestamp: Timestamp::now(),
            query_length: record.query.len(),
            query,
            detected_domain: record.detected_domain,
            routed_tool: record.routed_tool.to_lowercase(),
            confidence: record.confidence,
            parser_used: record.parser_used,
            validator_used: record.validator_used,
            cross_domain: record.cross_domain,
            outcome: record.outcome,
            execution_time_ms: record.execution_time_ms,
            error_message: record.error_message,
            metadata: record.metadata,
            user_id: record.user_id,
            session_id: record.session_id,
        });

        Ok(id)
    }

    async fn record_correction(
        &self,
        decision_id: i64,
        original_tool: &str,
        corrected_tool: &str,
        reason: &str,
        validator_confidence: Option<f64>,
    ) -> Result<(), AnalyticsError> {
        let mut inner = self.inner.lock().await;
        inner.next_correction_id += 1;
        let id = inner.next_correction_id;
        inner.corrections.push(CorrectionRecord {
            id,
            routing_decision_id: decision_id,
            timestamp: Timestamp::now(),
            original_tool: original_tool.to_lowercase(),
            corrected_tool: corrected_tool.to_lowercase(),
            reason: reason.to_string(),
            validator_confidence,
        });
        Ok(())
    }

    async fn record_misrouting_pattern(
        &self,
        query_pattern: &str,
        wrong_tool: &str,
        correct_tool: &str,
        confidence: Option<f64>,
    ) -> Result<(), AnalyticsError> {
        let mut inner = self.inner.lock().await;
        let hash = pattern_hash(query_pattern, wrong_tool, correct_tool);
        let now = Timestamp::now();

        match inner.patterns.get_mut(&hash) {
            Some(pattern) => {
                let occurrences = pattern.occurrences;
                pattern.avg_confidence = match (pattern.avg_confidence, confidence) {
                    (Some(avg), Some(new)) => {
                        Some((avg * occurrences as f64 + new) / (occurrences + 1) as f64)
                    }
                    (None, Some(new)) => Some(new),
                    (existing, None) => existing,
                };
                pattern.occurrences += 1;
                pattern.last_seen = now;
            }
            None => {
                inner.patterns.insert(
                    hash,
                    MisroutingPattern {
                        query_pattern: query_pattern
                            .chars()
                            .take(MAX_STORED_QUERY_LEN)
                            .collect(),
                        wrong_tool: wrong_tool.to_string(),
                        correct_tool: correct_tool.to_string(),
                        occurrences: 1,
                        first_seen: now,
                        last_seen: now,
                        avg_confidence: confidence,
                        resolved: false,
                    },
                );
            }
        }
        Ok(())
    }

    async fn get_metrics(&self, filter: &MetricsFilter) -> Result<RoutingMetrics, AnalyticsError> {
        let since = Timestamp::now().minus_days(filter.days);
        let inner = self.inner.lock().await;

        let rows: Vec<&RoutingRecord> = inner
            .decisions
            .iter()
            .filter(|r| Self::in_window(r, since))
            .filter(|r| filter.domain.map_or(true, |d| r.detected_domain == Some(d)))
            .filter(|r| filter.tool.as_deref().map_or(true, |t| r.routed_tool == t))
            .collect();

        let total = rows.len() as i64;
        if total == 0 {
            return Ok(RoutingMetrics {
                period_days: filter.days,
                ..Default::default()
            });
        }

        let count_outcome = |outcome: RoutingOutcome| {
            rows.iter().filter(|r| r.outcome == outcome).count() as i64
        };
        let successful = count_outcome(RoutingOutcome::Success);
        let failed = count_outcome(RoutingOutcome::Failure);
        let corrected = count_outcome(RoutingOutcome::Correction);

        let mean = |values: Vec<f64>| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };
        let avg_confidence = mean(rows.iter().filter_map(|r| r.confidence).collect());
        let avg_execution_time_ms = mean(rows.iter().filter_map(|r| r.execution_time_ms).collect());

        let rate = |count: usize| count as f64 / total as f64;

        Ok(RoutingMetrics {
            period_days: filter.days,
            total_routings: total,
            successful_routings: successful,
            failed_routings: failed,
            corrected_routings: corrected,
            accuracy: successful as f64 / total as f64,
            avg_confidence,
            avg_execution_time_ms,
            parser_usage_rate: rate(rows.iter().filter(|r| r.parser_used).count()),
            validator_usage_rate: rate(rows.iter().filter(|r| r.validator_used).count()),
            cross_domain_rate: rate(rows.iter().filter(|r| r.cross_domain).count()),
        })
    }

    async fn get_misrouting_patterns(
        &self,
        min_occurrences: i64,
        unresolved_only: bool,
    ) -> Result<Vec<MisroutingPattern>, AnalyticsError> {
        let inner = self.inner.lock().await;
        let mut patterns: Vec<MisroutingPattern> = inner
            .patterns
            .values()
            .filter(|p| p.occurrences >= min_occurrences)
            .filter(|p| !unresolved_only || !p.resolved)
            .cloned()
            .collect();
        patterns.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        Ok(patterns)
    }

    async fn get_domain_accuracy(&self, days: i64) -> Result<BTreeMap<String, f64>, AnalyticsError> {
        let since = Timestamp::now().minus_days(days);
        let inner = self.inner.lock().await;

        let mut totals: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        for record in inner.decisions.iter().filter(|r| Self::in_window(r, since)) {
            let Some(domain) = record.detected_domain else { continue };
            let entry = totals.entry(domain.as_str().to_string()).or_default();
            entry.0 += 1;
            if record.outcome == RoutingOutcome::Success {
                entry.1 += 1;
            }
        }

        Ok(totals
            .into_iter()
            .map(|(domain, (total, ok))| (domain, ok as f64 / total as f64))
            .collect())
    }

    async fn get_tool_usage(&self, days: i64) -> Result<Vec<(String, i64)>, AnalyticsError> {
        let since = Timestamp::now().minus_days(days);
        let inner = self.inner.lock().await;

        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for record in inner.decisions.iter().filter(|r| Self::in_window(r, since)) {
            *counts.entry(record.routed_tool.clone()).or_default() += 1;
        }

        let mut usage: Vec<(String, i64)> = counts.into_iter().collect();
        usage.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(usage)
    }

    async fn get_confidence_distribution(
        &self,
        days: i64,
        bins: usize,
    ) -> Result<BTreeMap<String, i64>, AnalyticsError> {
        let since = Timestamp::now().minus_days(days);
        let inner = self.inner.lock().await;

        let confidences: Vec<f64> = inner
            .decisions
            .iter()
            .filter(|r| Self::in_window(r, since))
            .filter_map(|r| r.confidence)
            .collect();

        Ok(bin_confidences(&confidences, bins))
    }

    async fn aggregate_daily(&self, date: chrono::NaiveDate) -> Result<(), AnalyticsError> {
        let mut inner = self.inner.lock().await;

        let rows: Vec<&RoutingRecord> = inner
            .decisions
            .iter()
            .filter(|r| r.timestamp.as_datetime().date_naive() == date)
            .collect();

        let total = rows.len() as i64;
        let count_outcome = |outcome: RoutingOutcome| {
            rows.iter().filter(|r| r.outcome == outcome).count() as i64
        };
        let mean = |values: Vec<f64>| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };
        let rate = |count: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            }
        };

        let rollup = DailyRollup {
            date,
            total_routings: total,
            successful_routings: count_outcome(RoutingOutcome::Success),
            failed_routings: count_outcome(RoutingOutcome::Failure),
            corrected_routings: count_outcome(RoutingOutcome::Correction),
            avg_confidence: mean(rows.iter().filter_map(|r| r.confidence).collect()),
            avg_execution_time_ms: mean(rows.iter().filter_map(|r| r.execution_time_ms).collect()),
            parser_usage_rate: rate(rows.iter().filter(|r| r.parser_used).count()),
            validator_usage_rate: rate(rows.iter().filter(|r| r.validator_used).count()),
            cross_domain_rate: rate(rows.iter().filter(|r| r.cross_domain).count()),
        };

        inner.daily.insert(date, rollup);
        Ok(())
    }
}

/// Bins confidence values into `bins` equal ranges over [0, 1].
pub(crate) fn bin_confidences(confidences: &[f64], bins: usize) -> BTreeMap<String, i64> {
    let mut distribution = BTreeMap::new();
    if confidences.is_empty() || bins == 0 {
        return distribution;
    }

    let bin_size = 1.0 / bins as f64;
    for confidence in confidences {
        let index = ((confidence / bin_size) as usize).min(bins - 1);
        let label = format!(
            "{:.1}-{:.1}",
            index as f64 * bin_size,
            (index + 1) as f64 * bin_size
        );
        *distribution.entry(label).or_default() += 1;
    }
    distribution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::Domain;

    fn record(outcome: RoutingOutcome) -> NewRoutingRecord {
        NewRoutingRecord::new("what tasks do I have", "tasks", outcome)
            .with_domain(Domain::Task)
            .with_confidence(0.9)
            .with_execution_time_ms(12.0)
    }

    #[tokio::test]
    async fn decisions_get_sequential_ids() {
        let store = InMemoryAnalyticsStore::new();
        let a = store.record_routing(record(RoutingOutcome::Success)).await.unwrap();
        let b = store.record_routing(record(RoutingOutcome::Failure)).await.unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[tokio::test]
    async fn metrics_compute_accuracy_over_the_window() {
        let store = InMemoryAnalyticsStore::new();
        for _ in 0..3 {
            store.record_routing(record(RoutingOutcome::Success)).await.unwrap();
        }
        store.record_routing(record(RoutingOutcome::Failure)).await.unwrap();

        let metrics = store.get_metrics(&MetricsFilter::last_days(7)).await.unwrap();
        assert_eq!(metrics.total_routings, 4);
        assert_eq!(metrics.successful_routings, 3);
        assert!((metrics.accuracy - 0.75).abs() < 1e-9);
        assert!((metrics.avg_confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn repeated_pattern_recording_accumulates_one_row() {
        let store = InMemoryAnalyticsStore::new();
        for _ in 0..5 {
            store
                .record_misrouting_pattern("what tasks...", "calendar", "tasks", Some(0.4))
                .await
                .unwrap();
        }

        let patterns = store.misrouting_patterns().await;
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].occurrences, 5);
        assert!(!patterns[0].first_seen.is_after(&patterns[0].last_seen));
    }

    #[tokio::test]
    async fn pattern_average_confidence_is_running_mean() {
        let store = InMemoryAnalyticsStore::new();
        store
            .record_misrouting_pattern("p", "a", "b", Some(0.2))
            .await
            .unwrap();
        store
            .record_misrouting_pattern("p", "a", "b", Some(0.6))
            .await
            .unwrap();

        let patterns = store.misrouting_patterns().await;
        assert!((patterns[0].avg_confidence.unwrap() - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn domain_accuracy_groups_by_domain() {
        let store = InMemoryAnalyticsStore::new();
        store.record_routing(record(RoutingOutcome::Success)).await.unwrap();
        store.record_routing(record(RoutingOutcome::Failure)).await.unwrap();
        store
            .record_routing(
                NewRoutingRecord::new("q", "email", RoutingOutcome::Success)
                    .with_domain(Domain::Email),
            )
            .await
            .unwrap();

        let accuracy = store.get_domain_accuracy(7).await.unwrap();
        assert!((accuracy["task"] - 0.5).abs() < 1e-9);
        assert!((accuracy["email"] - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn tool_usage_sorts_by_count() {
        let store = InMemoryAnalyticsStore::new();
        for _ in 0..2 {
            store.record_routing(record(RoutingOutcome::Success)).await.unwrap();
        }
        store
            .record_routing(NewRoutingRecord::new("q", "email", RoutingOutcome::Success))
            .await
            .unwrap();

        let usage = store.get_tool_usage(7).await.unwrap();
        assert_eq!(usage[0], ("tasks".to_string(), 2));
        assert_eq!(usage[1], ("email".to_string(), 1));
    }

    #[tokio::test]
    async fn confidence_distribution_bins_values() {
        let distribution = bin_confidences(&[0.05, 0.12, 0.95, 1.0], 10);
        assert_eq!(distribution["0.0-0.1"], 1);
        assert_eq!(distribution["0.1-0.2"], 1);
        assert_eq!(distribution["0.9-1.0"], 2);
    }

    #[tokio::test]
    async fn daily_rollup_aggregates_today() {
        let store = InMemoryAnalyticsStore::new();
        store.record_routing(record(RoutingOutcome::Success)).await.unwrap();
        store.record_routing(record(RoutingOutcome::Failure)).await.unwrap();

        let today = Timestamp::now().as_datetime().date_naive();
        store.aggregate_daily(today).await.unwrap();

        let rollup = store.daily_rollup(today).await.unwrap();
        assert_eq!(rollup.total_routings, 2);
        assert_eq!(rollup.successful_routings, 1);
    }

    #[tokio::test]
    async fn long_queries_are_truncated_on_storage() {
        let store = InMemoryAnalyticsStore::new();
        let long_query = "x".repeat(800);
        store
            .record_routing(NewRoutingRecord::new(&long_query, "tasks", RoutingOutcome::Success))
            .await
            .unwrap();

        let decisions = store.decisions().await;
        assert_eq!(decisions[0].query.len(), 500);
        assert_eq!(decisions[0].query_length, 800);
    }

    #[tokio::test]
    async fn generate_report_renders_from_provided_queries() {
        let store = InMemoryAnalyticsStore::new();
        store.record_routing(record(RoutingOutcome::Success)).await.unwrap();
        let report = store.generate_report(7).await.unwrap();
        assert!(report.contains("ROUTING ANALYTICS REPORT"));
        assert!(report.contains("Total Routings: 1"));
    }
}
