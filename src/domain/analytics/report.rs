//! Text report rendering for routing analytics.

use std::collections::BTreeMap;

use super::records::{MisroutingPattern, RoutingMetrics};

const MAX_PATTERNS_IN_REPORT: usize = 10;

/// Renders the fixed-width analytics report.
pub fn render_report(
    days: i64,
    metrics: &RoutingMetrics,
    domain_accuracy: &BTreeMap<String, f64>,
    tool_usage: &[(String, i64)],
    patterns: &[MisroutingPattern],
    width: usize,
) -> String {
    let rule = "=".repeat(width);
    let mut lines = Vec::new();

    lines.push(rule.clone());
    lines.push(format!("ROUTING ANALYTICS REPORT - Last {} Days", days));
    lines.push(rule.clone());
    lines.push(String::new());

    lines.push("OVERALL METRICS:".to_string());
    lines.push(format!("  Total Routings: {}", metrics.total_routings));
    lines.push(format!("  Accuracy: {:.1}%", metrics.accuracy * 100.0));
    lines.push(format!("  Avg Confidence: {:.2}", metrics.avg_confidence));
    lines.push(format!(
        "  Avg Execution Time: {:.1}ms",
        metrics.avg_execution_time_ms
    ));
    lines.push(format!(
        "  Parser Usage: {:.1}%",
        metrics.parser_usage_rate * 100.0
    ));
    lines.push(format!(
        "  Validator Usage: {:.1}%",
        metrics.validator_usage_rate * 100.0
    ));
    lines.push(format!(
        "  Cross-Domain Queries: {:.1}%",
        metrics.cross_domain_rate * 100.0
    ));
    lines.push(String::new());

    if !domain_accuracy.is_empty() {
        lines.push("ACCURACY BY DOMAIN:".to_string());
        let mut sorted: Vec<_> = domain_accuracy.iter().collect();
        sorted.sort_by(|a, b| b.1.total_cmp(a.1));
        for (domain, accuracy) in sorted {
            lines.push(format!("  {}: {:.1}%", domain, accuracy * 100.0));
        }
        lines.push(String::new());
    }

    if !tool_usage.is_empty() {
        lines.push("TOOL USAGE:".to_string());
        for (tool, count) in tool_usage {
            let percentage = if metrics.total_routings > 0 {
                *count as f64 / metrics.total_routings as f64 * 100.0
            } else {
                0.0
            };
            lines.push(format!("  {}: {} ({:.1}%)", tool, count, percentage));
        }
        lines.push(String::new());
    }

    if !patterns.is_empty() {
        lines.push("COMMON MISROUTING PATTERNS:".to_string());
        for pattern in patterns.iter().take(MAX_PATTERNS_IN_REPORT) {
            let preview: String = pattern.query_pattern.chars().take(50).collect();
            lines.push(format!("  Pattern: '{}...'", preview));
            lines.push(format!(
                "    Wrong: {} -> Correct: {}",
                pattern.wrong_tool, pattern.correct_tool
            ));
            lines.push(format!("    Occurrences: {}", pattern.occurrences));
            if let Some(conf) = pattern.avg_confidence {
                lines.push(format!("    Avg Confidence: {:.2}", conf));
            }
            lines.push(String::new());
        }
    }

    lines.push(rule);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;

    #[test]
    fn report_includes_headline_metrics() {
        let metrics = RoutingMetrics {
            period_days: 7,
            total_routings: 10,
            successful_routings: 9,
            failed_routings: 1,
            corrected_routings: 0,
            accuracy: 0.9,
            avg_confidence: 0.82,
            avg_execution_time_ms: 41.5,
            parser_usage_rate: 0.2,
            validator_usage_rate: 0.5,
            cross_domain_rate: 0.1,
        };
        let report = render_report(7, &metrics, &BTreeMap::new(), &[], &[], 60);
        assert!(report.contains("ROUTING ANALYTICS REPORT - Last 7 Days"));
        assert!(report.contains("Accuracy: 90.0%"));
        assert!(report.contains("Avg Execution Time: 41.5ms"));
        assert!(report.starts_with(&"=".repeat(60)));
    }

    #[test]
    fn report_lists_misrouting_patterns() {
        let pattern = MisroutingPattern {
            query_pattern: "what tasks do I have".to_string(),
            wrong_tool: "calendar".to_string(),
            correct_tool: "tasks".to_string(),
            occurrences: 3,
            first_seen: Timestamp::now(),
            last_seen: Timestamp::now(),
            avg_confidence: Some(0.4),
            resolved: false,
        };
        let report = render_report(7, &RoutingMetrics::default(), &BTreeMap::new(), &[], &[pattern], 60);
        assert!(report.contains("Wrong: calendar -> Correct: tasks"));
        assert!(report.contains("Occurrences: 3"));
    }
}
