//! Entity extraction and query complexity analysis.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::domain::plan::Action;
use crate::domain::routing::patterns::matched_keyword_domains;

/// Separators that split a compound query into sequential fragments.
pub const MULTI_STEP_SEPARATORS: &[&str] =
    &["; ", ", then ", " and then ", " then ", ". ", ", and "];

/// Words hinting at a sequential multi-step request.
const SEQUENCE_INDICATORS: &[&str] = &["first", "then", "next", "finally", "after that"];

/// Keywords indicating the step needs previous results as context.
pub const CONTEXT_KEYWORDS: &[&str] =
    &["them", "those", "previous", "above", "mentioned", "from that"];

static TIME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\btoday\b",
        r"\btomorrow\b",
        r"\byesterday\b",
        r"\bthis\s+week\b",
        r"\bnext\s+week\b",
        r"\bthis\s+month\b",
        r"\bnext\s+month\b",
        r"\b\d{1,2}:\d{2}\s*(?:am|pm)?\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static time pattern compiles"))
    .collect()
});

const HIGH_PRIORITY: &[&str] = &["urgent", "asap", "critical", "important", "high priority"];
const MEDIUM_PRIORITY: &[&str] = &["normal", "medium priority", "standard"];
const LOW_PRIORITY: &[&str] = &["low priority", "when possible", "later", "eventually"];

/// Entities extracted from a query and attached to every step descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedEntities {
    pub time_references: Vec<String>,
    pub priorities: Vec<String>,
    pub actions: Vec<String>,
    pub domains: Vec<String>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.time_references.is_empty()
            && self.priorities.is_empty()
            && self.actions.is_empty()
            && self.domains.is_empty()
    }
}

/// Extracts time references, priorities, action verbs, and domain keywords.
pub fn extract_entities(query: &str) -> ExtractedEntities {
    let lower = query.to_lowercase();

    let mut time_references = Vec::new();
    for pattern in TIME_PATTERNS.iter() {
        for m in pattern.find_iter(&lower) {
            let text = m.as_str().to_string();
            if !time_references.contains(&text) {
                time_references.push(text);
            }
        }
    }

    let mut priorities = Vec::new();
    for (level, keywords) in [("high", HIGH_PRIORITY), ("medium", MEDIUM_PRIORITY), ("low", LOW_PRIORITY)] {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            priorities.push(level.to_string());
        }
    }

    let mut actions = Vec::new();
    for word in lower.split_whitespace() {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        if Action::from_verb(word).is_some() && !actions.contains(&word.to_string()) {
            actions.push(word.to_string());
        }
    }

    let domains = matched_keyword_domains(query)
        .into_iter()
        .map(|d| d.as_str().to_string())
        .collect();

    ExtractedEntities {
        time_references,
        priorities,
        actions,
        domains,
    }
}

/// Complexity level of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

/// Result of complexity analysis.
#[derive(Debug, Clone)]
pub struct QueryComplexity {
    pub score: u32,
    pub level: ComplexityLevel,
    pub should_orchestrate: bool,
    pub separator_count: u32,
    pub domain_count: u32,
    pub sequence_indicator_count: u32,
}

/// Scores a query's structural complexity to decide between single-step
/// and orchestrated multi-step execution.
pub fn analyze_complexity(query: &str) -> QueryComplexity {
    let lower = query.to_lowercase();

    let separator_count = MULTI_STEP_SEPARATORS
        .iter()
        .filter(|sep| lower.contains(*sep))
        .count() as u32;

    let domain_count = matched_keyword_domains(query).len() as u32;

    let sequence_indicator_count = SEQUENCE_INDICATORS
        .iter()
        .filter(|word| lower.contains(*word))
        .count() as u32;

    let mut score = separator_count * 2 + sequence_indicator_count;
    score += domain_count.saturating_sub(1) * 2;
    if query.len() > 120 {
        score += 1;
    }

    let level = match score {
        0..=1 => ComplexityLevel::Low,
        2..=3 => ComplexityLevel::Medium,
        _ => ComplexityLevel::High,
    };

    QueryComplexity {
        score,
        level,
        should_orchestrate: score >= 2,
        separator_count,
        domain_count,
        sequence_indicator_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_time_references() {
        let entities = extract_entities("show my tasks for tomorrow and next week");
        assert!(entities.time_references.contains(&"tomorrow".to_string()));
        assert!(entities.time_references.contains(&"next week".to_string()));
    }

    #[test]
    fn extracts_priorities_and_actions() {
        let entities = extract_entities("create an urgent task to review the budget");
        assert_eq!(entities.priorities, vec!["high".to_string()]);
        assert!(entities.actions.contains(&"create".to_string()));
        assert!(entities.actions.contains(&"review".to_string()));
    }

    #[test]
    fn extracts_domain_keywords() {
        let entities = extract_entities("email me about my tasks");
        assert!(entities.domains.contains(&"email".to_string()));
        assert!(entities.domains.contains(&"task".to_string()));
    }

    #[test]
    fn simple_query_is_low_complexity() {
        let complexity = analyze_complexity("what tasks do I have today");
        assert_eq!(complexity.level, ComplexityLevel::Low);
        assert!(!complexity.should_orchestrate);
    }

    #[test]
    fn separated_query_orchestrates() {
        let complexity = analyze_complexity("check my inbox; then create a task for the report");
        assert!(complexity.separator_count >= 1);
        assert!(complexity.should_orchestrate);
    }

    #[test]
    fn multi_domain_query_orchestrates() {
        let complexity = analyze_complexity("summarize my inbox and add a task for each meeting");
        assert!(complexity.domain_count >= 2);
        assert!(complexity.should_orchestrate);
    }
}
