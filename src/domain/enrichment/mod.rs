//! Cross-domain context enrichment rules.
//!
//! Rules are keyed by `(source_domain, target_domain)` transitions. Each
//! rule names the patterns to look for in a source result and maps detected
//! facts to enriched-context keys the target domain understands. Defaults
//! are compiled in; a YAML file with the same shape can override them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::domain::catalog::Domain;

/// Context accumulated across step executions.
pub type ContextMap = HashMap<String, serde_json::Value>;

/// An enrichment produced for one domain transition.
#[derive(Debug, Clone, Serialize)]
pub struct ContextEnrichment {
    pub source_domain: Domain,
    pub target_domain: Domain,
    pub enrichment_type: String,
    pub enriched_context: BTreeMap<String, serde_json::Value>,
    pub confidence: f64,
}

impl ContextEnrichment {
    /// Key under which this enrichment is stored in the context map.
    pub fn context_key(&self) -> String {
        format!("enrichment_{}", self.enrichment_type)
    }

    /// Whether the enrichment clears a confidence threshold.
    pub fn is_high_confidence(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }
}

/// A single enrichment rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRule {
    /// Substrings whose presence in the source result activates the rule.
    pub extract_patterns: Vec<String>,
    /// Detected-fact key → enriched-context key for the target domain.
    pub context_mappings: BTreeMap<String, String>,
}

/// The rule table, keyed `<source>_to_<target>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichmentRules {
    rules: BTreeMap<String, EnrichmentRule>,
}

/// Error loading a rules file.
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentRulesError {
    #[error("failed to read rules file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse rules file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Shape of the on-disk rules file.
#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    enrichment_rules: BTreeMap<String, EnrichmentRule>,
}

impl EnrichmentRules {
    /// The compiled-in rule set covering the common transitions.
    pub fn defaults() -> Self {
        let mut rules = BTreeMap::new();

        rules.insert(
            rule_key(Domain::Email, Domain::Task),
            EnrichmentRule {
                extract_patterns: strings(&["unread", "urgent", "deadline", "subject:", "from"]),
                context_mappings: mappings(&[
                    ("subjects", "source_data"),
                    ("deadlines", "due_dates"),
                    ("senders", "assignees"),
                ]),
            },
        );
        rules.insert(
            rule_key(Domain::Email, Domain::Calendar),
            EnrichmentRule {
                extract_patterns: strings(&["meeting", "invite", "proposed time", "@"]),
                context_mappings: mappings(&[
                    ("senders", "participants"),
                    ("time_references", "proposed_times"),
                ]),
            },
        );
        rules.insert(
            rule_key(Domain::Calendar, Domain::Task),
            EnrichmentRule {
                extract_patterns: strings(&["meeting", "agenda", "attendee", "prepare"]),
                context_mappings: mappings(&[
                    ("events", "source_data"),
                    ("deadlines", "due_dates"),
                ]),
            },
        );
        rules.insert(
            rule_key(Domain::Calendar, Domain::Email),
            EnrichmentRule {
                extract_patterns: strings(&["meeting", "attendee", "invite", "scheduled"]),
                context_mappings: mappings(&[
                    ("attendees", "participants"),
                    ("events", "source_data"),
                ]),
            },
        );
        rules.insert(
            rule_key(Domain::Task, Domain::Email),
            EnrichmentRule {
                extract_patterns: strings(&["completed", "overdue", "due", "assigned"]),
                context_mappings: mappings(&[("tasks", "source_data")]),
            },
        );
        rules.insert(
            rule_key(Domain::Email, Domain::Notion),
            EnrichmentRule {
                extract_patterns: strings(&["subject:", "summary", "attachment"]),
                context_mappings: mappings(&[("subjects", "page_content")]),
            },
        );
        rules.insert(
            rule_key(Domain::Calendar, Domain::Notion),
            EnrichmentRule {
                extract_patterns: strings(&["meeting", "agenda", "notes"]),
                context_mappings: mappings(&[("events", "page_content")]),
            },
        );
        rules.insert(
            rule_key(Domain::Task, Domain::Notion),
            EnrichmentRule {
                extract_patterns: strings(&["task", "due", "priority"]),
                context_mappings: mappings(&[("tasks", "page_content")]),
            },
        );

        Self { rules }
    }

    /// Loads rules from a YAML file, replacing the defaults entirely when
    /// the file defines at least one rule.
    pub fn load(path: &Path) -> Result<Self, EnrichmentRulesError> {
        let raw = std::fs::read_to_string(path)?;
        let file: RulesFile = serde_yaml::from_str(&raw)?;
        if file.enrichment_rules.is_empty() {
            tracing::warn!(path = %path.display(), "rules file defines no rules, keeping defaults");
            return Ok(Self::defaults());
        }
        Ok(Self {
            rules: file.enrichment_rules,
        })
    }

    /// Looks up the rule for a transition.
    pub fn for_transition(&self, source: Domain, target: Domain) -> Option<&EnrichmentRule> {
        self.rules.get(&rule_key(source, target))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Canonical rule key for a transition.
pub fn rule_key(source: Domain, target: Domain) -> String {
    format!("{}_to_{}", source.as_str(), target.as_str())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn mappings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_email_to_task() {
        let rules = EnrichmentRules::defaults();
        let rule = rules.for_transition(Domain::Email, Domain::Task).unwrap();
        assert!(rule.extract_patterns.contains(&"unread".to_string()));
        assert_eq!(rule.context_mappings.get("subjects").map(String::as_str), Some("source_data"));
    }

    #[test]
    fn rule_key_format_is_stable() {
        assert_eq!(rule_key(Domain::Email, Domain::Task), "email_to_task");
        assert_eq!(rule_key(Domain::Calendar, Domain::Notion), "calendar_to_notion");
    }

    #[test]
    fn missing_transition_has_no_rule() {
        let rules = EnrichmentRules::defaults();
        assert!(rules.for_transition(Domain::Notion, Domain::Email).is_none());
    }

    #[test]
    fn yaml_file_round_trips() {
        let yaml = r#"
enrichment_rules:
  email_to_task:
    extract_patterns: ["urgent"]
    context_mappings:
      subjects: source_data
"#;
        let file: RulesFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.enrichment_rules.len(), 1);
        let rule = &file.enrichment_rules["email_to_task"];
        assert_eq!(rule.extract_patterns, vec!["urgent".to_string()]);
    }

    #[test]
    fn enrichment_context_key_is_prefixed() {
        let enrichment = ContextEnrichment {
            source_domain: Domain::Email,
            target_domain: Domain::Task,
            enrichment_type: "email_to_task".to_string(),
            enriched_context: BTreeMap::new(),
            confidence: 0.75,
        };
        assert_eq!(enrichment.context_key(), "enrichment_email_to_task");
        assert!(enrichment.is_high_confidence(0.75));
        assert!(!enrichment.is_high_confidence(0.8));
    }
}
