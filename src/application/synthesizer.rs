//! Context synthesis - structured fact extraction from step results and
//! cross-domain enrichment between plan steps.
//!
//! Extraction prefers the LLM structured path when a client is available
//! and falls back to pattern extraction on any failure. Enrichment applies
//! `(source_domain, target_domain)` rules over adjacent step transitions
//! and stores results under `enrichment_<source>_to_<target>` keys.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::SynthesisConfig;
use crate::domain::enrichment::{ContextEnrichment, ContextMap, EnrichmentRules};
use crate::domain::plan::{ContextRequirements, ExecutionStep, StepStatus};
use crate::ports::llm::LlmClient;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
        .expect("static email pattern compiles")
});
static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\d{4}-\d{2}-\d{2}",
        r"\d{1,2}/\d{1,2}/\d{4}",
        r"(?i)\b(?:today|tomorrow|yesterday)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static date pattern compiles"))
    .collect()
});
static COUNT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s+(?:email|message|event|task|item)")
        .expect("static count pattern compiles")
});
static SUBJECT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^.*?Subject:\s*(.+?)\s*$").expect("static subject pattern compiles"));

/// Result strings that carry no extractable information.
const EMPTY_RESULT_PATTERNS: &[&str] = &[
    "no emails found",
    "no results",
    "no messages",
    "found 0",
    "could not find",
    "nothing found",
    "no matching",
    "no events",
    "no tasks",
    "empty",
    "zero results",
    "not found",
    "no data",
    "no entries",
    "no items",
    "search returned nothing",
    "query returned no results",
];

/// Structured context the LLM path must return. Any subset may be null.
#[derive(Debug, Default, Deserialize)]
struct ExtractedContext {
    #[serde(default)]
    search_topic: Option<String>,
    #[serde(default)]
    key_findings: Vec<String>,
    #[serde(default)]
    relevant_count: Option<i64>,
    #[serde(default)]
    subjects: Vec<String>,
    #[serde(default)]
    important_entities: Option<serde_json::Value>,
    #[serde(default)]
    action_items: Vec<String>,
    #[serde(default)]
    deadlines: Vec<String>,
    #[serde(default)]
    priorities: Vec<String>,
    #[serde(default)]
    recipients: Vec<String>,
    #[serde(default)]
    time_references: Vec<String>,
    #[serde(default)]
    domain_context: Option<String>,
}

/// Synthesizes context across domains and enriches dependent queries.
#[derive(Clone)]
pub struct ContextSynthesizer {
    llm: Option<Arc<dyn LlmClient>>,
    rules: EnrichmentRules,
    config: SynthesisConfig,
    max_snippet: usize,
}

impl std::fmt::Debug for ContextSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSynthesizer")
            .field("llm", &self.llm.is_some())
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

impl ContextSynthesizer {
    pub fn new(config: SynthesisConfig, max_snippet: usize) -> Self {
        let rules = match &config.rules_path {
            Some(path) => match EnrichmentRules::load(path) {
                Ok(rules) => rules,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to load enrichment rules, using defaults");
                    EnrichmentRules::defaults()
                }
            },
            None => EnrichmentRules::defaults(),
        };
        Self {
            llm: None,
            rules,
            config,
            max_snippet,
        }
    }

    /// Attaches an LLM used for structured context extraction.
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Extracts structured facts from a step result.
    pub async fn extract_context(&self, result: &str) -> Option<ContextMap> {
        if result.trim().is_empty() || is_empty_result(result) {
            return None;
        }

        if let Some(llm) = &self.llm {
            let prompt = format!(
                "Extract structured context from this step result:\n\n{}\n\n\
                 Return a JSON object with any of: search_topic, key_findings, \
                 relevant_count, subjects, important_entities, action_items, \
                 deadlines, priorities, recipients, time_references, domain_context.",
                result
            );
            match llm.complete(&prompt).await {
                Ok(response) => match serde_json::from_str::<ExtractedContext>(response.trim()) {
                    Ok(extracted) => return Some(self.context_from_extracted(extracted)),
                    Err(e) => {
                        tracing::warn!(error = %e, "structured extraction failed, using patterns");
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "llm extraction failed, using patterns");
                }
            }
        }

        let context = self.pattern_extract(result);
        if context.is_empty() {
            None
        } else {
            Some(context)
        }
    }

    fn context_from_extracted(&self, extracted: ExtractedContext) -> ContextMap {
        let mut context = ContextMap::new();
        if let Some(topic) = extracted.search_topic {
            context.insert("search_topic".to_string(), topic.into());
        }
        if !extracted.key_findings.is_empty() {
            context.insert("key_findings".to_string(), extracted.key_findings.into());
        }
        if let Some(count) = extracted.relevant_count {
            context.insert("relevant_count".to_string(), count.into());
        }
        if !extracted.subjects.is_empty() {
            let mut subjects = extracted.subjects;
            subjects.truncate(self.config.max_subjects);
            context.insert("subjects".to_string(), subjects.into());
        }
        if let Some(entities) = extracted.important_entities {
            if !entities.is_null() {
                context.insert("important_entities".to_string(), entities);
            }
        }
        if !extracted.action_items.is_empty() {
            context.insert("action_items".to_string(), extracted.action_items.into());
        }
        if !extracted.deadlines.is_empty() {
            context.insert("deadlines".to_string(), extracted.deadlines.into());
        }
        if !extracted.priorities.is_empty() {
            context.insert("priorities".to_string(), extracted.priorities.into());
        }
        if !extracted.recipients.is_empty() {
            context.insert("recipients".to_string(), extracted.recipients.into());
        }
        if !extracted.time_references.is_empty() {
            context.insert("time_references".to_string(), extracted.time_references.into());
        }
        if let Some(domain_context) = extracted.domain_context {
            context.insert("domain_context".to_string(), domain_context.into());
        }
        context
    }

    /// Pattern-based extraction fallback.
    fn pattern_extract(&self, result: &str) -> ContextMap {
        let mut context = ContextMap::new();

        let emails: Vec<String> = {
            let mut seen = Vec::new();
            for m in EMAIL_PATTERN.find_iter(result) {
                let email = m.as_str().to_string();
                if !seen.contains(&email) {
                    seen.push(email);
                }
            }
            seen
        };
        if !emails.is_empty() {
            context.insert("emails".to_string(), emails.into());
        }

        let mut dates: Vec<String> = Vec::new();
        for pattern in DATE_PATTERNS.iter() {
            for m in pattern.find_iter(result) {
                let date = m.as_str().to_string();
                if !dates.contains(&date) {
                    dates.push(date);
                }
            }
        }
        if !dates.is_empty() {
            context.insert("dates".to_string(), dates.into());
        }

        if let Some(caps) = COUNT_PATTERN.captures(result) {
            if let Ok(count) = caps[1].parse::<i64>() {
                context.insert("relevant_count".to_string(), count.into());
            }
        }

        let subjects: Vec<String> = SUBJECT_PATTERN
            .captures_iter(result)
            .take(self.config.max_subjects)
            .map(|caps| caps[1].to_string())
            .collect();
        if !subjects.is_empty() {
            context.insert("subjects".to_string(), subjects.into());
        }

        context
    }

    /// Applies cross-domain enrichment rules over adjacent step
    /// transitions, merging enrichments into the context map.
    ///
    /// Enrichment keys are last-writer-wins within a level; same-level
    /// steps are independent by construction, so overwrites never cross a
    /// dependency edge.
    pub fn synthesize_context(&self, steps: &[ExecutionStep], mut context: ContextMap) -> ContextMap {
        for window in steps.windows(2) {
            let (source, target) = (&window[0], &window[1]);
            if source.domain == target.domain
                || !source.domain.is_data_domain()
                || !target.domain.is_data_domain()
            {
                continue;
            }
            if source.status != StepStatus::Completed {
                continue;
            }
            let Some(result) = &source.result else { continue };

            if let Some(enrichment) = self.apply_rule(source, target, result) {
                tracing::debug!(
                    enrichment = %enrichment.enrichment_type,
                    "applied cross-domain enrichment"
                );
                let payload: serde_json::Map<String, serde_json::Value> = enrichment
                    .enriched_context
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                context.insert(enrichment.context_key(), payload.into());

                context.insert(
                    "source_data".to_string(),
                    snippet(result, 500).into(),
                );
                let participants: Vec<String> =
                    EMAIL_PATTERN.find_iter(result).map(|m| m.as_str().to_string()).collect();
                if !participants.is_empty() {
                    context.insert("participants".to_string(), participants.join(", ").into());
                }
            }
        }
        context
    }

    fn apply_rule(
        &self,
        source: &ExecutionStep,
        target: &ExecutionStep,
        result: &str,
    ) -> Option<ContextEnrichment> {
        let rule = self.rules.for_transition(source.domain, target.domain)?;
        let lower = result.to_lowercase();

        let matched: Vec<&String> = rule
            .extract_patterns
            .iter()
            .filter(|p| lower.contains(p.to_lowercase().as_str()))
            .collect();
        if matched.is_empty() {
            return None;
        }

        let enriched_context = rule
            .context_mappings
            .values()
            .map(|target_key| (target_key.clone(), serde_json::Value::Bool(true)))
            .collect();

        Some(ContextEnrichment {
            source_domain: source.domain,
            target_domain: target.domain,
            enrichment_type: crate::domain::enrichment::rule_key(source.domain, target.domain),
            enriched_context,
            confidence: self.config.enrichment_confidence,
        })
    }

    /// Suffixes a step query with the context its requirements name.
    pub fn apply_context_to_query(
        &self,
        query: &str,
        context: &ContextMap,
        requirements: &ContextRequirements,
    ) -> String {
        if context.is_empty() || requirements.is_empty() {
            return query.to_string();
        }

        let mut enriched = query.to_string();

        if requirements.needs_previous_results {
            if let Some(last) = context.get("last_result").and_then(|v| v.as_str()) {
                enriched.push_str(&format!(" [Context: {}]", snippet(last, self.max_snippet)));
            }
        }
        if requirements.needs_source_data {
            if let Some(source) = context.get("source_data").and_then(|v| v.as_str()) {
                enriched.push_str(&format!(" [Source: {}]", snippet(source, self.max_snippet)));
            }
        }
        if requirements.needs_participant_data {
            if let Some(participants) = context.get("participants").and_then(|v| v.as_str()) {
                enriched.push_str(&format!(
                    " [Participants: {}]",
                    snippet(participants, self.max_snippet)
                ));
            }
        }

        enriched
    }
}

fn is_empty_result(result: &str) -> bool {
    let lower = result.to_lowercase();
    EMPTY_RESULT_PATTERNS.iter().any(|p| lower.contains(p))
}

fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::Domain;
    use crate::domain::foundation::StepId;
    use crate::domain::plan::Action;
    use std::time::Duration;

    fn synthesizer() -> ContextSynthesizer {
        ContextSynthesizer::new(SynthesisConfig::default(), 200)
    }

    fn completed_step(id: &str, domain: Domain, result: &str) -> ExecutionStep {
        let mut step = ExecutionStep::new(
            StepId::new(id),
            "tool",
            Action::List,
            "q",
            "intent",
            domain,
            vec![],
            ContextRequirements::default(),
        );
        step.mark_in_progress();
        step.mark_completed(result, Duration::from_millis(5));
        step
    }

    #[tokio::test]
    async fn pattern_extraction_finds_emails_counts_and_subjects() {
        let result = "Found 3 emails.\nSubject: Budget review\nFrom boss@example.com on 2026-07-30";
        let context = synthesizer().extract_context(result).await.unwrap();
        assert_eq!(context["relevant_count"], 3);
        assert_eq!(context["emails"][0], "boss@example.com");
        assert_eq!(context["subjects"][0], "Budget review");
        assert!(context["dates"][0].as_str().unwrap().contains("2026-07-30"));
    }

    #[tokio::test]
    async fn empty_results_extract_nothing() {
        assert!(synthesizer().extract_context("No emails found").await.is_none());
        assert!(synthesizer().extract_context("   ").await.is_none());
    }

    #[tokio::test]
    async fn subjects_are_capped() {
        let mut result = String::new();
        for i in 0..10 {
            result.push_str(&format!("Subject: item {}\n", i));
        }
        let context = synthesizer().extract_context(&result).await.unwrap();
        assert_eq!(context["subjects"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn email_to_task_transition_enriches_context() {
        let steps = vec![
            completed_step(
                "a",
                Domain::Email,
                "Found 2 unread emails. Subject: Renew contract, from legal@corp.com",
            ),
            completed_step("b", Domain::Task, ""),
        ];
        let context = synthesizer().synthesize_context(&steps, ContextMap::new());
        assert!(context.contains_key("enrichment_email_to_task"));
        assert!(context.contains_key("source_data"));
        assert!(context["participants"].as_str().unwrap().contains("legal@corp.com"));
    }

    #[test]
    fn same_domain_transition_is_ignored() {
        let steps = vec![
            completed_step("a", Domain::Email, "Subject: one, unread"),
            completed_step("b", Domain::Email, ""),
        ];
        let context = synthesizer().synthesize_context(&steps, ContextMap::new());
        assert!(context.is_empty());
    }

    #[test]
    fn general_transitions_are_ignored() {
        let steps = vec![
            completed_step("a", Domain::Email, "unread emails here"),
            completed_step("b", Domain::General, ""),
        ];
        let context = synthesizer().synthesize_context(&steps, ContextMap::new());
        assert!(context.is_empty());
    }

    #[test]
    fn query_enrichment_appends_requested_context() {
        let mut context = ContextMap::new();
        context.insert("last_result".to_string(), "2 unread emails from the boss".into());
        context.insert("source_data".to_string(), "Subject: Q3 plan".into());
        context.insert("participants".to_string(), "boss@example.com".into());

        let requirements = ContextRequirements {
            needs_previous_results: true,
            needs_source_data: true,
            needs_participant_data: true,
        };
        let enriched = synthesizer().apply_context_to_query("create tasks", &context, &requirements);
        assert!(enriched.contains("[Context: 2 unread emails from the boss]"));
        assert!(enriched.contains("[Source: Subject: Q3 plan]"));
        assert!(enriched.contains("[Participants: boss@example.com]"));
    }

    #[test]
    fn context_snippets_are_truncated() {
        let mut context = ContextMap::new();
        context.insert("last_result".to_string(), "x".repeat(500).into());
        let requirements = ContextRequirements {
            needs_previous_results: true,
            ..Default::default()
        };
        let enriched = synthesizer().apply_context_to_query("q", &context, &requirements);
        assert!(enriched.len() < 300);
    }

    #[test]
    fn no_requirements_leaves_query_untouched() {
        let mut context = ContextMap::new();
        context.insert("last_result".to_string(), "stuff".into());
        let enriched = synthesizer().apply_context_to_query(
            "plain query",
            &context,
            &ContextRequirements::default(),
        );
        assert_eq!(enriched, "plain query");
    }
}
