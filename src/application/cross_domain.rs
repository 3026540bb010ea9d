//! Cross-domain query handling - detection, sub-query generation,
//! dependency-aware fan-out, and result synthesis.
//!
//! Detection short-circuits email-only and calendar-only phrasings, then
//! tries explicit cross-domain patterns, the domain detector's mixed
//! verdict, and finally keyword buckets. Sub-queries fan out in parallel
//! by default, sequentially when configured, and in topological waves when
//! dependencies are detected; a failed sub-query does not abort its peers.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::{CrossDomainConfig, SelectionConfig};
use crate::domain::analytics::RoutingOutcome;
use crate::domain::catalog::{Domain, ToolCatalog};
use crate::domain::enrichment::ContextMap;
use crate::domain::plan::Action;
use crate::domain::routing::patterns::{domain_keywords, matched_keyword_domains};
use crate::domain::routing::DomainDetector;
use crate::ports::analytics::{AnalyticsStore, NewRoutingRecord};
use crate::ports::events::{WorkflowEvent, WorkflowEventKind, WorkflowEventSink};
use crate::ports::synthesizer::ResponseSynthesizer;
use crate::ports::tool::{ParseOutcome, ToolError, ToolRegistry};

use super::executor::RequestIdentity;
use super::record_routing_best_effort;
use super::synthesizer::ContextSynthesizer;

/// How sub-queries are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Parallel,
    Sequential,
    Dependent,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Parallel => "parallel",
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Dependent => "dependent",
        }
    }
}

/// A derived, domain-specific sub-query.
#[derive(Debug, Clone)]
pub struct SubQuery {
    pub id: String,
    pub query: String,
    pub domain: Domain,
    pub tool_name: String,
    pub action: Action,
    pub dependencies: Vec<String>,
    pub priority: usize,
    pub result: Option<String>,
    pub error: Option<String>,
    pub executed: bool,
}

/// Detection result for a possibly-multi-domain query.
#[derive(Debug, Clone)]
pub struct CrossDomainDetection {
    pub is_cross_domain: bool,
    pub domains: Vec<Domain>,
    pub confidence: f64,
}

impl CrossDomainDetection {
    fn single_domain() -> Self {
        Self {
            is_cross_domain: false,
            domains: Vec::new(),
            confidence: 0.0,
        }
    }
}

/// Outcome of handling a cross-domain query.
#[derive(Debug)]
pub struct CrossDomainOutcome {
    pub is_cross_domain: bool,
    pub domains: Vec<Domain>,
    pub confidence: f64,
    pub execution_mode: Option<ExecutionMode>,
    pub sub_queries: Vec<SubQuery>,
    pub result: Option<String>,
    pub successful_count: usize,
    pub total_count: usize,
}

static EMAIL_ONLY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\btell\s+me\s+(?:about|more\s+about)\s+.*(?:email|message)",
        r"\bwhat\s+(?:is|was|does)\s+.*(?:email|message).*(?:about|say)",
        r"\bwhat\s+(?:email|message).*(?:did\s+i\s+receive|from)",
        r"\bwhen\s+(?:was|did).*(?:email|message).*(?:from|arrive)",
        r"\blast\s+(?:email|message).*(?:from|by)",
        r"\bemail.*(?:about|regarding|concerning)",
        r"\bsummarize.*(?:email|message)",
        r"\bexplain.*(?:email|message)",
    ])
});

static CALENDAR_ONLY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\bcalendar\s+events?\b",
        r"\bmy\s+calendar\b",
        r"\bwhat.*calendar\b",
        r"\bshow.*calendar\b",
        r"\bmeetings?\s+(?:today|tomorrow|for)\b",
        r"\bevents?\s+(?:today|tomorrow|for|between)\b",
        r"\bwhat\s+events?\s+(?:do\s+i|i)\s+have\b",
        r"\bshow\s+(?:my\s+)?events?\b",
    ])
});

static TIME_CONTEXT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\btoday\b",
        r"\btomorrow\b",
        r"\bthis\s+week\b",
        r"\bnext\s+week\b",
        r"\bthis\s+month\b",
        r"\bnext\s+month\b",
    ])
});

struct CrossPattern {
    regex: Regex,
    domains: &'static [Domain],
    description: &'static str,
}

static CROSS_DOMAIN_PATTERNS: Lazy<Vec<CrossPattern>> = Lazy::new(|| {
    let pattern = |regex: &str, domains: &'static [Domain], description: &'static str| CrossPattern {
        regex: Regex::new(regex).expect("static cross-domain pattern compiles"),
        domains,
        description,
    };
    vec![
        pattern(
            r"\b(?:tasks?|todos?)\s+and\s+(?:my\s+)?(?:meetings?|events?|calendar)\b",
            &[Domain::Task, Domain::Calendar],
            "tasks and calendar events",
        ),
        pattern(
            r"\b(?:meetings?|events?|calendar)\s+and\s+(?:my\s+)?(?:tasks?|todos?)\b",
            &[Domain::Calendar, Domain::Task],
            "calendar events and tasks",
        ),
        pattern(
            r"\b(?:email|send|message)\b.*\b(?:about|regarding)\b.*\b(?:meeting|event|task)\b",
            &[Domain::Email, Domain::Calendar, Domain::Task],
            "email about calendar/task items",
        ),
        pattern(
            r"\bcreate\s+(?:a\s+)?(?:task|todo)s?\s+for\s+each\b.*\b(?:email|message)s?\b",
            &[Domain::Email, Domain::Task],
            "create tasks from emails",
        ),
        pattern(
            r"\bprepare\s+for\b.*\b(?:meeting|event)\b",
            &[Domain::Calendar, Domain::Task, Domain::Email],
            "meeting preparation",
        ),
        pattern(
            r"\b(?:how much|how many)\s+(?:time|hours?|minutes?)\s+(?:do i have|left|until|before|till)",
            &[Domain::Calendar, Domain::Task],
            "time calculation",
        ),
        pattern(
            r"\b(?:what|show|list)\s+(?:do i have|have i got|is there)\s+(?:between|from|until|before)",
            &[Domain::Calendar, Domain::Task],
            "time range",
        ),
        pattern(
            r"\b(?:create|update|add)\b.*\b(?:notion|page|database)\b.*\b(?:about|for|from)\b.*\b(?:meeting|event|task|email)\b",
            &[Domain::Notion, Domain::Calendar, Domain::Task, Domain::Email],
            "notion page from calendar/task/email",
        ),
        pattern(
            r"\b(?:notion|page|database)\b.*\band\b.*\b(?:tasks?|meetings?|emails?)\b",
            &[Domain::Notion, Domain::Task, Domain::Calendar, Domain::Email],
            "notion and other domains",
        ),
        pattern(
            r"\b(?:tasks?|meetings?|emails?)\b.*\band\b.*\b(?:notion|page|database)\b",
            &[Domain::Task, Domain::Calendar, Domain::Email, Domain::Notion],
            "other domains and notion",
        ),
    ]
});

static CREATE_FROM_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"create\s+(?:a\s+)?tasks?\b.*\bfor\s+each\b.*\bemails?")
        .expect("static dependency pattern compiles")
});
static EMAIL_ABOUT_MEETING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"email\b.*\babout\b.*\b(?:meeting|event)")
        .expect("static dependency pattern compiles")
});
static PREPARE_FOR_MEETING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"prepare\b.*\bfor\b.*\b(?:meeting|event)")
        .expect("static dependency pattern compiles")
});

const CREATE_KEYWORDS: &[&str] = &["create", "add", "new", "schedule", "book"];
const SEARCH_KEYWORDS: &[&str] = &["search", "find", "look for"];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static pattern compiles"))
        .collect()
}

/// Handles queries spanning multiple domains.
pub struct CrossDomainHandler {
    catalog: Arc<ToolCatalog>,
    detector: DomainDetector,
    context_synthesizer: ContextSynthesizer,
    synthesizer: Option<Arc<dyn ResponseSynthesizer>>,
    analytics: Arc<dyn AnalyticsStore>,
    events: Arc<dyn WorkflowEventSink>,
    config: CrossDomainConfig,
    parser_refine_threshold: f64,
    sub_query_timeout: Duration,
}

impl CrossDomainHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<ToolCatalog>,
        detector: DomainDetector,
        context_synthesizer: ContextSynthesizer,
        analytics: Arc<dyn AnalyticsStore>,
        events: Arc<dyn WorkflowEventSink>,
        config: CrossDomainConfig,
        selection: &SelectionConfig,
        sub_query_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            detector,
            context_synthesizer,
            synthesizer: None,
            analytics,
            events,
            config,
            parser_refine_threshold: selection.parser_refine_threshold,
            sub_query_timeout,
        }
    }

    /// Attaches a response synthesizer for final prose.
    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn ResponseSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Detects whether a query spans multiple domains.
    pub async fn detect(&self, query: &str) -> CrossDomainDetection {
        let lower = query.to_lowercase();

        let has_keyword =
            |domain: Domain| domain_keywords(domain).iter().any(|kw| lower.contains(kw));
        let has_email = has_keyword(Domain::Email);
        let has_calendar = has_keyword(Domain::Calendar);
        let has_task = has_keyword(Domain::Task);

        let email_only_phrasing = EMAIL_ONLY_PATTERNS.iter().any(|p| p.is_match(&lower));
        if (email_only_phrasing || has_email) && !has_calendar && !has_task {
            tracing::debug!("query is email-only, not cross-domain");
            return CrossDomainDetection::single_domain();
        }

        let calendar_only_phrasing = CALENDAR_ONLY_PATTERNS.iter().any(|p| p.is_match(&lower));
        if calendar_only_phrasing && !has_task {
            tracing::debug!("query is calendar-only, not cross-domain");
            return CrossDomainDetection::single_domain();
        }

        for pattern in CROSS_DOMAIN_PATTERNS.iter() {
            if pattern.regex.is_match(&lower) {
                tracing::info!(pattern = pattern.description, "cross-domain pattern matched");
                return CrossDomainDetection {
                    is_cross_domain: true,
                    domains: pattern.domains.to_vec(),
                    confidence: self.config.pattern_confidence,
                };
            }
        }

        let detection = self.detector.detect(query).await;
        if detection.domain == Domain::Mixed {
            return CrossDomainDetection {
                is_cross_domain: true,
                domains: detection.evidence.domains,
                confidence: self.config.mixed_confidence,
            };
        }

        let buckets = matched_keyword_domains(query);
        if buckets.len() >= 2 {
            tracing::info!(domains = ?buckets, "multiple domain keyword buckets matched");
            return CrossDomainDetection {
                is_cross_domain: true,
                domains: buckets,
                confidence: self.config.keyword_confidence,
            };
        }

        CrossDomainDetection::single_domain()
    }

    /// Handles a detected cross-domain query end to end.
    pub async fn handle(
        &self,
        query: &str,
        detection: &CrossDomainDetection,
        tools: &ToolRegistry,
        identity: RequestIdentity<'_>,
        cancel: &CancellationToken,
    ) -> CrossDomainOutcome {
        self.events
            .emit(WorkflowEvent::new(
                WorkflowEventKind::ActionExecuting,
                "Processing cross-domain query",
                serde_json::json!({ "query": query }),
            ))
            .await;

        let mut sub_queries = self.decompose(query, &detection.domains, tools);
        if sub_queries.is_empty() {
            tracing::warn!("could not decompose cross-domain query into sub-queries");
            return CrossDomainOutcome {
                is_cross_domain: true,
                domains: detection.domains.clone(),
                confidence: detection.confidence,
                execution_mode: None,
                sub_queries: Vec::new(),
                result: None,
                successful_count: 0,
                total_count: 0,
            };
        }

        let mode = self.execution_mode(&sub_queries);
        tracing::info!(
            mode = mode.as_str(),
            sub_queries = sub_queries.len(),
            "executing cross-domain sub-queries"
        );

        match mode {
            ExecutionMode::Dependent => self.execute_dependent(&mut sub_queries, tools, cancel).await,
            ExecutionMode::Parallel => self.execute_parallel(&mut sub_queries, tools, cancel).await,
            ExecutionMode::Sequential => {
                self.execute_sequential(&mut sub_queries, tools, cancel).await
            }
        }

        let successful_count = sub_queries
            .iter()
            .filter(|s| s.executed && s.result.is_some())
            .count();
        let total_count = sub_queries.len();

        let result = self.synthesize(query, &sub_queries).await;

        self.record_analytics(query, detection, &sub_queries, mode, identity).await;

        self.events
            .emit(WorkflowEvent::new(
                WorkflowEventKind::ActionComplete,
                "Cross-domain query completed",
                serde_json::json!({
                    "successful_count": successful_count,
                    "total_count": total_count,
                    "execution_mode": mode.as_str(),
                }),
            ))
            .await;

        CrossDomainOutcome {
            is_cross_domain: true,
            domains: detection.domains.clone(),
            confidence: detection.confidence,
            execution_mode: Some(mode),
            sub_queries,
            result: Some(result),
            successful_count,
            total_count,
        }
    }

    /// Generates per-domain sub-queries.
    fn decompose(&self, query: &str, domains: &[Domain], tools: &ToolRegistry) -> Vec<SubQuery> {
        let time_context = extract_time_context(query);
        let available = tools.name_set();
        let mut sub_queries = Vec::new();

        for (i, &domain) in domains.iter().take(self.config.max_sub_queries).enumerate() {
            let Some(tool_name) = self.catalog.map_domain_to_tool(domain, Some(&available)) else {
                tracing::warn!(domain = %domain, "no tool available for domain, skipping sub-query");
                continue;
            };

            let text = generate_sub_query(query, domain, time_context.as_deref());
            let action = determine_action(query, domain);

            tracing::debug!(sub_query = %text, tool = %tool_name, "created sub-query");
            sub_queries.push(SubQuery {
                id: format!("subquery_{}_{}", i + 1, domain.as_str()),
                query: text,
                domain,
                tool_name,
                action,
                dependencies: Vec::new(),
                priority: i,
                result: None,
                error: None,
                executed: false,
            });
        }

        detect_dependencies(&mut sub_queries, query);
        sub_queries
    }

    fn execution_mode(&self, sub_queries: &[SubQuery]) -> ExecutionMode {
        if sub_queries.iter().any(|s| !s.dependencies.is_empty()) {
            ExecutionMode::Dependent
        } else if self.config.parallel_execution {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        }
    }

    async fn execute_parallel(
        &self,
        sub_queries: &mut [SubQuery],
        tools: &ToolRegistry,
        cancel: &CancellationToken,
    ) {
        let outcomes = futures::future::join_all(
            sub_queries
                .iter()
                .map(|sub| self.execute_single(sub, None, tools, cancel)),
        )
        .await;
        for (sub, outcome) in sub_queries.iter_mut().zip(outcomes) {
            apply_outcome(sub, outcome);
        }
    }

    async fn execute_sequential(
        &self,
        sub_queries: &mut [SubQuery],
        tools: &ToolRegistry,
        cancel: &CancellationToken,
    ) {
        for i in 0..sub_queries.len() {
            let outcome = self.execute_single(&sub_queries[i], None, tools, cancel).await;
            let failed = outcome.is_err();
            apply_outcome(&mut sub_queries[i], outcome);
            if failed && !self.config.continue_on_partial_failure {
                tracing::warn!("sub-query failed, aborting remaining sequential sub-queries");
                break;
            }
        }
    }

    /// Topological wave execution: each wave runs every sub-query whose
    /// dependencies have been attempted, enriched with dependency results.
    async fn execute_dependent(
        &self,
        sub_queries: &mut Vec<SubQuery>,
        tools: &ToolRegistry,
        cancel: &CancellationToken,
    ) {
        let mut attempted: Vec<String> = Vec::new();

        while attempted.len() < sub_queries.len() {
            let wave: Vec<usize> = sub_queries
                .iter()
                .enumerate()
                .filter(|(_, sub)| !attempted.contains(&sub.id))
                .filter(|(_, sub)| {
                    sub.dependencies.iter().all(|dep| attempted.contains(dep))
                })
                .map(|(i, _)| i)
                .collect();

            if wave.is_empty() {
                tracing::error!("circular dependency among sub-queries, aborting");
                break;
            }

            let outcomes = futures::future::join_all(wave.iter().map(|&i| {
                let sub = &sub_queries[i];
                let dep_context = dependency_context(sub, sub_queries);
                async move { (i, self.execute_single(sub, dep_context, tools, cancel).await) }
            }))
            .await;

            for (i, outcome) in outcomes {
                apply_outcome(&mut sub_queries[i], outcome);
                attempted.push(sub_queries[i].id.clone());
            }
        }
    }

    /// Executes one sub-query against its tool with timeout and
    /// cancellation. Dependency results, when present, are injected into
    /// the query text.
    async fn execute_single(
        &self,
        sub: &SubQuery,
        dependency_results: Option<String>,
        tools: &ToolRegistry,
        cancel: &CancellationToken,
    ) -> Result<String, String> {
        let Some(tool) = tools.get(&sub.tool_name) else {
            return Err(format!("tool '{}' not found", sub.tool_name));
        };

        let query = match dependency_results {
            Some(results) => {
                let mut context = ContextMap::new();
                context.insert("last_result".to_string(), results.into());
                let requirements = crate::domain::plan::ContextRequirements {
                    needs_previous_results: true,
                    ..Default::default()
                };
                self.context_synthesizer
                    .apply_context_to_query(&sub.query, &context, &requirements)
            }
            None => sub.query.clone(),
        };

        let mut action = sub.action;
        if let Some(parser) = tool.parser() {
            if let ParseOutcome::Parsed(parsed) = parser.parse(&query) {
                let more_specific = !matches!(parsed.action, Action::List | Action::Search);
                if parsed.confidence >= self.parser_refine_threshold
                    && more_specific
                    && matches!(action, Action::List | Action::Search)
                {
                    action = parsed.action;
                }
            }
        }

        let started = Instant::now();
        let run = tokio::select! {
            _ = cancel.cancelled() => Err("request cancelled".to_string()),
            outcome = tokio::time::timeout(self.sub_query_timeout, tool.run(action, &query)) => {
                match outcome {
                    Err(_) => Err(format!("sub-query timed out after {:.0?}", self.sub_query_timeout)),
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(ToolError::Rejected { message, .. })) => {
                        Err(format!("tool rejected the sub-query: {}", message))
                    }
                    Ok(Err(e)) => Err(e.to_string()),
                }
            }
        };

        match &run {
            Ok(_) => {
                tracing::info!(
                    sub_query = %sub.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sub-query executed"
                );
            }
            Err(e) => tracing::error!(sub_query = %sub.id, error = %e, "sub-query failed"),
        }
        run
    }

    /// Synthesizes the final response from sub-query results.
    async fn synthesize(&self, query: &str, sub_queries: &[SubQuery]) -> String {
        let successful: Vec<&SubQuery> = sub_queries
            .iter()
            .filter(|s| s.executed && s.result.is_some())
            .collect();
        let failed: Vec<&SubQuery> = sub_queries.iter().filter(|s| s.error.is_some()).collect();

        if successful.is_empty() {
            return "I couldn't retrieve any information. Please try again.".to_string();
        }

        let mut synthesized = None;
        if let Some(synthesizer) = &self.synthesizer {
            let mut by_domain: BTreeMap<Domain, String> = BTreeMap::new();
            for sub in &successful {
                if let Some(result) = &sub.result {
                    by_domain.insert(sub.domain, result.clone());
                }
            }
            let mut context = ContextMap::new();
            context.insert(
                "domains".to_string(),
                serde_json::json!(sub_queries
                    .iter()
                    .map(|s| s.domain.as_str())
                    .collect::<Vec<_>>()),
            );
            match synthesizer.synthesize(query, &by_domain, &context).await {
                Ok(text) => synthesized = Some(text),
                Err(e) => {
                    tracing::debug!(error = %e, "synthesizer failed, using concatenation");
                }
            }
        }

        let mut response = synthesized.unwrap_or_else(|| {
            let mut parts = vec!["Here's what I found:".to_string()];
            for sub in &successful {
                let result = sub.result.as_deref().unwrap_or_default();
                if self.config.include_domain_labels {
                    parts.push(format!("\n**{}:**\n{}", capitalize(sub.domain.as_str()), result));
                } else {
                    parts.push(result.to_string());
                }
            }
            parts.join("\n")
        });

        if !failed.is_empty() && self.config.include_error_details {
            response.push_str("\n\n**Note:**");
            for sub in &failed {
                response.push_str(&format!(
                    "\n- Could not retrieve {} information: {}",
                    sub.domain,
                    sub.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }

        response
    }

    async fn record_analytics(
        &self,
        query: &str,
        detection: &CrossDomainDetection,
        sub_queries: &[SubQuery],
        mode: ExecutionMode,
        identity: RequestIdentity<'_>,
    ) {
        for sub in sub_queries {
            if !sub.executed && sub.error.is_none() {
                continue;
            }
            let outcome = if sub.result.is_some() {
                RoutingOutcome::Success
            } else {
                RoutingOutcome::Failure
            };
            let mut record = NewRoutingRecord::new(&sub.query, &sub.tool_name, outcome)
                .with_domain(sub.domain)
                .with_confidence(detection.confidence)
                .with_cross_domain(true)
                .with_metadata(serde_json::json!({
                    "sub_query_id": sub.id,
                    "execution_mode": mode.as_str(),
                    "parent_query": query,
                }))
                .with_user(identity.user_id, identity.session_id);
            if let Some(error) = &sub.error {
                record = record.with_error(error.clone());
            }
            record_routing_best_effort(self.analytics.as_ref(), record).await;
        }

        let successful = sub_queries.iter().filter(|s| s.result.is_some()).count();
        let aggregate_outcome = if successful > 0 {
            RoutingOutcome::Mixed
        } else {
            RoutingOutcome::Failure
        };
        record_routing_best_effort(
            self.analytics.as_ref(),
            NewRoutingRecord::new(query, "cross_domain", aggregate_outcome)
                .with_domain(Domain::Mixed)
                .with_confidence(detection.confidence)
                .with_cross_domain(true)
                .with_metadata(serde_json::json!({
                    "domains": detection.domains.iter().map(Domain::as_str).collect::<Vec<_>>(),
                    "execution_mode": mode.as_str(),
                    "successful_count": successful,
                    "total_count": sub_queries.len(),
                }))
                .with_user(identity.user_id, identity.session_id),
        )
        .await;
    }
}

fn apply_outcome(sub: &mut SubQuery, outcome: Result<String, String>) {
    match outcome {
        Ok(result) => {
            sub.result = Some(result);
            sub.executed = true;
        }
        Err(error) => {
            sub.error = Some(error);
        }
    }
}

/// Concatenated results of a sub-query's direct dependencies.
fn dependency_context(sub: &SubQuery, all: &[SubQuery]) -> Option<String> {
    if sub.dependencies.is_empty() {
        return None;
    }
    let results: Vec<&str> = all
        .iter()
        .filter(|other| sub.dependencies.contains(&other.id))
        .filter_map(|other| other.result.as_deref())
        .collect();
    if results.is_empty() {
        None
    } else {
        Some(results.join("\n"))
    }
}

fn extract_time_context(query: &str) -> Option<String> {
    let lower = query.to_lowercase();
    for pattern in TIME_CONTEXT_PATTERNS.iter() {
        if let Some(m) = pattern.find(&lower) {
            return Some(m.as_str().to_string());
        }
    }
    None
}

/// Domain-specific sub-query templating. Create/update/send intents keep
/// the full original query; list-style intents use a focused template.
fn generate_sub_query(query: &str, domain: Domain, time_context: Option<&str>) -> String {
    let lower = query.to_lowercase();
    let has_create = CREATE_KEYWORDS.iter().any(|kw| lower.contains(kw));

    match domain {
        Domain::Task => {
            if has_create && lower.contains("task") {
                query.to_string()
            } else if lower.contains("task") {
                match time_context {
                    Some(time) => format!("Show my tasks for {}", time),
                    None => "Show my tasks".to_string(),
                }
            } else {
                match time_context {
                    Some(time) => format!("List tasks for {}", time),
                    None => "List tasks".to_string(),
                }
            }
        }
        Domain::Calendar => {
            if lower.contains("schedule") {
                query.to_string()
            } else if lower.contains("meeting") || lower.contains("event") {
                match time_context {
                    Some(time) => format!("Show my meetings for {}", time),
                    None => "Show my meetings".to_string(),
                }
            } else {
                match time_context {
                    Some(time) => format!("List calendar events for {}", time),
                    None => "List calendar events".to_string(),
                }
            }
        }
        Domain::Email => {
            if lower.contains("send") || lower.contains("email") {
                query.to_string()
            } else if lower.contains("unread") {
                "Show unread emails".to_string()
            } else {
                match time_context {
                    Some(time) => format!("Search emails for {}", time),
                    None => "Search emails".to_string(),
                }
            }
        }
        Domain::Notion => {
            if has_create || lower.contains("update") {
                query.to_string()
            } else if lower.contains("search") || lower.contains("find") {
                "Search Notion".to_string()
            } else {
                "Query Notion".to_string()
            }
        }
        Domain::General | Domain::Mixed => query.to_string(),
    }
}

/// Action keyword map: create/add/schedule -> create (`create_page` for
/// notion), send (email) -> send, search/find -> search, otherwise list.
fn determine_action(query: &str, domain: Domain) -> Action {
    let lower = query.to_lowercase();

    if CREATE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return match domain {
            Domain::Notion => Action::CreatePage,
            Domain::Email => Action::Send,
            _ => Action::Create,
        };
    }
    if domain == Domain::Email && lower.contains("send") {
        return Action::Send;
    }
    if SEARCH_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Action::Search;
    }
    Action::List
}

/// Textual dependency patterns between sub-queries.
fn detect_dependencies(sub_queries: &mut [SubQuery], query: &str) {
    let lower = query.to_lowercase();

    let id_of = |subs: &[SubQuery], domain: Domain| -> Option<String> {
        subs.iter().find(|s| s.domain == domain).map(|s| s.id.clone())
    };

    if CREATE_FROM_EMAIL.is_match(&lower) {
        if let Some(email_id) = id_of(sub_queries, Domain::Email) {
            for sub in sub_queries.iter_mut().filter(|s| s.domain == Domain::Task) {
                tracing::debug!(dependent = %sub.id, dependency = %email_id, "task depends on email");
                sub.dependencies.push(email_id.clone());
            }
        }
    }

    if EMAIL_ABOUT_MEETING.is_match(&lower) {
        if let Some(calendar_id) = id_of(sub_queries, Domain::Calendar) {
            for sub in sub_queries.iter_mut().filter(|s| s.domain == Domain::Email) {
                tracing::debug!(dependent = %sub.id, dependency = %calendar_id, "email depends on calendar");
                sub.dependencies.push(calendar_id.clone());
            }
        }
    }

    if PREPARE_FOR_MEETING.is_match(&lower) {
        if let Some(calendar_id) = id_of(sub_queries, Domain::Calendar) {
            for sub in sub_queries
                .iter_mut()
                .filter(|s| matches!(s.domain, Domain::Task | Domain::Email))
            {
                tracing::debug!(dependent = %sub.id, dependency = %calendar_id, "preparation depends on calendar");
                sub.dependencies.push(calendar_id.clone());
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::analytics::InMemoryAnalyticsStore;
    use crate::adapters::events::NullEventSink;
    use crate::adapters::tools::MockTool;
    use crate::config::DetectionConfig;
    use crate::ports::tool::Tool;

    fn handler(analytics: Arc<InMemoryAnalyticsStore>) -> CrossDomainHandler {
        let catalog = Arc::new(ToolCatalog::with_defaults());
        CrossDomainHandler::new(
            catalog,
            DomainDetector::new(DetectionConfig::default()),
            ContextSynthesizer::new(crate::config::SynthesisConfig::default(), 200),
            analytics,
            Arc::new(NullEventSink),
            CrossDomainConfig::default(),
            &SelectionConfig::default(),
            Duration::from_secs(30),
        )
    }

    fn registry(tools: Vec<Arc<dyn Tool>>) -> ToolRegistry {
        ToolRegistry::from_tools(tools)
    }

    #[tokio::test]
    async fn tasks_and_meetings_match_the_explicit_pattern() {
        let h = handler(Arc::new(InMemoryAnalyticsStore::new()));
        let detection = h.detect("show my tasks and meetings for tomorrow").await;
        assert!(detection.is_cross_domain);
        assert_eq!(detection.domains, vec![Domain::Task, Domain::Calendar]);
        assert!((detection.confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn email_only_query_is_not_cross_domain() {
        let h = handler(Arc::new(InMemoryAnalyticsStore::new()));
        let detection = h.detect("summarize the email from my landlord").await;
        assert!(!detection.is_cross_domain);
    }

    #[tokio::test]
    async fn calendar_only_query_is_not_cross_domain() {
        let h = handler(Arc::new(InMemoryAnalyticsStore::new()));
        let detection = h.detect("show my meetings for tomorrow").await;
        assert!(!detection.is_cross_domain);
    }

    #[tokio::test]
    async fn create_task_per_email_is_cross_domain_with_email_first() {
        let h = handler(Arc::new(InMemoryAnalyticsStore::new()));
        let detection = h.detect("create a task for each unread email from my boss").await;
        assert!(detection.is_cross_domain);
        assert_eq!(detection.domains, vec![Domain::Email, Domain::Task]);
        assert!((detection.confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn parallel_fan_out_executes_all_sub_queries() {
        let analytics = Arc::new(InMemoryAnalyticsStore::new());
        let h = handler(Arc::clone(&analytics));
        let tasks = Arc::new(MockTool::new("tasks").with_response("1 task: file taxes"));
        let calendar = Arc::new(MockTool::new("calendar").with_response("2 meetings"));
        let tools = registry(vec![
            Arc::clone(&tasks) as Arc<dyn Tool>,
            Arc::clone(&calendar) as Arc<dyn Tool>,
            Arc::new(MockTool::new("email")),
        ]);

        let query = "show my tasks and meetings for tomorrow";
        let detection = h.detect(query).await;
        let outcome = h
            .handle(query, &detection, &tools, RequestIdentity::default(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.execution_mode, Some(ExecutionMode::Parallel));
        assert_eq!(outcome.successful_count, 2);
        assert_eq!(outcome.total_count, 2);
        let result = outcome.result.unwrap();
        assert!(result.contains("**Task:**"));
        assert!(result.contains("**Calendar:**"));
        assert!(result.contains("1 task: file taxes"));

        // Sub-query templating focused both queries.
        assert_eq!(tasks.calls()[0].1, "Show my tasks for tomorrow");
        assert_eq!(calendar.calls()[0].1, "Show my meetings for tomorrow");

        // Two sub-query rows plus one aggregate row, all cross-domain.
        let decisions = analytics.decisions().await;
        assert_eq!(decisions.len(), 3);
        assert!(decisions.iter().all(|d| d.cross_domain));
        assert!(decisions.iter().any(|d| d.routed_tool == "cross_domain"));
    }

    #[tokio::test]
    async fn dependent_mode_runs_email_first_and_enriches_task_query() {
        let analytics = Arc::new(InMemoryAnalyticsStore::new());
        let h = handler(analytics);
        let email = Arc::new(MockTool::new("email").with_response("2 unread emails from boss@corp.com"));
        let tasks = Arc::new(MockTool::new("tasks").with_response("2 tasks created"));
        let tools = registry(vec![
            Arc::clone(&email) as Arc<dyn Tool>,
            Arc::clone(&tasks) as Arc<dyn Tool>,
        ]);

        let query = "create a task for each unread email from my boss";
        let detection = h.detect(query).await;
        let outcome = h
            .handle(query, &detection, &tools, RequestIdentity::default(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.execution_mode, Some(ExecutionMode::Dependent));
        assert_eq!(outcome.successful_count, 2);

        // Email ran before tasks, and the task query carries its result.
        assert_eq!(email.call_count(), 1);
        let task_query = &tasks.calls()[0].1;
        assert!(task_query.contains("[Context: 2 unread emails from boss@corp.com]"));

        let task_sub = outcome
            .sub_queries
            .iter()
            .find(|s| s.domain == Domain::Task)
            .unwrap();
        assert_eq!(task_sub.dependencies.len(), 1);
        assert!(task_sub.dependencies[0].contains("email"));
    }

    #[tokio::test]
    async fn partial_failure_is_reported_in_a_note() {
        let h = handler(Arc::new(InMemoryAnalyticsStore::new()));
        let tasks = MockTool::new("tasks").with_response("3 tasks");
        let calendar =
            MockTool::new("calendar").with_scripted(Err(ToolError::Failed("api down".to_string())));
        let tools = registry(vec![
            Arc::new(tasks) as Arc<dyn Tool>,
            Arc::new(calendar) as Arc<dyn Tool>,
        ]);

        let query = "show my tasks and meetings for tomorrow";
        let detection = h.detect(query).await;
        let outcome = h
            .handle(query, &detection, &tools, RequestIdentity::default(), &CancellationToken::new())
            .await;

        assert_eq!(outcome.successful_count, 1);
        assert_eq!(outcome.total_count, 2);
        let result = outcome.result.unwrap();
        assert!(result.contains("3 tasks"));
        assert!(result.contains("**Note:**"));
        assert!(result.contains("Could not retrieve calendar information"));
    }

    #[tokio::test]
    async fn missing_domain_tool_skips_that_sub_query() {
        let h = handler(Arc::new(InMemoryAnalyticsStore::new()));
        // No calendar tool registered.
        let tools = registry(vec![Arc::new(MockTool::new("tasks")) as Arc<dyn Tool>]);

        let query = "show my tasks and meetings for tomorrow";
        let detection = h.detect(query).await;
        let outcome = h
            .handle(query, &detection, &tools, RequestIdentity::default(), &CancellationToken::new())
            .await;
        assert_eq!(outcome.total_count, 1);
        assert_eq!(outcome.sub_queries[0].domain, Domain::Task);
    }

    #[test]
    fn action_keyword_map_covers_domains() {
        assert_eq!(determine_action("create a task", Domain::Task), Action::Create);
        assert_eq!(determine_action("add a page about this", Domain::Notion), Action::CreatePage);
        assert_eq!(determine_action("send the summary", Domain::Email), Action::Send);
        assert_eq!(determine_action("find the notes", Domain::Task), Action::Search);
        assert_eq!(determine_action("show everything", Domain::Calendar), Action::List);
    }

    #[test]
    fn time_context_extraction_finds_the_first_match() {
        assert_eq!(extract_time_context("tasks for tomorrow"), Some("tomorrow".to_string()));
        assert_eq!(extract_time_context("meetings this week"), Some("this week".to_string()));
        assert_eq!(extract_time_context("all my tasks"), None);
    }

    #[test]
    fn prepare_for_meeting_makes_task_and_email_depend_on_calendar() {
        let mut subs = vec![
            SubQuery {
                id: "subquery_1_calendar".to_string(),
                query: "q".to_string(),
                domain: Domain::Calendar,
                tool_name: "calendar".to_string(),
                action: Action::List,
                dependencies: vec![],
                priority: 0,
                result: None,
                error: None,
                executed: false,
            },
            SubQuery {
                id: "subquery_2_task".to_string(),
                query: "q".to_string(),
                domain: Domain::Task,
                tool_name: "tasks".to_string(),
                action: Action::List,
                dependencies: vec![],
                priority: 1,
                result: None,
                error: None,
                executed: false,
            },
            SubQuery {
                id: "subquery_3_email".to_string(),
                query: "q".to_string(),
                domain: Domain::Email,
                tool_name: "email".to_string(),
                action: Action::List,
                dependencies: vec![],
                priority: 2,
                result: None,
                error: None,
                executed: false,
            },
        ];
        detect_dependencies(&mut subs, "prepare for my meeting tomorrow");
        assert!(subs[1].dependencies.contains(&"subquery_1_calendar".to_string()));
        assert!(subs[2].dependencies.contains(&"subquery_1_calendar".to_string()));
    }
}
