//! Orchestrator facade - the entry point composing detection, planning,
//! execution, and synthesis.
//!
//! Admission control (rate limiting) sits in front of this facade; see
//! [`crate::application::rate_limiter`]. Per request the orchestrator
//! tries the cross-domain fast path, otherwise decomposes the query,
//! plans it, executes the plan, and synthesizes the final prose. A
//! request succeeds when at least one step completes; a plan with zero
//! executable steps fails.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::domain::catalog::{Domain, ToolCatalog};
use crate::domain::decompose::QueryDecomposer;
use crate::domain::enrichment::ContextMap;
use crate::domain::plan::{OrchestrationResult, StepStatus};
use crate::domain::routing::{DomainDetector, RoutingValidator};
use crate::ports::analytics::AnalyticsStore;
use crate::ports::analyzer::QueryAnalyzer;
use crate::ports::events::{WorkflowEvent, WorkflowEventKind, WorkflowEventSink};
use crate::ports::llm::LlmClient;
use crate::ports::synthesizer::ResponseSynthesizer;
use crate::ports::tool::ToolRegistry;

use super::cross_domain::CrossDomainHandler;
use super::executor::{ExecutionReport, ExecutorSettings, RequestIdentity, StepExecutor};
use super::planner::{ExecutionPlanner, PlannerOptions};
use super::selector::ToolSelector;
use super::synthesizer::ContextSynthesizer;

/// Builder wiring the orchestration pipeline.
pub struct OrchestratorBuilder {
    tools: ToolRegistry,
    analytics: Arc<dyn AnalyticsStore>,
    events: Arc<dyn WorkflowEventSink>,
    config: AppConfig,
    catalog: Option<Arc<ToolCatalog>>,
    llm: Option<Arc<dyn LlmClient>>,
    analyzer: Option<Arc<dyn QueryAnalyzer>>,
    synthesizer: Option<Arc<dyn ResponseSynthesizer>>,
}

impl OrchestratorBuilder {
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the process-wide catalog (mainly for tests).
    pub fn with_catalog(mut self, catalog: Arc<ToolCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn WorkflowEventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn QueryAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn ResponseSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn build(self) -> Orchestrator {
        let catalog = self.catalog.unwrap_or_else(ToolCatalog::shared);
        let config = self.config;

        // Surface unregistered tools early; they route as general.
        let names = self.tools.names();
        let _ = catalog.build_from_available_tools(names.iter().map(String::as_str));

        let mut detector = DomainDetector::new(config.detection.clone());
        if let Some(analyzer) = &self.analyzer {
            detector = detector.with_analyzer(Arc::clone(analyzer));
        }

        let validator = RoutingValidator::new(
            detector.clone(),
            Arc::clone(&catalog),
            config.detection.clone(),
            config.orchestrator.strict_validation,
        );

        let mut context_synthesizer =
            ContextSynthesizer::new(config.synthesis.clone(), config.orchestrator.max_context_snippet);
        if let Some(llm) = &self.llm {
            context_synthesizer = context_synthesizer.with_llm(Arc::clone(llm));
        }

        let mut decomposer = QueryDecomposer::new(config.detection.clone());
        if let Some(llm) = &self.llm {
            decomposer = decomposer.with_llm(Arc::clone(llm));
        }

        let planner = ExecutionPlanner::new(
            ToolSelector::new(Arc::clone(&catalog), config.selection.clone()),
            validator.clone(),
            Arc::clone(&catalog),
            Arc::clone(&self.analytics),
            PlannerOptions {
                enable_validation: config.orchestrator.enable_validation,
                auto_correct: config.orchestrator.auto_correct_routing,
                reject_on_plan_warnings: config.orchestrator.reject_on_plan_warnings,
            },
        );

        let executor = StepExecutor::new(
            Arc::clone(&catalog),
            validator.clone(),
            context_synthesizer.clone(),
            Arc::clone(&self.analytics),
            Arc::clone(&self.events),
            ExecutorSettings {
                step_timeout: config.orchestrator.step_timeout(),
                max_retries: config.orchestrator.max_step_retries,
                parser_refine_threshold: config.selection.parser_refine_threshold,
            },
        );

        let mut cross_domain = CrossDomainHandler::new(
            Arc::clone(&catalog),
            detector,
            context_synthesizer,
            Arc::clone(&self.analytics),
            Arc::clone(&self.events),
            config.cross_domain.clone(),
            &config.selection,
            config.orchestrator.step_timeout(),
        );
        if let Some(synthesizer) = &self.synthesizer {
            cross_domain = cross_domain.with_synthesizer(Arc::clone(synthesizer));
        }

        Orchestrator {
            tools: self.tools,
            decomposer,
            planner,
            executor,
            cross_domain,
            synthesizer: self.synthesizer,
            events: self.events,
            config,
        }
    }
}

/// Entry point for query orchestration.
pub struct Orchestrator {
    tools: ToolRegistry,
    decomposer: QueryDecomposer,
    planner: ExecutionPlanner,
    executor: StepExecutor,
    cross_domain: CrossDomainHandler,
    synthesizer: Option<Arc<dyn ResponseSynthesizer>>,
    events: Arc<dyn WorkflowEventSink>,
    config: AppConfig,
}

impl Orchestrator {
    /// Starts a builder over the available tools and analytics store.
    pub fn builder(tools: ToolRegistry, analytics: Arc<dyn AnalyticsStore>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            tools,
            analytics,
            events: Arc::new(crate::adapters::events::NullEventSink),
            config: AppConfig::default(),
            catalog: None,
            llm: None,
            analyzer: None,
            synthesizer: None,
        }
    }

    /// Executes a query end to end.
    pub async fn execute_query(
        &self,
        query: &str,
        user_id: Option<i64>,
        session_id: Option<&str>,
    ) -> OrchestrationResult {
        self.execute_query_with_cancellation(query, user_id, session_id, CancellationToken::new())
            .await
    }

    /// Executes a query under an external cancellation token.
    pub async fn execute_query_with_cancellation(
        &self,
        query: &str,
        user_id: Option<i64>,
        session_id: Option<&str>,
        cancel: CancellationToken,
    ) -> OrchestrationResult {
        let started = Instant::now();
        let query = query.trim();

        if query.is_empty() {
            return OrchestrationResult::failure(
                "Cannot execute an empty query.",
                started.elapsed().as_secs_f64(),
                vec!["empty query".to_string()],
            );
        }

        self.events
            .emit(WorkflowEvent::new(
                WorkflowEventKind::ReasoningStart,
                "Working on your request",
                serde_json::json!({ "query": query }),
            ))
            .await;

        let identity = RequestIdentity { user_id, session_id };

        let detection = self.cross_domain.detect(query).await;
        if detection.is_cross_domain
            && detection.confidence >= self.config.orchestrator.cross_domain_confidence_threshold
        {
            tracing::info!(
                domains = ?detection.domains,
                confidence = detection.confidence,
                "cross-domain query detected"
            );
            return self.run_cross_domain(query, &detection, identity, &cancel, started).await;
        }

        let descriptors = match tokio::time::timeout(
            self.config.orchestrator.decomposition_timeout(),
            self.decomposer.decompose(query, None),
        )
        .await
        {
            Ok(descriptors) => descriptors,
            Err(_) => {
                tracing::warn!("query decomposition timed out, using a single step");
                vec![self.decomposer.single_step(query)]
            }
        };
        tracing::info!(steps = descriptors.len(), "query decomposed");

        let plan = match tokio::time::timeout(
            self.config.orchestrator.planning_timeout(),
            self.planner.plan(descriptors, None, query, None, &self.tools),
        )
        .await
        {
            Ok(Ok(plan)) => plan,
            Ok(Err(e)) => {
                return self
                    .fail(format!("Planning failed: {}", e), started, vec![e.to_string()])
                    .await;
            }
            Err(_) => {
                return self
                    .fail(
                        "Planning timed out.".to_string(),
                        started,
                        vec!["planning timed out".to_string()],
                    )
                    .await;
            }
        };

        if plan.is_empty() {
            let errors = plan.errors.clone();
            return self
                .fail(
                    "I couldn't find any executable steps for this query.".to_string(),
                    started,
                    errors,
                )
                .await;
        }

        let total_steps = plan.len();
        let report = match self.executor.execute(plan, &self.tools, identity, &cancel).await {
            Ok(report) => report,
            Err(e) => {
                return self
                    .fail(format!("Execution refused: {}", e), started, vec![e.to_string()])
                    .await;
            }
        };

        let final_result = self.synthesize_final(query, &report).await;
        let result = OrchestrationResult {
            success: report.completed > 0,
            final_result,
            steps_executed: report.completed,
            total_steps,
            execution_time: started.elapsed().as_secs_f64(),
            errors: report.errors,
            context_used: report.context,
        };

        self.emit_complete(&result).await;
        result
    }

    async fn run_cross_domain(
        &self,
        query: &str,
        detection: &super::cross_domain::CrossDomainDetection,
        identity: RequestIdentity<'_>,
        cancel: &CancellationToken,
        started: Instant,
    ) -> OrchestrationResult {
        let outcome = self
            .cross_domain
            .handle(query, detection, &self.tools, identity, cancel)
            .await;

        let errors: Vec<String> = outcome
            .sub_queries
            .iter()
            .filter_map(|s| s.error.as_ref().map(|e| format!("{}: {}", s.id, e)))
            .collect();

        let mut context_used = ContextMap::new();
        context_used.insert("cross_domain".to_string(), true.into());
        context_used.insert(
            "domains".to_string(),
            serde_json::json!(outcome.domains.iter().map(Domain::as_str).collect::<Vec<_>>()),
        );
        if let Some(mode) = outcome.execution_mode {
            context_used.insert("execution_mode".to_string(), mode.as_str().into());
        }

        let result = OrchestrationResult {
            success: outcome.successful_count > 0,
            final_result: outcome.result.unwrap_or_else(|| {
                "I couldn't retrieve any information. Please try again.".to_string()
            }),
            steps_executed: outcome.successful_count,
            total_steps: outcome.total_count,
            execution_time: started.elapsed().as_secs_f64(),
            errors,
            context_used,
        };

        self.emit_complete(&result).await;
        result
    }

    /// Synthesizes the final prose from an execution report.
    async fn synthesize_final(&self, query: &str, report: &ExecutionReport) -> String {
        let mut completed: Vec<_> = report
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed && s.result.is_some())
            .collect();

        if completed.is_empty() {
            return "I couldn't complete any steps for this query.".to_string();
        }

        // Mutation outcomes outrank read results: a created task matters
        // more than the search that preceded it.
        let mutations: Vec<_> = completed
            .iter()
            .filter(|s| s.action.is_mutation())
            .copied()
            .collect();
        if !mutations.is_empty() {
            completed = mutations;
        }

        if let Some(synthesizer) = &self.synthesizer {
            let mut by_domain: BTreeMap<Domain, String> = BTreeMap::new();
            for step in &completed {
                if let Some(result) = &step.result {
                    by_domain.insert(step.domain, result.clone());
                }
            }
            match synthesizer.synthesize(query, &by_domain, &report.context).await {
                Ok(text) => return self.append_failure_note(text, report),
                Err(e) => {
                    tracing::debug!(error = %e, "synthesizer failed, using concatenation");
                }
            }
        }

        let body = if completed.len() == 1 {
            completed[0].result.clone().unwrap_or_default()
        } else {
            let mut parts = vec!["Here's what I found:".to_string()];
            for step in &completed {
                parts.push(format!(
                    "\n**{}:**\n{}",
                    capitalize(step.domain.as_str()),
                    step.result.as_deref().unwrap_or_default()
                ));
            }
            parts.join("\n")
        };

        self.append_failure_note(body, report)
    }

    fn append_failure_note(&self, mut body: String, report: &ExecutionReport) -> String {
        let failed: Vec<_> = report
            .steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Failed | StepStatus::Blocked))
            .take(self.config.orchestrator.max_errors_in_response)
            .collect();
        if failed.is_empty() {
            return body;
        }

        body.push_str("\n\n**Note:**");
        for step in failed {
            body.push_str(&format!(
                "\n- Could not retrieve {} information: {}",
                step.domain,
                step.error.as_deref().unwrap_or("unknown error")
            ));
        }
        body
    }

    async fn fail(
        &self,
        message: String,
        started: Instant,
        errors: Vec<String>,
    ) -> OrchestrationResult {
        self.events
            .emit(WorkflowEvent::new(
                WorkflowEventKind::Error,
                message.clone(),
                serde_json::json!({ "errors": errors }),
            ))
            .await;

        OrchestrationResult::failure(message, started.elapsed().as_secs_f64(), errors)
    }

    async fn emit_complete(&self, result: &OrchestrationResult) {
        self.events
            .emit(WorkflowEvent::new(
                WorkflowEventKind::WorkflowComplete,
                if result.success {
                    "Query completed"
                } else {
                    "Query failed"
                },
                serde_json::json!({
                    "success": result.success,
                    "steps_executed": result.steps_executed,
                    "total_steps": result.total_steps,
                }),
            ))
            .await;
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
