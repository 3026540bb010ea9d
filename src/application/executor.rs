//! Step execution - topological, level-parallel plan execution.
//!
//! Steps are partitioned into dependency levels; levels run in order and
//! the steps of one level run concurrently (in-level ordering is
//! unspecified). Each step gets a cheap lenient re-validation, context
//! enrichment, optional parser action refinement, a per-step timeout with
//! cooperative cancellation, a bounded retry budget for read-only actions,
//! and the alternate-tool retry on structured domain rejections. Context is
//! synthesized after every level and flows into the next.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::analytics::RoutingOutcome;
use crate::domain::catalog::{Domain, ToolCatalog};
use crate::domain::enrichment::ContextMap;
use crate::domain::foundation::StepId;
use crate::domain::plan::{Action, ExecutionPlan, ExecutionStep, PlanError, StepStatus};
use crate::domain::routing::{matched_keyword_domains, RoutingValidator};
use crate::ports::analytics::{AnalyticsStore, NewRoutingRecord};
use crate::ports::events::{WorkflowEvent, WorkflowEventKind, WorkflowEventSink};
use crate::ports::tool::{ParseOutcome, Tool, ToolError, ToolRegistry};

use super::record_routing_best_effort;
use super::synthesizer::ContextSynthesizer;

/// Executor tuning, derived from the orchestrator config.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub step_timeout: Duration,
    pub max_retries: u32,
    pub parser_refine_threshold: f64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            max_retries: 2,
            parser_refine_threshold: 0.60,
        }
    }
}

/// Execution failure that invalidates the whole plan.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("refusing to execute invalid plan: {0}")]
    InvalidPlan(#[from] PlanError),
}

/// Result of executing a plan.
#[derive(Debug)]
pub struct ExecutionReport {
    /// All steps with their final status, results, and timings.
    pub steps: Vec<ExecutionStep>,
    /// Context accumulated across levels.
    pub context: ContextMap,
    /// Number of steps that completed successfully.
    pub completed: usize,
    pub errors: Vec<String>,
}

/// Caller identity attached to analytics rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdentity<'a> {
    pub user_id: Option<i64>,
    pub session_id: Option<&'a str>,
}

struct StepSuccess {
    tool_name: String,
    domain: Domain,
    action: Action,
    result: String,
    elapsed: Duration,
}

struct StepFailure {
    message: String,
}

struct StepRun {
    retries: u32,
    outcome: Result<StepSuccess, StepFailure>,
}

enum AttemptError {
    Timeout,
    Cancelled,
    Tool(ToolError),
}

/// Executes plans level by level.
pub struct StepExecutor {
    catalog: Arc<ToolCatalog>,
    /// Lenient re-validation; planning already ran the strict pass.
    validator: RoutingValidator,
    synthesizer: ContextSynthesizer,
    analytics: Arc<dyn AnalyticsStore>,
    events: Arc<dyn WorkflowEventSink>,
    settings: ExecutorSettings,
}

impl StepExecutor {
    pub fn new(
        catalog: Arc<ToolCatalog>,
        validator: RoutingValidator,
        synthesizer: ContextSynthesizer,
        analytics: Arc<dyn AnalyticsStore>,
        events: Arc<dyn WorkflowEventSink>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            catalog,
            validator: validator.with_strictness(false),
            synthesizer,
            analytics,
            events,
            settings,
        }
    }

    /// Executes all steps of a plan. Refuses plans whose dependency graph
    /// is not a DAG.
    pub async fn execute(
        &self,
        plan: ExecutionPlan,
        tools: &ToolRegistry,
        identity: RequestIdentity<'_>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport, ExecutorError> {
        let levels = plan.dependency_levels()?;
        let mut steps = plan.steps;
        let mut errors = plan.errors;
        let mut context = ContextMap::new();
        let mut failed_ids: HashSet<StepId> = HashSet::new();

        for level in levels {
            let mut runnable = Vec::new();
            for idx in level {
                let blocked_by = steps[idx]
                    .dependencies
                    .iter()
                    .find(|dep| failed_ids.contains(dep))
                    .cloned();
                match blocked_by {
                    Some(dep) => {
                        let reason = format!("dependency '{}' failed", dep);
                        steps[idx].mark_blocked(reason.clone());
                        errors.push(format!("{}: {}", steps[idx].id, reason));
                        failed_ids.insert(steps[idx].id.clone());
                    }
                    None => runnable.push(idx),
                }
            }

            let runs = futures::future::join_all(runnable.iter().map(|&idx| {
                let snapshot = steps[idx].clone();
                let context = context.clone();
                async move { (idx, self.run_step(snapshot, &context, tools, identity, cancel).await) }
            }))
            .await;

            for (idx, run) in runs {
                let step = &mut steps[idx];
                step.retry_count = run.retries;
                step.mark_in_progress();
                match run.outcome {
                    Ok(success) => {
                        step.tool_name = success.tool_name;
                        step.domain = success.domain;
                        step.action = success.action;
                        step.mark_completed(success.result, success.elapsed);
                    }
                    Err(failure) => {
                        step.mark_failed(failure.message.clone());
                        errors.push(format!("{}: {}", step.id, failure.message));
                        failed_ids.insert(step.id.clone());
                    }
                }
            }

            for &idx in &runnable {
                if steps[idx].status != StepStatus::Completed {
                    continue;
                }
                let Some(result) = steps[idx].result.clone() else { continue };
                if let Some(extracted) = self.synthesizer.extract_context(&result).await {
                    context.extend(extracted);
                }
                context.insert("last_result".to_string(), result.into());
            }
            context = self.synthesizer.synthesize_context(&steps, context);
        }

        let completed = steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();

        Ok(ExecutionReport {
            steps,
            context,
            completed,
            errors,
        })
    }

    async fn run_step(
        &self,
        step: ExecutionStep,
        context: &ContextMap,
        tools: &ToolRegistry,
        identity: RequestIdentity<'_>,
        cancel: &CancellationToken,
    ) -> StepRun {
        let verdict = self.validator.validate(&step.query, &step.tool_name, None).await;
        if !verdict.valid {
            let message = format!("routing validation failed: {}", verdict.reason);
            self.record_failure(&step, &step.tool_name, step.domain, &message, None, identity)
                .await;
            return StepRun {
                retries: 0,
                outcome: Err(StepFailure { message }),
            };
        }

        let mut tool_name = step.tool_name.clone();
        let mut domain = step.domain;
        let Some(mut tool) = tools.get(&tool_name) else {
            let message = format!("tool '{}' not available", tool_name);
            self.emit_error(&step, &tool_name, &message).await;
            self.record_failure(&step, &tool_name, domain, &message, None, identity)
                .await;
            return StepRun {
                retries: 0,
                outcome: Err(StepFailure { message }),
            };
        };

        let enriched = self
            .synthesizer
            .apply_context_to_query(&step.query, context, &step.context_requirements);

        let mut action = step.action;
        let mut parser_used = false;
        if let Some(parser) = tool.parser() {
            if let ParseOutcome::Parsed(parsed) = parser.parse(&enriched) {
                let refinable = matches!(action, Action::List | Action::Search);
                let more_specific = !matches!(parsed.action, Action::List | Action::Search);
                if parsed.confidence >= self.settings.parser_refine_threshold
                    && refinable
                    && more_specific
                {
                    tracing::debug!(step = %step.id, action = %parsed.action, "parser refined action");
                    action = parsed.action;
                    parser_used = true;
                }
            }
        }

        self.events
            .emit(WorkflowEvent::new(
                WorkflowEventKind::ToolCallStart,
                format!("Calling {}", tool_name),
                serde_json::json!({
                    "step_id": step.id.as_str(),
                    "action": action.as_str(),
                    "query": enriched,
                    "parser_used": parser_used,
                }),
            ))
            .await;

        let mut retries = 0u32;
        let mut switched_tool = false;

        loop {
            let started = Instant::now();
            let attempt = tokio::select! {
                _ = cancel.cancelled() => Err(AttemptError::Cancelled),
                outcome = tokio::time::timeout(self.settings.step_timeout, tool.run(action, &enriched)) => {
                    match outcome {
                        Err(_) => Err(AttemptError::Timeout),
                        Ok(Ok(text)) => Ok(text),
                        Ok(Err(e)) => Err(AttemptError::Tool(e)),
                    }
                }
            };
            let elapsed = started.elapsed();

            match attempt {
                Ok(result) => {
                    record_routing_best_effort(
                        self.analytics.as_ref(),
                        NewRoutingRecord::new(&step.query, &tool_name, RoutingOutcome::Success)
                            .with_domain(domain)
                            .with_confidence(verdict.confidence)
                            .with_parser_used(parser_used)
                            .with_validator_used(true)
                            .with_execution_time_ms(elapsed.as_secs_f64() * 1000.0)
                            .with_user(identity.user_id, identity.session_id),
                    )
                    .await;

                    self.events
                        .emit(WorkflowEvent::new(
                            WorkflowEventKind::ToolComplete,
                            format!("Completed {}", action),
                            serde_json::json!({
                                "step_id": step.id.as_str(),
                                "tool": tool_name,
                                "execution_time_ms": elapsed.as_secs_f64() * 1000.0,
                            }),
                        ))
                        .await;

                    tracing::info!(step = %step.id, tool = %tool_name, elapsed_ms = elapsed.as_millis() as u64, "step completed");
                    return StepRun {
                        retries,
                        outcome: Ok(StepSuccess {
                            tool_name,
                            domain,
                            action,
                            result,
                            elapsed,
                        }),
                    };
                }

                Err(AttemptError::Cancelled) => {
                    let message = "request cancelled".to_string();
                    self.record_failure(&step, &tool_name, domain, &message, Some(elapsed), identity)
                        .await;
                    return StepRun {
                        retries,
                        outcome: Err(StepFailure { message }),
                    };
                }

                Err(AttemptError::Tool(ToolError::Rejected {
                    message,
                    suggested_domains,
                })) => {
                    let failure = format!("tool '{}' rejected the query: {}", tool_name, message);
                    self.record_failure(&step, &tool_name, domain, &failure, Some(elapsed), identity)
                        .await;

                    if switched_tool {
                        return StepRun {
                            retries,
                            outcome: Err(StepFailure { message: failure }),
                        };
                    }

                    match self.alternate_tool(&step.query, domain, &suggested_domains, tools) {
                        Some((alt_name, alt_domain, alt_tool)) => {
                            tracing::info!(
                                step = %step.id,
                                from = %tool_name,
                                to = %alt_name,
                                "tool rejection, retrying with alternate domain tool"
                            );
                            if let Err(e) = self
                                .analytics
                                .record_misrouting_pattern(
                                    &step.query,
                                    &tool_name,
                                    &alt_name,
                                    Some(verdict.confidence),
                                )
                                .await
                            {
                                tracing::warn!(error = %e, "misrouting pattern write failed");
                            }
                            tool_name = alt_name;
                            domain = alt_domain;
                            tool = alt_tool;
                            switched_tool = true;
                            continue;
                        }
                        None => {
                            return StepRun {
                                retries,
                                outcome: Err(StepFailure { message: failure }),
                            };
                        }
                    }
                }

                Err(err) => {
                    let message = match &err {
                        AttemptError::Timeout => format!(
                            "tool '{}' timed out after {:.0?}",
                            tool_name, self.settings.step_timeout
                        ),
                        AttemptError::Tool(e) => e.to_string(),
                        AttemptError::Cancelled => unreachable!("handled above"),
                    };
                    self.record_failure(&step, &tool_name, domain, &message, Some(elapsed), identity)
                        .await;

                    if action.is_retryable() && retries < self.settings.max_retries {
                        retries += 1;
                        tracing::warn!(
                            step = %step.id,
                            retry = retries,
                            error = %message,
                            "step failed, retrying"
                        );
                        continue;
                    }

                    self.emit_error(&step, &tool_name, &message).await;
                    return StepRun {
                        retries,
                        outcome: Err(StepFailure { message }),
                    };
                }
            }
        }
    }

    /// Picks the alternate tool for a rejected step: the canonical tool of
    /// the first keyword-matched (or parser-suggested) domain that differs
    /// from the current one and is available.
    fn alternate_tool(
        &self,
        query: &str,
        current_domain: Domain,
        suggested: &[Domain],
        tools: &ToolRegistry,
    ) -> Option<(String, Domain, Arc<dyn Tool>)> {
        let candidates: Vec<Domain> = if suggested.is_empty() {
            matched_keyword_domains(query)
        } else {
            suggested.to_vec()
        };

        let available = tools.name_set();
        for candidate in candidates {
            if candidate == current_domain || !candidate.is_data_domain() {
                continue;
            }
            if let Some(name) = self.catalog.map_domain_to_tool(candidate, Some(&available)) {
                if let Some(tool) = tools.get(&name) {
                    return Some((name, candidate, tool));
                }
            }
        }
        None
    }

    async fn record_failure(
        &self,
        step: &ExecutionStep,
        tool_name: &str,
        domain: Domain,
        message: &str,
        elapsed: Option<Duration>,
        identity: RequestIdentity<'_>,
    ) {
        let mut record = NewRoutingRecord::new(&step.query, tool_name, RoutingOutcome::Failure)
            .with_domain(domain)
            .with_error(message)
            .with_validator_used(true)
            .with_user(identity.user_id, identity.session_id);
        if let Some(elapsed) = elapsed {
            record = record.with_execution_time_ms(elapsed.as_secs_f64() * 1000.0);
        }
        record_routing_best_effort(self.analytics.as_ref(), record).await;
    }

    async fn emit_error(&self, step: &ExecutionStep, tool_name: &str, message: &str) {
        self.events
            .emit(WorkflowEvent::new(
                WorkflowEventKind::Error,
                message.to_string(),
                serde_json::json!({
                    "step_id": step.id.as_str(),
                    "tool": tool_name,
                }),
            ))
            .await;
    }
}
