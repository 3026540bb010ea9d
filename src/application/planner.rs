//! Execution planning - turning step descriptors into a validated plan.
//!
//! For each descriptor the planner selects a tool, validates the routing,
//! and either accepts the step, auto-corrects it to the detected domain's
//! canonical tool (recording the correction), or drops it. Plan-level
//! validation findings are attached as warnings and never block execution
//! unless `reject_on_plan_warnings` is enabled.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::analytics::RoutingOutcome;
use crate::domain::catalog::{Domain, ToolCatalog};
use crate::domain::decompose::{MemoryRecommendations, StepDescriptor};
use crate::domain::plan::{ExecutionPlan, ExecutionStep};
use crate::domain::routing::RoutingValidator;
use crate::ports::analytics::{AnalyticsStore, NewRoutingRecord};
use crate::ports::tool::{ParsedQuery, ToolRegistry};

use super::record_routing_best_effort;
use super::selector::ToolSelector;

/// Planner behavior switches, derived from the orchestrator config.
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    pub enable_validation: bool,
    pub auto_correct: bool,
    pub reject_on_plan_warnings: bool,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            enable_validation: true,
            auto_correct: true,
            reject_on_plan_warnings: false,
        }
    }
}

/// Planning failure.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("execution plan rejected: {warnings:?}")]
    PlanRejected { warnings: Vec<String> },
}

/// Builds execution plans from decomposed step descriptors.
pub struct ExecutionPlanner {
    selector: ToolSelector,
    validator: RoutingValidator,
    catalog: Arc<ToolCatalog>,
    analytics: Arc<dyn AnalyticsStore>,
    options: PlannerOptions,
}

impl ExecutionPlanner {
    pub fn new(
        selector: ToolSelector,
        validator: RoutingValidator,
        catalog: Arc<ToolCatalog>,
        analytics: Arc<dyn AnalyticsStore>,
        options: PlannerOptions,
    ) -> Self {
        Self {
            selector,
            validator,
            catalog,
            analytics,
            options,
        }
    }

    /// Plans execution for the given descriptors against the available
    /// tools.
    pub async fn plan(
        &self,
        descriptors: Vec<StepDescriptor>,
        memory: Option<&MemoryRecommendations>,
        original_query: &str,
        parser_results: Option<&HashMap<String, ParsedQuery>>,
        tools: &ToolRegistry,
    ) -> Result<ExecutionPlan, PlannerError> {
        let mut plan = ExecutionPlan::default();

        for descriptor in descriptors {
            let Some(selection) = self.selector.select(
                &descriptor.query,
                &descriptor.intent,
                memory,
                parser_results,
                tools,
            ) else {
                plan.errors
                    .push(format!("no tool available for step '{}'", descriptor.id));
                continue;
            };

            let mut tool_name = selection.tool_name;

            if self.options.enable_validation && !descriptor.query.is_empty() {
                let parsed = parser_results.and_then(|r| r.get(&tool_name));
                let verdict = self
                    .validator
                    .validate(&descriptor.query, &tool_name, parsed)
                    .await;

                if !verdict.valid {
                    tracing::error!(
                        query = %descriptor.query,
                        tool = %tool_name,
                        reason = %verdict.reason,
                        "routing validation failed"
                    );

                    let corrected = if self.options.auto_correct {
                        self.attempt_correction(
                            &descriptor.query,
                            &tool_name,
                            verdict.detected_domain,
                            &verdict.reason,
                            verdict.confidence,
                            tools,
                        )
                        .await
                    } else {
                        None
                    };

                    match corrected {
                        Some(corrected_tool) => tool_name = corrected_tool,
                        None => {
                            tracing::error!(
                                step = %descriptor.id,
                                "skipping step, routing cannot be corrected"
                            );
                            plan.errors.push(format!(
                                "step '{}' dropped: {}",
                                descriptor.id, verdict.reason
                            ));
                            record_routing_best_effort(
                                self.analytics.as_ref(),
                                NewRoutingRecord::new(
                                    &descriptor.query,
                                    &tool_name,
                                    RoutingOutcome::Failure,
                                )
                                .with_domain(verdict.detected_domain)
                                .with_confidence(verdict.confidence)
                                .with_validator_used(true)
                                .with_error(verdict.reason.clone()),
                            )
                            .await;
                            continue;
                        }
                    }
                } else {
                    let _ = self
                        .analytics
                        .record_domain_validation(
                            &descriptor.query,
                            verdict.detected_domain,
                            &tool_name,
                            true,
                            verdict.confidence,
                            verdict.confidence,
                        )
                        .await
                        .map_err(|e| {
                            tracing::warn!(error = %e, "analytics write failed, continuing")
                        });
                }
            }

            let domain = self
                .catalog
                .domain_for_tool(&tool_name)
                .unwrap_or(Domain::General);

            plan.steps.push(ExecutionStep::new(
                descriptor.id,
                tool_name,
                descriptor.action,
                descriptor.query,
                descriptor.intent,
                domain,
                descriptor.dependencies,
                descriptor.context_requirements,
            ));
        }

        if self.options.enable_validation && !plan.steps.is_empty() {
            let validation = self.validator.validate_plan(original_query, &plan.steps).await;
            plan.warnings.extend(validation.warnings);
            // Individual step invalidity was already handled above; plan
            // findings are informational.
            plan.errors.extend(validation.errors);

            if self.options.reject_on_plan_warnings && !plan.warnings.is_empty() {
                return Err(PlannerError::PlanRejected {
                    warnings: plan.warnings,
                });
            }
        }

        Ok(plan)
    }

    /// Tries to reroute an invalid step to the detected domain's canonical
    /// tool, recording a correction on success.
    async fn attempt_correction(
        &self,
        query: &str,
        original_tool: &str,
        detected_domain: Domain,
        reason: &str,
        validator_confidence: f64,
        tools: &ToolRegistry,
    ) -> Option<String> {
        if !detected_domain.is_data_domain() {
            return None;
        }

        let available = tools.name_set();
        let corrected = self
            .catalog
            .map_domain_to_tool(detected_domain, Some(&available))?;
        if corrected == original_tool {
            return None;
        }

        tracing::info!(
            from = %original_tool,
            to = %corrected,
            "auto-correcting routing"
        );

        let decision_id = record_routing_best_effort(
            self.analytics.as_ref(),
            NewRoutingRecord::new(query, &corrected, RoutingOutcome::Correction)
                .with_domain(detected_domain)
                .with_confidence(validator_confidence)
                .with_validator_used(true)
                .with_metadata(serde_json::json!({ "original_tool": original_tool })),
        )
        .await;

        if let Some(decision_id) = decision_id {
            if let Err(e) = self
                .analytics
                .record_correction(
                    decision_id,
                    original_tool,
                    &corrected,
                    reason,
                    Some(validator_confidence),
                )
                .await
            {
                tracing::warn!(error = %e, "correction record failed, continuing");
            }
        }

        Some(corrected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::analytics::InMemoryAnalyticsStore;
    use crate::adapters::tools::MockTool;
    use crate::config::{DetectionConfig, SelectionConfig};
    use crate::domain::decompose::QueryDecomposer;
    use crate::domain::plan::Action;
    use crate::domain::routing::DomainDetector;
    use crate::ports::tool::Tool;

    fn planner(analytics: Arc<InMemoryAnalyticsStore>) -> ExecutionPlanner {
        let catalog = Arc::new(ToolCatalog::with_defaults());
        let detection = DetectionConfig::default();
        ExecutionPlanner::new(
            ToolSelector::new(Arc::clone(&catalog), SelectionConfig::default()),
            RoutingValidator::new(
                DomainDetector::new(detection.clone()),
                Arc::clone(&catalog),
                detection,
                true,
            ),
            catalog,
            analytics,
            PlannerOptions::default(),
        )
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::from_tools(vec![
            Arc::new(MockTool::new("email")) as Arc<dyn Tool>,
            Arc::new(MockTool::new("tasks")),
            Arc::new(MockTool::new("calendar")),
        ])
    }

    async fn descriptors_for(query: &str) -> Vec<StepDescriptor> {
        QueryDecomposer::new(DetectionConfig::default())
            .decompose(query, None)
            .await
    }

    #[tokio::test]
    async fn plans_a_single_task_step() {
        let analytics = Arc::new(InMemoryAnalyticsStore::new());
        let planner = planner(Arc::clone(&analytics));
        let descriptors = descriptors_for("what tasks do I have today").await;

        let plan = planner
            .plan(descriptors, None, "what tasks do I have today", None, &registry())
            .await
            .unwrap();

        assert_eq!(plan.len(), 1);
        let step = &plan.steps[0];
        assert_eq!(step.tool_name, "tasks");
        assert_eq!(step.action, Action::List);
        assert_eq!(step.domain, Domain::Task);
        assert!(step.dependencies.is_empty());
    }

    #[tokio::test]
    async fn misrouted_descriptor_is_auto_corrected_with_record() {
        let analytics = Arc::new(InMemoryAnalyticsStore::new());
        let planner = planner(Arc::clone(&analytics));

        // A selector fed the calendar intent routes the task query to the
        // calendar tool; validation catches and corrects it.
        let mut descriptors = descriptors_for("create a task to call Alice").await;
        descriptors[0].intent = "calendar".to_string();

        let plan = planner
            .plan(descriptors, None, "create a task to call Alice", None, &registry())
            .await
            .unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps[0].tool_name, "tasks");
        assert_eq!(plan.steps[0].domain, Domain::Task);

        let corrections = analytics.corrections().await;
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].original_tool, "calendar");
        assert_eq!(corrections[0].corrected_tool, "tasks");

        // The correction row links back to a decision with the correction
        // outcome.
        let decisions = analytics.decisions().await;
        let decision = decisions
            .iter()
            .find(|d| d.id == corrections[0].routing_decision_id)
            .unwrap();
        assert_eq!(decision.outcome, RoutingOutcome::Correction);
    }

    #[tokio::test]
    async fn uncorrectable_step_is_dropped_not_crashed() {
        let analytics = Arc::new(InMemoryAnalyticsStore::new());
        let planner = planner(Arc::clone(&analytics));

        let mut descriptors = descriptors_for("create a task to call Alice").await;
        descriptors[0].intent = "calendar".to_string();

        // No task tool available: correction has nowhere to land.
        let tools = ToolRegistry::from_tools(vec![
            Arc::new(MockTool::new("calendar")) as Arc<dyn Tool>,
            Arc::new(MockTool::new("email")),
        ]);

        let plan = planner
            .plan(descriptors, None, "create a task to call Alice", None, &tools)
            .await
            .unwrap();

        assert!(plan.is_empty());
        assert!(!plan.errors.is_empty());
    }

    #[tokio::test]
    async fn empty_registry_produces_empty_plan_with_errors() {
        let analytics = Arc::new(InMemoryAnalyticsStore::new());
        let planner = planner(analytics);
        let descriptors = descriptors_for("what tasks do I have today").await;

        let plan = planner
            .plan(descriptors, None, "what tasks do I have today", None, &ToolRegistry::new())
            .await
            .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.errors.len(), 1);
    }

    #[tokio::test]
    async fn reject_on_plan_warnings_gates_when_enabled() {
        let analytics = Arc::new(InMemoryAnalyticsStore::new());
        let catalog = Arc::new(ToolCatalog::with_defaults());
        let detection = DetectionConfig::default();
        let planner = ExecutionPlanner::new(
            ToolSelector::new(Arc::clone(&catalog), SelectionConfig::default()),
            RoutingValidator::new(
                DomainDetector::new(detection.clone()),
                Arc::clone(&catalog),
                detection,
                true,
            ),
            catalog,
            analytics,
            PlannerOptions {
                reject_on_plan_warnings: true,
                ..Default::default()
            },
        );

        // A vague query validates at 0.5 and the detector-free fragment
        // "them" scores 0.0, so plan warnings are possible; force one with
        // a mismatching lenient step by planning a vague query against the
        // first-available tool.
        let descriptors = descriptors_for("handle it").await;
        let tools = ToolRegistry::from_tools(vec![Arc::new(MockTool::new("email")) as Arc<dyn Tool>]);
        let result = planner.plan(descriptors, None, "handle it", None, &tools).await;
        // Valid at the general-domain confidence (0.5), which is above the
        // warning floor: no warnings, plan accepted.
        assert!(result.is_ok());
    }
}
