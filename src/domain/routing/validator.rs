//! Routing validation - prevents queries from reaching the wrong domain.
//!
//! Validates `(query, target_tool)` pairs before execution. Strict mode
//! rejects confident mismatches (the planner may then auto-correct or drop
//! the step); lenient mode admits them with a warning.

use std::sync::Arc;

use crate::config::{mismatch_message, DetectionConfig};
use crate::domain::catalog::{Domain, ToolCatalog};
use crate::domain::plan::ExecutionStep;
use crate::ports::tool::ParsedQuery;

use super::detector::DomainDetector;

/// Verdict on a single routing decision.
#[derive(Debug, Clone)]
pub struct ValidationVerdict {
    pub valid: bool,
    /// Always within [0, 1].
    pub confidence: f64,
    pub reason: String,
    pub detected_domain: Domain,
    pub target_domain: Domain,
    pub suggestions: Vec<String>,
}

/// One step's verdict inside a plan validation.
#[derive(Debug, Clone)]
pub struct StepVerdict {
    pub step_id: String,
    pub verdict: ValidationVerdict,
}

/// Validation over an entire execution plan.
#[derive(Debug, Clone)]
pub struct PlanValidation {
    pub overall_valid: bool,
    /// Minimum confidence over all step verdicts.
    pub confidence: f64,
    pub step_verdicts: Vec<StepVerdict>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Validates routing decisions against detected query domains.
#[derive(Debug, Clone)]
pub struct RoutingValidator {
    detector: DomainDetector,
    catalog: Arc<ToolCatalog>,
    config: DetectionConfig,
    strict: bool,
}

impl RoutingValidator {
    pub fn new(
        detector: DomainDetector,
        catalog: Arc<ToolCatalog>,
        config: DetectionConfig,
        strict: bool,
    ) -> Self {
        Self {
            detector,
            catalog,
            config,
            strict,
        }
    }

    /// Returns a copy of this validator in the given strictness mode.
    pub fn with_strictness(&self, strict: bool) -> Self {
        let mut cloned = self.clone();
        cloned.strict = strict;
        cloned
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Validates that a query belongs with the targeted tool.
    pub async fn validate(
        &self,
        query: &str,
        target_tool: &str,
        parser_result: Option<&ParsedQuery>,
    ) -> ValidationVerdict {
        let detection = self.detector.detect(query).await;
        let detected = detection.domain;
        let detection_confidence = detection.confidence;

        let target_domain = self
            .catalog
            .domain_for_tool(target_tool)
            .unwrap_or(Domain::General);

        if detected == Domain::Mixed {
            let involved = detection.evidence.domains.clone();
            if involved.contains(&target_domain) {
                return ValidationVerdict {
                    valid: true,
                    confidence: self.config.mixed_match_confidence,
                    reason: format!(
                        "Mixed query, but {} is one of the detected domains",
                        target_domain
                    ),
                    detected_domain: detected,
                    target_domain,
                    suggestions: vec![
                        "Consider breaking this into separate queries for better accuracy"
                            .to_string(),
                    ],
                };
            }

            if self.strict {
                let names: Vec<&str> = involved.iter().map(Domain::as_str).collect();
                return ValidationVerdict {
                    valid: false,
                    confidence: self.config.mixed_mismatch_confidence,
                    reason: format!(
                        "Mixed query detected domains {:?}, but routing to {}",
                        names, target_domain
                    ),
                    detected_domain: detected,
                    target_domain,
                    suggestions: involved
                        .iter()
                        .map(|d| format!("Try routing to {}", d))
                        .collect(),
                };
            }

            tracing::warn!(
                target = %target_domain,
                "mixed query routed outside its detected set"
            );
            return ValidationVerdict {
                valid: true,
                confidence: self.config.mismatch_warn_confidence,
                reason: format!(
                    "[WARNING] Mixed query routed to {} outside its detected domains",
                    target_domain
                ),
                detected_domain: detected,
                target_domain,
                suggestions: involved
                    .iter()
                    .map(|d| format!("Consider routing to {}", d))
                    .collect(),
            };
        }

        if detected == target_domain {
            let mut confidence =
                (detection_confidence + self.config.exact_match_bonus).min(1.0);
            if let Some(parsed) = parser_result {
                confidence = (confidence * self.config.detection_weight
                    + parsed.confidence * self.config.parser_weight)
                    .clamp(0.0, 1.0);
            }

            return ValidationVerdict {
                valid: true,
                confidence,
                reason: format!(
                    "Query domain ({}) matches target ({})",
                    detected, target_domain
                ),
                detected_domain: detected,
                target_domain,
                suggestions: Vec::new(),
            };
        }

        if detected == Domain::General {
            return ValidationVerdict {
                valid: true,
                confidence: self.config.general_confidence,
                reason: format!(
                    "Could not confidently detect domain, allowing {} routing",
                    target_domain
                ),
                detected_domain: detected,
                target_domain,
                suggestions: vec![
                    "Query is vague - consider being more specific".to_string(),
                ],
            };
        }

        let reason = mismatch_message(detected, target_domain);

        if self.strict && detection_confidence > self.config.strict_threshold {
            tracing::error!(
                detected = %detected,
                target = %target_domain,
                confidence = detection_confidence,
                "routing validation rejected a confident mismatch"
            );
            return ValidationVerdict {
                valid: false,
                confidence: self.config.mismatch_reject_confidence,
                reason,
                detected_domain: detected,
                target_domain,
                suggestions: vec![
                    format!("Route to the {} tool instead", detected),
                    format!("Detected domain with {:.0}% confidence", detection_confidence * 100.0),
                ],
            };
        }

        tracing::warn!(detected = %detected, target = %target_domain, "routing mismatch admitted with warning");
        ValidationVerdict {
            valid: true,
            confidence: self.config.mismatch_warn_confidence,
            reason: format!("[WARNING] {}", reason),
            detected_domain: detected,
            target_domain,
            suggestions: vec![
                format!("Consider routing to the {} tool", detected),
                "Result may not match user expectations".to_string(),
            ],
        }
    }

    /// Validates an entire execution plan. Aggregate confidence is the
    /// minimum over step verdicts; warnings never gate execution here.
    pub async fn validate_plan(&self, query: &str, steps: &[ExecutionStep]) -> PlanValidation {
        let mut result = PlanValidation {
            overall_valid: true,
            confidence: 1.0,
            step_verdicts: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        };

        for (i, step) in steps.iter().enumerate() {
            let step_query = if step.query.is_empty() { query } else { &step.query };
            let verdict = self.validate(step_query, &step.tool_name, None).await;

            if !verdict.valid {
                result.overall_valid = false;
                result.errors.push(format!("Step {}: {}", i, verdict.reason));
            } else if verdict.confidence < self.config.min_plan_confidence {
                result
                    .warnings
                    .push(format!("Step {}: low confidence ({:.2})", i, verdict.confidence));
            }

            result.confidence = result.confidence.min(verdict.confidence);
            result.step_verdicts.push(StepVerdict {
                step_id: step.id.to_string(),
                verdict,
            });
        }

        tracing::info!(
            valid = result.overall_valid,
            confidence = result.confidence,
            warnings = result.warnings.len(),
            errors = result.errors.len(),
            "execution plan validated"
        );

        result
    }
}
