//! Orchestrator configuration.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Timeouts, retry budget, and validation behavior for the orchestration
/// pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum seconds for a single step execution.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Maximum seconds for query decomposition.
    #[serde(default = "default_decomposition_timeout_secs")]
    pub decomposition_timeout_secs: u64,

    /// Maximum seconds for execution planning.
    #[serde(default = "default_planning_timeout_secs")]
    pub planning_timeout_secs: u64,

    /// Maximum retries for a single step on retryable failure.
    #[serde(default = "default_max_step_retries")]
    pub max_step_retries: u32,

    /// Minimum confidence to hand a query to the cross-domain handler.
    #[serde(default = "default_cross_domain_confidence_threshold")]
    pub cross_domain_confidence_threshold: f64,

    /// Maximum characters of context appended to an enriched step query.
    #[serde(default = "default_max_context_snippet")]
    pub max_context_snippet: usize,

    /// Whether routing validation runs during planning.
    #[serde(default = "default_true")]
    pub enable_validation: bool,

    /// Whether planning-time validation runs in strict mode.
    #[serde(default = "default_true")]
    pub strict_validation: bool,

    /// Whether invalid routings are auto-corrected when possible.
    #[serde(default = "default_true")]
    pub auto_correct_routing: bool,

    /// Whether plan-validation warnings reject the whole plan.
    #[serde(default = "default_false")]
    pub reject_on_plan_warnings: bool,

    /// Maximum error messages carried into the final response.
    #[serde(default = "default_max_errors_in_response")]
    pub max_errors_in_response: usize,
}

fn default_step_timeout_secs() -> u64 {
    30
}
fn default_decomposition_timeout_secs() -> u64 {
    10
}
fn default_planning_timeout_secs() -> u64 {
    10
}
fn default_max_step_retries() -> u32 {
    2
}
fn default_cross_domain_confidence_threshold() -> f64 {
    0.70
}
fn default_max_context_snippet() -> usize {
    200
}
fn default_max_errors_in_response() -> usize {
    3
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
            decomposition_timeout_secs: default_decomposition_timeout_secs(),
            planning_timeout_secs: default_planning_timeout_secs(),
            max_step_retries: default_max_step_retries(),
            cross_domain_confidence_threshold: default_cross_domain_confidence_threshold(),
            max_context_snippet: default_max_context_snippet(),
            enable_validation: default_true(),
            strict_validation: default_true(),
            auto_correct_routing: default_true(),
            reject_on_plan_warnings: default_false(),
            max_errors_in_response: default_max_errors_in_response(),
        }
    }
}

impl OrchestratorConfig {
    /// Per-step execution timeout as a [`Duration`].
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    /// Decomposition timeout as a [`Duration`].
    pub fn decomposition_timeout(&self) -> Duration {
        Duration::from_secs(self.decomposition_timeout_secs)
    }

    /// Planning timeout as a [`Duration`].
    pub fn planning_timeout(&self) -> Duration {
        Duration::from_secs(self.planning_timeout_secs)
    }

    /// Validates timeout and threshold ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.step_timeout_secs == 0 {
            return Err(ValidationError::Zero {
                field: "step_timeout_secs".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.cross_domain_confidence_threshold) {
            return Err(ValidationError::OutOfRange {
                field: "cross_domain_confidence_threshold".to_string(),
            });
        }
        Ok(())
    }
}
