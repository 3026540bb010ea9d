//! Orchestration result and execution plan containers.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::domain::enrichment::ContextMap;
use crate::domain::foundation::StepId;

use super::step::ExecutionStep;

/// An ordered collection of execution steps plus plan-level validation
/// findings. Warnings and errors never block execution by themselves.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub steps: Vec<ExecutionStep>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Structural problem with a plan's dependency graph.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanError {
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: StepId, dependency: StepId },

    #[error("dependency cycle involving steps: {0:?}")]
    CyclicDependencies(Vec<StepId>),
}

impl ExecutionPlan {
    /// Creates a plan from steps with no validation findings.
    pub fn new(steps: Vec<ExecutionStep>) -> Self {
        Self {
            steps,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Groups step indices into dependency levels: level 0 holds steps with
    /// no dependencies, level k holds steps whose dependencies are all in
    /// earlier levels. Refuses cyclic graphs and unknown dependency ids.
    pub fn dependency_levels(&self) -> Result<Vec<Vec<usize>>, PlanError> {
        let known: HashMap<&StepId, usize> =
            self.steps.iter().enumerate().map(|(i, s)| (&s.id, i)).collect();

        for step in &self.steps {
            for dep in &step.dependencies {
                if !known.contains_key(dep) {
                    return Err(PlanError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut levels: Vec<Vec<usize>> = Vec::new();
        let mut placed: HashSet<usize> = HashSet::new();

        while placed.len() < self.steps.len() {
            let mut level: Vec<usize> = Vec::new();
            for (idx, step) in self.steps.iter().enumerate() {
                if placed.contains(&idx) {
                    continue;
                }
                let ready = step
                    .dependencies
                    .iter()
                    .all(|dep| placed.contains(&known[dep]));
                if ready {
                    level.push(idx);
                }
            }

            if level.is_empty() {
                let stuck = self
                    .steps
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !placed.contains(i))
                    .map(|(_, s)| s.id.clone())
                    .collect();
                return Err(PlanError::CyclicDependencies(stuck));
            }

            placed.extend(level.iter().copied());
            levels.push(level);
        }

        Ok(levels)
    }
}

/// Final result of orchestrated execution.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub success: bool,
    pub final_result: String,
    pub steps_executed: usize,
    pub total_steps: usize,
    /// Wall-clock time in seconds.
    pub execution_time: f64,
    pub errors: Vec<String>,
    pub context_used: ContextMap,
}

impl OrchestrationResult {
    /// A failed result with no executed steps.
    pub fn failure(message: impl Into<String>, execution_time: f64, errors: Vec<String>) -> Self {
        Self {
            success: false,
            final_result: message.into(),
            steps_executed: 0,
            total_steps: 0,
            execution_time,
            errors,
            context_used: ContextMap::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Completion rate in percent.
    pub fn completion_rate(&self) -> f64 {
        if self.total_steps == 0 {
            0.0
        } else {
            (self.steps_executed as f64 / self.total_steps as f64) * 100.0
        }
    }

    /// True when the request succeeded but some steps did not complete.
    pub fn is_partial_success(&self) -> bool {
        self.success && self.steps_executed < self.total_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::Domain;
    use crate::domain::plan::step::{Action, ContextRequirements};

    fn step(id: &str, deps: &[&str]) -> ExecutionStep {
        ExecutionStep::new(
            StepId::new(id),
            "tasks",
            Action::List,
            "q",
            "tasks",
            Domain::Task,
            deps.iter().map(|d| StepId::new(*d)).collect(),
            ContextRequirements::default(),
        )
    }

    #[test]
    fn independent_steps_form_one_level() {
        let plan = ExecutionPlan::new(vec![step("a", &[]), step("b", &[])]);
        let levels = plan.dependency_levels().unwrap();
        assert_eq!(levels, vec![vec![0, 1]]);
    }

    #[test]
    fn chain_forms_sequential_levels() {
        let plan = ExecutionPlan::new(vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])]);
        let levels = plan.dependency_levels().unwrap();
        assert_eq!(levels, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn diamond_groups_middle_steps_together() {
        let plan = ExecutionPlan::new(vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ]);
        let levels = plan.dependency_levels().unwrap();
        assert_eq!(levels, vec![vec![0], vec![1, 2], vec![3]]);
    }

    #[test]
    fn cycle_is_refused() {
        let plan = ExecutionPlan::new(vec![step("a", &["b"]), step("b", &["a"])]);
        assert!(matches!(
            plan.dependency_levels(),
            Err(PlanError::CyclicDependencies(_))
        ));
    }

    #[test]
    fn unknown_dependency_is_refused() {
        let plan = ExecutionPlan::new(vec![step("a", &["ghost"])]);
        assert!(matches!(
            plan.dependency_levels(),
            Err(PlanError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn completion_rate_handles_zero_steps() {
        let result = OrchestrationResult::failure("nothing to do", 0.0, vec![]);
        assert_eq!(result.completion_rate(), 0.0);
        assert!(!result.success);
    }
}
