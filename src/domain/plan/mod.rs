//! Execution plan model: steps, the step state machine, dependency
//! levels, and the orchestration result.

mod result;
mod step;

pub use result::{ExecutionPlan, OrchestrationResult, PlanError};
pub use step::{
    Action, ContextRequirements, DependencyKind, ExecutionStep, ParseActionError, StepStatus,
};
