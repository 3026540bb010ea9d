//! Application layer - the orchestration engine composing domain logic
//! with the injected ports.

pub mod cross_domain;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod rate_limiter;
pub mod selector;
pub mod synthesizer;

pub use cross_domain::{
    CrossDomainDetection, CrossDomainHandler, CrossDomainOutcome, ExecutionMode, SubQuery,
};
pub use executor::{
    ExecutionReport, ExecutorError, ExecutorSettings, RequestIdentity, StepExecutor,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use planner::{ExecutionPlanner, PlannerError, PlannerOptions};
pub use rate_limiter::{resolve_client_id, RateLimitStats, RateLimiter};
pub use selector::{Selection, SelectionStrategy, ToolSelector};
pub use synthesizer::ContextSynthesizer;

use crate::ports::analytics::{AnalyticsStore, NewRoutingRecord};

/// Records a routing decision, logging instead of failing when the store
/// is unavailable. Analytics must never block a request.
pub(crate) async fn record_routing_best_effort(
    store: &dyn AnalyticsStore,
    record: NewRoutingRecord,
) -> Option<i64> {
    match store.record_routing(record).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(error = %e, "analytics write failed, continuing");
            None
        }
    }
}
