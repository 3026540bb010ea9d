//! Execution steps and their state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::catalog::Domain;
use crate::domain::foundation::{StepId, Timestamp};

/// The verb dispatched to a tool. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    List,
    Search,
    Create,
    Update,
    Delete,
    Complete,
    Analyze,
    FindFreeTime,
    CheckConflicts,
    Send,
    CreatePage,
}

impl Action {
    /// Returns the wire string for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::List => "list",
            Action::Search => "search",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Complete => "complete",
            Action::Analyze => "analyze",
            Action::FindFreeTime => "find_free_time",
            Action::CheckConflicts => "check_conflicts",
            Action::Send => "send",
            Action::CreatePage => "create_page",
        }
    }

    /// Conservative retry policy: only read-only actions are retried,
    /// because mutating tools are not guaranteed idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Action::List
                | Action::Search
                | Action::FindFreeTime
                | Action::CheckConflicts
                | Action::Analyze
        )
    }

    /// True for actions that mutate state in the target system.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Action::Create
                | Action::Update
                | Action::Delete
                | Action::Complete
                | Action::Send
                | Action::CreatePage
        )
    }

    /// Maps a free-form verb found in a query to an action.
    pub fn from_verb(verb: &str) -> Option<Action> {
        match verb {
            "list" | "show" | "display" | "get" => Some(Action::List),
            "search" | "find" | "look" | "lookup" => Some(Action::Search),
            "create" | "add" | "make" | "schedule" | "book" => Some(Action::Create),
            "update" | "edit" | "modify" | "change" | "reschedule" | "move" => Some(Action::Update),
            "delete" | "remove" | "cancel" => Some(Action::Delete),
            "complete" | "finish" | "done" => Some(Action::Complete),
            "analyze" | "check" | "review" | "summarize" => Some(Action::Analyze),
            "send" | "compose" | "reply" | "forward" => Some(Action::Send),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error parsing an action string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct ParseActionError(String);

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(Action::List),
            "search" => Ok(Action::Search),
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "complete" => Ok(Action::Complete),
            "analyze" => Ok(Action::Analyze),
            "find_free_time" => Ok(Action::FindFreeTime),
            "check_conflicts" => Ok(Action::CheckConflicts),
            "send" => Ok(Action::Send),
            "create_page" => Ok(Action::CreatePage),
            other => Err(ParseActionError(other.to_string())),
        }
    }
}

/// Execution status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Retrying,
    Blocked,
}

impl StepStatus {
    /// True once execution of the step has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed | StepStatus::Blocked)
    }

    /// True while the step is actively executing.
    pub fn is_active(&self) -> bool {
        matches!(self, StepStatus::InProgress | StepStatus::Retrying)
    }
}

/// Relationship between a step and its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Independent,
    RequiresData,
}

/// Context the step needs injected from earlier results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRequirements {
    #[serde(default)]
    pub needs_previous_results: bool,
    #[serde(default)]
    pub needs_source_data: bool,
    #[serde(default)]
    pub needs_participant_data: bool,
}

impl ContextRequirements {
    /// True when no context injection is requested.
    pub fn is_empty(&self) -> bool {
        !self.needs_previous_results && !self.needs_source_data && !self.needs_participant_data
    }
}

/// A single step in an execution plan.
///
/// Steps are owned by their plan and mutated only by the executor while
/// they are `in_progress` or `retrying`.
#[derive(Debug, Clone)]
pub struct ExecutionStep {
    pub id: StepId,
    pub tool_name: String,
    pub action: Action,
    pub query: String,
    pub intent: String,
    pub domain: Domain,
    pub dependencies: Vec<StepId>,
    pub dependency_kind: DependencyKind,
    pub context_requirements: ContextRequirements,
    pub status: StepStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub execution_time: Option<Duration>,
    pub created_at: Timestamp,
}

impl ExecutionStep {
    /// Creates a pending step. `dependency_kind` is derived: any
    /// dependencies imply `requires_data`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: StepId,
        tool_name: impl Into<String>,
        action: Action,
        query: impl Into<String>,
        intent: impl Into<String>,
        domain: Domain,
        dependencies: Vec<StepId>,
        context_requirements: ContextRequirements,
    ) -> Self {
        let dependency_kind = if dependencies.is_empty() {
            DependencyKind::Independent
        } else {
            DependencyKind::RequiresData
        };

        Self {
            id,
            tool_name: tool_name.into(),
            action,
            query: query.into(),
            intent: intent.into(),
            domain,
            dependencies,
            dependency_kind,
            context_requirements,
            status: StepStatus::Pending,
            result: None,
            error: None,
            retry_count: 0,
            execution_time: None,
            created_at: Timestamp::now(),
        }
    }

    /// pending/retrying → in_progress
    pub fn mark_in_progress(&mut self) {
        self.status = StepStatus::InProgress;
    }

    /// in_progress → completed
    pub fn mark_completed(&mut self, result: impl Into<String>, execution_time: Duration) {
        self.status = StepStatus::Completed;
        self.result = Some(result.into());
        self.error = None;
        self.execution_time = Some(execution_time);
    }

    /// in_progress → failed
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
    }

    /// pending → blocked (a dependency failed)
    pub fn mark_blocked(&mut self, reason: impl Into<String>) {
        self.status = StepStatus::Blocked;
        self.error = Some(reason.into());
    }

    /// Whether another retry is allowed for this step.
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries && self.action.is_retryable()
    }

    /// failed attempt with retries left → retrying; clears result/error.
    pub fn begin_retry(&mut self) {
        self.retry_count += 1;
        self.status = StepStatus::Retrying;
        self.result = None;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(deps: Vec<StepId>) -> ExecutionStep {
        ExecutionStep::new(
            StepId::numbered(1),
            "tasks",
            Action::List,
            "what tasks do I have",
            "tasks",
            Domain::Task,
            deps,
            ContextRequirements::default(),
        )
    }

    #[test]
    fn dependencies_imply_requires_data() {
        assert_eq!(step(vec![]).dependency_kind, DependencyKind::Independent);
        assert_eq!(
            step(vec![StepId::new("step_0")]).dependency_kind,
            DependencyKind::RequiresData
        );
    }

    #[test]
    fn lifecycle_reaches_completed_with_result() {
        let mut s = step(vec![]);
        assert_eq!(s.status, StepStatus::Pending);
        s.mark_in_progress();
        assert!(s.status.is_active());
        s.mark_completed("done", Duration::from_millis(12));
        assert_eq!(s.status, StepStatus::Completed);
        assert!(s.status.is_terminal());
        assert!(s.result.is_some());
        assert!(s.execution_time.is_some());
    }

    #[test]
    fn retry_resets_result_and_error() {
        let mut s = step(vec![]);
        s.mark_in_progress();
        s.mark_failed("boom");
        assert!(s.can_retry(2));
        s.begin_retry();
        assert_eq!(s.status, StepStatus::Retrying);
        assert_eq!(s.retry_count, 1);
        assert!(s.result.is_none());
        assert!(s.error.is_none());
    }

    #[test]
    fn retry_budget_is_exhausted() {
        let mut s = step(vec![]);
        s.begin_retry();
        s.begin_retry();
        assert!(!s.can_retry(2));
    }

    #[test]
    fn mutating_actions_are_not_retryable() {
        let mut s = step(vec![]);
        s.action = Action::Create;
        assert!(!s.can_retry(2));
    }

    #[test]
    fn blocked_is_terminal() {
        let mut s = step(vec![StepId::new("step_0")]);
        s.mark_blocked("dependency step_0 failed");
        assert!(s.status.is_terminal());
        assert!(s.error.is_some());
    }

    #[test]
    fn action_round_trips_through_strings() {
        for action in [
            Action::List,
            Action::FindFreeTime,
            Action::CheckConflicts,
            Action::CreatePage,
        ] {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!("teleport".parse::<Action>().is_err());
    }

    #[test]
    fn verb_lookup_maps_synonyms() {
        assert_eq!(Action::from_verb("show"), Some(Action::List));
        assert_eq!(Action::from_verb("find"), Some(Action::Search));
        assert_eq!(Action::from_verb("book"), Some(Action::Create));
        assert_eq!(Action::from_verb("frobnicate"), None);
    }
}
