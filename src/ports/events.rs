//! Workflow event port - push stream of orchestration progress.
//!
//! Events are best-effort: sinks must never fail the request, and
//! subscribers must tolerate missing events.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::foundation::Timestamp;

/// Kind of workflow event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventKind {
    ReasoningStart,
    ToolCallStart,
    ToolComplete,
    ActionExecuting,
    ActionComplete,
    Error,
    WorkflowComplete,
}

impl WorkflowEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowEventKind::ReasoningStart => "reasoning_start",
            WorkflowEventKind::ToolCallStart => "tool_call_start",
            WorkflowEventKind::ToolComplete => "tool_complete",
            WorkflowEventKind::ActionExecuting => "action_executing",
            WorkflowEventKind::ActionComplete => "action_complete",
            WorkflowEventKind::Error => "error",
            WorkflowEventKind::WorkflowComplete => "workflow_complete",
        }
    }
}

/// A structured workflow event.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowEvent {
    #[serde(rename = "type")]
    pub kind: WorkflowEventKind,
    pub message: String,
    pub data: serde_json::Value,
    pub correlation_id: Uuid,
    pub timestamp: Timestamp,
}

impl WorkflowEvent {
    pub fn new(kind: WorkflowEventKind, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind,
            message: message.into(),
            data,
            correlation_id: Uuid::new_v4(),
            timestamp: Timestamp::now(),
        }
    }
}

/// Port for emitting workflow events.
#[async_trait]
pub trait WorkflowEventSink: Send + Sync {
    /// Emits an event. Must not fail; delivery is best-effort.
    async fn emit(&self, event: WorkflowEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_snake_case_type() {
        let event = WorkflowEvent::new(
            WorkflowEventKind::ToolCallStart,
            "Calling tasks",
            serde_json::json!({"step_id": "step_1"}),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_call_start");
        assert_eq!(json["message"], "Calling tasks");
        assert_eq!(json["data"]["step_id"], "step_1");
    }

    #[test]
    fn kind_strings_cover_all_variants() {
        assert_eq!(WorkflowEventKind::ReasoningStart.as_str(), "reasoning_start");
        assert_eq!(WorkflowEventKind::WorkflowComplete.as_str(), "workflow_complete");
    }
}
