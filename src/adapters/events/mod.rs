//! Workflow event sink adapters.
//!
//! - [`NullEventSink`] - discards everything.
//! - [`InMemoryEventSink`] - buffers events for assertions in tests.
//! - [`BroadcastEventSink`] - fans events out to push subscribers over a
//!   tokio broadcast channel; lagging subscribers drop events, which the
//!   event contract allows.

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use crate::ports::events::{WorkflowEvent, WorkflowEventKind, WorkflowEventSink};

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

#[async_trait]
impl WorkflowEventSink for NullEventSink {
    async fn emit(&self, _event: WorkflowEvent) {}
}

/// Sink buffering events in memory.
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All emitted events, in order.
    pub async fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().await.clone()
    }

    /// Kinds of all emitted events, in order.
    pub async fn kinds(&self) -> Vec<WorkflowEventKind> {
        self.events.lock().await.iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl WorkflowEventSink for InMemoryEventSink {
    async fn emit(&self, event: WorkflowEvent) {
        self.events.lock().await.push(event);
    }
}

/// Sink fanning events out over a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl BroadcastEventSink {
    /// Creates a sink with the given subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl WorkflowEventSink for BroadcastEventSink {
    async fn emit(&self, event: WorkflowEvent) {
        // A send error only means there are no subscribers right now.
        let _ = self.sender.send(event);
    }
}
