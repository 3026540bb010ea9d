//! Ports - async trait boundaries for every injected collaborator.

pub mod analytics;
pub mod analyzer;
pub mod events;
pub mod llm;
pub mod rate_limit;
pub mod synthesizer;
pub mod tool;

pub use analytics::{AnalyticsError, AnalyticsStore, MetricsFilter, NewRoutingRecord};
pub use analyzer::{AnalyzerError, QueryAnalysis, QueryAnalyzer};
pub use events::{WorkflowEvent, WorkflowEventKind, WorkflowEventSink};
pub use llm::{LlmClient, LlmError};
pub use rate_limit::{RateLimitStore, RateLimitStoreError, WindowDecision};
pub use synthesizer::{ResponseSynthesizer, SynthesisError};
pub use tool::{
    ParseOutcome, ParsedQuery, ParserRejection, QueryParser, Tool, ToolError, ToolRegistry,
};
