//! LLM client port.
//!
//! The LLM is an accelerator, not a dependency: every caller has a
//! pattern-based fallback and must not fail the request on LLM errors.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the language model client.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(String),

    #[error("llm response was malformed: {0}")]
    Malformed(String),
}

/// Port for a text-completion language model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Completes a prompt and returns the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}
