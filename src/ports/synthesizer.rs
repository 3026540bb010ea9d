//! Response synthesizer port.
//!
//! Turns per-domain results into final prose. When absent, callers fall
//! back to domain-labelled concatenation.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::catalog::Domain;
use crate::domain::enrichment::ContextMap;

/// Errors from the synthesizer.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesis failed: {0}")]
    Failed(String),
}

/// Port for natural-language result synthesis.
#[async_trait]
pub trait ResponseSynthesizer: Send + Sync {
    /// Produces final prose from per-domain results.
    async fn synthesize(
        &self,
        query: &str,
        results: &BTreeMap<Domain, String>,
        context: &ContextMap,
    ) -> Result<String, SynthesisError>;
}
