//! External query analyzer port.
//!
//! An optional collaborator that can pre-analyze a query (domains, intent,
//! entities). The domain detector uses its primary domain directly and
//! falls back silently to pattern matching on failure.

use async_trait::async_trait;
use thiserror::Error;

/// Result of external query analysis.
#[derive(Debug, Clone, Default)]
pub struct QueryAnalysis {
    /// Domain names in priority order (free-form strings, normalized by
    /// the caller).
    pub domains: Vec<String>,
    pub confidence: Option<f64>,
    pub intent: Option<String>,
    pub entities: serde_json::Value,
}

/// Errors from the analyzer.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analysis failed: {0}")]
    Failed(String),
}

/// Port for an external query analyzer.
#[async_trait]
pub trait QueryAnalyzer: Send + Sync {
    async fn analyze(&self, query: &str) -> Result<QueryAnalysis, AnalyzerError>;
}
