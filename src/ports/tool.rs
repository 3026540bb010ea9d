//! Tool port - the contract data-source tools implement to be callable.
//!
//! A tool receives an action verb and a query string and returns a
//! human-readable summary. Tools may expose an optional query parser; a
//! parser returning a rejection is informative, not an error state - the
//! selector excludes rejecting tools from candidacy and the executor uses
//! tool-level rejections to trigger the alternate-tool retry.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::domain::catalog::Domain;
use crate::domain::plan::Action;

/// Port for callable data-source tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as registered with the catalog.
    fn name(&self) -> &str;

    /// Optional query parser for smarter routing.
    fn parser(&self) -> Option<&dyn QueryParser> {
        None
    }

    /// Executes the action against the query, returning a human-readable
    /// summary.
    async fn run(&self, action: Action, query: &str) -> Result<String, ToolError>;
}

/// Port for tool-scoped query parsers.
pub trait QueryParser: Send + Sync {
    /// Parses a query into action, entities, and confidence, or rejects it
    /// when the query does not belong to this tool's domain.
    fn parse(&self, query: &str) -> ParseOutcome;
}

/// Outcome of a parser invocation.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Parsed(ParsedQuery),
    Rejected(ParserRejection),
}

/// A successfully parsed query.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub action: Action,
    /// Parser confidence in [0, 1].
    pub confidence: f64,
    pub entities: serde_json::Value,
    pub metadata: serde_json::Value,
}

impl ParsedQuery {
    pub fn new(action: Action, confidence: f64) -> Self {
        Self {
            action,
            confidence,
            entities: serde_json::Value::Null,
            metadata: serde_json::Value::Null,
        }
    }
}

/// A parser's explicit "not my domain" signal.
#[derive(Debug, Clone)]
pub struct ParserRejection {
    pub reason: String,
    /// Domains the parser believes the query belongs to, if any.
    pub suggested_domains: Vec<Domain>,
}

/// Errors a tool can surface.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// Structured domain rejection ("not my domain").
    #[error("tool rejected the query: {message}")]
    Rejected {
        message: String,
        suggested_domains: Vec<Domain>,
    },

    /// Generic tool failure; retry-eligible for read-only actions.
    #[error("tool execution failed: {0}")]
    Failed(String),
}

/// The set of tools available to a request, keyed by lowercased name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from tools, keying each by its lowercased name.
    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let mut registry = Self::new();
        for tool in tools {
            registry.insert(tool);
        }
        registry
    }

    pub fn insert(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_lowercase(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted for deterministic iteration.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn name_set(&self) -> HashSet<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn Tool>)> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}
