//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a step within an execution plan.
///
/// Stable, human-readable, and unique within its plan (e.g. `step_1`,
/// `subquery_2_calendar`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Creates a step id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates the conventional id for the n-th step (1-based).
    pub fn numbered(n: usize) -> Self {
        Self(format!("step_{}", n))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_ids_are_sequential() {
        assert_eq!(StepId::numbered(1).as_str(), "step_1");
        assert_eq!(StepId::numbered(12).as_str(), "step_12");
    }

    #[test]
    fn step_id_equality_is_by_value() {
        assert_eq!(StepId::new("step_1"), StepId::from("step_1"));
    }
}
