//! Cross-domain query handling configuration.

use serde::Deserialize;

use super::error::ValidationError;

/// Detection confidences, execution behavior, and response formatting for
/// the cross-domain handler.
#[derive(Debug, Clone, Deserialize)]
pub struct CrossDomainConfig {
    /// Confidence when an explicit cross-domain pattern matches.
    #[serde(default = "default_pattern_confidence")]
    pub pattern_confidence: f64,

    /// Confidence when the domain detector reports a mixed query.
    #[serde(default = "default_mixed_confidence")]
    pub mixed_confidence: f64,

    /// Confidence when two or more keyword buckets match.
    #[serde(default = "default_keyword_confidence")]
    pub keyword_confidence: f64,

    /// Whether independent sub-queries run in parallel.
    #[serde(default = "default_true")]
    pub parallel_execution: bool,

    /// Whether remaining sub-queries continue after one fails.
    #[serde(default = "default_true")]
    pub continue_on_partial_failure: bool,

    /// Maximum sub-queries generated from a single query.
    #[serde(default = "default_max_sub_queries")]
    pub max_sub_queries: usize,

    /// Whether domain labels are included in the synthesized response.
    #[serde(default = "default_true")]
    pub include_domain_labels: bool,

    /// Whether failed sub-queries are listed in the response note.
    #[serde(default = "default_true")]
    pub include_error_details: bool,
}

fn default_pattern_confidence() -> f64 {
    0.90
}
fn default_mixed_confidence() -> f64 {
    0.60
}
fn default_keyword_confidence() -> f64 {
    0.60
}
fn default_max_sub_queries() -> usize {
    10
}
fn default_true() -> bool {
    true
}

impl Default for CrossDomainConfig {
    fn default() -> Self {
        Self {
            pattern_confidence: default_pattern_confidence(),
            mixed_confidence: default_mixed_confidence(),
            keyword_confidence: default_keyword_confidence(),
            parallel_execution: default_true(),
            continue_on_partial_failure: default_true(),
            max_sub_queries: default_max_sub_queries(),
            include_domain_labels: default_true(),
            include_error_details: default_true(),
        }
    }
}

impl CrossDomainConfig {
    /// Validates confidences and limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("pattern_confidence", self.pattern_confidence),
            ("mixed_confidence", self.mixed_confidence),
            ("keyword_confidence", self.keyword_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::OutOfRange {
                    field: name.to_string(),
                });
            }
        }
        if self.max_sub_queries == 0 {
            return Err(ValidationError::Zero {
                field: "max_sub_queries".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(CrossDomainConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_sub_query_limit_fails() {
        let mut config = CrossDomainConfig::default();
        config.max_sub_queries = 0;
        assert!(config.validate().is_err());
    }
}
