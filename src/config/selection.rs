//! Tool selection configuration.

use serde::Deserialize;

use super::error::ValidationError;

/// Parser confidence thresholds for the tool selection cascade.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    /// A supplied parser result at or above this confidence routes
    /// authoritatively to the tool that produced it.
    #[serde(default = "default_parser_authoritative_threshold")]
    pub parser_authoritative_threshold: f64,

    /// Minimum confidence for a live parser sweep candidate.
    #[serde(default = "default_parser_candidate_threshold")]
    pub parser_candidate_threshold: f64,

    /// Minimum confidence for execution-time parser action refinement.
    #[serde(default = "default_parser_refine_threshold")]
    pub parser_refine_threshold: f64,
}

fn default_parser_authoritative_threshold() -> f64 {
    0.80
}
fn default_parser_candidate_threshold() -> f64 {
    0.70
}
fn default_parser_refine_threshold() -> f64 {
    0.60
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            parser_authoritative_threshold: default_parser_authoritative_threshold(),
            parser_candidate_threshold: default_parser_candidate_threshold(),
            parser_refine_threshold: default_parser_refine_threshold(),
        }
    }
}

impl SelectionConfig {
    /// Validates threshold ranges and ordering.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("parser_authoritative_threshold", self.parser_authoritative_threshold),
            ("parser_candidate_threshold", self.parser_candidate_threshold),
            ("parser_refine_threshold", self.parser_refine_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::OutOfRange {
                    field: name.to_string(),
                });
            }
        }
        if self.parser_candidate_threshold > self.parser_authoritative_threshold {
            return Err(ValidationError::Invalid {
                field: "parser_candidate_threshold".to_string(),
                reason: "must not exceed parser_authoritative_threshold".to_string(),
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
        assert!(SelectionConfig::default().validate().is_ok());
    }

    #[test]
    fn candidate_above_authoritative_fails() {
        let mut config = SelectionConfig::default();
        config.parser_candidate_threshold = 0.95;
        assert!(config.validate().is_err());
    }
}
