//! Context synthesis configuration.

use serde::Deserialize;
use std::path::PathBuf;

use super::error::ValidationError;

/// Limits and thresholds for context extraction and enrichment.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    /// Maximum subject lines extracted from a single result.
    #[serde(default = "default_max_subjects")]
    pub max_subjects: usize,

    /// Confidence attached to rule-based enrichments.
    #[serde(default = "default_enrichment_confidence")]
    pub enrichment_confidence: f64,

    /// Optional YAML file overriding the compiled-in enrichment rules.
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
}

fn default_max_subjects() -> usize {
    5
}
fn default_enrichment_confidence() -> f64 {
    0.75
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_subjects: default_max_subjects(),
            enrichment_confidence: default_enrichment_confidence(),
            rules_path: None,
        }
    }
}

impl SynthesisConfig {
    /// Validates limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_subjects == 0 {
            return Err(ValidationError::Zero {
                field: "max_subjects".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.enrichment_confidence) {
            return Err(ValidationError::OutOfRange {
                field: "enrichment_confidence".to_string(),
            });
        }
        Ok(())
    }
}
