//! Domain detection and routing validation configuration.
//!
//! All scoring weights and confidence thresholds used by the detector and
//! the routing validator live here, together with the mismatch messages
//! surfaced when a query is routed to the wrong domain.

use serde::Deserialize;

use crate::domain::catalog::Domain;

use super::error::ValidationError;

/// Weights and thresholds for domain detection and routing validation.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Score contribution of a strong-indicator regex match.
    #[serde(default = "default_strong_indicator_weight")]
    pub strong_indicator_weight: f64,
    /// Score contribution of a plain keyword match.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    /// Score contribution of a question-form phrase match.
    #[serde(default = "default_question_weight")]
    pub question_weight: f64,
    /// Score contribution of an action-form phrase match.
    #[serde(default = "default_action_weight")]
    pub action_weight: f64,

    /// Score above which a domain counts toward a mixed detection.
    #[serde(default = "default_mixed_threshold")]
    pub mixed_threshold: f64,
    /// Confidence reported for a mixed detection.
    #[serde(default = "default_mixed_confidence")]
    pub mixed_confidence: f64,
    /// Confidence when a mixed query matches the target domain.
    #[serde(default = "default_mixed_match_confidence")]
    pub mixed_match_confidence: f64,
    /// Confidence when a mixed query does not match the target domain.
    #[serde(default = "default_mixed_mismatch_confidence")]
    pub mixed_mismatch_confidence: f64,

    /// Confidence when no domain could be detected (general).
    #[serde(default = "default_general_confidence")]
    pub general_confidence: f64,
    /// Detection confidence above which strict mode rejects mismatches.
    #[serde(default = "default_strict_threshold")]
    pub strict_threshold: f64,
    /// Confidence assigned to a rejected mismatch.
    #[serde(default = "default_mismatch_reject_confidence")]
    pub mismatch_reject_confidence: f64,
    /// Confidence assigned to a warned-about mismatch (lenient mode).
    #[serde(default = "default_mismatch_warn_confidence")]
    pub mismatch_warn_confidence: f64,

    /// Bonus added to detection confidence on an exact domain match.
    #[serde(default = "default_exact_match_bonus")]
    pub exact_match_bonus: f64,
    /// Weight of detection confidence when blending with a parser result.
    #[serde(default = "default_detection_weight")]
    pub detection_weight: f64,
    /// Weight of parser confidence when blending with detection.
    #[serde(default = "default_parser_weight")]
    pub parser_weight: f64,

    /// Step verdicts below this confidence raise a plan-validation warning.
    #[serde(default = "default_min_plan_confidence")]
    pub min_plan_confidence: f64,
}

fn default_strong_indicator_weight() -> f64 {
    0.40
}
fn default_keyword_weight() -> f64 {
    0.20
}
fn default_question_weight() -> f64 {
    0.15
}
fn default_action_weight() -> f64 {
    0.15
}
fn default_mixed_threshold() -> f64 {
    0.30
}
fn default_mixed_confidence() -> f64 {
    0.60
}
fn default_mixed_match_confidence() -> f64 {
    0.70
}
fn default_mixed_mismatch_confidence() -> f64 {
    0.40
}
fn default_general_confidence() -> f64 {
    0.50
}
fn default_strict_threshold() -> f64 {
    0.60
}
fn default_mismatch_reject_confidence() -> f64 {
    0.20
}
fn default_mismatch_warn_confidence() -> f64 {
    0.40
}
fn default_exact_match_bonus() -> f64 {
    0.15
}
fn default_detection_weight() -> f64 {
    0.70
}
fn default_parser_weight() -> f64 {
    0.30
}
fn default_min_plan_confidence() -> f64 {
    0.30
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            strong_indicator_weight: default_strong_indicator_weight(),
            keyword_weight: default_keyword_weight(),
            question_weight: default_question_weight(),
            action_weight: default_action_weight(),
            mixed_threshold: default_mixed_threshold(),
            mixed_confidence: default_mixed_confidence(),
            mixed_match_confidence: default_mixed_match_confidence(),
            mixed_mismatch_confidence: default_mixed_mismatch_confidence(),
            general_confidence: default_general_confidence(),
            strict_threshold: default_strict_threshold(),
            mismatch_reject_confidence: default_mismatch_reject_confidence(),
            mismatch_warn_confidence: default_mismatch_warn_confidence(),
            exact_match_bonus: default_exact_match_bonus(),
            detection_weight: default_detection_weight(),
            parser_weight: default_parser_weight(),
            min_plan_confidence: default_min_plan_confidence(),
        }
    }
}

impl DetectionConfig {
    /// Validates weight and threshold ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let unit_fields = [
            ("strong_indicator_weight", self.strong_indicator_weight),
            ("keyword_weight", self.keyword_weight),
            ("question_weight", self.question_weight),
            ("action_weight", self.action_weight),
            ("mixed_threshold", self.mixed_threshold),
            ("mixed_confidence", self.mixed_confidence),
            ("general_confidence", self.general_confidence),
            ("strict_threshold", self.strict_threshold),
            ("exact_match_bonus", self.exact_match_bonus),
            ("min_plan_confidence", self.min_plan_confidence),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::OutOfRange {
                    field: name.to_string(),
                });
            }
        }
        if (self.detection_weight + self.parser_weight - 1.0).abs() > 1e-9 {
            return Err(ValidationError::OutOfRange {
                field: "detection_weight + parser_weight".to_string(),
            });
        }
        Ok(())
    }
}

/// Message explaining a routing mismatch between detected and target domain.
pub fn mismatch_message(detected: Domain, target: Domain) -> String {
    let article = |d: Domain| match d {
        Domain::Email => "an email",
        Domain::Task => "a task",
        Domain::Calendar => "a calendar",
        Domain::Notion => "a Notion",
        Domain::General => "a general",
        Domain::Mixed => "a mixed",
    };
    // Notion is a proper noun in prose, unlike the wire-format name.
    let tool_word = |d: Domain| match d {
        Domain::Notion => "Notion",
        other => other.as_str(),
    };

    match (detected, target) {
        (d, t) if d.is_data_domain() && t.is_data_domain() => format!(
            "This appears to be {} query, not {} query. Use the {} tool instead.",
            article(d),
            article(t),
            tool_word(d)
        ),
        (d, t) => format!("Domain mismatch: detected {}, routing to {}", d, t),
    }
}
