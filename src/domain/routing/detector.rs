//! Domain detection with weighted pattern scoring.
//!
//! `detect` is deterministic for a fixed configuration: every domain
//! accumulates a weighted score over strong-indicator, keyword, question-
//! phrase, and action-phrase matches, capped at 1.0. Two or more domains
//! above the mixed threshold yield [`Domain::Mixed`]; no evidence at all
//! yields [`Domain::General`] at confidence 0.0.
//!
//! An external analyzer may be injected; its primary domain is used
//! directly and any analyzer failure falls back silently to the pattern
//! path.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::DetectionConfig;
use crate::domain::catalog::{Domain, ToolCatalog};
use crate::domain::routing::patterns::PatternSet;
use crate::ports::analyzer::QueryAnalyzer;

/// How a detection was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    Patterns,
    Analyzer,
}

/// Kind of evidence that matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    StrongIndicator,
    Keyword,
    QuestionPhrase,
    ActionPhrase,
}

/// Supporting evidence for a detection.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub method: DetectionMethod,
    /// Final per-domain scores (pattern path only).
    pub scores: BTreeMap<Domain, f64>,
    /// Matches contributing to the winning domain.
    pub matches: Vec<(MatchKind, String)>,
    /// Domains involved in a mixed detection, in canonical order.
    pub domains: Vec<Domain>,
}

impl Evidence {
    fn empty(method: DetectionMethod) -> Self {
        Self {
            method,
            scores: BTreeMap::new(),
            matches: Vec::new(),
            domains: Vec::new(),
        }
    }
}

/// Result of domain detection.
#[derive(Debug, Clone)]
pub struct Detection {
    pub domain: Domain,
    pub confidence: f64,
    pub evidence: Evidence,
}

/// Weighted pattern-matching domain detector.
#[derive(Clone)]
pub struct DomainDetector {
    patterns: &'static PatternSet,
    config: DetectionConfig,
    analyzer: Option<Arc<dyn QueryAnalyzer>>,
}

impl std::fmt::Debug for DomainDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainDetector")
            .field("config", &self.config)
            .field("analyzer", &self.analyzer.is_some())
            .finish_non_exhaustive()
    }
}

impl DomainDetector {
    /// Creates a detector over the standard pattern set.
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            patterns: PatternSet::standard(),
            config,
            analyzer: None,
        }
    }

    /// Attaches an external analyzer consulted before the pattern path.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn QueryAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Detects the primary domain of a query.
    pub async fn detect(&self, query: &str) -> Detection {
        if let Some(analyzer) = &self.analyzer {
            match analyzer.analyze(query).await {
                Ok(analysis) => {
                    let domains: Vec<Domain> = analysis
                        .domains
                        .iter()
                        .filter_map(|d| ToolCatalog::normalize_domain_string(d))
                        .filter(Domain::is_data_domain)
                        .collect();

                    if let Some(primary) = domains.first().copied() {
                        let confidence = analysis.confidence.unwrap_or(0.8).clamp(0.0, 1.0);
                        tracing::info!(
                            domain = %primary,
                            confidence,
                            "analyzer detected domain"
                        );
                        let mut evidence = Evidence::empty(DetectionMethod::Analyzer);
                        evidence.domains = domains;
                        return Detection {
                            domain: primary,
                            confidence,
                            evidence,
                        };
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "analyzer detection failed, falling back to patterns");
                }
            }
        }

        self.detect_patterns(query)
    }

    /// Pattern-only detection. Pure function of `(query, config)`.
    pub fn detect_patterns(&self, query: &str) -> Detection {
        let lower = query.to_lowercase();

        let mut scores: BTreeMap<Domain, f64> = BTreeMap::new();
        let mut all_matches: BTreeMap<Domain, Vec<(MatchKind, String)>> = BTreeMap::new();

        for (domain, patterns) in self.patterns.iter() {
            let mut score = 0.0;
            let mut matches = Vec::new();

            for indicator in &patterns.strong_indicators {
                if indicator.is_match(&lower) {
                    score += self.config.strong_indicator_weight;
                    matches.push((MatchKind::StrongIndicator, indicator.as_str().to_string()));
                }
            }
            for keyword in patterns.keywords {
                if lower.contains(keyword) {
                    score += self.config.keyword_weight;
                    matches.push((MatchKind::Keyword, keyword.to_string()));
                }
            }
            for phrase in patterns.question_phrases {
                if lower.contains(phrase) {
                    score += self.config.question_weight;
                    matches.push((MatchKind::QuestionPhrase, phrase.to_string()));
                }
            }
            for phrase in patterns.action_phrases {
                if lower.contains(phrase) {
                    score += self.config.action_weight;
                    matches.push((MatchKind::ActionPhrase, phrase.to_string()));
                }
            }

            scores.insert(domain, score.min(1.0));
            all_matches.insert(domain, matches);
        }

        let high_scoring: Vec<Domain> = scores
            .iter()
            .filter(|(_, s)| **s > self.config.mixed_threshold)
            .map(|(d, _)| *d)
            .collect();

        if high_scoring.len() > 1 {
            tracing::info!(domains = ?high_scoring, "mixed domain query detected");
            return Detection {
                domain: Domain::Mixed,
                confidence: self.config.mixed_confidence,
                evidence: Evidence {
                    method: DetectionMethod::Patterns,
                    scores,
                    matches: Vec::new(),
                    domains: high_scoring,
                },
            };
        }

        let (best_domain, best_score) = scores
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(d, s)| (*d, *s))
            .unwrap_or((Domain::General, 0.0));

        if best_score <= 0.0 {
            return Detection {
                domain: Domain::General,
                confidence: 0.0,
                evidence: Evidence::empty(DetectionMethod::Patterns),
            };
        }

        let matches = all_matches.remove(&best_domain).unwrap_or_default();
        tracing::debug!(domain = %best_domain, confidence = best_score, "pattern-based detection");

        Detection {
            domain: best_domain,
            confidence: best_score,
            evidence: Evidence {
                method: DetectionMethod::Patterns,
                scores,
                matches,
                domains: Vec::new(),
            },
        }
    }
}
