//! Tool selection - cascade of strategies mapping a step to a tool.
//!
//! The cascade stops at the first strategy that produces an available
//! tool:
//!
//! 1. A supplied parser result at authoritative confidence routes to the
//!    tool whose parser produced it.
//! 2. A live parser sweep over the available tools; explicit rejections
//!    drop a tool from candidacy, then the highest-confidence candidate
//!    wins.
//! 3. Memory-recommended tool names matching the intent.
//! 4. The static intent-to-tool map.
//! 5. Catalog mapping from the intent's domain to a tool.
//! 6. A case-insensitive tool-name match.
//! 7. The first available tool.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::SelectionConfig;
use crate::domain::catalog::{Domain, ToolCatalog};
use crate::domain::decompose::MemoryRecommendations;
use crate::ports::tool::{ParseOutcome, ParsedQuery, ToolRegistry};

/// Which cascade strategy chose the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    AuthoritativeParser,
    ParserSweep,
    MemoryRecommendation,
    IntentMap,
    DomainMapping,
    NameMatch,
    FirstAvailable,
}

/// A selected tool plus how it was chosen.
#[derive(Debug, Clone)]
pub struct Selection {
    pub tool_name: String,
    pub strategy: SelectionStrategy,
    pub parser_confidence: Option<f64>,
}

/// Cascade-based tool selector.
#[derive(Debug, Clone)]
pub struct ToolSelector {
    catalog: Arc<ToolCatalog>,
    config: SelectionConfig,
}

impl ToolSelector {
    pub fn new(catalog: Arc<ToolCatalog>, config: SelectionConfig) -> Self {
        Self { catalog, config }
    }

    /// Selects a tool for a step. Returns `None` only when no tools are
    /// available at all.
    pub fn select(
        &self,
        step_query: &str,
        intent: &str,
        memory: Option<&MemoryRecommendations>,
        parser_results: Option<&HashMap<String, ParsedQuery>>,
        tools: &ToolRegistry,
    ) -> Option<Selection> {
        if tools.is_empty() {
            return None;
        }

        // 1. Parser-authoritative routing.
        if let Some(results) = parser_results {
            let best = results
                .iter()
                .filter(|(name, _)| tools.contains(name))
                .max_by(|a, b| a.1.confidence.total_cmp(&b.1.confidence));
            if let Some((name, parsed)) = best {
                if parsed.confidence >= self.config.parser_authoritative_threshold {
                    tracing::info!(
                        tool = %name,
                        confidence = parsed.confidence,
                        "parser-authoritative routing"
                    );
                    return Some(Selection {
                        tool_name: name.clone(),
                        strategy: SelectionStrategy::AuthoritativeParser,
                        parser_confidence: Some(parsed.confidence),
                    });
                }
            }
        }

        // 2. Live parser sweep; rejections remove candidacy.
        if !step_query.is_empty() {
            let mut candidates: Vec<(String, f64)> = Vec::new();
            for (name, tool) in tools.iter() {
                let Some(parser) = tool.parser() else { continue };
                match parser.parse(step_query) {
                    ParseOutcome::Rejected(rejection) => {
                        tracing::info!(
                            tool = %name,
                            reason = %rejection.reason,
                            "parser rejected query, excluding tool"
                        );
                    }
                    ParseOutcome::Parsed(parsed) => {
                        candidates.push((name.clone(), parsed.confidence));
                    }
                }
            }
            if let Some((name, confidence)) = candidates
                .into_iter()
                .max_by(|a, b| a.1.total_cmp(&b.1))
            {
                if confidence >= self.config.parser_candidate_threshold {
                    tracing::info!(tool = %name, confidence, "parser sweep routing");
                    return Some(Selection {
                        tool_name: name,
                        strategy: SelectionStrategy::ParserSweep,
                        parser_confidence: Some(confidence),
                    });
                }
            }
        }

        // 3. Memory recommendations matching the intent.
        if let Some(memory) = memory {
            let intent_lower = intent.to_lowercase();
            for recommended in &memory.recommended_tools {
                let rec_lower = recommended.to_lowercase();
                let matches_intent =
                    rec_lower.contains(&intent_lower) || intent_lower.contains(&rec_lower);
                if matches_intent && tools.contains(&rec_lower) {
                    return Some(Selection {
                        tool_name: rec_lower,
                        strategy: SelectionStrategy::MemoryRecommendation,
                        parser_confidence: None,
                    });
                }
            }
        }

        // 4. Static intent-to-tool map.
        if let Some(mapped) = intent_tool_map(intent) {
            if tools.contains(mapped) {
                return Some(Selection {
                    tool_name: mapped.to_string(),
                    strategy: SelectionStrategy::IntentMap,
                    parser_confidence: None,
                });
            }
        }

        // 5. Catalog domain mapping.
        if let Some(domain) = ToolCatalog::normalize_domain_string(intent) {
            if domain != Domain::General {
                let available = tools.name_set();
                if let Some(mapped) = self.catalog.map_domain_to_tool(domain, Some(&available)) {
                    return Some(Selection {
                        tool_name: mapped,
                        strategy: SelectionStrategy::DomainMapping,
                        parser_confidence: None,
                    });
                }
            }
        }

        // 6. Case-insensitive name match.
        let intent_lower = intent.to_lowercase();
        if tools.contains(&intent_lower) {
            return Some(Selection {
                tool_name: intent_lower,
                strategy: SelectionStrategy::NameMatch,
                parser_confidence: None,
            });
        }

        // 7. Last resort: first available tool.
        tools.names().into_iter().next().map(|tool_name| Selection {
            tool_name,
            strategy: SelectionStrategy::FirstAvailable,
            parser_confidence: None,
        })
    }
}

/// Static intent-to-tool mapping for the standard tool families.
fn intent_tool_map(intent: &str) -> Option<&'static str> {
    match intent.to_lowercase().as_str() {
        "task" | "tasks" | "todo" | "reminder" => Some("tasks"),
        "calendar" | "event" | "meeting" | "appointment" | "schedule" => Some("calendar"),
        "email" | "emails" | "message" | "messages" | "mail" => Some("email"),
        "notion" => Some("notion"),
        "summary" | "summarize" => Some("summarize"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tools::{MockParser, MockTool};
    use crate::domain::plan::Action;
    use crate::ports::tool::{ParserRejection, Tool};

    fn selector() -> ToolSelector {
        ToolSelector::new(Arc::new(ToolCatalog::with_defaults()), SelectionConfig::default())
    }

    fn registry(tools: Vec<Arc<dyn Tool>>) -> ToolRegistry {
        ToolRegistry::from_tools(tools)
    }

    #[test]
    fn authoritative_parser_result_wins_at_point_eight() {
        let tools = registry(vec![
            Arc::new(MockTool::new("email")),
            Arc::new(MockTool::new("tasks")),
        ]);
        let mut parser_results = HashMap::new();
        parser_results.insert("email".to_string(), ParsedQuery::new(Action::Search, 0.80));

        let selection = selector()
            .select("find that invoice", "general", None, Some(&parser_results), &tools)
            .unwrap();
        assert_eq!(selection.tool_name, "email");
        assert_eq!(selection.strategy, SelectionStrategy::AuthoritativeParser);
    }

    #[test]
    fn just_below_authoritative_threshold_falls_to_sweep() {
        let email = MockTool::new("email")
            .with_parser(MockParser::parsed(ParsedQuery::new(Action::Search, 0.79)));
        let tools = registry(vec![Arc::new(email), Arc::new(MockTool::new("tasks"))]);
        let mut parser_results = HashMap::new();
        parser_results.insert("email".to_string(), ParsedQuery::new(Action::Search, 0.79));

        let selection = selector()
            .select("find that invoice", "general", None, Some(&parser_results), &tools)
            .unwrap();
        assert_eq!(selection.tool_name, "email");
        assert_eq!(selection.strategy, SelectionStrategy::ParserSweep);
        assert_eq!(selection.parser_confidence, Some(0.79));
    }

    #[test]
    fn rejecting_parser_removes_tool_from_candidacy() {
        let email = MockTool::new("email").with_parser(MockParser::rejected(ParserRejection {
            reason: "not an email query".to_string(),
            suggested_domains: vec![Domain::Task],
        }));
        let tasks = MockTool::new("tasks")
            .with_parser(MockParser::parsed(ParsedQuery::new(Action::List, 0.75)));
        let tools = registry(vec![Arc::new(email), Arc::new(tasks)]);

        let selection = selector()
            .select("what tasks do I have", "general", None, None, &tools)
            .unwrap();
        assert_eq!(selection.tool_name, "tasks");
        assert_eq!(selection.strategy, SelectionStrategy::ParserSweep);
    }

    #[test]
    fn low_sweep_confidence_falls_through_to_intent_map() {
        let email = MockTool::new("email")
            .with_parser(MockParser::parsed(ParsedQuery::new(Action::Search, 0.3)));
        let tools = registry(vec![Arc::new(email), Arc::new(MockTool::new("tasks"))]);

        let selection = selector()
            .select("what tasks do I have", "tasks", None, None, &tools)
            .unwrap();
        assert_eq!(selection.tool_name, "tasks");
        assert_eq!(selection.strategy, SelectionStrategy::IntentMap);
    }

    #[test]
    fn memory_recommendation_matching_intent_is_used() {
        let tools = registry(vec![
            Arc::new(MockTool::new("task_tool")),
            Arc::new(MockTool::new("email")),
        ]);
        let memory = MemoryRecommendations {
            recommended_tools: vec!["task_tool".to_string()],
            intent: None,
        };

        let selection = selector()
            .select("add something", "task", Some(&memory), None, &tools)
            .unwrap();
        assert_eq!(selection.tool_name, "task_tool");
        assert_eq!(selection.strategy, SelectionStrategy::MemoryRecommendation);
    }

    #[test]
    fn domain_mapping_covers_non_canonical_registrations() {
        let tools = registry(vec![Arc::new(MockTool::new("task_tool"))]);
        let selection = selector()
            .select("show tasks", "tasks", None, None, &tools)
            .unwrap();
        // "tasks" intent maps to the canonical "tasks" tool, which is not
        // available; the catalog falls back to the registered alternative.
        assert_eq!(selection.tool_name, "task_tool");
        assert_eq!(selection.strategy, SelectionStrategy::DomainMapping);
    }

    #[test]
    fn name_match_and_first_available_close_the_cascade() {
        let tools = registry(vec![Arc::new(MockTool::new("weather_widget"))]);
        let named = selector()
            .select("anything", "Weather_Widget", None, None, &tools)
            .unwrap();
        assert_eq!(named.strategy, SelectionStrategy::NameMatch);

        let fallback = selector()
            .select("anything", "unknown_intent", None, None, &tools)
            .unwrap();
        assert_eq!(fallback.strategy, SelectionStrategy::FirstAvailable);
        assert_eq!(fallback.tool_name, "weather_widget");
    }

    #[test]
    fn empty_registry_selects_nothing() {
        assert!(selector()
            .select("anything", "tasks", None, None, &ToolRegistry::new())
            .is_none());
    }
}
