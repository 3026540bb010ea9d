//! Tool catalog - the canonical tool-to-domain registry.
//!
//! Single source of truth for which tools belong to which domains, the
//! canonical tool name per domain, and tool-name normalization. All routing
//! and validation components resolve tools through this catalog instead of
//! hard-coding tool names.
//!
//! There is one shared catalog per process (see [`ToolCatalog::shared`]).
//! Components receive it as an explicit `Arc` so their behavior stays
//! deterministic and unit-testable; nothing reads the singleton ambiently.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

/// Canonical domain types for all routing and validation decisions.
///
/// `Mixed` marks queries whose evidence straddles two or more data domains;
/// `General` means no domain was confidently detected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Email,
    Task,
    Calendar,
    Notion,
    General,
    Mixed,
}

impl Domain {
    /// Returns the wire string for this domain.
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Email => "email",
            Domain::Task => "task",
            Domain::Calendar => "calendar",
            Domain::Notion => "notion",
            Domain::General => "general",
            Domain::Mixed => "mixed",
        }
    }

    /// The four data-source domains, in canonical order.
    pub fn data_domains() -> [Domain; 4] {
        [Domain::Email, Domain::Task, Domain::Calendar, Domain::Notion]
    }

    /// True for domains that correspond to an actual data source.
    pub fn is_data_domain(&self) -> bool {
        !matches!(self, Domain::General | Domain::Mixed)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error parsing a domain string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown domain: {0}")]
pub struct ParseDomainError(String);

impl FromStr for Domain {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolCatalog::normalize_domain_string(s).ok_or_else(|| ParseDomainError(s.to_string()))
    }
}

#[derive(Debug)]
struct CatalogInner {
    tool_to_domain: HashMap<String, Domain>,
    domain_to_tools: HashMap<Domain, BTreeSet<String>>,
    canonical: HashMap<Domain, String>,
}

/// Centralized, mutable tool-to-domain registry.
///
/// Tool names are stored lowercased. In practice the catalog is populated at
/// bootstrap and only read afterwards; reads take a short lock and writers
/// synchronize through the same lock.
#[derive(Debug)]
pub struct ToolCatalog {
    inner: RwLock<CatalogInner>,
}

static SHARED_CATALOG: Lazy<Arc<ToolCatalog>> = Lazy::new(|| Arc::new(ToolCatalog::with_defaults()));

impl ToolCatalog {
    /// Returns the process-wide catalog, creating it on first use.
    pub fn shared() -> Arc<ToolCatalog> {
        Arc::clone(&SHARED_CATALOG)
    }

    /// Creates an empty catalog (mainly for tests).
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(CatalogInner {
                tool_to_domain: HashMap::new(),
                domain_to_tools: HashMap::new(),
                canonical: HashMap::new(),
            }),
        }
    }

    /// Creates a catalog seeded with the standard tool families.
    pub fn with_defaults() -> Self {
        let catalog = Self::empty();
        catalog.register_batch([
            // Email domain tools
            ("email", Domain::Email),
            ("email_tool", Domain::Email),
            ("analyze_email", Domain::Email),
            ("compose_email", Domain::Email),
            ("search_email", Domain::Email),
            // Task domain tools
            ("task", Domain::Task),
            ("tasks", Domain::Task),
            ("task_tool", Domain::Task),
            ("task_manager", Domain::Task),
            ("todo", Domain::Task),
            // Calendar domain tools
            ("calendar", Domain::Calendar),
            ("calendar_tool", Domain::Calendar),
            ("event_manager", Domain::Calendar),
            ("schedule", Domain::Calendar),
            // Notion domain tools
            ("notion", Domain::Notion),
            ("notion_tool", Domain::Notion),
            ("notion_search", Domain::Notion),
            ("notion_page", Domain::Notion),
            ("notion_database", Domain::Notion),
            // General/utility tools
            ("summarize", Domain::General),
            ("summarize_tool", Domain::General),
            ("summary", Domain::General),
        ]);

        {
            let mut inner = catalog.inner.write().unwrap_or_else(|e| e.into_inner());
            inner.canonical.insert(Domain::Email, "email".to_string());
            inner.canonical.insert(Domain::Task, "tasks".to_string());
            inner.canonical.insert(Domain::Calendar, "calendar".to_string());
            inner.canonical.insert(Domain::Notion, "notion".to_string());
            inner.canonical.insert(Domain::General, "summarize".to_string());
            // Mixed queries fall back to the email tool
            inner.canonical.insert(Domain::Mixed, "email".to_string());
        }

        catalog
    }

    /// Registers a tool under a domain. Names are lowercased.
    pub fn register(&self, tool_name: &str, domain: Domain) {
        let name = tool_name.to_lowercase();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.tool_to_domain.insert(name.clone(), domain);
        inner.domain_to_tools.entry(domain).or_default().insert(name);
    }

    /// Registers multiple tools at once.
    pub fn register_batch<'a>(&self, tools: impl IntoIterator<Item = (&'a str, Domain)>) {
        for (name, domain) in tools {
            self.register(name, domain);
        }
    }

    /// Removes a tool from the catalog. Returns false when unknown.
    pub fn unregister(&self, tool_name: &str) -> bool {
        let name = tool_name.to_lowercase();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match inner.tool_to_domain.remove(&name) {
            Some(domain) => {
                if let Some(tools) = inner.domain_to_tools.get_mut(&domain) {
                    tools.remove(&name);
                }
                true
            }
            None => false,
        }
    }

    /// Looks up the domain for a tool name (case-insensitive).
    pub fn domain_for_tool(&self, tool_name: &str) -> Option<Domain> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.tool_to_domain.get(&tool_name.to_lowercase()).copied()
    }

    /// Returns all tools registered for a domain, sorted.
    pub fn tools_for_domain(&self, domain: Domain) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .domain_to_tools
            .get(&domain)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the canonical tool name for a domain.
    pub fn canonical_tool(&self, domain: Domain) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.canonical.get(&domain).cloned()
    }

    /// Sets the canonical tool for a domain. The tool must already be
    /// registered under that domain.
    pub fn set_canonical_tool(&self, domain: Domain, tool_name: &str) -> bool {
        let name = tool_name.to_lowercase();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.tool_to_domain.get(&name) != Some(&domain) {
            tracing::warn!(
                tool = %name,
                domain = %domain,
                "cannot set canonical tool: not registered in this domain"
            );
            return false;
        }
        inner.canonical.insert(domain, name);
        true
    }

    /// Checks whether a tool belongs to a specific domain.
    pub fn is_tool_in_domain(&self, tool_name: &str, domain: Domain) -> bool {
        self.domain_for_tool(tool_name) == Some(domain)
    }

    /// Returns the canonical (lowercased) form of a registered tool name,
    /// or the input unchanged when the tool is unknown. Idempotent.
    pub fn normalize_tool_name(&self, tool_name: &str) -> String {
        let lower = tool_name.to_lowercase();
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        if inner.tool_to_domain.contains_key(&lower) {
            lower
        } else {
            tool_name.to_string()
        }
    }

    /// Normalizes a domain string (case-insensitive, accepts plural forms).
    pub fn normalize_domain_string(domain: &str) -> Option<Domain> {
        match domain.to_lowercase().as_str() {
            "email" | "emails" => Some(Domain::Email),
            "task" | "tasks" | "todo" | "todos" => Some(Domain::Task),
            "calendar" => Some(Domain::Calendar),
            "notion" => Some(Domain::Notion),
            "general" => Some(Domain::General),
            "mixed" => Some(Domain::Mixed),
            _ => None,
        }
    }

    /// Maps a domain to a usable tool name.
    ///
    /// Prefers the canonical tool; when `available` is given and the
    /// canonical tool is absent, falls back to any registered tool of the
    /// domain that is available.
    pub fn map_domain_to_tool(
        &self,
        domain: Domain,
        available: Option<&HashSet<String>>,
    ) -> Option<String> {
        let canonical = self.canonical_tool(domain);
        let Some(available) = available else {
            return canonical;
        };

        if let Some(name) = &canonical {
            if available.contains(name) {
                return canonical;
            }
        }

        for candidate in self.tools_for_domain(domain) {
            if available.contains(&candidate) {
                tracing::debug!(
                    domain = %domain,
                    tool = %candidate,
                    "canonical tool unavailable, using registered alternative"
                );
                return Some(candidate);
            }
        }

        tracing::warn!(
            domain = %domain,
            canonical = canonical.as_deref().unwrap_or("<none>"),
            "no available tool for domain"
        );
        None
    }

    /// Builds a tool-to-domain mapping for the tools actually available in
    /// the system. Unknown tools map to [`Domain::General`] with a warning.
    pub fn build_from_available_tools<'a>(
        &self,
        available: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<String, Domain> {
        let mut mapping = HashMap::new();
        let mut unregistered = Vec::new();

        for name in available {
            let lower = name.to_lowercase();
            let domain = self.domain_for_tool(&lower).unwrap_or_else(|| {
                unregistered.push(lower.clone());
                Domain::General
            });
            mapping.insert(lower, domain);
        }

        if !unregistered.is_empty() {
            tracing::warn!(
                tools = ?unregistered,
                "unknown tools mapped to the general domain; register them for proper routing"
            );
        }

        mapping
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.tool_to_domain.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_map_standard_tools() {
        let catalog = ToolCatalog::with_defaults();
        assert_eq!(catalog.domain_for_tool("email"), Some(Domain::Email));
        assert_eq!(catalog.domain_for_tool("tasks"), Some(Domain::Task));
        assert_eq!(catalog.domain_for_tool("CALENDAR"), Some(Domain::Calendar));
        assert_eq!(catalog.domain_for_tool("notion_page"), Some(Domain::Notion));
        assert_eq!(catalog.domain_for_tool("nonexistent"), None);
    }

    #[test]
    fn canonical_tools_match_expected_names() {
        let catalog = ToolCatalog::with_defaults();
        assert_eq!(catalog.canonical_tool(Domain::Email).as_deref(), Some("email"));
        assert_eq!(catalog.canonical_tool(Domain::Task).as_deref(), Some("tasks"));
        assert_eq!(catalog.canonical_tool(Domain::Mixed).as_deref(), Some("email"));
    }

    #[test]
    fn register_and_unregister_round_trip() {
        let catalog = ToolCatalog::with_defaults();
        catalog.register("My_Email_Bridge", Domain::Email);
        assert_eq!(catalog.domain_for_tool("my_email_bridge"), Some(Domain::Email));
        assert!(catalog.tools_for_domain(Domain::Email).contains(&"my_email_bridge".to_string()));

        assert!(catalog.unregister("MY_EMAIL_BRIDGE"));
        assert_eq!(catalog.domain_for_tool("my_email_bridge"), None);
        assert!(!catalog.unregister("my_email_bridge"));
    }

    #[test]
    fn map_domain_to_tool_prefers_canonical() {
        let catalog = ToolCatalog::with_defaults();
        let available: HashSet<String> =
            ["tasks".to_string(), "calendar".to_string()].into_iter().collect();
        assert_eq!(
            catalog.map_domain_to_tool(Domain::Task, Some(&available)).as_deref(),
            Some("tasks")
        );
    }

    #[test]
    fn map_domain_to_tool_falls_back_to_registered_alternative() {
        let catalog = ToolCatalog::with_defaults();
        let available: HashSet<String> = ["task_tool".to_string()].into_iter().collect();
        assert_eq!(
            catalog.map_domain_to_tool(Domain::Task, Some(&available)).as_deref(),
            Some("task_tool")
        );
    }

    #[test]
    fn map_domain_to_tool_returns_none_when_nothing_available() {
        let catalog = ToolCatalog::with_defaults();
        let available: HashSet<String> = HashSet::new();
        assert_eq!(catalog.map_domain_to_tool(Domain::Notion, Some(&available)), None);
    }

    #[test]
    fn build_from_available_tools_maps_unknown_to_general() {
        let catalog = ToolCatalog::with_defaults();
        let mapping = catalog.build_from_available_tools(["email", "weird_widget"]);
        assert_eq!(mapping.get("email"), Some(&Domain::Email));
        assert_eq!(mapping.get("weird_widget"), Some(&Domain::General));
    }

    #[test]
    fn normalize_domain_string_accepts_plurals() {
        assert_eq!(ToolCatalog::normalize_domain_string("Tasks"), Some(Domain::Task));
        assert_eq!(ToolCatalog::normalize_domain_string("emails"), Some(Domain::Email));
        assert_eq!(ToolCatalog::normalize_domain_string("slack"), None);
    }

    #[test]
    fn set_canonical_requires_domain_membership() {
        let catalog = ToolCatalog::with_defaults();
        assert!(!catalog.set_canonical_tool(Domain::Task, "email"));
        assert!(catalog.set_canonical_tool(Domain::Task, "task_tool"));
        assert_eq!(catalog.canonical_tool(Domain::Task).as_deref(), Some("task_tool"));
    }

    #[test]
    fn shared_catalog_is_singleton() {
        let a = ToolCatalog::shared();
        let b = ToolCatalog::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn domain_serde_uses_snake_case() {
        assert_eq!(serde_json::to_string(&Domain::Email).unwrap(), "\"email\"");
        let parsed: Domain = serde_json::from_str("\"mixed\"").unwrap();
        assert_eq!(parsed, Domain::Mixed);
    }

    proptest! {
        #[test]
        fn normalize_tool_name_is_idempotent(name in "[A-Za-z_][A-Za-z0-9_]{0,24}") {
            let catalog = ToolCatalog::with_defaults();
            let once = catalog.normalize_tool_name(&name);
            let twice = catalog.normalize_tool_name(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
