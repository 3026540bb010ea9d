//! Pattern sets for domain detection.
//!
//! Each data domain carries four families of evidence: strong-indicator
//! regexes, plain keywords, question-form phrases, and action-form phrases.
//! The sets are compiled once and are stable configuration inputs; they are
//! not editable at runtime.
//!
//! Bare `event` is deliberately absent from the keyword lists (it is too
//! generic a noun); it appears only inside strong-indicator regexes where
//! the surrounding words disambiguate.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::domain::catalog::Domain;

/// Evidence patterns for one domain.
#[derive(Debug)]
pub struct DomainPatterns {
    pub strong_indicators: Vec<Regex>,
    pub keywords: &'static [&'static str],
    pub question_phrases: &'static [&'static str],
    pub action_phrases: &'static [&'static str],
}

/// The full pattern set over all data domains.
#[derive(Debug)]
pub struct PatternSet {
    per_domain: BTreeMap<Domain, DomainPatterns>,
}

pub const TASK_KEYWORDS: &[&str] = &["task", "tasks", "todo", "todos"];
pub const CALENDAR_KEYWORDS: &[&str] = &["meeting", "calendar", "appointment"];
pub const EMAIL_KEYWORDS: &[&str] = &["email", "message", "inbox", "send"];
pub const NOTION_KEYWORDS: &[&str] = &["notion", "page", "database", "document", "wiki"];

const TASK_QUESTIONS: &[&str] = &[
    "what tasks",
    "my tasks",
    "tasks do i have",
    "what do i need to do",
    "my todo",
];
const TASK_ACTIONS: &[&str] = &[
    "create a task",
    "add a task",
    "new task",
    "remind me to",
    "mark as done",
];

const CALENDAR_QUESTIONS: &[&str] = &[
    "what meetings",
    "my meetings",
    "my calendar",
    "what's on my calendar",
    "meetings do i have",
    "when is my",
];
const CALENDAR_ACTIONS: &[&str] = &[
    "schedule a meeting",
    "book a meeting",
    "set up a meeting",
    "create an event",
    "add to my calendar",
];

const EMAIL_QUESTIONS: &[&str] = &[
    "check my email",
    "unread emails",
    "emails from",
    "my inbox",
    "any new emails",
];
const EMAIL_ACTIONS: &[&str] = &[];

const NOTION_QUESTIONS: &[&str] = &[
    "what notion",
    "notion pages",
    "notion database",
    "search notion",
    "find in notion",
    "notion document",
];
const NOTION_ACTIONS: &[&str] = &[
    "create notion",
    "update notion",
    "add to notion",
    "notion page",
    "notion database",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static detection pattern compiles"))
        .collect()
}

static STANDARD: Lazy<PatternSet> = Lazy::new(|| {
    let mut per_domain = BTreeMap::new();

    per_domain.insert(
        Domain::Task,
        DomainPatterns {
            strong_indicators: compile(&[
                r"\btask\b",
                r"\btasks\b",
                r"\btodo\b",
                r"\btodos\b",
                r"\breminder\b",
                r"\bdeadline\b",
                r"due\s+(?:today|tomorrow|this week|next week)",
                r"\boverdue\b",
                r"\bpending\b",
                r"\bcompleted\b",
            ]),
            keywords: TASK_KEYWORDS,
            question_phrases: TASK_QUESTIONS,
            action_phrases: TASK_ACTIONS,
        },
    );

    per_domain.insert(
        Domain::Calendar,
        DomainPatterns {
            strong_indicators: compile(&[
                r"\bmeeting\b",
                r"\bmeetings\b",
                r"\bevent\b",
                r"\bevents\b",
                r"\bappointment\b",
                r"\bcalendar\b",
                r"schedule\s+(?:a|an|the)\s+meeting",
                r"book\s+(?:a|an|the)\s+meeting",
                r"what.*(?:on my calendar|calendar events)",
                r"(?:time|when)\s+(?:is|are)\s+(?:my|the)\s+meeting",
            ]),
            keywords: CALENDAR_KEYWORDS,
            question_phrases: CALENDAR_QUESTIONS,
            action_phrases: CALENDAR_ACTIONS,
        },
    );

    per_domain.insert(
        Domain::Email,
        DomainPatterns {
            strong_indicators: compile(&[
                r"\bemail\b",
                r"\bemails\b",
                r"\bmessage\b",
                r"\bmessages\b",
                r"\binbox\b",
                r"\bunread\b",
                r"\bsender\b",
                r"send\s+(?:an?\s+)?email",
                r"search\s+(?:for\s+)?emails?",
                r"from\s+\w+@",
                r"urgent\s+(?:emails?|messages?)",
            ]),
            keywords: EMAIL_KEYWORDS,
            question_phrases: EMAIL_QUESTIONS,
            action_phrases: EMAIL_ACTIONS,
        },
    );

    per_domain.insert(
        Domain::Notion,
        DomainPatterns {
            strong_indicators: compile(&[
                r"\bnotion\b",
                r"\bpage\b",
                r"\bpages\b",
                r"\bdatabase\b",
                r"\bdocument\b",
                r"\bwiki\b",
                r"create\s+(?:a|an|the)?\s+(?:notion\s+)?(?:page|database)",
                r"update\s+(?:a|an|the)?\s+(?:notion\s+)?(?:page|database)",
                r"search\s+(?:in\s+)?notion",
                r"query\s+(?:notion\s+)?(?:page|database)",
                r"notion\s+(?:page|database|document)",
            ]),
            keywords: NOTION_KEYWORDS,
            question_phrases: NOTION_QUESTIONS,
            action_phrases: NOTION_ACTIONS,
        },
    );

    PatternSet { per_domain }
});

impl PatternSet {
    /// Returns the compiled standard pattern set.
    pub fn standard() -> &'static PatternSet {
        &STANDARD
    }

    /// Iterates over (domain, patterns) pairs in canonical domain order.
    pub fn iter(&self) -> impl Iterator<Item = (Domain, &DomainPatterns)> {
        self.per_domain.iter().map(|(d, p)| (*d, p))
    }

    /// Returns the patterns for one domain, if it is a data domain.
    pub fn for_domain(&self, domain: Domain) -> Option<&DomainPatterns> {
        self.per_domain.get(&domain)
    }
}

/// Plain keyword bucket for a data domain.
///
/// Used by cross-domain detection and the rejection-retry keyword match.
pub fn domain_keywords(domain: Domain) -> &'static [&'static str] {
    match domain {
        Domain::Task => TASK_KEYWORDS,
        Domain::Calendar => CALENDAR_KEYWORDS,
        Domain::Email => EMAIL_KEYWORDS,
        Domain::Notion => NOTION_KEYWORDS,
        Domain::General | Domain::Mixed => &[],
    }
}

/// Returns the data domains whose keyword buckets match the query.
pub fn matched_keyword_domains(query: &str) -> Vec<Domain> {
    let lower = query.to_lowercase();
    Domain::data_domains()
        .into_iter()
        .filter(|d| domain_keywords(*d).iter().any(|kw| lower.contains(kw)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_set_covers_all_data_domains() {
        let set = PatternSet::standard();
        for domain in Domain::data_domains() {
            assert!(set.for_domain(domain).is_some(), "missing patterns for {domain}");
        }
        assert!(set.for_domain(Domain::General).is_none());
    }

    #[test]
    fn keyword_buckets_exclude_bare_event() {
        assert!(!CALENDAR_KEYWORDS.contains(&"event"));
    }

    #[test]
    fn matched_keyword_domains_finds_buckets() {
        let domains = matched_keyword_domains("show my tasks and meetings for tomorrow");
        assert!(domains.contains(&Domain::Task));
        assert!(domains.contains(&Domain::Calendar));
        assert!(!domains.contains(&Domain::Email));
    }

    #[test]
    fn matched_keyword_domains_empty_for_vague_query() {
        assert!(matched_keyword_domains("how are you doing").is_empty());
    }
}
