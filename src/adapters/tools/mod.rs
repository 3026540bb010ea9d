//! Mock tool adapter for tests and local composition.
//!
//! A scripted tool: queued results are returned in order, then the
//! fallback response repeats. Invocations are recorded for assertions.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::plan::Action;
use crate::ports::tool::{
    ParseOutcome, ParsedQuery, ParserRejection, QueryParser, Tool, ToolError,
};

/// A parser returning a fixed outcome.
#[derive(Debug, Clone)]
pub struct MockParser {
    outcome: ParseOutcome,
}

impl MockParser {
    pub fn parsed(parsed: ParsedQuery) -> Self {
        Self {
            outcome: ParseOutcome::Parsed(parsed),
        }
    }

    pub fn rejected(rejection: ParserRejection) -> Self {
        Self {
            outcome: ParseOutcome::Rejected(rejection),
        }
    }
}

impl QueryParser for MockParser {
    fn parse(&self, _query: &str) -> ParseOutcome {
        self.outcome.clone()
    }
}

/// A scripted tool for tests.
pub struct MockTool {
    name: String,
    script: Mutex<VecDeque<Result<String, ToolError>>>,
    fallback: String,
    delay: Option<Duration>,
    parser: Option<MockParser>,
    calls: Mutex<Vec<(Action, String)>>,
}

impl MockTool {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            fallback: format!("{} responded", name),
            name,
            script: Mutex::new(VecDeque::new()),
            delay: None,
            parser: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the response returned once the script is exhausted.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.fallback = response.into();
        self
    }

    /// Queues one scripted result (consumed in order).
    pub fn with_scripted(self, result: Result<String, ToolError>) -> Self {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).push_back(result);
        self
    }

    /// Attaches a parser.
    pub fn with_parser(mut self, parser: MockParser) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Sleeps before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All `(action, query)` pairs this tool has received.
    pub fn calls(&self) -> Vec<(Action, String)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn parser(&self) -> Option<&dyn QueryParser> {
        self.parser.as_ref().map(|p| p as &dyn QueryParser)
    }

    async fn run(&self, action: Action, query: &str) -> Result<String, ToolError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((action, query.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::Domain;

    #[tokio::test]
    async fn scripted_results_are_consumed_in_order() {
        let tool = MockTool::new("tasks")
            .with_scripted(Err(ToolError::Failed("first call fails".to_string())))
            .with_response("2 tasks found");

        assert!(tool.run(Action::List, "q").await.is_err());
        assert_eq!(tool.run(Action::List, "q").await.unwrap(), "2 tasks found");
        assert_eq!(tool.call_count(), 2);
    }

    #[tokio::test]
    async fn calls_record_action_and_query() {
        let tool = MockTool::new("email");
        tool.run(Action::Search, "find invoices").await.unwrap();
        let calls = tool.calls();
        assert_eq!(calls, vec![(Action::Search, "find invoices".to_string())]);
    }

    #[test]
    fn parser_outcomes_are_fixed() {
        let rejection = ParserRejection {
            reason: "nope".to_string(),
            suggested_domains: vec![Domain::Task],
        };
        let parser = MockParser::rejected(rejection);
        assert!(matches!(parser.parse("anything"), ParseOutcome::Rejected(_)));
    }
}
