//! Tool schemas declared to the model and parsing of its tool calls.

use serde_json::{Value, json};

use crate::llm::{ToolCall, ToolSchema};

pub const CLASSIFY_RELEVANCE: &str = "classify_relevance";
pub const SEARCH_LINKS: &str = "search_links";

/// `max_results` used when the model omits it.
pub const DEFAULT_MAX_RESULTS: usize = 3;

/// Both tools, in the order they are declared to the model.
pub fn schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: CLASSIFY_RELEVANCE.to_string(),
            description: "Определяет, относится ли запрос к ИТМО.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"],
            }),
        },
        ToolSchema {
            name: SEARCH_LINKS.to_string(),
            description: "Поиск ссылок по теме ИТМО.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "max_results": {"type": "integer"},
                },
                "required": ["query"],
            }),
        },
    ]
}

/// A tool call resolved to a local capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    ClassifyRelevance { query: Option<String> },
    SearchLinks { query: Option<String>, max_results: usize },
    Unknown(String),
}

impl ToolRequest {
    /// Resolve `call` by name. Unparseable or non-object arguments are read
    /// as an empty object; missing fields fall back to `None` / defaults.
    pub fn parse(call: &ToolCall) -> Self {
        let args: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);

        match call.name.as_str() {
            CLASSIFY_RELEVANCE => ToolRequest::ClassifyRelevance { query },
            SEARCH_LINKS => {
                let max_results = args
                    .get("max_results")
                    .and_then(Value::as_u64)
                    .and_then(|n| usize::try_from(n).ok())
                    .unwrap_or(DEFAULT_MAX_RESULTS);
                ToolRequest::SearchLinks { query, max_results }
            }
            other => ToolRequest::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall { id: "c1".into(), name: name.into(), arguments: arguments.into() }
    }

    #[test]
    fn declares_both_tools() {
        let names: Vec<_> = schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, [CLASSIFY_RELEVANCE, SEARCH_LINKS]);
    }

    #[test]
    fn parses_search_with_defaults() {
        assert_eq!(
            ToolRequest::parse(&call(SEARCH_LINKS, r#"{"query":"кампус ИТМО"}"#)),
            ToolRequest::SearchLinks { query: Some("кампус ИТМО".into()), max_results: 3 }
        );
        assert_eq!(
            ToolRequest::parse(&call(SEARCH_LINKS, r#"{"query":"q","max_results":5}"#)),
            ToolRequest::SearchLinks { query: Some("q".into()), max_results: 5 }
        );
    }

    #[test]
    fn malformed_arguments_read_as_empty() {
        assert_eq!(
            ToolRequest::parse(&call(CLASSIFY_RELEVANCE, "{not json")),
            ToolRequest::ClassifyRelevance { query: None }
        );
        assert_eq!(
            ToolRequest::parse(&call(SEARCH_LINKS, r#"{"query":"  ","max_results":-2}"#)),
            ToolRequest::SearchLinks { query: None, max_results: 3 }
        );
    }

    #[test]
    fn unknown_tool_is_reported_by_name() {
        assert_eq!(ToolRequest::parse(&call("send_email", "{}")), ToolRequest::Unknown("send_email".into()));
    }
}
