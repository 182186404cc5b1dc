//! Request/response records and assembly of the final response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::agent::classifier::strip_code_fence;
use crate::text::{answer, urls};

pub const OUT_OF_SCOPE_REASONING: &str = "Этот вопрос выходит за рамки моей специализации.";
pub const GENERIC_ERROR_REASONING: &str = "Ошибка формирования ответа.";
pub const TOOL_NOT_FOUND_REASONING: &str = "Запрошенный инструмент не найден.";
pub const TOOL_LIMIT_REASONING: &str = "Превышено допустимое число обращений к инструментам.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: i64,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: i64,
    pub answer: Option<u32>,
    pub reasoning: String,
    pub sources: Vec<String>,
}

impl Response {
    /// Fixed reply for queries the classifier rejected.
    pub fn out_of_scope(id: i64) -> Self {
        Self::fixed(id, OUT_OF_SCOPE_REASONING)
    }

    /// Fixed reply when the model produced nothing usable.
    pub fn generic_error(id: i64) -> Self {
        Self::fixed(id, GENERIC_ERROR_REASONING)
    }

    fn fixed(id: i64, reasoning: &str) -> Self {
        Self { id, answer: None, reasoning: reasoning.to_string(), sources: Vec::new() }
    }
}

/// A final reply the model formatted as the response JSON itself.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    answer: Value,
    reasoning: String,
    #[serde(default)]
    sources: Vec<String>,
}

impl Envelope {
    fn parse(text: &str) -> Option<Self> {
        serde_json::from_str::<Envelope>(strip_code_fence(text))
            .ok()
            .filter(|e| !e.reasoning.trim().is_empty())
    }

    /// Numeric (or numeric-string) answer within the option range.
    fn answer(&self) -> Option<u32> {
        let n = match &self.answer {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }?;
        u32::try_from(n).ok().filter(|n| (1..=answer::MAX_OPTION).contains(n))
    }
}

/// Build the response from the model's final text.
///
/// `candidates` are links captured from the latest successful search and
/// take precedence over any links the model wrote itself.
pub fn assemble(id: i64, final_text: Option<&str>, has_options: bool, candidates: &[String]) -> Response {
    let Some(text) = final_text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Response::generic_error(id);
    };

    let envelope = Envelope::parse(text);
    let raw_reasoning = envelope.as_ref().map_or(text, |e| e.reasoning.as_str());

    let extracted = answer::extract_answer(raw_reasoning, has_options);
    let answer = match envelope.as_ref().and_then(Envelope::answer) {
        Some(n) if has_options => Some(n),
        _ => extracted,
    };

    // Links written in free text are stripped, never promoted to sources.
    let sources = match &envelope {
        _ if !candidates.is_empty() => urls::clean_sources(candidates.iter().cloned()),
        Some(e) => urls::clean_sources(e.sources.iter().cloned()),
        None => Vec::new(),
    };

    let reasoning = urls::strip_from_text(raw_reasoning);
    if reasoning.is_empty() {
        return Response::generic_error(id);
    }

    debug!(id, ?answer, sources = sources.len(), envelope = envelope.is_some(), "response assembled");
    Response { id, answer, reasoning, sources }
}
