//! Relevance classifier: a secondary LLM call gating the pipeline.
//!
//! Empty or unparseable output is treated as "not relevant". A failed LLM
//! call is returned to the caller once retries are exhausted.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::retry::with_retry;
use crate::llm::{AssistantReply, LlmProvider, ProviderError, Turn};

const FAILURE_REASON: &str = "Ошибка обработки запроса.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub is_itmo_relevant: bool,
    #[serde(default)]
    pub reason: String,
}

impl Classification {
    pub fn failed() -> Self {
        Self { is_itmo_relevant: false, reason: FAILURE_REASON.to_string() }
    }
}

/// Ask the model whether `query` is in scope.
pub async fn classify(
    provider: &LlmProvider,
    system_prompt: &str,
    query: &str,
    max_attempts: u32,
) -> Result<Classification, ProviderError> {
    let turns = [Turn::system(system_prompt), Turn::user(query)];
    let response = with_retry(max_attempts, || provider.chat(&turns, &[])).await?;

    let text = match response.reply {
        AssistantReply::Text(Some(text)) => text,
        other => {
            warn!(reply = ?other, "classifier returned no text");
            return Ok(Classification::failed());
        }
    };

    Ok(match parse_classification(&text) {
        Some(c) => {
            debug!(relevant = c.is_itmo_relevant, reason = %c.reason, "query classified");
            c
        }
        None => {
            warn!(output = %text, "classifier output is not valid JSON");
            Classification::failed()
        }
    })
}

/// Parse the classifier's JSON verdict, tolerating a surrounding code fence.
pub fn parse_classification(text: &str) -> Option<Classification> {
    serde_json::from_str(strip_code_fence(text)).ok()
}

/// Remove a leading ```` ``` ```` / ```` ```json ```` fence and its closing
/// fence, if present.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
