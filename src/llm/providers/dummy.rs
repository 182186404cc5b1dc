//! Dummy LLM provider: replays a script of canned replies, then echoes.
//!
//! Used for tests and keyless local runs. Every request is recorded so tests
//! can inspect the exact conversation each call received. Clones share the
//! same script and request log.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::llm::{LlmResponse, ProviderError, Role, ToolSchema, Turn};

/// One recorded `chat` call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub turns: Vec<Turn>,
    pub tool_names: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    script: VecDeque<Result<LlmResponse, ProviderError>>,
    requests: Vec<RecordedRequest>,
}

#[derive(Debug, Clone, Default)]
pub struct DummyProvider {
    inner: Arc<Mutex<Inner>>,
}

impl DummyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that answers with `replies` in order, then falls back to echo.
    pub fn scripted(replies: impl IntoIterator<Item = LlmResponse>) -> Self {
        let p = Self::new();
        for reply in replies {
            p.push(Ok(reply));
        }
        p
    }

    /// Queue a reply (or an error) for a future call.
    pub fn push(&self, reply: Result<LlmResponse, ProviderError>) {
        self.lock().script.push_back(reply);
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub async fn chat(&self, turns: &[Turn], tools: &[ToolSchema]) -> Result<LlmResponse, ProviderError> {
        let mut inner = self.lock();
        inner.requests.push(RecordedRequest {
            turns: turns.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });
        if let Some(next) = inner.script.pop_front() {
            return next;
        }
        let last_user = turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .and_then(|t| t.content.as_deref())
            .unwrap_or_default();
        Ok(LlmResponse::text(format!("[echo] {last_user}")))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
