//! Conversation orchestrator.
//!
//! One [`Agent::answer`] call drives a single request through an explicit
//! state machine:
//!
//! ```text
//! AwaitingModel ──tool call──▶ ToolRequested ──relevant / searched──▶ AwaitingModel
//!       │                           │
//!       │ text                      ├─ not relevant ──▶ Rejected
//!       ▼                           └─ unknown tool / round limit ──▶ FinalAnswer
//! FinalAnswer
//! ```
//!
//! The agent is immutable after construction and shared across requests as
//! `Arc<Agent>`; all per-request state lives on the stack of `answer`.

pub mod classifier;
pub mod conversation;
pub mod prompt;
pub mod response;
pub mod tools;

use chrono::Datelike;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::llm::retry::with_retry;
use crate::llm::{AssistantReply, LlmProvider, ProviderError, ToolCall, ToolSchema, Turn, providers};
use crate::search::{SearchClient, SearchOutcome};
use crate::text::{answer, sanitize, urls};

use conversation::Conversation;
use prompt::Prompts;
use response::{Request, Response, TOOL_LIMIT_REASONING, TOOL_NOT_FOUND_REASONING};
use tools::ToolRequest;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("failed to encode tool result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Orchestrator state between two steps of the loop.
#[derive(Debug)]
enum State {
    AwaitingModel,
    ToolRequested(ToolCall),
    FinalAnswer(Option<String>),
    Rejected,
}

#[derive(Debug)]
pub struct Agent {
    provider: LlmProvider,
    search: SearchClient,
    prompts: Prompts,
    tools: Vec<ToolSchema>,
    max_tool_rounds: usize,
    max_attempts: u32,
}

impl Agent {
    pub fn new(
        provider: LlmProvider,
        search: SearchClient,
        prompts: Prompts,
        max_tool_rounds: usize,
        max_attempts: u32,
    ) -> Self {
        Self { provider, search, prompts, tools: tools::schemas(), max_tool_rounds, max_attempts }
    }

    /// Build the provider, search client and prompts from `config`.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let provider = providers::build(&config.llm, config.llm_api_key.clone())?;
        let search = SearchClient::new(&config.search, config.search_api_key.clone())?;
        let prompts = Prompts::load(&config.agent.prompts_dir, chrono::Local::now().year());
        Ok(Self::new(provider, search, prompts, config.agent.max_tool_rounds, config.llm.max_attempts))
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    pub fn search_enabled(&self) -> bool {
        self.search.is_enabled()
    }

    /// Answer one request. Only an LLM failure that survives the retry
    /// bound is an error; everything else degrades to a fixed response.
    pub async fn answer(&self, request: Request) -> Result<Response, AgentError> {
        let has_options = answer::has_enumerated_options(&request.query);
        let query = sanitize::sanitize(&request.query);
        info!(id = request.id, query = %request.query, "request received");
        debug!(id = request.id, sanitized = %query, has_options, "query sanitized");

        let mut conversation = Conversation::new(&self.prompts.agent, &query);
        let mut candidates: Vec<String> = Vec::new();
        let mut rounds = 0usize;
        let mut state = State::AwaitingModel;

        loop {
            state = match state {
                State::AwaitingModel => self.call_model(&conversation).await?,
                State::ToolRequested(call) => {
                    rounds += 1;
                    if rounds > self.max_tool_rounds {
                        warn!(id = request.id, limit = self.max_tool_rounds, "tool round limit reached");
                        State::FinalAnswer(Some(TOOL_LIMIT_REASONING.to_string()))
                    } else {
                        self.run_tool(call, &query, &mut conversation, &mut candidates).await?
                    }
                }
                State::FinalAnswer(text) => {
                    debug!(id = request.id, text = ?text, "final model output");
                    let response = response::assemble(request.id, text.as_deref(), has_options, &candidates);
                    info!(id = request.id, answer = ?response.answer, sources = response.sources.len(), "request answered");
                    return Ok(response);
                }
                State::Rejected => {
                    info!(id = request.id, "query rejected as out of scope");
                    return Ok(Response::out_of_scope(request.id));
                }
            };
        }
    }

    async fn call_model(&self, conversation: &Conversation) -> Result<State, AgentError> {
        let provider = &self.provider;
        let turns = conversation.turns();
        let tools = self.tools.as_slice();
        let response = with_retry(self.max_attempts, || provider.chat(turns, tools)).await?;
        if let Some(usage) = response.usage {
            debug!(input_tokens = usage.input_tokens, output_tokens = usage.output_tokens, "model usage");
        }
        Ok(match response.reply {
            AssistantReply::ToolCall(call) => State::ToolRequested(call),
            AssistantReply::Text(text) => State::FinalAnswer(text),
        })
    }

    async fn run_tool(
        &self,
        call: ToolCall,
        query: &str,
        conversation: &mut Conversation,
        candidates: &mut Vec<String>,
    ) -> Result<State, AgentError> {
        info!(tool = %call.name, arguments = %call.arguments, "tool requested");
        match ToolRequest::parse(&call) {
            ToolRequest::ClassifyRelevance { query: argument } => {
                let target = argument.as_deref().unwrap_or(query);
                let verdict =
                    classifier::classify(&self.provider, &self.prompts.classifier, target, self.max_attempts).await?;
                if !verdict.is_itmo_relevant {
                    return Ok(State::Rejected);
                }
                record(conversation, call, &verdict)?;
            }
            ToolRequest::SearchLinks { query: argument, max_results } => {
                let target = argument.as_deref().unwrap_or(query);
                let outcome = self.search.search(target, max_results).await;
                if let SearchOutcome::Links(links) = &outcome {
                    *candidates = links.iter().take(urls::MAX_SOURCES).map(|l| l.link.clone()).collect();
                    debug!(candidates = ?candidates, "sources captured");
                }
                record(conversation, call, &outcome)?;
            }
            ToolRequest::Unknown(name) => {
                warn!(tool = %name, "model requested an unknown tool");
                return Ok(State::FinalAnswer(Some(TOOL_NOT_FOUND_REASONING.to_string())));
            }
        }
        Ok(State::AwaitingModel)
    }
}

/// Append the tool-call turn and its JSON result.
fn record(conversation: &mut Conversation, call: ToolCall, result: &impl Serialize) -> Result<(), AgentError> {
    let content = serde_json::to_string(result)?;
    let call_id = call.id.clone();
    conversation.push(Turn::tool_call(call));
    conversation.push(Turn::tool_result(call_id, content));
    Ok(())
}
