//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! Speaks the `tools` / `tool_calls` protocol. All OpenAI wire types are
//! private to this module; callers only see [`Turn`] and [`LlmResponse`].
//! This provider is stateless: one `chat` call is one HTTP round trip.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::retry::classify_transport;
use crate::llm::{AssistantReply, LlmResponse, LlmUsage, ProviderError, Role, ToolCall, ToolSchema, Turn};

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from config values and an optional API key.
    ///
    /// When `api_key` is present it is sent as `Authorization: Bearer <key>`.
    /// `timeout_seconds` bounds each request end to end.
    pub fn new(
        api_base_url: String,
        model: String,
        temperature: f32,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, model, temperature, api_key })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `turns` with `tools` declared (`tool_choice = "auto"`).
    pub async fn chat(&self, turns: &[Turn], tools: &[ToolSchema]) -> Result<LlmResponse, ProviderError> {
        let payload = self.build_request(turns, tools);

        debug!(
            model = %payload.model,
            temperature = ?payload.temperature,
            messages = payload.messages.len(),
            tools = payload.tools.len(),
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM HTTP request failed (transport)");
            classify_transport(e)
        })?;

        let response = check_status(response).await?;

        let body = response.text().await.map_err(classify_transport)?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            ProviderError::Parse(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received LLM response");
        trace!(response = %body, "full LLM response payload");

        let usage = parsed.usage.as_ref().map(|u| LlmUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });
        let reply = into_reply(parsed)?;
        Ok(LlmResponse { reply, usage })
    }

    fn build_request<'a>(&'a self, turns: &'a [Turn], tools: &'a [ToolSchema]) -> ChatCompletionRequest<'a> {
        // Some models (gpt-5 family) do not accept a temperature parameter.
        let temperature = if self.model.starts_with("gpt-5") {
            None
        } else {
            Some(self.temperature)
        };
        let has_tools = !tools.is_empty();

        ChatCompletionRequest {
            model: &self.model,
            messages: turns.iter().map(WireMessage::from_turn).collect(),
            temperature,
            tools: tools.iter().map(WireTool::from_schema).collect(),
            tool_choice: has_tools.then_some("auto"),
            parallel_tool_calls: has_tools.then_some(false),
        }
    }
}

fn into_reply(parsed: ChatCompletionResponse) -> Result<AssistantReply, ProviderError> {
    let message = parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ProviderError::Parse("no choices in response".into()))?;

    if let Some(call) = message.tool_calls.and_then(|calls| calls.into_iter().next()) {
        return Ok(AssistantReply::ToolCall(ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        }));
    }

    let text = message
        .content
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    Ok(AssistantReply::Text(text))
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    /// Serialized as `null` on assistant tool-call turns.
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCallRef<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> WireMessage<'a> {
    fn from_turn(turn: &'a Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.as_deref(),
            tool_calls: turn.tool_call.as_ref().map(|call| {
                vec![WireToolCallRef {
                    id: &call.id,
                    kind: "function",
                    function: WireFunctionRef { name: &call.name, arguments: &call.arguments },
                }]
            }),
            tool_call_id: turn.tool_call_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolCallRef<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionRef<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionRef<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef<'a>,
}

impl<'a> WireTool<'a> {
    fn from_schema(schema: &'a ToolSchema) -> Self {
        Self {
            kind: "function",
            function: WireFunctionDef {
                name: &schema.name,
                description: &schema.description,
                parameters: &schema.parameters,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    error!(%status, %message, "LLM request returned HTTP error");
    Err(ProviderError::Request(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, extract::State, http::HeaderMap, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    use crate::test_support::spawn_router;

    fn provider(url: String) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(url, "gpt-4".into(), 0.3, 5, Some("sk-test".into())).unwrap()
    }

    fn search_tool() -> ToolSchema {
        ToolSchema {
            name: "search_links".into(),
            description: "search".into(),
            parameters: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        }
    }

    #[derive(Clone, Default)]
    struct Captured {
        body: Arc<Mutex<Option<Value>>>,
        auth: Arc<Mutex<Option<String>>>,
    }

    async fn capture(State(c): State<Captured>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
        *c.auth.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let reply = if body["tools"].is_array() {
            json!({"choices": [{"message": {"content": null, "tool_calls": [
                {"id": "call_1", "type": "function",
                 "function": {"name": "search_links", "arguments": "{\"query\":\"итмо\"}"}},
                {"id": "call_2", "type": "function",
                 "function": {"name": "classify_relevance", "arguments": "{}"}}
            ]}}]})
        } else {
            json!({"choices": [{"message": {"content": "  hello  "}}],
                   "usage": {"prompt_tokens": 12, "completion_tokens": 3}})
        };
        *c.body.lock().unwrap() = Some(body);
        Json(reply)
    }

    async fn start_capture() -> (String, Captured) {
        let captured = Captured::default();
        let router = Router::new()
            .route("/v1/chat/completions", post(capture))
            .with_state(captured.clone());
        let addr = spawn_router(router).await;
        (format!("http://{addr}/v1/chat/completions"), captured)
    }

    #[tokio::test]
    async fn parses_text_reply_and_usage() {
        let (url, captured) = start_capture().await;
        let reply = provider(url).chat(&[Turn::system("sys"), Turn::user("hi")], &[]).await.unwrap();
        assert_eq!(reply.reply, AssistantReply::Text(Some("hello".into())));
        assert_eq!(reply.usage, Some(LlmUsage { input_tokens: 12, output_tokens: 3 }));

        let body = captured.body.lock().unwrap().clone().unwrap();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(captured.auth.lock().unwrap().as_deref(), Some("Bearer sk-test"));
    }

    #[tokio::test]
    async fn takes_first_tool_call_only() {
        let (url, captured) = start_capture().await;
        let reply = provider(url).chat(&[Turn::user("q")], &[search_tool()]).await.unwrap();
        match reply.reply {
            AssistantReply::ToolCall(call) => {
                assert_eq!(call.id, "call_1");
                assert_eq!(call.name, "search_links");
                assert_eq!(call.arguments, "{\"query\":\"итмо\"}");
            }
            other => panic!("expected tool call, got {other:?}"),
        }
        let body = captured.body.lock().unwrap().clone().unwrap();
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["parallel_tool_calls"], false);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "search_links");
    }

    #[test]
    fn tool_turns_serialize_in_openai_shape() {
        let call = ToolCall { id: "call_9".into(), name: "search_links".into(), arguments: "{}".into() };
        let call_turn = Turn::tool_call(call);
        let result_turn = Turn::tool_result("call_9", "{\"links\":[]}");

        let v = serde_json::to_value(WireMessage::from_turn(&call_turn)).unwrap();
        assert_eq!(v["role"], "assistant");
        assert!(v["content"].is_null());
        assert_eq!(v["tool_calls"][0]["id"], "call_9");
        assert_eq!(v["tool_calls"][0]["type"], "function");
        assert_eq!(v["tool_calls"][0]["function"]["name"], "search_links");

        let v = serde_json::to_value(WireMessage::from_turn(&result_turn)).unwrap();
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "call_9");
        assert_eq!(v["content"], "{\"links\":[]}");
        assert!(v.get("tool_calls").is_none());
    }

    #[test]
    fn gpt5_omits_temperature() {
        let p = OpenAiCompatibleProvider::new("http://x".into(), "gpt-5-mini".into(), 0.3, 5, None).unwrap();
        let turns = [Turn::user("q")];
        assert!(p.build_request(&turns, &[]).temperature.is_none());
    }

    #[tokio::test]
    async fn http_error_maps_to_request_error() {
        async fn fail() -> (StatusCode, Json<Value>) {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"message": "bad key", "code": "invalid_api_key"}})),
            )
        }
        let addr = spawn_router(Router::new().route("/v1/chat/completions", post(fail))).await;
        let err = provider(format!("http://{addr}/v1/chat/completions"))
            .chat(&[Turn::user("q")], &[])
            .await
            .unwrap_err();
        match err {
            ProviderError::Request(msg) => {
                assert!(msg.contains("401"));
                assert!(msg.contains("invalid_api_key"));
                assert!(msg.contains("bad key"));
            }
            other => panic!("expected request error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_body_maps_to_parse_error() {
        async fn garbage() -> &'static str {
            "not json"
        }
        let addr = spawn_router(Router::new().route("/v1/chat/completions", post(garbage))).await;
        let err = provider(format!("http://{addr}/v1/chat/completions"))
            .chat(&[Turn::user("q")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }
}
