//! Shared fixtures: local mock LLM and search servers, and a router wired
//! to them through the real provider and search client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::{Json, Router, extract::State, routing::post};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use itmo_agent::agent::Agent;
use itmo_agent::config::{self, Config, EnvOverrides};

pub async fn spawn_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Every chat-completion body the mock LLM received, in order.
#[derive(Clone, Default)]
pub struct LlmLog(pub Arc<Mutex<Vec<Value>>>);

impl LlmLog {
    pub fn bodies(&self) -> Vec<Value> {
        self.0.lock().unwrap().clone()
    }
}

/// Scripted OpenAI-compatible endpoint.
///
/// Requests without tools are classifier calls: anything mentioning "борщ"
/// is judged off-topic. Orchestrator calls get `classify_relevance` on the
/// user turn, then `search_links`, then a final answer, keyed on how many
/// tool results the conversation already holds.
async fn chat_completions(State(log): State<LlmLog>, Json(body): Json<Value>) -> Json<Value> {
    log.0.lock().unwrap().push(body.clone());

    let messages = body["messages"].as_array().cloned().unwrap_or_default();
    if body.get("tools").is_none() {
        let user = messages.last().and_then(|m| m["content"].as_str()).unwrap_or_default();
        let relevant = !user.contains("борщ");
        let verdict = json!({"is_itmo_relevant": relevant, "reason": "mock"}).to_string();
        return Json(text_reply(&verdict));
    }

    let user = messages.get(1).and_then(|m| m["content"].as_str()).unwrap_or_default();
    let tool_results = messages.iter().filter(|m| m["role"] == "tool").count();
    Json(match tool_results {
        0 => tool_reply("call_1", "classify_relevance", &json!({"query": user}).to_string()),
        1 => tool_reply("call_2", "search_links", r#"{"query":"главный кампус ИТМО","max_results":3}"#),
        _ => text_reply("Главный кампус находится в Санкт-Петербурге, что соответствует варианту 2. Подробнее: https://itmo.ru/ru/"),
    })
}

fn text_reply(content: &str) -> Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5},
    })
}

fn tool_reply(id: &str, name: &str, arguments: &str) -> Value {
    json!({
        "choices": [{"message": {
            "role": "assistant",
            "content": null,
            "tool_calls": [{"id": id, "type": "function", "function": {"name": name, "arguments": arguments}}],
        }}],
    })
}

async fn serper() -> Json<Value> {
    Json(json!({"organic": [
        {"title": "Кампус", "link": "https://spb.example.com/campus", "snippet": "Кампусы вузов"},
        {"title": "Контакты ИТМО", "link": "https://itmo.ru/ru/contacts", "snippet": "Кронверкский пр., 49"},
        {"title": "Новости ИТМО", "link": "https://news.itmo.ru/ru/campus", "snippet": "Новый кампус"},
        {"title": "Форум", "link": "https://forum.example.org/t/1", "snippet": "Обсуждение"},
    ]}))
}

pub struct Fixture {
    pub config: Config,
    pub llm_log: LlmLog,
}

/// Start both mocks and load `config/default.toml` pointed at them.
pub async fn fixture() -> Fixture {
    let llm_log = LlmLog::default();
    let llm = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(llm_log.clone());
    let llm_addr = spawn_router(llm).await;
    let search_addr = spawn_router(Router::new().route("/search", post(serper))).await;

    let overrides = EnvOverrides {
        llm_api_key: Some("sk-test".into()),
        search_api_key: Some("serper-test".into()),
        ..EnvOverrides::default()
    };
    let mut config = config::load_from(Path::new("config/default.toml"), &overrides).unwrap();
    config.server.log_file = None;
    config.llm.openai.api_base_url = format!("http://{llm_addr}/v1/chat/completions");
    config.llm.openai.timeout_seconds = 5;
    config.search.api_url = format!("http://{search_addr}/search");
    config.search.timeout_seconds = 5;

    Fixture { config, llm_log }
}

pub fn agent(config: &Config) -> Arc<Agent> {
    Arc::new(Agent::from_config(config).unwrap())
}
