//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the path given with `-f`), then applies
//! `ITMO_AGENT_BIND`, `ITMO_AGENT_LOG_LEVEL` and `LLM_BASE_URL` / `PROXY_URL`
//! env overrides. Secrets (`LLM_API_KEY`, `SERPER_API_KEY`) are only ever
//! read from the environment, never from TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// HTTP listener and logging settings (`[server]`).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind the HTTP listener to.
    pub bind: String,
    pub log_level: String,
    /// Append-only log file. `None` logs to stderr only.
    pub log_file: Option<PathBuf>,
}

/// OpenAI / OpenAI-compatible provider configuration.
/// Populated from `[llm.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature (ignored for models that forbid it).
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"` or `"openai"`).
    /// Maps to `default` in `[llm]` TOML.
    pub provider: String,
    /// Attempts per LLM call, including the first one.
    pub max_attempts: u32,
    pub openai: OpenAiConfig,
}

/// Orchestrator settings (`[agent]`).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Upper bound on tool-call round trips per request.
    pub max_tool_rounds: usize,
    /// Directory holding `agent.md` and `classifier.md`.
    pub prompts_dir: PathBuf,
}

/// Web-search provider and ranking settings (`[search]`).
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub api_url: String,
    pub timeout_seconds: u64,
    /// Lower-case keyword whose presence marks a query or result as on-topic.
    pub keyword: String,
    /// Phrase appended to queries that lack `keyword`.
    pub qualifier: String,
    pub primary_domain: String,
    pub trusted_subdomain: String,
    pub gl: String,
    pub hl: String,
    pub google_domain: String,
}

/// Fully-resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub search: SearchConfig,
    /// From `LLM_API_KEY` (or `OPENAI_API_KEY`) env, required by the openai provider.
    pub llm_api_key: Option<String>,
    /// From `SERPER_API_KEY` env. `None` degrades search to an error result.
    pub search_api_key: Option<String>,
}

/// Values normally taken from the process environment.
/// Tests build this directly instead of mutating env vars.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub bind: Option<String>,
    pub log_level: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub search_api_key: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            bind: non_empty_var("ITMO_AGENT_BIND"),
            log_level: non_empty_var("ITMO_AGENT_LOG_LEVEL"),
            llm_base_url: non_empty_var("LLM_BASE_URL").or_else(|| non_empty_var("PROXY_URL")),
            llm_api_key: non_empty_var("LLM_API_KEY").or_else(|| non_empty_var("OPENAI_API_KEY")),
            search_api_key: non_empty_var("SERPER_API_KEY"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    agent: RawAgent,
    #[serde(default)]
    search: RawSearch,
}

#[derive(Deserialize)]
struct RawServer {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_log_file")]
    log_file: Option<String>,
}

impl Default for RawServer {
    fn default() -> Self {
        Self { bind: default_bind(), log_level: default_log_level(), log_file: default_log_file() }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            max_attempts: default_max_attempts(),
            openai: RawOpenAiConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_temperature")]
    temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawAgent {
    #[serde(default = "default_max_tool_rounds")]
    max_tool_rounds: usize,
    #[serde(default = "default_prompts_dir")]
    prompts_dir: String,
}

impl Default for RawAgent {
    fn default() -> Self {
        Self { max_tool_rounds: default_max_tool_rounds(), prompts_dir: default_prompts_dir() }
    }
}

#[derive(Deserialize)]
struct RawSearch {
    #[serde(default = "default_search_api_url")]
    api_url: String,
    #[serde(default = "default_search_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default = "default_keyword")]
    keyword: String,
    #[serde(default = "default_qualifier")]
    qualifier: String,
    #[serde(default = "default_primary_domain")]
    primary_domain: String,
    #[serde(default = "default_trusted_subdomain")]
    trusted_subdomain: String,
    #[serde(default = "default_locale")]
    gl: String,
    #[serde(default = "default_locale")]
    hl: String,
    #[serde(default = "default_google_domain")]
    google_domain: String,
}

impl Default for RawSearch {
    fn default() -> Self {
        Self {
            api_url: default_search_api_url(),
            timeout_seconds: default_search_timeout_seconds(),
            keyword: default_keyword(),
            qualifier: default_qualifier(),
            primary_domain: default_primary_domain(),
            trusted_subdomain: default_trusted_subdomain(),
            gl: default_locale(),
            hl: default_locale(),
            google_domain: default_google_domain(),
        }
    }
}

fn default_bind() -> String { "0.0.0.0:8080".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_log_file() -> Option<String> { Some("logs/api.log".to_string()) }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_max_attempts() -> u32 { 3 }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-4".to_string() }
fn default_openai_temperature() -> f32 { 0.3 }
fn default_timeout_seconds() -> u64 { 60 }
fn default_max_tool_rounds() -> usize { 5 }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_search_api_url() -> String { "https://google.serper.dev/search".to_string() }
fn default_search_timeout_seconds() -> u64 { 15 }
fn default_keyword() -> String { "итмо".to_string() }
fn default_qualifier() -> String { "Университет ИТМО".to_string() }
fn default_primary_domain() -> String { "itmo.ru".to_string() }
fn default_trusted_subdomain() -> String { "news.itmo.ru".to_string() }
fn default_locale() -> String { "ru".to_string() }
fn default_google_domain() -> String { "google.ru".to_string() }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `config_path`, or `config/default.toml`, then apply env overrides.
///
/// A missing default file falls back to built-in defaults; a missing file that
/// was named explicitly is an error.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = EnvOverrides::from_env();
    match config_path {
        Some(path) => load_from(Path::new(path), &overrides),
        None => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                load_from(path, &overrides)
            } else {
                resolve(RawConfig::default(), &overrides)
            }
        }
    }
}

/// Internal loader; accepts an explicit path and overrides.
pub fn load_from(path: &Path, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    resolve(parsed, overrides)
}

fn resolve(parsed: RawConfig, overrides: &EnvOverrides) -> Result<Config, AppError> {
    if parsed.llm.max_attempts == 0 {
        return Err(AppError::Config("llm.max_attempts must be at least 1".into()));
    }
    if parsed.agent.max_tool_rounds == 0 {
        return Err(AppError::Config("agent.max_tool_rounds must be at least 1".into()));
    }

    let api_base_url = match overrides.llm_base_url.as_deref() {
        Some(base) => chat_completions_url(base),
        None => parsed.llm.openai.api_base_url,
    };

    Ok(Config {
        server: ServerConfig {
            bind: overrides.bind.clone().unwrap_or(parsed.server.bind),
            log_level: overrides.log_level.clone().unwrap_or(parsed.server.log_level),
            log_file: parsed
                .server
                .log_file
                .filter(|p| !p.is_empty())
                .map(|p| expand_home(&p)),
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            max_attempts: parsed.llm.max_attempts,
            openai: OpenAiConfig {
                api_base_url,
                model: parsed.llm.openai.model,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        agent: AgentConfig {
            max_tool_rounds: parsed.agent.max_tool_rounds,
            prompts_dir: expand_home(&parsed.agent.prompts_dir),
        },
        search: SearchConfig {
            api_url: parsed.search.api_url,
            timeout_seconds: parsed.search.timeout_seconds,
            keyword: parsed.search.keyword.to_lowercase(),
            qualifier: parsed.search.qualifier,
            primary_domain: parsed.search.primary_domain.to_lowercase(),
            trusted_subdomain: parsed.search.trusted_subdomain.to_lowercase(),
            gl: parsed.search.gl,
            hl: parsed.search.hl,
            google_domain: parsed.search.google_domain,
        },
        llm_api_key: overrides.llm_api_key.clone(),
        search_api_key: overrides.search_api_key.clone(),
    })
}

/// Turn a proxy base URL (`https://proxy/v1`) into a chat completions endpoint.
/// URLs already ending in `/chat/completions` are returned unchanged.
pub fn chat_completions_url(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

impl Config {
    /// Safe `Config` for tests: dummy LLM, no API keys, no log file.
    pub fn test_default() -> Self {
        let mut config = resolve(RawConfig::default(), &EnvOverrides::default())
            .unwrap_or_else(|e| panic!("built-in defaults must resolve: {e}"));
        config.server.bind = "127.0.0.1:0".into();
        config.server.log_file = None;
        config.llm.provider = "dummy".into();
        config.llm.openai.api_base_url = "http://localhost:0/v1/chat/completions".into();
        config.llm.openai.model = "test-model".into();
        config.llm.openai.timeout_seconds = 1;
        config.search.api_url = "http://localhost:0/search".into();
        config.search.timeout_seconds = 1;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[server]
bind = "127.0.0.1:9000"
log_level = "debug"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_basic_config() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &EnvOverrides::default()).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        assert_eq!(cfg.server.log_level, "debug");
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.max_attempts, 3);
        assert_eq!(cfg.agent.max_tool_rounds, 5);
        assert_eq!(cfg.search.primary_domain, "itmo.ru");
        assert_eq!(cfg.search.trusted_subdomain, "news.itmo.ru");
    }

    #[test]
    fn empty_file_uses_defaults() {
        let f = write_toml("");
        let cfg = load_from(f.path(), &EnvOverrides::default()).unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.server.log_file, Some(PathBuf::from("logs/api.log")));
        assert_eq!(cfg.llm.openai.model, "gpt-4");
        assert_eq!(cfg.search.keyword, "итмо");
        assert!(cfg.llm_api_key.is_none());
    }

    #[test]
    fn keyword_is_lowercased() {
        let f = write_toml("[search]\nkeyword = \"ИТМО\"\n");
        let cfg = load_from(f.path(), &EnvOverrides::default()).unwrap();
        assert_eq!(cfg.search.keyword, "итмо");
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), &EnvOverrides::default());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn invalid_toml_errors() {
        let f = write_toml("[server\nbind = 1");
        assert!(load_from(f.path(), &EnvOverrides::default()).is_err());
    }

    #[test]
    fn zero_attempts_rejected() {
        let f = write_toml("[llm]\nmax_attempts = 0\n");
        assert!(load_from(f.path(), &EnvOverrides::default()).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let f = write_toml(MINIMAL_TOML);
        let overrides = EnvOverrides {
            bind: Some("127.0.0.1:7000".into()),
            log_level: Some("trace".into()),
            llm_base_url: Some("https://proxy.example/v1/".into()),
            llm_api_key: Some("sk-test".into()),
            search_api_key: Some("serper".into()),
        };
        let cfg = load_from(f.path(), &overrides).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:7000");
        assert_eq!(cfg.server.log_level, "trace");
        assert_eq!(cfg.llm.openai.api_base_url, "https://proxy.example/v1/chat/completions");
        assert_eq!(cfg.llm_api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.search_api_key.as_deref(), Some("serper"));
    }

    #[test]
    fn chat_completions_url_keeps_full_endpoint() {
        assert_eq!(
            chat_completions_url("http://localhost:8081/v1/chat/completions"),
            "http://localhost:8081/v1/chat/completions"
        );
        assert_eq!(chat_completions_url("http://localhost:8081/v1"), "http://localhost:8081/v1/chat/completions");
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/logs");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with("logs"));
    }

    #[test]
    fn relative_path_unchanged() {
        assert_eq!(expand_home("relative/path"), PathBuf::from("relative/path"));
    }

    #[test]
    fn test_default_is_offline() {
        let cfg = Config::test_default();
        assert_eq!(cfg.llm.provider, "dummy");
        assert!(cfg.server.log_file.is_none());
        assert!(cfg.search_api_key.is_none());
    }
}
