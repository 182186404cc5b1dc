//! System prompts for the orchestrator and the relevance classifier.
//!
//! Prompts ship compiled in from `config/prompts/`. A file with the same
//! name under the configured prompts directory replaces the built-in text
//! at startup, so wording can change without a rebuild.
//!
//! Variable substitution uses `{{key}}` syntax and is applied once at
//! [`build()`](PromptBuilder::build) time, after all layers are joined.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const AGENT_PROMPT_FILE: &str = "agent.md";
pub const CLASSIFIER_PROMPT_FILE: &str = "classifier.md";

const BUILTIN_AGENT_PROMPT: &str = include_str!("../../config/prompts/agent.md");
const BUILTIN_CLASSIFIER_PROMPT: &str = include_str!("../../config/prompts/classifier.md");

const SEPARATOR: &str = "\n\n";

/// Fluent builder that assembles a prompt from template files and fragments.
pub struct PromptBuilder {
    prompts_dir: PathBuf,
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    /// Create a builder rooted at `prompts_dir` (e.g. `"config/prompts"`).
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self { prompts_dir: prompts_dir.into(), parts: Vec::new(), vars: HashMap::new() }
    }

    /// Append a layer loaded from `filename`, or `fallback` when the file
    /// is missing or empty.
    pub fn layer_or(self, filename: &str, fallback: &str) -> Self {
        let path = self.prompts_dir.join(filename);
        let text = match fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) | Err(_) => {
                tracing::debug!("prompt: '{}' not found, using built-in", path.display());
                fallback.to_string()
            }
        };
        self.append(text)
    }

    /// Directly append a text fragment.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        let s = text.into();
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }

    /// Register a `{{key}}` → `value` substitution applied at build time.
    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Join all layers and substitute variables.
    pub fn build(self) -> String {
        let mut out = self.parts.join(SEPARATOR);
        for (k, v) in &self.vars {
            out = out.replace(&format!("{{{{{k}}}}}"), v);
        }
        out
    }
}

/// The two system prompts the agent needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Prompts {
    pub agent: String,
    pub classifier: String,
}

impl Prompts {
    /// Load prompts from `prompts_dir`, substituting `{{year}}` with `year`.
    pub fn load(prompts_dir: &Path, year: i32) -> Self {
        let agent = PromptBuilder::new(prompts_dir)
            .layer_or(AGENT_PROMPT_FILE, BUILTIN_AGENT_PROMPT)
            .var("year", year.to_string())
            .build();
        let classifier = PromptBuilder::new(prompts_dir)
            .layer_or(CLASSIFIER_PROMPT_FILE, BUILTIN_CLASSIFIER_PROMPT)
            .build();
        Self { agent, classifier }
    }

    /// Built-in prompts only, ignoring anything on disk.
    pub fn builtin(year: i32) -> Self {
        let agent = PromptBuilder::new("")
            .append(BUILTIN_AGENT_PROMPT)
            .var("year", year.to_string())
            .build();
        let classifier = PromptBuilder::new("").append(BUILTIN_CLASSIFIER_PROMPT).build();
        Self { agent, classifier }
    }
}
