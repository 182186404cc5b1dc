//! ITMO University question-answering service.
//!
//! A single HTTP endpoint hands each question to an LLM that may call a
//! relevance classifier and a web-search tool before answering; the reply is
//! post-processed into `{id, answer, reasoning, sources}`.

pub mod agent;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod logger;
pub mod search;
pub mod text;
