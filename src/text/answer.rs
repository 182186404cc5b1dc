//! Multiple-choice answer extraction from free-text reasoning.
//!
//! Best effort: a model that phrases its choice differently simply yields
//! `None`.

use std::sync::LazyLock;

use regex::Regex;

/// Highest option number the service recognises.
pub const MAX_OPTION: u32 = 10;

static NOISE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"["'«»“”,*]+"#).expect("valid regex"));

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// "вариант", any inflection ("варианту", "варианта"), optional "№", then a number.
static VARIANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"вариант[а-яё]*\s*№?\s*([0-9]+)").expect("valid regex"));

/// A line that starts with an option number 1–10 followed by `.` or `)`.
static OPTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:10|[1-9])[ \t]*[.)](?:[ \t]|$)").expect("valid regex"));

/// `true` when the raw (uncleaned) query enumerates numbered options.
///
/// Must run before sanitizing: cleaning collapses the newlines this relies on.
pub fn has_enumerated_options(raw_query: &str) -> bool {
    OPTION_LINE.is_match(raw_query)
}

/// Extract the selected option from `text`.
///
/// Returns `None` immediately when `has_options` is false. Only the first
/// "вариант N" occurrence is considered; N outside `1..=10` yields `None`.
pub fn extract_answer(text: &str, has_options: bool) -> Option<u32> {
    if !has_options {
        return None;
    }
    let lowered = text.to_lowercase();
    let without_noise = NOISE.replace_all(&lowered, "");
    let normalized = WHITESPACE_RUN.replace_all(&without_noise, " ");

    let number = VARIANT.captures(&normalized)?.get(1)?.as_str();
    number.parse::<u32>().ok().filter(|n| (1..=MAX_OPTION).contains(n))
}
