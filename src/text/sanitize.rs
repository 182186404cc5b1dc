//! Query sanitizing before the text reaches the model.

use std::sync::LazyLock;

use regex::Regex;

/// Instruction-override phrases removed from user input, matched case-insensitively.
static INJECTION_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)ignore all instructions|forget all instructions|ignore previous instructions|disregard all instructions|system message",
    )
    .expect("valid regex")
});

/// Anything outside word characters, whitespace and `.,?!`.
static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.,?!]").expect("valid regex"));

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Delete every instruction-override phrase from `text`.
pub fn strip_injections(text: &str) -> String {
    INJECTION_PHRASES.replace_all(text, "").into_owned()
}

/// Drop disallowed characters, collapse whitespace runs to one space, trim.
pub fn clean_query(text: &str) -> String {
    let kept = DISALLOWED_CHARS.replace_all(text, "");
    WHITESPACE_RUN.replace_all(&kept, " ").trim().to_string()
}

/// Full sanitizer: [`strip_injections`] then [`clean_query`], repeated until
/// the text stops changing.
///
/// Repeating matters because a removal can splice a new phrase together
/// (`"ignore all ignore all instructionsinstructions"`). The fixpoint makes
/// `sanitize(sanitize(x)) == sanitize(x)`. Every pass either shortens the
/// text or only normalises whitespace, so the loop terminates.
pub fn sanitize(text: &str) -> String {
    let mut current = clean_query(&strip_injections(text));
    loop {
        let next = clean_query(&strip_injections(&current));
        if next == current {
            return current;
        }
        current = next;
    }
}
