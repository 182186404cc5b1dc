//! Detecting, validating and repairing hyperlinks in model output and
//! search results.

use std::sync::LazyLock;

use regex::Regex;

/// Most sources a response may carry.
pub const MAX_SOURCES: usize = 3;

/// Characters left dangling at the end of links embedded in markdown or JSON.
const TRAILING_JUNK: &[char] = &['"', '\'', ',', ')'];

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"',)]+"#).expect("valid regex"));

static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

/// All URL-shaped substrings of `text`, in order of appearance.
pub fn find(text: &str) -> Vec<String> {
    URL.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

pub fn has_http_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Keep only strings starting with an http scheme.
pub fn validate<I>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    urls.into_iter().filter(|u| has_http_scheme(u)).collect()
}

/// Strip surrounding whitespace and trailing quote, comma or `)` characters.
pub fn repair<I>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    urls.into_iter()
        .map(|u| u.trim().trim_end_matches(TRAILING_JUNK).to_string())
        .collect()
}

/// Remove every URL from `text` so links only surface through `sources`.
pub fn strip_from_text(text: &str) -> String {
    let stripped = URL.replace_all(text, "");
    SPACE_RUN.replace_all(&stripped, " ").trim().to_string()
}

/// repair → validate → truncate to [`MAX_SOURCES`].
pub fn clean_sources<I>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut cleaned = validate(repair(urls));
    cleaned.truncate(MAX_SOURCES);
    cleaned
}
