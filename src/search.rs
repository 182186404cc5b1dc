//! Web search through a Serper.dev-compatible API.
//!
//! The client never returns an error to its caller: a missing key, a
//! transport failure, a non-2xx status or an unreadable body all become
//! [`SearchOutcome::Error`], which the agent treats as "no links found".

use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::error::AppError;

/// Bounds on the caller-requested result count.
pub const MIN_RESULTS: usize = 1;
pub const MAX_RESULTS: usize = 10;
/// Raw results requested per wanted result, to leave room for re-ranking.
const OVERFETCH_FACTOR: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub priority: i32,
}

/// Result of one search, serialized to the model as `{"links": [...]}` or
/// `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOutcome {
    Links(Vec<SearchResultItem>),
    Error(String),
}

#[cfg(test)]
impl SearchOutcome {
    /// Links of a successful search; empty for an error.
    pub fn links(&self) -> &[SearchResultItem] {
        match self {
            SearchOutcome::Links(links) => links,
            SearchOutcome::Error(_) => &[],
        }
    }
}

// ── Ranking ───────────────────────────────────────────────────────────────────

/// Query expansion and result scoring for the target organisation.
#[derive(Debug, Clone)]
pub struct Ranking {
    /// Lower-case keyword, e.g. `итмо`.
    pub keyword: String,
    pub qualifier: String,
    pub primary_domain: String,
    pub trusted_subdomain: String,
}

impl Ranking {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            keyword: config.keyword.clone(),
            qualifier: config.qualifier.clone(),
            primary_domain: config.primary_domain.clone(),
            trusted_subdomain: config.trusted_subdomain.clone(),
        }
    }

    /// Append the qualifier unless the query already mentions the keyword.
    pub fn expand_query(&self, query: &str) -> String {
        if query.to_lowercase().contains(&self.keyword) {
            query.to_string()
        } else {
            format!("{} {}", query.trim_end(), self.qualifier)
        }
    }

    /// +2 on the primary domain, +1 more on the trusted subdomain,
    /// +1 when the keyword appears in title or snippet.
    pub fn priority(&self, title: &str, link: &str, snippet: &str) -> i32 {
        let mut priority = 0;
        if let Some(host) = host_of(link) {
            if host_matches(&host, &self.primary_domain) {
                priority += 2;
                if host_matches(&host, &self.trusted_subdomain) {
                    priority += 1;
                }
            }
        }
        if title.to_lowercase().contains(&self.keyword) || snippet.to_lowercase().contains(&self.keyword) {
            priority += 1;
        }
        priority
    }

    /// Score, sort by (priority desc, snippet length desc) and truncate.
    /// The sort is stable, so full ties keep provider order.
    pub fn rank(&self, raw: Vec<OrganicResult>, max_results: usize) -> Vec<SearchResultItem> {
        let mut items: Vec<SearchResultItem> = raw
            .into_iter()
            .map(|r| SearchResultItem {
                priority: self.priority(&r.title, &r.link, &r.snippet),
                title: r.title,
                link: r.link,
                snippet: r.snippet,
            })
            .collect();
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.snippet.chars().count().cmp(&a.snippet.chars().count()))
        });
        items.truncate(max_results);
        items
    }
}

fn host_of(link: &str) -> Option<String> {
    Url::parse(link.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
}

fn host_matches(host: &str, domain: &str) -> bool {
    !domain.is_empty()
        && (host == domain || host.strip_suffix(domain).is_some_and(|prefix| prefix.ends_with('.')))
}

// ── Client ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SearchClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    ranking: Ranking,
    gl: String,
    hl: String,
    google_domain: String,
}

impl SearchClient {
    /// `api_key` comes from `SERPER_API_KEY`; `None` disables network search.
    pub fn new(config: &SearchConfig, api_key: Option<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build search HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            ranking: Ranking::from_config(config),
            gl: config.gl.clone(),
            hl: config.hl.clone(),
            google_domain: config.google_domain.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Search for `query` and return at most `max_results` ranked links.
    pub async fn search(&self, query: &str, max_results: usize) -> SearchOutcome {
        let Some(api_key) = &self.api_key else {
            warn!("search requested but SERPER_API_KEY is not set");
            return SearchOutcome::Error("SERPER_API_KEY не задан.".to_string());
        };

        let max_results = max_results.clamp(MIN_RESULTS, MAX_RESULTS);
        let expanded = self.ranking.expand_query(query);
        let request = SerperRequest {
            q: &expanded,
            num: max_results * OVERFETCH_FACTOR,
            gl: &self.gl,
            hl: &self.hl,
            google_domain: &self.google_domain,
        };

        info!(query = %expanded, max_results, "web search");

        match self.fetch(api_key, &request).await {
            Ok(organic) => {
                let fetched = organic.len();
                let links = self.ranking.rank(organic, max_results);
                debug!(fetched, kept = links.len(), "search results ranked");
                SearchOutcome::Links(links)
            }
            Err(message) => {
                warn!(error = %message, "web search failed");
                SearchOutcome::Error(message)
            }
        }
    }

    async fn fetch(&self, api_key: &str, request: &SerperRequest<'_>) -> Result<Vec<OrganicResult>, String> {
        let response = self
            .client
            .post(&self.api_url)
            .header("X-API-KEY", api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let response = response.error_for_status().map_err(|e| e.to_string())?;
        let body: SerperResponse = response
            .json()
            .await
            .map_err(|e| format!("failed to parse search response: {e}"))?;

        Ok(body.organic.unwrap_or_default())
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
    gl: &'a str,
    hl: &'a str,
    #[serde(rename = "googleDomain")]
    google_domain: &'a str,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Option<Vec<OrganicResult>>,
}

/// One raw organic result as returned by the provider.
///
/// Missing and `null` fields both read as empty strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganicResult {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub link: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub snippet: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
