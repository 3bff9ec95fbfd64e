// src/enrichment/search.rs - Website candidate search with bounded retries

use crate::error::{ResolveError, ResolveResult};
use crate::models::core::SearchHit;
use async_trait::async_trait;
use log::{debug, warn};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Query form used for website discovery.
pub fn search_query(representative_name: &str) -> String {
    format!("{} official site", representative_name)
}

/// External search capability behind the enrichment pipeline.
///
/// Zero hits is a valid, non-error outcome: it represents "no evidence
/// found" and maps to the `no_candidate` status downstream. Implementations
/// report transient failures (network, timeout, bad upstream responses) as
/// `ResolveError::TransientEnrichment` so the retry policy can apply.
#[async_trait]
pub trait CandidateSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> ResolveResult<Vec<SearchHit>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

/// HTTP-backed search against a SearXNG-compatible JSON endpoint.
pub struct HttpSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSearch {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> ResolveResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                ResolveError::Configuration(format!("failed to build HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl CandidateSearch for HttpSearch {
    async fn search(&self, query: &str, max_results: usize) -> ResolveResult<Vec<SearchHit>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .map_err(|e| {
                ResolveError::TransientEnrichment(format!("search request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(ResolveError::TransientEnrichment(format!(
                "search returned HTTP {}",
                response.status()
            )));
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            ResolveError::TransientEnrichment(format!("malformed search response: {}", e))
        })?;

        let hits: Vec<SearchHit> = body
            .results
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                snippet: r.content,
            })
            .collect();
        debug!("Search: {} hits for query '{}'", hits.len(), query);
        Ok(hits)
    }
}

/// Retry wrapper with exponential backoff and jitter. A timeout is a
/// transient failure, retried up to `retries` additional attempts; only the
/// exhausted error escapes, and the orchestrator downgrades it to a
/// per-cluster `error` status rather than aborting the batch.
///
/// Returns the hits along with the number of retries consumed.
pub async fn search_with_retries(
    search: &dyn CandidateSearch,
    query: &str,
    max_results: usize,
    retries: u32,
    backoff_base_ms: u64,
) -> ResolveResult<(Vec<SearchHit>, u32)> {
    let mut attempt: u32 = 0;
    loop {
        match search.search(query, max_results).await {
            Ok(hits) => return Ok((hits, attempt)),
            Err(ResolveError::TransientEnrichment(msg)) if attempt < retries => {
                attempt += 1;
                let exponential = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(16));
                let jitter = rand::thread_rng().gen_range(0..=backoff_base_ms.max(2) / 2);
                warn!(
                    "Search: transient failure for '{}' (attempt {}/{}): {}. Backing off {}ms",
                    query,
                    attempt,
                    retries,
                    msg,
                    exponential + jitter
                );
                tokio::time::sleep(Duration::from_millis(exponential + jitter)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Homepage text fetch for scoring evidence.
///
/// Auxiliary only: a failed fetch is `None`, never an error, so a dead or
/// slow candidate page costs that candidate its page evidence without
/// touching the cluster's status.
#[async_trait]
pub trait PageFetch: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Option<String>;
}

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static META_DESCRIPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta[^>]*name\s*=\s*["']description["'][^>]*content\s*=\s*["']([^"']*)["']"#)
        .unwrap()
});
static H1_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

const MAX_PAGE_TEXT_CHARS: usize = 500;

/// Pull the identity-bearing parts of a homepage: title, meta description,
/// and leading h1 headings, with markup stripped and whitespace collapsed.
fn extract_page_text(html: &str) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(captures) = TITLE_RE.captures(html) {
        parts.push(captures[1].to_string());
    }
    if let Some(captures) = META_DESCRIPTION_RE.captures(html) {
        parts.push(captures[1].to_string());
    }
    for captures in H1_RE.captures_iter(html).take(3) {
        parts.push(captures[1].to_string());
    }
    let joined = parts.join(" ");
    let stripped = TAG_RE.replace_all(&joined, " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.chars().take(MAX_PAGE_TEXT_CHARS).collect())
    }
}

/// HTTP homepage fetcher with a per-call timeout.
pub struct HttpPageFetch {
    client: reqwest::Client,
}

impl HttpPageFetch {
    pub fn new(timeout_secs: u64) -> ResolveResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                ResolveError::Configuration(format!("failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetch for HttpPageFetch {
    async fn fetch_text(&self, url: &str) -> Option<String> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Page fetch: request to '{}' failed: {}", url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            debug!("Page fetch: '{}' returned HTTP {}", url, response.status());
            return None;
        }
        let body = response.text().await.ok()?;
        extract_page_text(&body)
    }
}

/// In-memory page fetcher keyed by URL, for tests.
#[derive(Debug, Default)]
pub struct StaticPageFetch {
    pages: HashMap<String, String>,
}

impl StaticPageFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(url.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl PageFetch for StaticPageFetch {
    async fn fetch_text(&self, url: &str) -> Option<String> {
        self.pages.get(url).cloned()
    }
}

/// Deterministic in-memory search, keyed by query. Used by tests and dry
/// runs in place of the network.
#[derive(Debug, Default)]
pub struct StaticSearch {
    hits: HashMap<String, Vec<SearchHit>>,
    failing: HashSet<String>,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register hits for the query derived from a representative name.
    pub fn with_hits(mut self, representative_name: &str, hits: Vec<SearchHit>) -> Self {
        self.hits.insert(search_query(representative_name), hits);
        self
    }

    /// Make the query for a representative name fail transiently, always.
    pub fn with_failure(mut self, representative_name: &str) -> Self {
        self.failing.insert(search_query(representative_name));
        self
    }
}

#[async_trait]
impl CandidateSearch for StaticSearch {
    async fn search(&self, query: &str, max_results: usize) -> ResolveResult<Vec<SearchHit>> {
        if self.failing.contains(query) {
            return Err(ResolveError::TransientEnrichment(format!(
                "simulated failure for '{}'",
                query
            )));
        }
        Ok(self
            .hits
            .get(query)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(max_results)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then succeeds.
    struct FlakySearch {
        calls: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl CandidateSearch for FlakySearch {
        async fn search(&self, _query: &str, _max: usize) -> ResolveResult<Vec<SearchHit>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ResolveError::TransientEnrichment("flaky".to_string()))
            } else {
                Ok(vec![SearchHit {
                    url: "https://example.com".to_string(),
                    title: "Example".to_string(),
                    snippet: String::new(),
                }])
            }
        }
    }

    #[tokio::test]
    async fn retries_recover_from_transient_failures() {
        let search = FlakySearch {
            calls: AtomicU32::new(0),
            failures: 2,
        };
        let (hits, retries) = search_with_retries(&search, "acme official site", 5, 3, 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(retries, 2);
        assert_eq!(search.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let search = FlakySearch {
            calls: AtomicU32::new(0),
            failures: u32::MAX,
        };
        let result = search_with_retries(&search, "acme official site", 5, 2, 1).await;
        assert!(matches!(
            result,
            Err(ResolveError::TransientEnrichment(_))
        ));
        // Initial attempt plus two retries.
        assert_eq!(search.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn static_search_returns_registered_hits() {
        let search = StaticSearch::new().with_hits(
            "Acme",
            vec![SearchHit {
                url: "https://acme.com".to_string(),
                title: "Acme".to_string(),
                snippet: String::new(),
            }],
        );
        let hits = search.search(&search_query("Acme"), 5).await.unwrap();
        assert_eq!(hits.len(), 1);

        // Unknown query: zero hits, not an error.
        let none = search.search(&search_query("Globex"), 5).await.unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn page_text_extraction_keeps_identity_parts() {
        let html = r#"
            <html><head>
            <title>Acme Widgets | Home</title>
            <meta name="description" content="Acme Widgets makes industrial widgets">
            </head><body>
            <h1>Welcome to <b>Acme</b></h1>
            <p>Lots of body copy that should not be included.</p>
            </body></html>
        "#;
        let text = extract_page_text(html).unwrap();
        assert!(text.contains("Acme Widgets | Home"));
        assert!(text.contains("industrial widgets"));
        assert!(text.contains("Welcome to Acme"));
        assert!(!text.contains("body copy"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn page_text_extraction_yields_none_for_bare_markup() {
        assert_eq!(extract_page_text("<html><body></body></html>"), None);
        assert_eq!(extract_page_text(""), None);
    }

    #[tokio::test]
    async fn static_page_fetch_returns_registered_text() {
        let fetch = StaticPageFetch::new().with_page("https://acme.com", "Acme Widgets");
        assert_eq!(
            fetch.fetch_text("https://acme.com").await.as_deref(),
            Some("Acme Widgets")
        );
        assert_eq!(fetch.fetch_text("https://other.com").await, None);
    }

    #[tokio::test]
    async fn max_results_truncates() {
        let many: Vec<SearchHit> = (0..10)
            .map(|i| SearchHit {
                url: format!("https://site{}.com", i),
                title: String::new(),
                snippet: String::new(),
            })
            .collect();
        let search = StaticSearch::new().with_hits("Acme", many);
        let hits = search.search(&search_query("Acme"), 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }
}
