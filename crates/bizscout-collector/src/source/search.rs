//! Search-engine result pages as a candidate source.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bizscout_core::SourceKind;
use futures::stream::{self, StreamExt};

use super::{CandidatePayload, PageState, RawCandidate, SourceProvider};
use crate::error::{FetchError, SourceError};
use crate::extract::{PageHandle, Platform};
use crate::fetch::PageFetcher;
use crate::identity::IdentityController;
use crate::urls::{extract_domain, unwrap_redirect};

const RESULTS_PER_PAGE: u32 = 10;

/// Engine-internal or non-merchant destinations.
const BLOCKED_LINK_FRAGMENTS: [&str; 5] = [
    "webcache.googleusercontent",
    "policies.google",
    "accounts.google",
    "support.google",
    "youtube.com/results",
];

/// Paths that mark product or category pages rather than a site's landing page.
const PRODUCT_PATH_PATTERNS: [&str; 11] = [
    "/product/",
    "/products/",
    "/item/",
    "/items/",
    "/p/",
    "/collection/",
    "/collections/",
    "/category/",
    "/categories/",
    "/shop/",
    "/store/",
];

/// Parameters of a web search run.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Results endpoint, e.g. `https://www.google.com/search`.
    pub engine_url: String,
    pub query: String,
    pub location: String,
    pub niche: String,
    /// Bias queries toward this storefront platform.
    pub platform: Option<Platform>,
    /// Result pages fetched concurrently per load.
    pub pages_per_load: u32,
    /// No result page past this index is requested.
    pub max_pages: u32,
    pub request_timeout: Duration,
}

impl SearchConfig {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            engine_url: "https://www.google.com/search".to_owned(),
            query: query.into(),
            location: String::new(),
            niche: String::new(),
            platform: None,
            pages_per_load: 3,
            max_pages: 9,
            request_timeout: Duration::from_secs(20),
        }
    }
}

/// `"<query> <location> <niche>"` plus platform hint terms when filtering by platform.
#[must_use]
pub fn build_search_query(query: &str, location: &str, niche: &str, platform: Option<Platform>) -> String {
    let mut parts: Vec<&str> = [query, location, niche]
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if let Some(platform) = platform {
        parts.extend(platform.query_hints());
    }
    parts.join(" ")
}

#[derive(Debug, Default)]
struct SearchState {
    links: Vec<String>,
    seen: HashSet<String>,
    next_page: u32,
}

/// Fetches result pages a few at a time and yields the distinct site links
/// found on them.
pub struct WebSearchSource {
    config: SearchConfig,
    fetcher: Arc<dyn PageFetcher>,
    identity: Arc<IdentityController>,
    state: Mutex<SearchState>,
}

impl WebSearchSource {
    #[must_use]
    pub fn new(
        config: SearchConfig,
        fetcher: Arc<dyn PageFetcher>,
        identity: Arc<IdentityController>,
    ) -> Self {
        Self {
            config,
            fetcher,
            identity,
            state: Mutex::new(SearchState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SearchState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn page_url(&self, page_idx: u32) -> Result<String, FetchError> {
        let query = build_search_query(
            &self.config.query,
            &self.config.location,
            &self.config.niche,
            self.config.platform,
        );
        let start = (page_idx * RESULTS_PER_PAGE).to_string();
        url::Url::parse_with_params(
            &self.config.engine_url,
            &[
                ("q", query.as_str()),
                ("num", "10"),
                ("start", start.as_str()),
                ("hl", "en"),
            ],
        )
        .map(|u| u.to_string())
        .map_err(|e| FetchError::InvalidUrl {
            url: self.config.engine_url.clone(),
            reason: e.to_string(),
        })
    }

    async fn fetch_page(&self, page_idx: u32) -> Result<Vec<String>, FetchError> {
        let url = self.page_url(page_idx)?;
        self.identity.before_request().await;
        let identity = self.identity.current();
        let html = self
            .fetcher
            .fetch(&url, self.config.request_timeout, &identity)
            .await?;
        Ok(parse_result_links(&url, &html))
    }

    /// Loads the next `pages_per_load` result pages. Returns how many new
    /// links were added and the last error, if every page failed.
    async fn load_pages(&self) -> (usize, Option<FetchError>) {
        let first = self.lock().next_page;
        let last = (first + self.config.pages_per_load.max(1)).min(self.config.max_pages + 1);
        if first >= last {
            return (0, None);
        }
        let concurrency = usize::try_from(self.config.pages_per_load.max(1)).unwrap_or(1);
        let results: Vec<Result<Vec<String>, FetchError>> = stream::iter(first..last)
            .map(|idx| self.fetch_page(idx))
            .buffered(concurrency)
            .collect()
            .await;

        let mut state = self.lock();
        state.next_page = last;
        let mut added = 0;
        let mut last_error = None;
        let mut any_ok = false;
        for (offset, result) in results.into_iter().enumerate() {
            match result {
                Ok(links) => {
                    any_ok = true;
                    for link in links {
                        if state.seen.insert(link.clone()) {
                            state.links.push(link);
                            added += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(first_page = first, offset, error = %e, "result page fetch failed");
                    last_error = Some(e);
                }
            }
        }
        (added, if any_ok { None } else { last_error })
    }
}

#[async_trait]
impl SourceProvider for WebSearchSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Web
    }

    async fn initialize(&self) -> Result<PageState, SourceError> {
        let (added, error) = self.load_pages().await;
        if let Some(e) = error {
            return Err(SourceError::Transport(e));
        }
        if added == 0 {
            return Err(SourceError::NoResults {
                detail: format!("no site links for \"{}\"", self.config.query),
            });
        }
        tracing::info!(links = added, "search results loaded");
        Ok(PageState::default())
    }

    async fn list_window(&self, state: &PageState) -> Result<Vec<RawCandidate>, SourceError> {
        Ok(self
            .lock()
            .links
            .iter()
            .enumerate()
            .skip(state.cursor)
            .map(|(i, link)| RawCandidate {
                sequence_index: i,
                payload: CandidatePayload::Url(link.clone()),
            })
            .collect())
    }

    async fn advance(&self, state: &PageState) -> Result<Option<PageState>, SourceError> {
        let (added, error) = self.load_pages().await;
        if let Some(e) = error {
            return Err(SourceError::Transport(e));
        }
        if added == 0 {
            return Ok(None);
        }
        Ok(Some(PageState {
            page: state.page + 1,
            cursor: state.cursor,
        }))
    }
}

/// Site links on one result page, in page order without repeats.
#[must_use]
pub fn parse_result_links(page_url: &str, html: &str) -> Vec<String> {
    let engine_host = extract_domain(page_url);
    let page = PageHandle::parse(page_url, html);
    let mut seen = HashSet::new();
    page.select("#search a[href], a[jsname][href], a[href^=\"/url?\"]")
        .into_iter()
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| page.resolve(href))
        .map(|href| unwrap_redirect(&href))
        .filter(|href| is_result_link(href, &engine_host) && is_landing_page(href))
        .filter(|href| seen.insert(href.clone()))
        .collect()
}

fn is_result_link(href: &str, engine_host: &str) -> bool {
    let Ok(parsed) = url::Url::parse(href) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    let host = parsed.host_str().unwrap_or_default().trim_start_matches("www.");
    !host.is_empty()
        && host != engine_host
        && !host.contains("google.")
        && !BLOCKED_LINK_FRAGMENTS.iter().any(|b| href.contains(b))
}

fn is_landing_page(href: &str) -> bool {
    let lowered = href.to_lowercase();
    !PRODUCT_PATH_PATTERNS.iter().any(|p| lowered.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_includes_platform_hints() {
        assert_eq!(
            build_search_query("candles", " Austin ", "", Some(Platform::Shopify)),
            "candles Austin \"powered by shopify\" inurl:collections"
        );
        assert_eq!(build_search_query("candles", "", "soy", None), "candles soy");
    }

    #[test]
    fn result_links_are_unwrapped_filtered_and_deduplicated() {
        let html = r#"<html><body><div id="search">
            <a href="/url?q=https://acme.com/&amp;sa=U">Acme</a>
            <a href="https://acme.com/">Acme again</a>
            <a href="https://www.google.com/maps">Maps</a>
            <a href="/search?q=next">Next</a>
            <a href="https://bluefern.co/products/candle">Product</a>
            <a href="https://webcache.googleusercontent.com/x">Cache</a>
            <a href="https://bluefern.co/">Blue Fern</a>
        </div></body></html>"#;
        let links = parse_result_links("https://www.google.com/search?q=x", html);
        assert_eq!(links, ["https://acme.com/", "https://bluefern.co/"]);
    }
}
