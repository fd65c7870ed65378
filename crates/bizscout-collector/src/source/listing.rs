//! Paged result listings with per-entry detail views.
//!
//! [`ListingDriver`] is the automation seam: a browser-backed driver and the
//! plain-HTTP [`HttpDirectoryDriver`] both sit behind it. [`ListingSource`]
//! adapts any driver to the orchestrator's [`SourceProvider`] contract.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bizscout_core::SourceKind;

use super::{CandidatePayload, ElementHandle, PageState, RawCandidate, SourceProvider};
use crate::error::{DriverError, SourceError};
use crate::extract::page::element_text;
use crate::extract::PageHandle;
use crate::fetch::PageFetcher;
use crate::identity::IdentityController;

/// Result-container selectors tried in order when locating results.
pub const DEFAULT_RESULT_SELECTORS: [&str; 7] = [
    r#"div[role="article"]"#,
    "div.section-result",
    "div.place-result",
    r#"div[jsaction*="mouseover"]"#,
    r#"div[aria-label*="result"]"#,
    "li.result",
    "article",
];

/// How a result entry is activated to reach its detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationMethod {
    /// Scroll into view and click (follow the entry's anchor).
    Primary,
    /// Script-driven activation (follow a `data-href`/`data-url` target).
    Alternate,
}

/// A loaded detail view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailView {
    pub url: String,
    pub html: String,
}

/// Outcome of looking for the result list on the first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateOutcome {
    Located,
    /// The page explicitly says there are no results.
    NoResults,
    /// None of the known result selectors matched.
    NotFound { tried: Vec<String> },
}

/// Drives one listing page session.
#[async_trait]
pub trait ListingDriver: Send + Sync {
    /// Loads the first results page and finds the result container.
    ///
    /// # Errors
    ///
    /// Fails when the page cannot be loaded at all.
    async fn locate_results(&self) -> Result<LocateOutcome, DriverError>;

    /// All result entries loaded so far, in page order.
    ///
    /// # Errors
    ///
    /// Fails when the result list can no longer be read.
    async fn result_elements(&self) -> Result<Vec<ElementHandle>, DriverError>;

    /// Scrolls or pages to load more entries. `Ok(false)` when nothing more loaded.
    ///
    /// # Errors
    ///
    /// Fails when the next page cannot be loaded.
    async fn load_more(&self) -> Result<bool, DriverError>;

    /// Activates `element` and returns its detail view.
    ///
    /// # Errors
    ///
    /// [`DriverError::Interaction`] when the entry cannot be activated with `method`.
    async fn open_detail(
        &self,
        element: &ElementHandle,
        method: ActivationMethod,
    ) -> Result<DetailView, DriverError>;

    async fn page_source(&self) -> Option<String>;
}

/// [`SourceProvider`] over a [`ListingDriver`].
pub struct ListingSource {
    driver: Arc<dyn ListingDriver>,
}

impl ListingSource {
    #[must_use]
    pub fn new(driver: Arc<dyn ListingDriver>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl SourceProvider for ListingSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Listing
    }

    async fn initialize(&self) -> Result<PageState, SourceError> {
        match self.driver.locate_results().await? {
            LocateOutcome::Located => Ok(PageState::default()),
            LocateOutcome::NoResults => Err(SourceError::NoResults {
                detail: "the listing reports no results for this query".to_owned(),
            }),
            LocateOutcome::NotFound { tried } => Err(SourceError::Unreachable {
                detail: format!(
                    "timed out waiting for search results (tried {} selectors)",
                    tried.len()
                ),
                page_source: self.driver.page_source().await,
            }),
        }
    }

    async fn list_window(&self, state: &PageState) -> Result<Vec<RawCandidate>, SourceError> {
        let elements = self.driver.result_elements().await?;
        Ok(elements
            .into_iter()
            .filter(|el| el.index >= state.cursor)
            .map(|el| RawCandidate {
                sequence_index: el.index,
                payload: CandidatePayload::Element(el),
            })
            .collect())
    }

    async fn advance(&self, state: &PageState) -> Result<Option<PageState>, SourceError> {
        if self.driver.load_more().await? {
            Ok(Some(PageState {
                page: state.page + 1,
                cursor: state.cursor,
            }))
        } else {
            Ok(None)
        }
    }

    async fn open_detail(
        &self,
        element: &ElementHandle,
        method: ActivationMethod,
    ) -> Result<DetailView, DriverError> {
        self.driver.open_detail(element, method).await
    }

    async fn page_source(&self) -> Option<String> {
        self.driver.page_source().await
    }
}

/// Settings for [`HttpDirectoryDriver`].
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Results page URL with a `{page}` placeholder (1-based).
    pub url_template: String,
    /// Result entry selectors, tried in order until one matches.
    pub result_selectors: Vec<String>,
    /// Last page number that will be requested.
    pub max_pages: u32,
    pub request_timeout: Duration,
}

impl DirectoryConfig {
    #[must_use]
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            result_selectors: DEFAULT_RESULT_SELECTORS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            max_pages: 10,
            request_timeout: Duration::from_secs(15),
        }
    }

    fn page_url(&self, page: u32) -> String {
        self.url_template.replace("{page}", &page.to_string())
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    page: u32,
    selector: Option<String>,
    elements: Vec<ElementHandle>,
    /// URL each element was listed on, parallel to `elements`.
    element_pages: Vec<String>,
    last_html: Option<String>,
}

/// Non-browser listing driver for server-rendered directories: each page of
/// results is a plain GET, and a detail view is whatever the entry links to.
pub struct HttpDirectoryDriver {
    config: DirectoryConfig,
    fetcher: Arc<dyn PageFetcher>,
    identity: Arc<IdentityController>,
    state: Mutex<DirectoryState>,
}

impl HttpDirectoryDriver {
    #[must_use]
    pub fn new(
        config: DirectoryConfig,
        fetcher: Arc<dyn PageFetcher>,
        identity: Arc<IdentityController>,
    ) -> Self {
        Self {
            config,
            fetcher,
            identity,
            state: Mutex::new(DirectoryState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn fetch(&self, url: &str) -> Result<String, DriverError> {
        self.identity.before_request().await;
        let identity = self.identity.current();
        Ok(self
            .fetcher
            .fetch(url, self.config.request_timeout, &identity)
            .await?)
    }
}

/// Parsed result entries from one page, using the first selector that matches.
fn parse_entries<'s>(
    html: &str,
    selectors: impl IntoIterator<Item = &'s String>,
) -> Option<(String, Vec<(String, String)>)> {
    let page = PageHandle::fragment(html);
    selectors.into_iter().find_map(|css| {
        let found: Vec<(String, String)> = page
            .select(css)
            .into_iter()
            .map(|el| (el.html(), entry_text(&el)))
            .collect();
        (!found.is_empty()).then(|| (css.clone(), found))
    })
}

/// Rendered text with one line per block-level text run.
fn entry_text(el: &scraper::ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn says_no_results(html: &str) -> bool {
    let text = PageHandle::fragment(html).visible_text().to_lowercase();
    text.contains("no results") || text.contains("no matches found")
}

#[async_trait]
impl ListingDriver for HttpDirectoryDriver {
    async fn locate_results(&self) -> Result<LocateOutcome, DriverError> {
        let url = self.config.page_url(1);
        let html = self.fetch(&url).await?;
        let parsed = parse_entries(&html, &self.config.result_selectors);

        let mut state = self.lock();
        state.page = 1;
        state.last_html = Some(html.clone());
        let Some((selector, entries)) = parsed else {
            tracing::debug!(url, "no result selector matched");
            return Ok(if says_no_results(&html) {
                LocateOutcome::NoResults
            } else {
                LocateOutcome::NotFound {
                    tried: self.config.result_selectors.clone(),
                }
            });
        };
        tracing::debug!(url, selector, entries = entries.len(), "results located");
        state.selector = Some(selector);
        for (html, text) in entries {
            let index = state.elements.len();
            state.elements.push(ElementHandle { index, html, text });
            state.element_pages.push(url.clone());
        }
        Ok(LocateOutcome::Located)
    }

    async fn result_elements(&self) -> Result<Vec<ElementHandle>, DriverError> {
        Ok(self.lock().elements.clone())
    }

    async fn load_more(&self) -> Result<bool, DriverError> {
        let (next, selector) = {
            let state = self.lock();
            let Some(selector) = state.selector.clone() else {
                return Ok(false);
            };
            (state.page + 1, selector)
        };
        if next > self.config.max_pages {
            return Ok(false);
        }
        let url = self.config.page_url(next);
        let html = self.fetch(&url).await?;
        let entries = parse_entries(&html, [&selector]).map(|(_, e)| e).unwrap_or_default();

        let mut state = self.lock();
        state.page = next;
        state.last_html = Some(html);
        if entries.is_empty() {
            return Ok(false);
        }
        for (html, text) in entries {
            let index = state.elements.len();
            state.elements.push(ElementHandle { index, html, text });
            state.element_pages.push(url.clone());
        }
        Ok(true)
    }

    async fn open_detail(
        &self,
        element: &ElementHandle,
        method: ActivationMethod,
    ) -> Result<DetailView, DriverError> {
        let listed_on = self
            .lock()
            .element_pages
            .get(element.index)
            .cloned()
            .unwrap_or_else(|| self.config.page_url(1));

        let target = {
            let fragment = PageHandle::fragment(&element.html);
            let raw = match method {
                ActivationMethod::Primary => fragment.first_attr("a[href]", "href"),
                ActivationMethod::Alternate => fragment
                    .first_attr("[data-href]", "data-href")
                    .or_else(|| fragment.first_attr("[data-url]", "data-url")),
            };
            raw.and_then(|href| crate::urls::absolutize(&listed_on, &href))
        };
        let Some(url) = target else {
            return Err(DriverError::Interaction {
                index: element.index,
                reason: format!("no {method:?} activation target"),
            });
        };

        let html = self.fetch(&url).await.map_err(|e| DriverError::Interaction {
            index: element.index,
            reason: e.to_string(),
        })?;
        self.lock().last_html = Some(html.clone());
        Ok(DetailView { url, html })
    }

    async fn page_source(&self) -> Option<String> {
        self.lock().last_html.clone()
    }
}

/// Name shown for an element in logs: the first line of its text.
#[must_use]
pub fn element_label(element: &ElementHandle) -> String {
    element
        .text
        .lines()
        .next()
        .map(str::to_owned)
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| {
            element_text(
                &PageHandle::fragment(&element.html)
                    .document()
                    .root_element(),
            )
        })
}
