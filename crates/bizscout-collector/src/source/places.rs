//! Structured places API as a candidate source.
//!
//! Text search pages are followed through `next_page_token`; every place is
//! then looked up in the details endpoint and turned into a ready-made
//! record. Records bypass extraction but still go through deduplication and
//! the completeness policy.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bizscout_core::{or_unknown, CollectedRecord, HoursEntry, SourceKind, SourceTag};
use futures::stream::{self, StreamExt};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{CandidatePayload, PageState, RawCandidate, SourceProvider};
use crate::error::{FetchError, SourceError};
use crate::rate_limit::retry_with_backoff;
use crate::urls::{extract_domain, redact_credentials};

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";
const DETAIL_FIELDS: &str = "name,formatted_phone_number,website,formatted_address,opening_hours,photos";
const SEARCH_RADIUS_M: &str = "5000";
const PHOTO_MAX_WIDTH: &str = "400";

/// Parameters of a places API run.
#[derive(Clone)]
pub struct PlacesConfig {
    pub base_url: String,
    pub api_key: String,
    pub query: String,
    pub location: String,
    /// Copied onto every record produced.
    pub tag: SourceTag,
    pub request_timeout: Duration,
    /// Text search pages loaded at most.
    pub max_pages: u32,
    /// Detail lookups in flight at once.
    pub details_concurrency: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// A fresh `next_page_token` is rejected until the API has published it.
    pub page_token_delay: Duration,
}

impl PlacesConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>, query: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.into(),
            query: query.into(),
            location: location.into(),
            tag: SourceTag::default(),
            request_timeout: Duration::from_secs(10),
            max_pages: 3,
            details_concurrency: 4,
            max_retries: 3,
            backoff_base_ms: 1_000,
            page_token_delay: Duration::from_secs(2),
        }
    }

    fn text_query(&self) -> String {
        let location = self.location.trim();
        if location.is_empty() {
            self.query.trim().to_owned()
        } else {
            format!("{} in {location}", self.query.trim())
        }
    }
}

impl std::fmt::Debug for PlacesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacesConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .field("query", &self.query)
            .field("location", &self.location)
            .field("max_pages", &self.max_pages)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<PlaceSummary>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlaceSummary {
    place_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    formatted_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    result: Option<PlaceDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct PlaceDetails {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    formatted_phone_number: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    opening_hours: Option<OpeningHours>,
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Default, Deserialize)]
struct OpeningHours {
    #[serde(default)]
    weekday_text: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    photo_reference: String,
}

/// Anything the envelope status can carry.
trait ApiEnvelope {
    fn status(&self) -> &str;
    fn error_message(&self) -> Option<&str>;
}

impl ApiEnvelope for TextSearchResponse {
    fn status(&self) -> &str {
        &self.status
    }
    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

impl ApiEnvelope for DetailsResponse {
    fn status(&self) -> &str {
        &self.status
    }
    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

#[derive(Debug, Default)]
struct PlacesState {
    prepared: Vec<(CollectedRecord, Option<String>)>,
    next_token: Option<String>,
    pages_loaded: u32,
}

/// Places API client exposed as a [`SourceProvider`].
pub struct PlacesApiSource {
    config: PlacesConfig,
    client: Client,
    base_url: Url,
    state: Mutex<PlacesState>,
}

impl PlacesApiSource {
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the HTTP client cannot be built, or
    /// [`FetchError::InvalidUrl`] if `config.base_url` does not parse.
    pub fn new(config: PlacesConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("bizscout/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let normalised = format!("{}/", config.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| FetchError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            config,
            client,
            base_url,
            state: Mutex::new(PlacesState::default()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlacesState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn build_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|e| FetchError::InvalidUrl {
                url: format!("{}{endpoint}", self.base_url),
                reason: e.to_string(),
            })?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
            pairs.append_pair("key", &self.config.api_key);
        }
        Ok(url)
    }

    /// `{base}/photo?maxwidth=400&photoreference=<ref>&key=<key>`.
    fn photo_url(&self, reference: &str) -> Option<String> {
        self.build_url(
            "photo",
            &[("maxwidth", PHOTO_MAX_WIDTH), ("photoreference", reference)],
        )
        .ok()
        .map(String::from)
    }

    async fn get_once<T>(&self, url: &Url) -> Result<T, FetchError>
    where
        T: DeserializeOwned + ApiEnvelope,
    {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: redact(url),
                }
            } else {
                FetchError::Http(e.without_url())
            }
        })?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                domain: extract_domain(url.as_str()),
                retry_after_secs: 2,
            });
        }
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
                url: redact(url),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Http(e.without_url()))?;
        let parsed: T = serde_json::from_str(&body).map_err(|e| FetchError::Deserialize {
            context: redact(url),
            source: e,
        })?;
        if parsed.status() == "OVER_QUERY_LIMIT" {
            return Err(FetchError::RateLimited {
                domain: extract_domain(url.as_str()),
                retry_after_secs: 2,
            });
        }
        Ok(parsed)
    }

    async fn get_json<T>(&self, url: Url) -> Result<T, SourceError>
    where
        T: DeserializeOwned + ApiEnvelope,
    {
        let parsed: T = retry_with_backoff(self.config.max_retries, self.config.backoff_base_ms, || {
            self.get_once(&url)
        })
        .await?;
        match parsed.status() {
            "OK" | "ZERO_RESULTS" => Ok(parsed),
            other => Err(SourceError::Unreachable {
                detail: format!(
                    "places API answered {other}: {}",
                    parsed.error_message().unwrap_or("no message")
                ),
                page_source: None,
            }),
        }
    }

    async fn text_search(&self, token: Option<&str>) -> Result<TextSearchResponse, SourceError> {
        let query = self.config.text_query();
        let url = match token {
            Some(token) => self.build_url("textsearch/json", &[("pagetoken", token)])?,
            None => self.build_url(
                "textsearch/json",
                &[("query", query.as_str()), ("radius", SEARCH_RADIUS_M)],
            )?,
        };
        self.get_json(url).await
    }

    async fn details(&self, place_id: &str) -> Result<PlaceDetails, SourceError> {
        let url = self.build_url(
            "details/json",
            &[("place_id", place_id), ("fields", DETAIL_FIELDS)],
        )?;
        let response: DetailsResponse = self.get_json(url).await?;
        Ok(response.result.unwrap_or_default())
    }

    /// Loads one text search page and resolves details for every place on it.
    /// Returns the number of records added.
    async fn load_page(&self, token: Option<String>) -> Result<usize, SourceError> {
        let page = self.text_search(token.as_deref()).await?;
        let concurrency = self.config.details_concurrency.max(1);
        let prepared: Vec<(CollectedRecord, Option<String>)> = stream::iter(page.results)
            .map(|summary| async move {
                let details = match self.details(&summary.place_id).await {
                    Ok(details) => details,
                    Err(e) => {
                        tracing::warn!(place_id = %summary.place_id, error = %e, "place details lookup failed");
                        PlaceDetails::default()
                    }
                };
                self.to_record(&summary, details)
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut state = self.lock();
        state.pages_loaded += 1;
        state.next_token = page.next_page_token.filter(|t| !t.is_empty());
        let added = prepared.len();
        state.prepared.extend(prepared);
        Ok(added)
    }

    fn to_record(
        &self,
        summary: &PlaceSummary,
        details: PlaceDetails,
    ) -> (CollectedRecord, Option<String>) {
        let mut record = CollectedRecord::new(SourceKind::PlacesApi);
        record.name = or_unknown(details.name.or_else(|| summary.name.clone()));
        record.phone = or_unknown(details.formatted_phone_number);
        record.website = or_unknown(details.website);
        record.address = or_unknown(
            summary
                .formatted_address
                .clone()
                .or(details.formatted_address),
        );
        record.hours = details
            .opening_hours
            .map(|h| parse_weekday_text(&h.weekday_text))
            .filter(|h| !h.is_empty());
        record.source_tag = self.config.tag.clone();
        let image_url = details
            .photos
            .first()
            .and_then(|p| self.photo_url(&p.photo_reference));
        (record, image_url)
    }
}

#[async_trait]
impl SourceProvider for PlacesApiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::PlacesApi
    }

    async fn initialize(&self) -> Result<PageState, SourceError> {
        let added = self.load_page(None).await?;
        if added == 0 {
            return Err(SourceError::NoResults {
                detail: format!("places API has nothing for \"{}\"", self.config.text_query()),
            });
        }
        tracing::info!(places = added, "places API results loaded");
        Ok(PageState::default())
    }

    async fn list_window(&self, state: &PageState) -> Result<Vec<RawCandidate>, SourceError> {
        Ok(self
            .lock()
            .prepared
            .iter()
            .enumerate()
            .skip(state.cursor)
            .map(|(i, (record, image_url))| RawCandidate {
                sequence_index: i,
                payload: CandidatePayload::Prepared {
                    record: Box::new(record.clone()),
                    image_url: image_url.clone(),
                },
            })
            .collect())
    }

    async fn advance(&self, state: &PageState) -> Result<Option<PageState>, SourceError> {
        let token = {
            let guard = self.lock();
            if guard.pages_loaded >= self.config.max_pages {
                return Ok(None);
            }
            guard.next_token.clone()
        };
        let Some(token) = token else {
            return Ok(None);
        };
        tokio::time::sleep(self.config.page_token_delay).await;
        let added = self.load_page(Some(token)).await?;
        if added == 0 {
            return Ok(None);
        }
        Ok(Some(PageState {
            page: state.page + 1,
            cursor: state.cursor,
        }))
    }
}

/// `"Monday: 9:00 AM – 5:00 PM"` → `("Monday", "9:00 AM – 5:00 PM")`.
fn parse_weekday_text(lines: &[String]) -> Vec<HoursEntry> {
    lines
        .iter()
        .filter_map(|line| {
            let (day, interval) = line.split_once(": ")?;
            Some(HoursEntry {
                day: day.trim().to_owned(),
                interval: interval.trim().to_owned(),
            })
        })
        .collect()
}

/// URL with the API key stripped, for errors and logs.
fn redact(url: &Url) -> String {
    redact_credentials(url.as_str())
}
