//! In-memory collaborators for engine tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bizscout_collector::error::{DriverError, FetchError, SourceError};
use bizscout_collector::source::{ActivationMethod, DetailView};
use bizscout_collector::{
    CandidatePayload, ElementHandle, Identity, IdentityController, IdentityPool, PacingPolicy,
    PageFetcher, PageState, RawCandidate, RunConfig, RunDeps, RunEvent, SourceProvider,
    WorkerConfig,
};
use bizscout_core::{CollectedRecord, SourceKind};
use tokio::sync::watch;

/// Pages of payloads served in order. `advance` reveals the next page.
pub struct ScriptedSource {
    kind: SourceKind,
    pages: Vec<Vec<CandidatePayload>>,
    loaded: Mutex<Vec<CandidatePayload>>,
    next_page: Mutex<usize>,
    /// Listing calls that fail before listing starts working again.
    list_failures: AtomicU32,
    /// Element indices whose detail view never loads.
    broken: HashSet<usize>,
    /// Element indices whose detail view hangs forever.
    hanging: HashSet<usize>,
    init_error: Mutex<Option<SourceError>>,
    /// Flipped to `false` the first time the cursor reaches this position.
    connectivity_drop: Option<(usize, Arc<watch::Sender<bool>>)>,
}

impl ScriptedSource {
    pub fn new(kind: SourceKind, pages: Vec<Vec<CandidatePayload>>) -> Self {
        Self {
            kind,
            pages,
            loaded: Mutex::new(Vec::new()),
            next_page: Mutex::new(0),
            list_failures: AtomicU32::new(0),
            broken: HashSet::new(),
            hanging: HashSet::new(),
            init_error: Mutex::new(None),
            connectivity_drop: None,
        }
    }

    pub fn failing_list_calls(mut self, n: u32) -> Self {
        self.list_failures = AtomicU32::new(n);
        self
    }

    pub fn broken(mut self, indices: &[usize]) -> Self {
        self.broken = indices.iter().copied().collect();
        self
    }

    pub fn hanging(mut self, indices: &[usize]) -> Self {
        self.hanging = indices.iter().copied().collect();
        self
    }

    pub fn failing_init(self, error: SourceError) -> Self {
        *self.init_error.lock().unwrap() = Some(error);
        self
    }

    pub fn dropping_connectivity_at(mut self, cursor: usize, tx: Arc<watch::Sender<bool>>) -> Self {
        self.connectivity_drop = Some((cursor, tx));
        self
    }

    fn load_next(&self) -> bool {
        let mut next = self.next_page.lock().unwrap();
        let Some(page) = self.pages.get(*next) else {
            return false;
        };
        self.loaded.lock().unwrap().extend(page.iter().cloned());
        *next += 1;
        !page.is_empty()
    }
}

#[async_trait]
impl SourceProvider for ScriptedSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn initialize(&self) -> Result<PageState, SourceError> {
        if let Some(e) = self.init_error.lock().unwrap().take() {
            return Err(e);
        }
        if !self.load_next() {
            return Err(SourceError::NoResults {
                detail: "scripted source is empty".to_owned(),
            });
        }
        Ok(PageState::default())
    }

    async fn list_window(&self, state: &PageState) -> Result<Vec<RawCandidate>, SourceError> {
        let left = self.list_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.list_failures.store(left - 1, Ordering::SeqCst);
            return Err(SourceError::Transport(FetchError::Timeout {
                url: "https://listing.test/results".to_owned(),
            }));
        }
        if let Some((at, tx)) = &self.connectivity_drop {
            if state.cursor == *at {
                tx.send_replace(false);
            }
        }
        Ok(self
            .loaded
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .skip(state.cursor)
            .map(|(i, payload)| RawCandidate {
                sequence_index: i,
                payload: payload.clone(),
            })
            .collect())
    }

    async fn advance(&self, state: &PageState) -> Result<Option<PageState>, SourceError> {
        if !self.load_next() {
            return Ok(None);
        }
        Ok(Some(PageState {
            page: state.page + 1,
            cursor: state.cursor,
        }))
    }

    async fn open_detail(
        &self,
        element: &ElementHandle,
        _method: ActivationMethod,
    ) -> Result<DetailView, DriverError> {
        if self.hanging.contains(&element.index) {
            std::future::pending::<()>().await;
        }
        if self.broken.contains(&element.index) {
            return Err(DriverError::Interaction {
                index: element.index,
                reason: "element not clickable".to_owned(),
            });
        }
        Ok(DetailView {
            url: format!("https://listing.test/place/{}", element.index),
            html: detail_html(element.index),
        })
    }

    async fn page_source(&self) -> Option<String> {
        Some("<html><body>captcha</body></html>".to_owned())
    }
}

/// Fetcher with a fixed set of pages; everything else is a 404.
#[derive(Default)]
pub struct MapFetcher {
    pub pages: HashMap<String, String>,
}

#[async_trait]
impl PageFetcher for MapFetcher {
    async fn fetch(&self, url: &str, _: Duration, _: &Identity) -> Result<String, FetchError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::UnexpectedStatus {
                status: 404,
                url: url.to_owned(),
            })
    }

    async fn fetch_bytes(&self, url: &str, _: Duration, _: &Identity) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::UnexpectedStatus {
            status: 404,
            url: url.to_owned(),
        })
    }
}

pub fn detail_html(index: usize) -> String {
    format!(
        r#"<html><head><title>Shop {index}</title></head><body>
           <h1>Shop {index}</h1>
           <button data-item-id="address" aria-label="Address: {index} Main Street, Springfield"></button>
           <a data-item-id="authority" href="https://shop{index}.test/">shop{index}.test</a>
           </body></html>"#
    )
}

pub fn element(index: usize) -> CandidatePayload {
    CandidatePayload::Element(ElementHandle {
        index,
        html: format!(r#"<div role="article"><a href="/place/{index}">Shop {index}</a></div>"#),
        text: format!("Shop {index}"),
    })
}

/// A ready-made record; `online` controls whether it has a website.
pub fn prepared(name: &str, address: &str, online: bool) -> CandidatePayload {
    let mut record = CollectedRecord::new(SourceKind::PlacesApi);
    record.name = name.to_owned();
    record.address = address.to_owned();
    record.email = format!("{}@example.test", name.to_lowercase().replace(' ', ""));
    if online {
        record.website = format!("https://{}.test/", name.to_lowercase().replace(' ', "-"));
    }
    CandidatePayload::Prepared {
        record: Box::new(record),
        image_url: None,
    }
}

pub fn prepared_batch(count: usize) -> Vec<CandidatePayload> {
    (0..count)
        .map(|i| prepared(&format!("Shop {i}"), &format!("{i} Main Street, Springfield"), true))
        .collect()
}

pub fn run_config(target: usize) -> RunConfig {
    RunConfig {
        concurrency: 4,
        batch_timeout: Duration::from_secs(30),
        max_attempt_multiplier: 5,
        rotate_every: 0,
        batch_retry_pause: Duration::from_secs(1),
        ..RunConfig::new(target)
    }
}

pub fn worker_config(require_social_presence: bool) -> WorkerConfig {
    WorkerConfig {
        require_social_presence,
        retry_pause: Duration::from_millis(100),
        capture_images: false,
        ..WorkerConfig::default()
    }
}

pub fn deps(source: Arc<dyn SourceProvider>, worker: WorkerConfig) -> RunDeps {
    RunDeps {
        sources: vec![source],
        fetcher: Arc::new(MapFetcher::default()),
        identity: Arc::new(IdentityController::new(
            PacingPolicy::disabled(),
            IdentityPool::default(),
        )),
        stager: None,
        worker,
        connectivity: None,
    }
}

/// Splits collected events into records and skip reasons.
pub fn records_and_skips(events: &[RunEvent]) -> (Vec<CollectedRecord>, Vec<String>) {
    let mut records = Vec::new();
    let mut skips = Vec::new();
    for event in events {
        match event {
            RunEvent::Record(r) => records.push((**r).clone()),
            RunEvent::Skipped { reason } => skips.push(reason.clone()),
            _ => {}
        }
    }
    (records, skips)
}
