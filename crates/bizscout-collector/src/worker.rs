//! Per-candidate processing.
//!
//! An [`EntryWorker`] turns one [`RawCandidate`] into exactly one [`Outcome`].
//! Field misses degrade to `UNKNOWN`; only a detail view that cannot be loaded
//! at all fails the candidate.

use std::sync::Arc;
use std::time::Duration;

use bizscout_core::{is_known, AppConfig, CollectedRecord, SourceKind, SourceTag, UNKNOWN};
use tokio_util::sync::CancellationToken;

use crate::extract::filters::{is_meaningful, valid_name};
use crate::extract::{
    detect_platform, extract_catalog, extract_field, extract_hours, extract_image_url,
    extract_other_socials, first_valid, read_seed, strategies_for, FieldKind, PageHandle,
    Platform, Seed,
};
use crate::fetch::PageFetcher;
use crate::harvest::EmailHarvester;
use crate::identity::IdentityController;
use crate::source::{
    ActivationMethod, CandidatePayload, DetailView, ElementHandle, RawCandidate, SourceProvider,
};
use crate::stage::{image_file_name, ResourceStager};
use crate::urls::redact_credentials;

/// Terminal result of processing one candidate.
#[derive(Debug, Clone)]
pub enum Outcome {
    Accepted(Box<CollectedRecord>),
    Skipped(String),
    Failed(String),
}

/// Knobs that shape how candidates are processed.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Skip records with neither a website nor an Instagram profile.
    pub require_social_presence: bool,
    /// Detail-view activation attempts per listing entry.
    pub interaction_retries: u32,
    /// Pause between activation attempts.
    pub retry_pause: Duration,
    pub request_timeout: Duration,
    /// Pages visited per site while looking for emails.
    pub harvest_page_budget: usize,
    /// Web candidates on a different detected platform are skipped.
    pub platform_filter: Option<Platform>,
    /// Applied to every record this worker produces.
    pub tag: SourceTag,
    /// Download and stage an image per record.
    pub capture_images: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            require_social_presence: true,
            interaction_retries: 3,
            retry_pause: Duration::from_millis(500),
            request_timeout: Duration::from_secs(15),
            harvest_page_budget: 2,
            platform_filter: None,
            tag: SourceTag::default(),
            capture_images: true,
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            require_social_presence: config.require_social_presence,
            interaction_retries: config.interaction_retries,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            harvest_page_budget: config.harvest_page_budget,
            ..Self::default()
        }
    }
}

/// Processes candidates from one source. Shared by every task of a run.
pub struct EntryWorker {
    config: WorkerConfig,
    source: Arc<dyn SourceProvider>,
    fetcher: Arc<dyn PageFetcher>,
    identity: Arc<IdentityController>,
    harvester: EmailHarvester,
    stager: Option<Arc<dyn ResourceStager>>,
}

impl EntryWorker {
    #[must_use]
    pub fn new(
        config: WorkerConfig,
        source: Arc<dyn SourceProvider>,
        fetcher: Arc<dyn PageFetcher>,
        identity: Arc<IdentityController>,
        stager: Option<Arc<dyn ResourceStager>>,
    ) -> Self {
        let harvester = EmailHarvester::new(
            Arc::clone(&fetcher),
            Arc::clone(&identity),
            config.request_timeout,
        );
        Self {
            config,
            source,
            fetcher,
            identity,
            harvester,
            stager,
        }
    }

    /// Processes one candidate to completion. Never panics on network or
    /// markup failures; those are folded into the returned outcome.
    pub async fn process(&self, candidate: RawCandidate, cancel: &CancellationToken) -> Outcome {
        let ordinal = candidate.sequence_index + 1;
        let outcome = match candidate.payload {
            CandidatePayload::Element(element) => {
                self.process_element(ordinal, &element, cancel).await
            }
            CandidatePayload::Url(url) => self.process_url(ordinal, &url, cancel).await,
            CandidatePayload::Prepared { record, image_url } => {
                self.process_prepared(ordinal, *record, image_url, cancel).await
            }
        };
        match &outcome {
            Outcome::Accepted(record) => {
                tracing::debug!(candidate = ordinal, name = %record.name, "candidate accepted");
            }
            Outcome::Skipped(reason) => {
                tracing::info!(candidate = ordinal, reason, "candidate skipped");
            }
            Outcome::Failed(reason) => {
                tracing::warn!(candidate = ordinal, reason, "candidate failed");
            }
        }
        outcome
    }

    async fn process_element(
        &self,
        ordinal: usize,
        element: &ElementHandle,
        cancel: &CancellationToken,
    ) -> Outcome {
        let seed = read_seed(&element.html, &element.text);
        let detail = match self.open_detail(element, cancel).await {
            Ok(detail) => detail,
            Err(reason) => return Outcome::Failed(reason),
        };

        let (mut record, image_url) = extract_listing_record(&detail, &seed);
        if is_known(&record.website) {
            self.enrich_from_website(&mut record, cancel).await;
        }
        self.finish(ordinal, record, image_url, cancel).await
    }

    /// Activates `element`, alternating activation methods between attempts.
    async fn open_detail(
        &self,
        element: &ElementHandle,
        cancel: &CancellationToken,
    ) -> Result<DetailView, String> {
        let attempts = self.config.interaction_retries.max(1);
        let mut last_error = String::from("not attempted");
        for attempt in 0..attempts {
            if cancel.is_cancelled() {
                return Err("cancelled".to_owned());
            }
            let method = if attempt % 2 == 0 {
                ActivationMethod::Primary
            } else {
                ActivationMethod::Alternate
            };
            let result = tokio::select! {
                () = cancel.cancelled() => return Err("cancelled".to_owned()),
                result = self.source.open_detail(element, method) => result,
            };
            match result {
                Ok(detail) => return Ok(detail),
                Err(e) => {
                    tracing::debug!(
                        entry = element.index,
                        attempt,
                        ?method,
                        error = %e,
                        "detail activation failed"
                    );
                    last_error = e.to_string();
                }
            }
            if attempt + 1 < attempts {
                tokio::select! {
                    () = cancel.cancelled() => return Err("cancelled".to_owned()),
                    () = tokio::time::sleep(self.config.retry_pause) => {}
                }
            }
        }
        Err(format!(
            "detail view for entry {} unreachable after {attempts} attempts: {last_error}",
            element.index
        ))
    }

    /// Harvests an email from the business website and, when the detail view
    /// had none, an Instagram profile from the site's landing page.
    async fn enrich_from_website(&self, record: &mut CollectedRecord, cancel: &CancellationToken) {
        let report = self
            .harvester
            .harvest(&record.website, self.config.harvest_page_budget, cancel)
            .await;
        if let Some(email) = report.emails.into_iter().next() {
            record.email = email;
        }
        if !is_known(&record.instagram) {
            if let Some(body) = report.root_page {
                if let Some(instagram) = instagram_on(&record.website, &body) {
                    record.instagram = instagram;
                }
            }
        }
    }

    async fn process_url(&self, ordinal: usize, url: &str, cancel: &CancellationToken) -> Outcome {
        let report = self
            .harvester
            .harvest(url, self.config.harvest_page_budget, cancel)
            .await;
        if cancel.is_cancelled() {
            return Outcome::Failed("cancelled".to_owned());
        }
        let Some(email) = report.emails.first().cloned() else {
            return Outcome::Skipped(format!("Skipped {url} - no email found"));
        };
        let Some(body) = report.root_page else {
            return Outcome::Failed(format!("{url} did not load"));
        };

        let (mut record, platform, image_url) = extract_web_record(url, &body);
        record.email = email;

        if let (Some(wanted), Some(found)) = (self.config.platform_filter, platform) {
            if wanted != found {
                return Outcome::Skipped(format!("Skipped {url} - runs on {found}, not {wanted}"));
            }
        }
        self.finish(ordinal, record, image_url, cancel).await
    }

    async fn process_prepared(
        &self,
        ordinal: usize,
        mut record: CollectedRecord,
        image_url: Option<String>,
        cancel: &CancellationToken,
    ) -> Outcome {
        if is_known(&record.website) && !is_known(&record.email) {
            let report = self
                .harvester
                .harvest(&record.website, self.config.harvest_page_budget, cancel)
                .await;
            if let Some(email) = report.emails.into_iter().next() {
                record.email = email;
            }
        }
        self.finish(ordinal, record, image_url, cancel).await
    }

    /// Completeness policy, tagging, then the optional image capture.
    async fn finish(
        &self,
        ordinal: usize,
        mut record: CollectedRecord,
        image_url: Option<String>,
        cancel: &CancellationToken,
    ) -> Outcome {
        if self.config.require_social_presence && !record.has_social_presence() {
            return Outcome::Skipped(skip_reason(ordinal, &record));
        }
        record.source_tag = self.config.tag.clone();
        if self.config.capture_images && !cancel.is_cancelled() {
            if let Some(url) = image_url {
                record.image_ref = self.capture_image(&url, &record.name, cancel).await;
            }
        }
        Outcome::Accepted(Box::new(record))
    }

    /// Cancellation drops the image and keeps the record.
    async fn capture_image(
        &self,
        url: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let stager = self.stager.as_ref()?;
        tokio::select! {
            () = cancel.cancelled() => return None,
            () = self.identity.before_request() => {}
        }
        let identity = self.identity.current();
        let download = tokio::select! {
            () = cancel.cancelled() => return None,
            result = self
                .fetcher
                .fetch_bytes(url, self.config.request_timeout, &identity) => result,
        };
        let shown = redact_credentials(url);
        let bytes = match download {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return None,
            Err(e) => {
                tracing::debug!(url = %shown, error = %e, "image download failed");
                return None;
            }
        };
        match stager.stage(&bytes, &image_file_name(name)).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::debug!(url = %shown, error = %e, "image staging failed");
                None
            }
        }
    }
}

/// `"Skipped entry 3 (Acme) - Address: 12 Main St - No website or Instagram"`.
fn skip_reason(ordinal: usize, record: &CollectedRecord) -> String {
    format!(
        "Skipped entry {ordinal} ({}) - Address: {} - No website or Instagram",
        record.name, record.address
    )
}

/// Every field off a listing detail view. Seeds stand in for placeholder
/// names and addresses.
fn extract_listing_record(detail: &DetailView, seed: &Seed) -> (CollectedRecord, Option<String>) {
    let page = PageHandle::parse(&detail.url, &detail.html);
    let mut record = CollectedRecord::new(SourceKind::Listing);

    // Detail URLs belong to the listing site: no domain-derived names here.
    record.name = first_valid(&page, strategies_for(FieldKind::Name), valid_name)
        .map(|(name, _)| name)
        .or_else(|| seed.name.clone())
        .unwrap_or_else(|| UNKNOWN.to_owned());
    let (address, found) = extract_field(&page, FieldKind::Address);
    record.address = match (&seed.address, found && is_meaningful(&address)) {
        (_, true) => address,
        (Some(seeded), false) => seeded.clone(),
        (None, false) => UNKNOWN.to_owned(),
    };
    record.phone = extract_field(&page, FieldKind::Phone).0;
    record.email = extract_field(&page, FieldKind::Email).0;
    record.website = extract_field(&page, FieldKind::Website).0;
    record.instagram = extract_field(&page, FieldKind::Instagram).0;
    record.whatsapp = extract_field(&page, FieldKind::Whatsapp).0;
    record.other_socials = extract_other_socials(&page);
    record.hours = extract_hours(&page);
    record.set_catalog(extract_catalog(&page));

    (record, extract_image_url(&page))
}

fn instagram_on(url: &str, body: &str) -> Option<String> {
    let (instagram, found) = extract_field(&PageHandle::parse(url, body), FieldKind::Instagram);
    found.then_some(instagram)
}

/// Every field off a site's landing page.
fn extract_web_record(url: &str, body: &str) -> (CollectedRecord, Option<Platform>, Option<String>) {
    let page = PageHandle::parse(url, body);
    let mut record = CollectedRecord::new(SourceKind::Web);

    record.name = extract_field(&page, FieldKind::Name).0;
    record.niche = extract_field(&page, FieldKind::Niche).0;
    record.phone = extract_field(&page, FieldKind::Phone).0;
    record.instagram = extract_field(&page, FieldKind::Instagram).0;
    record.whatsapp = extract_field(&page, FieldKind::Whatsapp).0;
    record.address = extract_field(&page, FieldKind::Address).0;
    record.other_socials = extract_other_socials(&page);
    record.website = url.to_owned();

    let platform = detect_platform(body);
    if let Some(platform) = platform {
        record.platform = platform.to_string();
    }
    (record, platform, extract_image_url(&page))
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod tests;
