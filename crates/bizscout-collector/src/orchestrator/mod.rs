//! Collection orchestrator.
//!
//! One coordinating task pages through a [`SourceProvider`], dispatches
//! bounded batches of [`EntryWorker`] tasks, deduplicates and counts what
//! they return, and streams [`RunEvent`]s to the caller until the quota, the
//! attempt budget or the source runs out.

pub mod connectivity;

use std::sync::Arc;
use std::time::Duration;

use bizscout_core::{AppConfig, CollectedRecord};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::dedup::Deduplicator;
use crate::error::{RemediationHint, RunError, SourceError};
use crate::fetch::PageFetcher;
use crate::identity::{request_new_circuit, IdentityController};
use crate::source::{PageState, RawCandidate, SourceProvider};
use crate::stage::ResourceStager;
use crate::worker::{EntryWorker, Outcome, WorkerConfig};

pub use connectivity::{spawn_connectivity_monitor, ConnectivityProbe, TcpProbe};

/// Consecutive paging failures that abort a run.
pub const MAX_CONSECUTIVE_BATCH_FAILURES: u32 = 3;

/// Name under which the failing page is staged when a source is unreachable.
pub const DEBUG_SNAPSHOT_NAME: &str = "debug_page.html";

const EVENT_BUFFER: usize = 64;

/// Shape of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Records to accept before stopping.
    pub target_count: usize,
    /// Workers per batch.
    pub concurrency: usize,
    /// Wall-clock budget of one batch; stragglers are abandoned.
    pub batch_timeout: Duration,
    /// `max_attempts = target_count * max_attempt_multiplier`.
    pub max_attempt_multiplier: usize,
    /// Rotate identity every this many processed candidates. Zero disables.
    pub rotate_every: usize,
    /// Pause after a failed batch before paging again.
    pub batch_retry_pause: Duration,
}

impl RunConfig {
    #[must_use]
    pub fn new(target_count: usize) -> Self {
        Self {
            target_count,
            concurrency: 4,
            batch_timeout: Duration::from_secs(30),
            max_attempt_multiplier: 5,
            rotate_every: 10,
            batch_retry_pause: Duration::from_secs(2),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            target_count: config.target_count,
            concurrency: config.concurrency,
            batch_timeout: Duration::from_secs(config.batch_timeout_secs),
            max_attempt_multiplier: config.max_attempt_multiplier,
            rotate_every: config.rotate_every,
            ..Self::new(config.target_count)
        }
    }

    /// Upper bound on candidates processed in one run.
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.target_count
            .saturating_mul(self.max_attempt_multiplier.max(1))
    }
}

/// Collaborators of one run.
pub struct RunDeps {
    /// Tried in order at start-up; the first that initializes is used.
    pub sources: Vec<Arc<dyn SourceProvider>>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub identity: Arc<IdentityController>,
    pub stager: Option<Arc<dyn ResourceStager>>,
    pub worker: WorkerConfig,
    /// Connectivity signal; `None` means always up.
    pub connectivity: Option<watch::Receiver<bool>>,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    QuotaMet,
    AttemptsExhausted,
    SourceExhausted,
    Cancelled,
    Fatal,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::QuotaMet => write!(f, "target reached"),
            TerminationReason::AttemptsExhausted => write!(f, "attempt budget exhausted"),
            TerminationReason::SourceExhausted => write!(f, "no more results"),
            TerminationReason::Cancelled => write!(f, "cancelled"),
            TerminationReason::Fatal => write!(f, "aborted"),
        }
    }
}

/// Final counts of a run, reported on success and on failure alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub target: usize,
    pub accepted: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub reason: TerminationReason,
    /// Suggestion shown when fewer than `target` records were accepted.
    pub shortfall_hint: Option<String>,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "collected {} of {} ({} processed, {} skipped, {} failed): {}",
            self.accepted, self.target, self.processed, self.skipped, self.failed, self.reason
        )
    }
}

/// Everything a run reports, in the order it happens.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Fraction of the target accepted so far, `0.0..=1.0`.
    Progress(f32),
    Status(String),
    Record(Box<CollectedRecord>),
    Skipped { reason: String },
    Finished(RunSummary),
    Failed {
        error: String,
        hint: RemediationHint,
        summary: RunSummary,
    },
}

/// Caller's side of a running collection.
pub struct RunHandle {
    events: mpsc::Receiver<RunEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Result<RunSummary, RunError>>,
}

impl RunHandle {
    /// Next event, or `None` once the run has ended and every event was read.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Requests cooperative shutdown. In-flight workers stop at their next
    /// blocking step; records already emitted stay emitted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drains remaining events and waits for the run to end.
    ///
    /// # Errors
    ///
    /// Returns the run's fatal [`RunError`], if any.
    pub async fn wait(mut self) -> Result<RunSummary, RunError> {
        while self.events.recv().await.is_some() {}
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(RunError::Interrupted(e.to_string())),
        }
    }
}

/// Starts a run on the current runtime.
#[must_use]
pub fn start_run(config: RunConfig, deps: RunDeps) -> RunHandle {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_collection(config, deps, tx, cancel.clone()));
    RunHandle {
        events: rx,
        cancel,
        task,
    }
}

/// Runs a collection to completion on the calling task, reporting through
/// `events`. A dropped receiver cancels the run.
///
/// # Errors
///
/// [`RunError::SourceUnreachable`] when no source could be initialized,
/// [`RunError::ConsecutiveBatchFailures`] after repeated paging failures.
pub async fn run_collection(
    config: RunConfig,
    deps: RunDeps,
    events: mpsc::Sender<RunEvent>,
    cancel: CancellationToken,
) -> Result<RunSummary, RunError> {
    let mut run = CollectionRun::new(config, deps, events, cancel);
    match run.execute().await {
        Ok(reason) => {
            let summary = run.summary(reason);
            tracing::info!(
                accepted = summary.accepted,
                processed = summary.processed,
                skipped = summary.skipped,
                reason = %summary.reason,
                "collection finished"
            );
            if let Some(hint) = &summary.shortfall_hint {
                run.emit(RunEvent::Status(hint.clone())).await;
            }
            run.emit(RunEvent::Finished(summary.clone())).await;
            Ok(summary)
        }
        Err(error) => {
            let summary = run.summary(TerminationReason::Fatal);
            tracing::error!(
                error = %error,
                accepted = summary.accepted,
                processed = summary.processed,
                skipped = summary.skipped,
                "collection aborted"
            );
            run.emit(RunEvent::Failed {
                error: error.to_string(),
                hint: error.hint(),
                summary,
            })
            .await;
            Err(error)
        }
    }
}

/// Per-run state, owned by the coordinating task.
struct CollectionRun {
    config: RunConfig,
    deps: RunDeps,
    events: mpsc::Sender<RunEvent>,
    cancel: CancellationToken,
    dedup: Deduplicator,
    max_attempts: usize,
    accepted: usize,
    processed: usize,
    skipped: usize,
    failed: usize,
    consecutive_failures: u32,
}

impl CollectionRun {
    fn new(
        config: RunConfig,
        deps: RunDeps,
        events: mpsc::Sender<RunEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let max_attempts = config.max_attempts();
        Self {
            config,
            deps,
            events,
            cancel,
            dedup: Deduplicator::new(),
            max_attempts,
            accepted: 0,
            processed: 0,
            skipped: 0,
            failed: 0,
            consecutive_failures: 0,
        }
    }

    async fn execute(&mut self) -> Result<TerminationReason, RunError> {
        let target = self.config.target_count;
        self.emit(RunEvent::Status(format!(
            "Collecting {target} records (at most {} attempts)",
            self.max_attempts
        )))
        .await;

        let Some((source, mut state)) = self.resolve_source().await? else {
            return Ok(TerminationReason::Cancelled);
        };
        let worker = Arc::new(EntryWorker::new(
            self.deps.worker.clone(),
            Arc::clone(&source),
            Arc::clone(&self.deps.fetcher),
            Arc::clone(&self.deps.identity),
            self.deps.stager.clone(),
        ));

        loop {
            if self.cancel.is_cancelled() {
                return Ok(TerminationReason::Cancelled);
            }
            if self.accepted >= target {
                return Ok(TerminationReason::QuotaMet);
            }
            if self.processed >= self.max_attempts {
                return Ok(TerminationReason::AttemptsExhausted);
            }
            if !self.wait_for_connectivity().await {
                return Ok(TerminationReason::Cancelled);
            }

            let paged = tokio::select! {
                () = self.cancel.cancelled() => return Ok(TerminationReason::Cancelled),
                paged = next_window(source.as_ref(), &mut state) => paged,
            };
            let window = match paged {
                Ok(Some(window)) => window,
                Ok(None) => return Ok(TerminationReason::SourceExhausted),
                Err(e) => {
                    self.record_batch_failure(&e).await?;
                    continue;
                }
            };

            let batch_size = self
                .config
                .concurrency
                .max(1)
                .min(window.len())
                .min(self.max_attempts - self.processed)
                .min(target - self.accepted);
            let batch: Vec<RawCandidate> = window.into_iter().take(batch_size).collect();
            if let Some(last) = batch.last() {
                state.cursor = last.sequence_index + 1;
            }

            self.dispatch(&worker, batch).await;
            let before = self.processed;
            self.processed += batch_size;
            self.consecutive_failures = 0;
            self.rotate_if_due(before).await;
            self.emit_progress().await;
        }
    }

    /// Initializes the configured sources in order and returns the first
    /// that works. `Ok(None)` means the run was cancelled meanwhile.
    async fn resolve_source(
        &self,
    ) -> Result<Option<(Arc<dyn SourceProvider>, PageState)>, RunError> {
        let mut last_failure = None;
        for (i, source) in self.deps.sources.iter().enumerate() {
            let initialized = tokio::select! {
                () = self.cancel.cancelled() => return Ok(None),
                initialized = source.initialize() => initialized,
            };
            match initialized {
                Ok(state) => {
                    tracing::info!(source = %source.kind(), "source ready");
                    return Ok(Some((Arc::clone(source), state)));
                }
                Err(e) => {
                    tracing::warn!(source = %source.kind(), error = %e, "source could not be initialized");
                    if i + 1 < self.deps.sources.len() {
                        self.emit(RunEvent::Status(format!(
                            "{} source unavailable ({e}), falling back",
                            source.kind()
                        )))
                        .await;
                    }
                    last_failure = Some((Arc::clone(source), e));
                }
            }
        }
        let Some((source, error)) = last_failure else {
            return Err(RunError::SourceUnreachable {
                detail: "no source configured".to_owned(),
                hint: RemediationHint::AutomationTooling,
                snapshot: None,
            });
        };
        Err(self.unreachable(source.as_ref(), error).await)
    }

    /// Builds the fatal error, staging the failing page when one is at hand.
    async fn unreachable(&self, source: &dyn SourceProvider, error: SourceError) -> RunError {
        let hint = error.hint();
        let page = match &error {
            SourceError::Unreachable {
                page_source: Some(page),
                ..
            } => Some(page.clone()),
            _ => source.page_source().await,
        };
        let snapshot = match (page, &self.deps.stager) {
            (Some(page), Some(stager)) => match stager.stage(page.as_bytes(), DEBUG_SNAPSHOT_NAME).await {
                Ok(stored) => {
                    tracing::info!(snapshot = %stored, "page snapshot saved");
                    Some(stored)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "page snapshot could not be saved");
                    None
                }
            },
            _ => None,
        };
        RunError::SourceUnreachable {
            detail: error.to_string(),
            hint,
            snapshot,
        }
    }

    async fn record_batch_failure(&mut self, error: &SourceError) -> Result<(), RunError> {
        self.consecutive_failures += 1;
        let failures = self.consecutive_failures;
        tracing::warn!(
            failures,
            processed = self.processed,
            error = %error,
            "batch failed"
        );
        self.emit(RunEvent::Status(format!(
            "Batch failed ({failures}/{MAX_CONSECUTIVE_BATCH_FAILURES}): {error}"
        )))
        .await;
        if failures >= MAX_CONSECUTIVE_BATCH_FAILURES {
            return Err(RunError::ConsecutiveBatchFailures {
                failures,
                last_error: error.to_string(),
                hint: error.hint(),
            });
        }
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = tokio::time::sleep(self.config.batch_retry_pause) => {}
        }
        Ok(())
    }

    /// Runs one batch to completion or until its deadline, handling outcomes
    /// in completion order.
    async fn dispatch(&mut self, worker: &Arc<EntryWorker>, batch: Vec<RawCandidate>) {
        tracing::debug!(size = batch.len(), processed = self.processed, "dispatching batch");
        let mut tasks = JoinSet::new();
        for candidate in batch {
            tracing::debug!(candidate = %candidate.describe(), "candidate dispatched");
            let worker = Arc::clone(worker);
            let cancel = self.cancel.clone();
            tasks.spawn(async move { worker.process(candidate, &cancel).await });
        }

        let deadline = Instant::now() + self.config.batch_timeout;
        loop {
            let joined = tokio::select! {
                () = self.cancel.cancelled() => {
                    tasks.abort_all();
                    return;
                }
                joined = tokio::time::timeout_at(deadline, tasks.join_next()) => joined,
            };
            match joined {
                Ok(None) => return,
                Ok(Some(Ok(outcome))) => self.handle_outcome(outcome).await,
                Ok(Some(Err(e))) => {
                    self.failed += 1;
                    tracing::error!(error = %e, "worker task ended abnormally");
                }
                Err(_) => {
                    let abandoned = tasks.len();
                    tasks.abort_all();
                    tracing::warn!(abandoned, "batch timed out");
                    self.emit(RunEvent::Status(format!(
                        "Batch timed out, {abandoned} entries abandoned"
                    )))
                    .await;
                    return;
                }
            }
        }
    }

    async fn handle_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Accepted(record) => {
                if self.accepted >= self.config.target_count {
                    tracing::debug!(name = %record.name, "target already met, record discarded");
                    return;
                }
                if !self.dedup.admit(&record) {
                    self.skipped += 1;
                    self.emit(RunEvent::Skipped {
                        reason: format!("Skipped duplicate entry ({})", record.name),
                    })
                    .await;
                    return;
                }
                self.accepted += 1;
                tracing::info!(
                    accepted = self.accepted,
                    target = self.config.target_count,
                    name = %record.name,
                    "record accepted"
                );
                let status = format!(
                    "Collected {} of {} entries",
                    self.accepted, self.config.target_count
                );
                self.emit(RunEvent::Record(record)).await;
                self.emit(RunEvent::Status(status)).await;
            }
            Outcome::Skipped(reason) => {
                self.skipped += 1;
                self.emit(RunEvent::Skipped { reason }).await;
            }
            Outcome::Failed(reason) => {
                self.failed += 1;
                self.emit(RunEvent::Status(format!("Entry failed: {reason}")))
                    .await;
            }
        }
    }

    /// Holds dispatch while connectivity is down. Returns `false` if the run
    /// was cancelled while waiting.
    async fn wait_for_connectivity(&mut self) -> bool {
        let down = self
            .deps
            .connectivity
            .as_ref()
            .is_some_and(|rx| !*rx.borrow());
        if !down {
            return true;
        }
        tracing::warn!(accepted = self.accepted, "connectivity lost, dispatch paused");
        self.emit(RunEvent::Status(
            "Connection lost, waiting for it to come back".to_owned(),
        ))
        .await;

        let cancel = self.cancel.clone();
        let Some(rx) = self.deps.connectivity.as_mut() else {
            return true;
        };
        let monitor_alive = tokio::select! {
            () = cancel.cancelled() => return false,
            restored = rx.wait_for(|up| *up) => restored.is_ok(),
        };
        if !monitor_alive {
            tracing::warn!("connectivity monitor stopped, resuming without it");
            self.deps.connectivity = None;
        }
        tracing::info!("connectivity restored, dispatch resumed");
        self.emit(RunEvent::Status("Connection restored, resuming".to_owned()))
            .await;
        true
    }

    async fn rotate_if_due(&self, processed_before: usize) {
        let every = self.config.rotate_every;
        if every == 0 || processed_before / every == self.processed / every {
            return;
        }
        let rotation = self.deps.identity.rotate_identity();
        if !rotation.changed {
            return;
        }
        tracing::info!(
            processed = self.processed,
            requests = self.deps.identity.request_count(),
            proxy = rotation.identity.proxy.as_deref().unwrap_or("direct"),
            "identity rotated"
        );
        if let Some(addr) = rotation.new_circuit {
            if let Err(e) = request_new_circuit(&addr).await {
                tracing::warn!(control = %addr, error = %e, "new circuit request failed");
            }
        }
    }

    async fn emit_progress(&self) {
        #[allow(clippy::cast_precision_loss)]
        let fraction = if self.config.target_count == 0 {
            1.0
        } else {
            (self.accepted as f32 / self.config.target_count as f32).min(1.0)
        };
        self.emit(RunEvent::Progress(fraction)).await;
    }

    /// Sends an event; a caller that stopped listening cancels the run.
    ///
    /// Once the run is cancelled a full channel no longer blocks: the event
    /// is delivered only if there is room for it.
    async fn emit(&self, event: RunEvent) {
        let permit = tokio::select! {
            biased;
            permit = self.events.reserve() => permit,
            () = self.cancel.cancelled() => {
                match self.events.try_reserve() {
                    Ok(permit) => permit.send(event),
                    Err(_) => tracing::debug!("event consumer stalled, dropping event after cancel"),
                }
                return;
            }
        };
        match permit {
            Ok(permit) => permit.send(event),
            Err(_) if !self.cancel.is_cancelled() => {
                tracing::debug!("event receiver dropped, cancelling run");
                self.cancel.cancel();
            }
            Err(_) => {}
        }
    }

    fn summary(&self, reason: TerminationReason) -> RunSummary {
        let target = self.config.target_count;
        let shortfall_hint = (self.accepted < target
            && self.deps.worker.require_social_presence
            && reason != TerminationReason::Cancelled)
            .then(|| {
                format!(
                    "Only {} of {target} entries had a website or Instagram profile. \
                     Consider disabling the website/Instagram requirement to collect more.",
                    self.accepted
                )
            });
        RunSummary {
            target,
            accepted: self.accepted,
            processed: self.processed,
            skipped: self.skipped,
            failed: self.failed,
            reason,
            shortfall_hint,
        }
    }
}

/// Unconsumed candidates at the cursor, advancing the source once when there
/// are none. `Ok(None)` means the source is exhausted.
async fn next_window(
    source: &dyn SourceProvider,
    state: &mut PageState,
) -> Result<Option<Vec<RawCandidate>>, SourceError> {
    let window = source.list_window(state).await?;
    if !window.is_empty() {
        return Ok(Some(window));
    }
    let Some(next) = source.advance(state).await? else {
        return Ok(None);
    };
    *state = next;
    let window = source.list_window(state).await?;
    Ok((!window.is_empty()).then_some(window))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_budget_is_target_times_multiplier() {
        let config = RunConfig {
            max_attempt_multiplier: 5,
            ..RunConfig::new(10)
        };
        assert_eq!(config.max_attempts(), 50);
        let config = RunConfig {
            max_attempt_multiplier: 0,
            ..RunConfig::new(10)
        };
        assert_eq!(config.max_attempts(), 10);
    }

    #[test]
    fn summary_renders_counts_and_reason() {
        let summary = RunSummary {
            target: 10,
            accepted: 6,
            processed: 10,
            skipped: 4,
            failed: 0,
            reason: TerminationReason::SourceExhausted,
            shortfall_hint: None,
        };
        assert_eq!(
            summary.to_string(),
            "collected 6 of 10 (10 processed, 4 skipped, 0 failed): no more results"
        );
    }
}
