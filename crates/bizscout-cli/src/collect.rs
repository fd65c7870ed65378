//! Turns a parsed command into a collection run and streams its output.
//!
//! Records go to stdout as JSON lines; status, skips and the final summary
//! go through `tracing` (stderr) so stdout stays machine-readable.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bizscout_collector::{
    clean_record, spawn_connectivity_monitor, start_run, validate_record, CleanOptions,
    DirectoryConfig, DirectoryStager, HttpDirectoryDriver, HttpFetcher, IdentityController,
    IdentityPool, ListingSource, PacingPolicy, PlacesApiSource, PlacesConfig, Platform, RunConfig,
    RunDeps, RunEvent, SearchConfig, SourceProvider, TcpProbe, ValidationOptions, WebSearchSource,
    WorkerConfig,
};
use bizscout_core::{or_unknown, AppConfig, CollectedRecord, SourceTag};
use tokio_util::sync::CancellationToken;

use crate::{Commands, RunArgs};

/// Where candidates come from after the optional places API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PagedSource {
    Directory { url_template: String },
    Web {
        niche: String,
        platform: Option<Platform>,
    },
}

/// Resolved sources and overrides for one run.
#[derive(Debug, Clone)]
pub(crate) struct SourcePlan {
    pub query: String,
    pub location: String,
    /// Try the places API before `paged`.
    pub places: bool,
    /// Fail up front when the places API is wanted but no key is set.
    pub places_required: bool,
    pub paged: Option<PagedSource>,
    pub run: RunArgs,
}

impl SourcePlan {
    pub(crate) fn from_command(command: Commands) -> Self {
        match command {
            Commands::Listing {
                url_template,
                query,
                location,
                run,
            } => Self {
                query,
                location,
                places: run.places_api_key.is_some(),
                places_required: false,
                paged: Some(PagedSource::Directory { url_template }),
                run,
            },
            Commands::Web {
                query,
                location,
                niche,
                platform,
                run,
            } => Self {
                query,
                location,
                places: false,
                places_required: false,
                paged: Some(PagedSource::Web { niche, platform }),
                run,
            },
            Commands::Places {
                query,
                location,
                fallback_url_template,
                run,
            } => Self {
                query,
                location,
                places: true,
                places_required: true,
                paged: fallback_url_template.map(|url_template| PagedSource::Directory { url_template }),
                run,
            },
        }
    }

    fn tag(&self) -> SourceTag {
        SourceTag {
            country: or_unknown(self.run.country.clone()),
            state: or_unknown(self.run.state.clone()),
            location: or_unknown(Some(self.location.clone())),
            query: or_unknown(Some(self.query.clone())),
        }
    }

    fn platform(&self) -> Option<Platform> {
        match &self.paged {
            Some(PagedSource::Web { platform, .. }) => *platform,
            _ => None,
        }
    }
}

impl RunArgs {
    /// Folds command-line overrides into the environment configuration.
    pub(crate) fn apply(&self, config: &mut AppConfig) {
        if let Some(target) = self.target {
            config.target_count = target.max(1);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency.max(1);
        }
        if self.allow_incomplete {
            config.require_social_presence = false;
        }
        if let Some(key) = &self.places_api_key {
            config.places_api_key = Some(key.clone());
        }
    }
}

/// Builds everything a run needs from `config`, runs it and reports.
///
/// # Errors
///
/// Returns an error if the HTTP client or sources cannot be built, if stdout
/// cannot be written, or if the run itself ends fatally.
pub(crate) async fn run_command(mut config: AppConfig, command: Commands) -> anyhow::Result<()> {
    let plan = SourcePlan::from_command(command);
    plan.run.apply(&mut config);
    tracing::debug!(?config, "configuration loaded");

    let identity = Arc::new(IdentityController::new(
        PacingPolicy::default(),
        identity_pool(&config),
    ));
    let fetcher = Arc::new(
        HttpFetcher::new(config.fetch_concurrency).context("failed to build HTTP client")?,
    );
    let sources = build_sources(&plan, &config, &fetcher, &identity)?;

    let monitor_cancel = CancellationToken::new();
    let connectivity = spawn_connectivity_monitor(
        Arc::new(TcpProbe::default()),
        Duration::from_secs(config.connectivity_poll_secs),
        monitor_cancel.clone(),
    );

    let mut worker = WorkerConfig::from_app_config(&config);
    worker.tag = plan.tag();
    worker.platform_filter = plan.platform();
    worker.capture_images = !plan.run.no_images;

    let deps = RunDeps {
        sources,
        fetcher,
        identity,
        stager: Some(Arc::new(DirectoryStager::new(config.staging_dir.clone()))),
        worker,
        connectivity: Some(connectivity),
    };
    let mut handle = start_run(RunConfig::from_app_config(&config), deps);

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after in-flight entries");
            cancel.cancel();
        }
    });

    let clean = plan.run.clean.then(|| CleanOptions {
        default_country_code: plan.run.country_code.clone(),
    });
    let mut stdout = std::io::stdout();
    while let Some(event) = handle.next_event().await {
        match event {
            RunEvent::Record(record) => {
                let line = render_record(&record, clean.as_ref())?;
                writeln!(stdout, "{line}").context("failed to write record")?;
                stdout.flush()?;
            }
            RunEvent::Skipped { reason } => tracing::info!(reason = %reason, "skipped"),
            RunEvent::Status(status) => tracing::info!("{status}"),
            RunEvent::Progress(fraction) => tracing::debug!(progress = fraction, "progress"),
            RunEvent::Finished(summary) => tracing::info!(
                accepted = summary.accepted,
                processed = summary.processed,
                skipped = summary.skipped,
                "{summary}"
            ),
            RunEvent::Failed { error, hint, summary } => {
                tracing::error!(error = %error, "{summary}");
                tracing::error!("suggestion: {hint}");
            }
        }
    }

    let result = handle.wait().await;
    monitor_cancel.cancel();
    result?;
    Ok(())
}

fn identity_pool(config: &AppConfig) -> IdentityPool {
    IdentityPool {
        user_agents: config.user_agents.clone(),
        proxies: config.proxies.clone(),
        circuit_control: config.tor_control_addr.clone(),
    }
}

/// Sources in the order the run tries them.
pub(crate) fn build_sources(
    plan: &SourcePlan,
    config: &AppConfig,
    fetcher: &Arc<HttpFetcher>,
    identity: &Arc<IdentityController>,
) -> anyhow::Result<Vec<Arc<dyn SourceProvider>>> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let mut sources: Vec<Arc<dyn SourceProvider>> = Vec::new();

    match (&config.places_api_key, plan.places) {
        (Some(key), true) => {
            let places = PlacesConfig {
                tag: plan.tag(),
                request_timeout: timeout,
                ..PlacesConfig::new(key.clone(), plan.query.clone(), plan.location.clone())
            };
            sources.push(Arc::new(
                PlacesApiSource::new(places).context("failed to build places API client")?,
            ));
        }
        (None, true) if plan.places_required => {
            anyhow::bail!("the places command needs BIZSCOUT_PLACES_API_KEY or --places-api-key");
        }
        _ => {}
    }

    match &plan.paged {
        Some(PagedSource::Directory { url_template }) => {
            if !url_template.contains("{page}") {
                anyhow::bail!("--url-template must contain a {{page}} placeholder");
            }
            let directory = DirectoryConfig {
                request_timeout: timeout,
                ..DirectoryConfig::new(url_template.clone())
            };
            let driver = HttpDirectoryDriver::new(directory, fetcher.clone(), Arc::clone(identity));
            sources.push(Arc::new(ListingSource::new(Arc::new(driver))));
        }
        Some(PagedSource::Web { niche, platform }) => {
            let search = SearchConfig {
                location: plan.location.clone(),
                niche: niche.clone(),
                platform: *platform,
                pages_per_load: u32::try_from(config.serp_concurrency).unwrap_or(3).max(1),
                request_timeout: timeout,
                ..SearchConfig::new(plan.query.clone())
            };
            sources.push(Arc::new(WebSearchSource::new(
                search,
                fetcher.clone(),
                Arc::clone(identity),
            )));
        }
        None => {}
    }
    Ok(sources)
}

/// One JSON line, optionally cleaned and validated first.
pub(crate) fn render_record(
    record: &CollectedRecord,
    clean: Option<&CleanOptions>,
) -> anyhow::Result<String> {
    let line = match clean {
        Some(options) => {
            let cleaned = validate_record(&clean_record(record, options), &ValidationOptions::default());
            serde_json::to_string(&cleaned)?
        }
        None => serde_json::to_string(record)?,
    };
    Ok(line)
}
