use std::path::PathBuf;
use std::sync::Arc;

use bizscout_collector::{HttpFetcher, IdentityController, IdentityPool, PacingPolicy};
use bizscout_core::{AppConfig, CollectedRecord, SourceKind, INVALID, UNKNOWN};

use super::*;
use crate::collect::{build_sources, render_record, PagedSource, SourcePlan};

fn test_config() -> AppConfig {
    AppConfig {
        log_level: "info".to_owned(),
        target_count: 20,
        concurrency: 4,
        fetch_concurrency: 5,
        serp_concurrency: 3,
        batch_timeout_secs: 30,
        max_attempt_multiplier: 5,
        require_social_presence: true,
        user_agents: Vec::new(),
        proxies: Vec::new(),
        tor_control_addr: None,
        rotate_every: 10,
        connectivity_poll_secs: 5,
        request_timeout_secs: 15,
        harvest_page_budget: 2,
        interaction_retries: 3,
        staging_dir: PathBuf::from("/tmp/bizscout-test"),
        places_api_key: None,
    }
}

fn plan(args: &[&str]) -> SourcePlan {
    let cli = Cli::try_parse_from(args).expect("expected valid cli args");
    SourcePlan::from_command(cli.command.expect("subcommand"))
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["bizscout"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_listing_command() {
    let plan = plan(&[
        "bizscout",
        "listing",
        "--url-template",
        "https://dir.test/search?q=bakery&page={page}",
        "--query",
        "bakery",
        "--location",
        "Austin",
        "--target",
        "5",
    ]);
    assert_eq!(plan.query, "bakery");
    assert_eq!(plan.location, "Austin");
    assert_eq!(plan.run.target, Some(5));
    assert_eq!(
        plan.paged,
        Some(PagedSource::Directory {
            url_template: "https://dir.test/search?q=bakery&page={page}".to_owned()
        })
    );
}

#[test]
fn parses_web_platform_case_insensitively() {
    let plan = plan(&[
        "bizscout", "web", "--query", "tea", "--niche", "loose leaf", "--platform", "shopify",
    ]);
    assert_eq!(
        plan.paged,
        Some(PagedSource::Web {
            niche: "loose leaf".to_owned(),
            platform: Some(Platform::Shopify)
        })
    );
    assert!(!plan.places);
}

#[test]
fn rejects_unknown_platform() {
    let result = Cli::try_parse_from(["bizscout", "web", "--query", "tea", "--platform", "geocities"]);
    assert!(result.is_err());
}

#[test]
fn country_code_requires_clean() {
    let result = Cli::try_parse_from(["bizscout", "web", "--query", "tea", "--country-code", "1"]);
    assert!(result.is_err());
}

#[test]
fn places_command_requires_a_key() {
    let mut plan = plan(&["bizscout", "places", "--query", "bakery"]);
    plan.run.places_api_key = None;
    let config = test_config();
    let fetcher = Arc::new(HttpFetcher::new(1).expect("client builds"));
    let identity = Arc::new(IdentityController::new(
        PacingPolicy::disabled(),
        IdentityPool::default(),
    ));
    let err = build_sources(&plan, &config, &fetcher, &identity)
        .err()
        .expect("missing key is an error");
    assert!(err.to_string().contains("BIZSCOUT_PLACES_API_KEY"));
}

#[test]
fn places_with_key_falls_back_to_directory() {
    let mut plan = plan(&[
        "bizscout",
        "places",
        "--query",
        "bakery",
        "--fallback-url-template",
        "https://dir.test/?page={page}",
    ]);
    plan.run.places_api_key = Some("key".to_owned());
    let mut config = test_config();
    plan.run.apply(&mut config);
    let fetcher = Arc::new(HttpFetcher::new(1).expect("client builds"));
    let identity = Arc::new(IdentityController::new(
        PacingPolicy::disabled(),
        IdentityPool::default(),
    ));
    let sources = build_sources(&plan, &config, &fetcher, &identity).expect("sources build");
    let kinds: Vec<SourceKind> = sources.iter().map(|s| s.kind()).collect();
    assert_eq!(kinds, [SourceKind::PlacesApi, SourceKind::Listing]);
}

#[test]
fn directory_template_needs_page_placeholder() {
    let mut plan = plan(&[
        "bizscout",
        "listing",
        "--url-template",
        "https://dir.test/search",
        "--query",
        "bakery",
    ]);
    plan.run.places_api_key = None;
    plan.places = false;
    let fetcher = Arc::new(HttpFetcher::new(1).expect("client builds"));
    let identity = Arc::new(IdentityController::new(
        PacingPolicy::disabled(),
        IdentityPool::default(),
    ));
    assert!(build_sources(&plan, &test_config(), &fetcher, &identity).is_err());
}

#[test]
fn overrides_fold_into_config() {
    let plan = plan(&[
        "bizscout",
        "web",
        "--query",
        "tea",
        "--target",
        "0",
        "--concurrency",
        "8",
        "--allow-incomplete",
    ]);
    let mut config = test_config();
    plan.run.apply(&mut config);
    assert_eq!(config.target_count, 1);
    assert_eq!(config.concurrency, 8);
    assert!(!config.require_social_presence);
}

#[test]
fn clean_rendering_normalizes_and_validates() {
    let mut record = CollectedRecord::new(SourceKind::Listing);
    record.name = "  Acme   Bakery ".to_owned();
    record.phone = "(512) 555-0100".to_owned();
    record.email = "not-an-email".to_owned();
    record.website = "acme.test".to_owned();

    let raw = render_record(&record, None).expect("serializes");
    assert!(raw.contains("\"  Acme   Bakery \""));

    let options = bizscout_collector::CleanOptions {
        default_country_code: Some("1".to_owned()),
    };
    let cleaned: serde_json::Value =
        serde_json::from_str(&render_record(&record, Some(&options)).expect("serializes"))
            .expect("valid json");
    assert_eq!(cleaned["name"], "Acme Bakery");
    assert_eq!(cleaned["phone"], "+15125550100");
    assert_eq!(cleaned["email"], INVALID);
    assert_eq!(cleaned["website"], "https://acme.test");
    assert_eq!(cleaned["instagram"], UNKNOWN);
}
