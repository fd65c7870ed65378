use std::collections::HashMap;
use std::env::VarError;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

#[test]
fn build_app_config_uses_defaults_with_empty_env() {
    let map: HashMap<&str, &str> = HashMap::new();
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.target_count, 20);
    assert_eq!(cfg.concurrency, 4);
    assert_eq!(cfg.fetch_concurrency, 5);
    assert_eq!(cfg.serp_concurrency, 3);
    assert_eq!(cfg.batch_timeout_secs, 30);
    assert_eq!(cfg.max_attempt_multiplier, 5);
    assert!(cfg.require_social_presence);
    assert_eq!(cfg.user_agents.len(), DEFAULT_USER_AGENTS.len());
    assert!(cfg.proxies.is_empty());
    assert!(cfg.tor_control_addr.is_none());
    assert_eq!(cfg.rotate_every, 10);
    assert_eq!(cfg.connectivity_poll_secs, 5);
    assert_eq!(cfg.request_timeout_secs, 15);
    assert_eq!(cfg.harvest_page_budget, 2);
    assert_eq!(cfg.interaction_retries, 3);
    assert!(cfg.places_api_key.is_none());
}

#[test]
fn target_count_override() {
    let mut map = HashMap::new();
    map.insert("BIZSCOUT_TARGET_COUNT", "50");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.target_count, 50);
}

#[test]
fn zero_concurrency_is_rejected() {
    let mut map = HashMap::new();
    map.insert("BIZSCOUT_CONCURRENCY", "0");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "BIZSCOUT_CONCURRENCY"),
        "expected InvalidEnvVar(BIZSCOUT_CONCURRENCY), got: {result:?}"
    );
}

#[test]
fn non_numeric_batch_timeout_is_rejected() {
    let mut map = HashMap::new();
    map.insert("BIZSCOUT_BATCH_TIMEOUT_SECS", "soon");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "BIZSCOUT_BATCH_TIMEOUT_SECS"),
        "expected InvalidEnvVar(BIZSCOUT_BATCH_TIMEOUT_SECS), got: {result:?}"
    );
}

#[test]
fn require_social_accepts_common_spellings() {
    for (raw, expected) in [("false", false), ("0", false), ("Yes", true), ("off", false)] {
        let mut map = HashMap::new();
        map.insert("BIZSCOUT_REQUIRE_SOCIAL", raw);
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();
        assert_eq!(cfg.require_social_presence, expected, "input {raw}");
    }
}

#[test]
fn require_social_rejects_garbage() {
    let mut map = HashMap::new();
    map.insert("BIZSCOUT_REQUIRE_SOCIAL", "maybe");
    let result = build_app_config(lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::InvalidEnvVar { .. })));
}

#[test]
fn user_agents_and_proxies_are_split_and_trimmed() {
    let mut map = HashMap::new();
    map.insert("BIZSCOUT_USER_AGENTS", "ua-one | ua-two|");
    map.insert("BIZSCOUT_PROXIES", "10.0.0.1:8080, 10.0.0.2:8080 ,");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.user_agents, vec!["ua-one", "ua-two"]);
    assert_eq!(cfg.proxies, vec!["10.0.0.1:8080", "10.0.0.2:8080"]);
}

#[test]
fn blank_user_agent_list_falls_back_to_defaults() {
    let mut map = HashMap::new();
    map.insert("BIZSCOUT_USER_AGENTS", " | ");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.user_agents.len(), DEFAULT_USER_AGENTS.len());
}

#[test]
fn blank_api_key_is_treated_as_unset() {
    let mut map = HashMap::new();
    map.insert("BIZSCOUT_PLACES_API_KEY", "  ");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert!(cfg.places_api_key.is_none());
}

#[test]
fn debug_output_redacts_api_key() {
    let mut map = HashMap::new();
    map.insert("BIZSCOUT_PLACES_API_KEY", "secret-key-123");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    let rendered = format!("{cfg:?}");
    assert!(!rendered.contains("secret-key-123"));
    assert!(rendered.contains("[redacted]"));
}

#[test]
fn proxy_file_lines_skip_comments_and_blanks() {
    let parsed = parse_proxy_lines("# header\n1.2.3.4:1080\n\n5.6.7.8:1080 # backup\n");
    assert_eq!(parsed, vec!["1.2.3.4:1080", "5.6.7.8:1080"]);
}
