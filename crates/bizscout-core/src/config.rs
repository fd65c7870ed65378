use std::env::VarError;
use std::path::PathBuf;

use crate::app_config::{AppConfig, DEFAULT_USER_AGENTS};
use crate::ConfigError;

/// Load collector configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but cannot be parsed, or if a
/// proxy file is configured but unreadable.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load configuration from variables already in the process environment.
///
/// # Errors
///
/// Same as [`load_app_config`].
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    let mut config = build_app_config(|key| std::env::var(key))?;
    if let Ok(path) = std::env::var("BIZSCOUT_PROXY_FILE") {
        let contents =
            std::fs::read_to_string(&path).map_err(|source| ConfigError::ProxyFile {
                path: PathBuf::from(&path),
                source,
            })?;
        config.proxies.extend(parse_proxy_lines(&contents));
    }
    Ok(config)
}

/// Build configuration using the provided env-var lookup function.
///
/// Pure parsing and validation, decoupled from the process environment so it
/// can be exercised with a `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = or_default(var, default)
            .trim()
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value == 0 {
            return Err(invalid(var, "must be greater than zero".to_string()));
        }
        Ok(value)
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        parse_flag(&or_default(var, default)).ok_or_else(|| {
            invalid(
                var,
                "expected one of true/false/1/0/yes/no/on/off".to_string(),
            )
        })
    };

    let log_level = or_default("BIZSCOUT_LOG_LEVEL", "info");
    let target_count = parse_positive("BIZSCOUT_TARGET_COUNT", "20")?;
    let concurrency = parse_positive("BIZSCOUT_CONCURRENCY", "4")?;
    let fetch_concurrency = parse_positive("BIZSCOUT_FETCH_CONCURRENCY", "5")?;
    let serp_concurrency = parse_positive("BIZSCOUT_SERP_CONCURRENCY", "3")?;
    let batch_timeout_secs = parse_u64("BIZSCOUT_BATCH_TIMEOUT_SECS", "30")?;
    let max_attempt_multiplier = parse_positive("BIZSCOUT_MAX_ATTEMPT_MULTIPLIER", "5")?;
    let require_social_presence = parse_bool("BIZSCOUT_REQUIRE_SOCIAL", "true")?;

    let user_agents = lookup("BIZSCOUT_USER_AGENTS")
        .ok()
        .map(|raw| split_list(&raw, '|'))
        .filter(|list| !list.is_empty())
        .unwrap_or_else(|| DEFAULT_USER_AGENTS.iter().map(|s| (*s).to_owned()).collect());

    let proxies = lookup("BIZSCOUT_PROXIES")
        .map(|raw| split_list(&raw, ','))
        .unwrap_or_default();

    let tor_control_addr = lookup("BIZSCOUT_TOR_CONTROL_ADDR")
        .ok()
        .filter(|s| !s.trim().is_empty());

    let rotate_every = parse_positive("BIZSCOUT_ROTATE_EVERY", "10")?;
    let connectivity_poll_secs = parse_u64("BIZSCOUT_CONNECTIVITY_POLL_SECS", "5")?;
    let request_timeout_secs = parse_u64("BIZSCOUT_REQUEST_TIMEOUT_SECS", "15")?;
    let harvest_page_budget = parse_positive("BIZSCOUT_HARVEST_PAGE_BUDGET", "2")?;
    let interaction_retries = parse_u32("BIZSCOUT_INTERACTION_RETRIES", "3")?;

    let staging_dir = lookup("BIZSCOUT_STAGING_DIR").map_or_else(
        |_| std::env::temp_dir().join("bizscout"),
        PathBuf::from,
    );

    let places_api_key = lookup("BIZSCOUT_PLACES_API_KEY")
        .ok()
        .filter(|s| !s.trim().is_empty());

    Ok(AppConfig {
        log_level,
        target_count,
        concurrency,
        fetch_concurrency,
        serp_concurrency,
        batch_timeout_secs,
        max_attempt_multiplier,
        require_social_presence,
        user_agents,
        proxies,
        tor_control_addr,
        rotate_every,
        connectivity_poll_secs,
        request_timeout_secs,
        harvest_page_budget,
        interaction_retries,
        staging_dir,
        places_api_key,
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parse a proxy list file: one `host:port` per line, `#` starts a comment.
fn parse_proxy_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
