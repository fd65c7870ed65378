//! Exponential backoff for transient fetch errors.
//!
//! Used by the structured places API client, where a 429 or a dropped
//! connection is worth waiting out. Scraped pages are never retried this way;
//! a failed page load is a field miss, not a reason to hammer the host.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;

const MAX_DELAY_MS: u64 = 60_000;

/// Returns `true` if `err` is a transient condition worth retrying.
///
/// Rate limiting, timeouts and network-level failures are retried; unexpected
/// statuses, bot challenges, bad URLs and malformed bodies are not.
pub(crate) fn is_retriable(err: &FetchError) -> bool {
    match err {
        FetchError::RateLimited { .. } | FetchError::Timeout { .. } => true,
        FetchError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        FetchError::UnexpectedStatus { status, .. } => *status >= 500,
        FetchError::BotChallenge { .. }
        | FetchError::InvalidUrl { .. }
        | FetchError::Deserialize { .. } => false,
    }
}

/// Runs `operation`, retrying transient failures up to `max_retries` times.
///
/// The delay before retry `n` is `backoff_base_ms * 2^(n-1)` with ±25 %
/// jitter, capped at one minute. A `RateLimited` error's `retry_after_secs`
/// raises the delay when it is longer.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let floor = match &err {
                    FetchError::RateLimited {
                        retry_after_secs, ..
                    } if backoff_base_ms > 0 => retry_after_secs.saturating_mul(1_000),
                    _ => 0,
                };
                let capped = computed.max(floor).min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient fetch error, retrying after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
