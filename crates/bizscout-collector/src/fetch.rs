//! Non-interactive page retrieval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::FetchError;
use crate::identity::Identity;
use crate::urls::{extract_domain, redact_credentials};

pub(crate) const BROWSER_FALLBACK_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Retrieves page bodies and binary resources on behalf of workers.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` as text, presenting `identity`.
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        identity: &Identity,
    ) -> Result<String, FetchError>;

    /// Fetches `url` as raw bytes (images).
    async fn fetch_bytes(
        &self,
        url: &str,
        timeout: Duration,
        identity: &Identity,
    ) -> Result<Vec<u8>, FetchError>;
}

/// `reqwest`-backed fetcher with a bounded number of in-flight requests and
/// one pooled client per outbound proxy.
pub struct HttpFetcher {
    direct: reqwest::Client,
    proxied: Mutex<HashMap<String, reqwest::Client>>,
    permits: Arc<Semaphore>,
}

impl HttpFetcher {
    /// Creates a fetcher that allows at most `max_in_flight` concurrent requests.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the underlying client cannot be built.
    pub fn new(max_in_flight: usize) -> Result<Self, FetchError> {
        Ok(Self {
            direct: build_client(None)?,
            proxied: Mutex::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        })
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<reqwest::Client, FetchError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };
        let mut clients = self
            .proxied
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }
        let client = build_client(Some(proxy))?;
        clients.insert(proxy.to_owned(), client.clone());
        Ok(client)
    }

    async fn send(
        &self,
        url: &str,
        timeout: Duration,
        identity: &Identity,
        accept: &str,
    ) -> Result<reqwest::Response, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::Timeout {
                url: redact_credentials(url),
            })?;
        let client = self.client_for(identity.proxy.as_deref())?;

        let mut user_agents = vec![identity
            .user_agent
            .clone()
            .unwrap_or_else(|| BROWSER_FALLBACK_UA.to_owned())];
        if user_agents[0] != BROWSER_FALLBACK_UA {
            user_agents.push(BROWSER_FALLBACK_UA.to_owned());
        }

        let mut last_status = None;
        for ua in user_agents {
            let response = client
                .get(url)
                .timeout(timeout)
                .header(reqwest::header::USER_AGENT, &ua)
                .header(reqwest::header::ACCEPT, accept)
                .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
                .send()
                .await
                .map_err(|e| classify(url, e))?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(FetchError::RateLimited {
                    domain: extract_domain(url),
                    retry_after_secs,
                });
            }
            if status.is_success() {
                return Ok(response);
            }
            // Some sites refuse unfamiliar agents but serve browser-like ones.
            if status == reqwest::StatusCode::FORBIDDEN {
                last_status = Some(status.as_u16());
                continue;
            }
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
                url: redact_credentials(url),
            });
        }

        Err(FetchError::UnexpectedStatus {
            status: last_status.unwrap_or(403),
            url: redact_credentials(url),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        identity: &Identity,
    ) -> Result<String, FetchError> {
        let response = self
            .send(url, timeout, identity, "text/html,application/xhtml+xml")
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(url, e))?;
        if body.trim().is_empty() {
            return Err(FetchError::UnexpectedStatus {
                status,
                url: redact_credentials(url),
            });
        }
        if looks_like_bot_challenge(&body) {
            return Err(FetchError::BotChallenge {
                url: redact_credentials(url),
            });
        }
        Ok(body)
    }

    async fn fetch_bytes(
        &self,
        url: &str,
        timeout: Duration,
        identity: &Identity,
    ) -> Result<Vec<u8>, FetchError> {
        let response = self.send(url, timeout, identity, "image/*,*/*;q=0.8").await?;
        let bytes = response.bytes().await.map_err(|e| classify(url, e))?;
        Ok(bytes.to_vec())
    }
}

fn build_client(proxy: Option<&str>) -> Result<reqwest::Client, FetchError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(5));
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url(proxy))?);
    }
    Ok(builder.build()?)
}

/// Bare `host:port` entries are treated as HTTP proxies; explicit schemes
/// (`socks5h://`, `https://`) are kept.
fn proxy_url(proxy: &str) -> String {
    if proxy.contains("://") {
        proxy.to_owned()
    } else {
        format!("http://{proxy}")
    }
}

fn classify(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: redact_credentials(url),
        }
    } else {
        FetchError::Http(err.without_url())
    }
}

/// Detects anti-bot interstitials that arrive with a 200 status.
pub(crate) fn looks_like_bot_challenge(body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    let has_cloudflare_banner = lowered.contains("attention required! | cloudflare");
    let has_challenge_platform = lowered.contains("/cdn-cgi/challenge-platform/");
    let has_just_a_moment = lowered.contains("just a moment...");
    let has_cookie_gate = lowered.contains("please enable cookies");
    let has_cf_chl = lowered.contains("cf-chl-");
    let has_unusual_traffic = lowered.contains("our systems have detected unusual traffic");

    has_cloudflare_banner
        || has_challenge_platform
        || has_unusual_traffic
        || (has_just_a_moment && has_cookie_gate)
        || (has_just_a_moment && has_cf_chl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_proxy_gets_http_scheme() {
        assert_eq!(proxy_url("10.0.0.1:8080"), "http://10.0.0.1:8080");
        assert_eq!(
            proxy_url("socks5h://127.0.0.1:9050"),
            "socks5h://127.0.0.1:9050"
        );
    }

    #[test]
    fn detects_cloudflare_challenge() {
        let body = "<title>Just a moment...</title><div>Please enable cookies.</div>";
        assert!(looks_like_bot_challenge(body));
    }

    #[test]
    fn detects_search_engine_captcha() {
        let body = "Our systems have detected unusual traffic from your computer network.";
        assert!(looks_like_bot_challenge(body));
    }

    #[test]
    fn ordinary_page_is_not_a_challenge() {
        let body = "<html><title>Acme Bakery</title><p>Just a moment of your time.</p></html>";
        assert!(!looks_like_bot_challenge(body));
    }
}
