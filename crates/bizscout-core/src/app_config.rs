use std::path::PathBuf;

/// Browser user agents rotated through when none are configured.
pub const DEFAULT_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:124.0) Gecko/20100101 Firefox/124.0",
];

#[derive(Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub target_count: usize,
    pub concurrency: usize,
    pub fetch_concurrency: usize,
    pub serp_concurrency: usize,
    pub batch_timeout_secs: u64,
    pub max_attempt_multiplier: usize,
    pub require_social_presence: bool,
    pub user_agents: Vec<String>,
    pub proxies: Vec<String>,
    pub tor_control_addr: Option<String>,
    pub rotate_every: usize,
    pub connectivity_poll_secs: u64,
    pub request_timeout_secs: u64,
    pub harvest_page_budget: usize,
    pub interaction_retries: u32,
    pub staging_dir: PathBuf,
    pub places_api_key: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("log_level", &self.log_level)
            .field("target_count", &self.target_count)
            .field("concurrency", &self.concurrency)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("serp_concurrency", &self.serp_concurrency)
            .field("batch_timeout_secs", &self.batch_timeout_secs)
            .field("max_attempt_multiplier", &self.max_attempt_multiplier)
            .field("require_social_presence", &self.require_social_presence)
            .field("user_agents", &self.user_agents.len())
            .field("proxies", &self.proxies.len())
            .field("tor_control_addr", &self.tor_control_addr)
            .field("rotate_every", &self.rotate_every)
            .field("connectivity_poll_secs", &self.connectivity_poll_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("harvest_page_budget", &self.harvest_page_budget)
            .field("interaction_retries", &self.interaction_retries)
            .field("staging_dir", &self.staging_dir)
            .field(
                "places_api_key",
                &self.places_api_key.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}
