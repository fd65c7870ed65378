use thiserror::Error;

/// Failure to retrieve one page or resource.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("rate limited by {domain} (retry after {retry_after_secs}s)")]
    RateLimited {
        domain: String,
        retry_after_secs: u64,
    },

    #[error("bot challenge page served by {url}")]
    BotChallenge { url: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure reported by a listing interaction driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("result element {index} could not be activated: {reason}")]
    Interaction { index: usize, reason: String },

    #[error("automation driver error: {0}")]
    Automation(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Remediation category attached to fatal run errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationHint {
    /// Check the network connection, proxy, or anonymity-network settings.
    Connectivity,
    /// Try different keywords or a more specific location.
    QuerySpecificity,
    /// The automation tooling (driver, selectors) is incompatible with the source.
    AutomationTooling,
}

impl std::fmt::Display for RemediationHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemediationHint::Connectivity => {
                write!(f, "check your internet connection and proxy settings")
            }
            RemediationHint::QuerySpecificity => {
                write!(f, "try different keywords or a more specific location")
            }
            RemediationHint::AutomationTooling => write!(
                f,
                "the page automation tooling may be incompatible with the source; update the driver or selectors"
            ),
        }
    }
}

/// Failure raised by a source provider while locating or paging candidates.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no results found: {detail}")]
    NoResults { detail: String },

    #[error("results could not be located: {detail}")]
    Unreachable {
        detail: String,
        /// Page source captured at the time of failure, for troubleshooting.
        page_source: Option<String>,
    },

    #[error("transport error: {0}")]
    Transport(#[from] FetchError),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

impl SourceError {
    /// Maps the error onto the remediation category shown to users.
    #[must_use]
    pub fn hint(&self) -> RemediationHint {
        match self {
            SourceError::NoResults { .. } => RemediationHint::QuerySpecificity,
            SourceError::Unreachable { .. } | SourceError::Driver(DriverError::Automation(_)) => {
                RemediationHint::AutomationTooling
            }
            SourceError::Transport(_)
            | SourceError::Driver(DriverError::Fetch(_) | DriverError::Interaction { .. }) => {
                RemediationHint::Connectivity
            }
        }
    }
}

/// Failure while staging a downloaded resource.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Fatal, run-terminating errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("source unreachable: {detail} ({hint})")]
    SourceUnreachable {
        detail: String,
        hint: RemediationHint,
        /// Stager reference of the saved page snapshot, if one was captured.
        snapshot: Option<String>,
    },

    #[error("aborted after {failures} consecutive batch failures; last error: {last_error} ({hint})")]
    ConsecutiveBatchFailures {
        failures: u32,
        last_error: String,
        hint: RemediationHint,
    },

    #[error("collection task stopped unexpectedly: {0}")]
    Interrupted(String),
}

impl RunError {
    #[must_use]
    pub fn hint(&self) -> RemediationHint {
        match self {
            RunError::SourceUnreachable { hint, .. }
            | RunError::ConsecutiveBatchFailures { hint, .. } => *hint,
            RunError::Interrupted(_) => RemediationHint::AutomationTooling,
        }
    }
}
