mod app_config;
mod config;
pub mod record;

use std::path::PathBuf;

use thiserror::Error;

pub use app_config::{AppConfig, DEFAULT_USER_AGENTS};
pub use config::{load_app_config, load_app_config_from_env};
pub use record::{
    is_known, or_unknown, CollectedRecord, HoursEntry, SocialLink, SourceKind, SourceTag,
    CATALOG_CAP, INVALID, UNKNOWN,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("cannot read proxy file {}: {source}", path.display())]
    ProxyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
