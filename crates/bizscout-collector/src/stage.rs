//! Staging of downloaded resources (images, debug snapshots).

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::StageError;

/// Stores a resource and returns a caller-usable reference to it.
#[async_trait]
pub trait ResourceStager: Send + Sync {
    /// Writes `bytes` under a name derived from `suggested_name`.
    async fn stage(&self, bytes: &[u8], suggested_name: &str) -> Result<String, StageError>;
}

/// Writes resources into one directory, created on first use.
#[derive(Debug, Clone)]
pub struct DirectoryStager {
    dir: PathBuf,
}

impl DirectoryStager {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ResourceStager for DirectoryStager {
    async fn stage(&self, bytes: &[u8], suggested_name: &str) -> Result<String, StageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(suggested_name);
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "resource staged");
        Ok(path.display().to_string())
    }
}

/// `"Acme Bakery & Café"` → `"Acme_Bakery__Caf_<8 hex>.jpg"`: ASCII alphanumerics
/// kept, spaces to underscores, everything else dropped, plus a random suffix.
#[must_use]
pub fn image_file_name(business_name: &str) -> String {
    let safe: String = business_name
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect();
    let safe = safe.trim_matches('_');
    let safe = if safe.is_empty() { "business" } else { safe };
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{safe}_{}.jpg", &suffix[..8])
}
