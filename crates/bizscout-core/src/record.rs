use serde::{Deserialize, Serialize};

/// Sentinel stored in every text field that could not be determined.
///
/// Fields never hold an empty string; "not found" is always spelled this way.
pub const UNKNOWN: &str = "N/A";

/// Marker written by validation passes over a value that was present but malformed.
pub const INVALID: &str = "N/A (Invalid)";

/// Maximum number of catalog snippets retained per record.
pub const CATALOG_CAP: usize = 10;

/// Returns `true` if `value` carries real data (not the sentinel, not blank).
#[must_use]
pub fn is_known(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed != UNKNOWN && trimmed != INVALID
}

/// Returns `value` unchanged when it carries data, otherwise the sentinel.
#[must_use]
pub fn or_unknown(value: Option<String>) -> String {
    match value {
        Some(v) if is_known(&v) => v,
        _ => UNKNOWN.to_owned(),
    }
}

/// Where a record was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Paged result list with per-entry detail views.
    Listing,
    /// Structured places API returning ready-made records.
    PlacesApi,
    /// Search-engine result pages pointing at arbitrary websites.
    Web,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Listing => write!(f, "listing"),
            SourceKind::PlacesApi => write!(f, "places_api"),
            SourceKind::Web => write!(f, "web"),
        }
    }
}

/// The search context a record was collected under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTag {
    pub country: String,
    pub state: String,
    pub location: String,
    pub query: String,
}

impl Default for SourceTag {
    fn default() -> Self {
        Self {
            country: UNKNOWN.to_owned(),
            state: UNKNOWN.to_owned(),
            location: UNKNOWN.to_owned(),
            query: UNKNOWN.to_owned(),
        }
    }
}

/// One labelled social profile link, e.g. `("Facebook", "https://facebook.com/acme")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLink {
    pub label: String,
    pub url: String,
}

/// Opening interval for one day, e.g. `("Monday", "9 AM–5 PM")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoursEntry {
    pub day: String,
    pub interval: String,
}

/// One business entity collected during a run.
///
/// Text fields default to [`UNKNOWN`]. Once a record has been emitted by a
/// run it is treated as immutable; cleaning passes build a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedRecord {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub website: String,
    pub instagram: String,
    pub other_socials: Vec<SocialLink>,
    pub whatsapp: String,
    pub address: String,
    pub hours: Option<Vec<HoursEntry>>,
    /// Menu items, products or services. Never longer than [`CATALOG_CAP`].
    pub catalog_items: Option<Vec<String>>,
    /// Short description of what the business does (web-sourced records).
    pub niche: String,
    /// Detected e-commerce platform (web-sourced records).
    pub platform: String,
    pub source_tag: SourceTag,
    pub source_kind: SourceKind,
    /// Handle returned by the resource stager for a captured image.
    pub image_ref: Option<String>,
}

impl CollectedRecord {
    /// Creates an all-unknown record for the given source.
    #[must_use]
    pub fn new(source_kind: SourceKind) -> Self {
        Self {
            name: UNKNOWN.to_owned(),
            phone: UNKNOWN.to_owned(),
            email: UNKNOWN.to_owned(),
            website: UNKNOWN.to_owned(),
            instagram: UNKNOWN.to_owned(),
            other_socials: Vec::new(),
            whatsapp: UNKNOWN.to_owned(),
            address: UNKNOWN.to_owned(),
            hours: None,
            catalog_items: None,
            niche: UNKNOWN.to_owned(),
            platform: UNKNOWN.to_owned(),
            source_tag: SourceTag::default(),
            source_kind,
            image_ref: None,
        }
    }

    /// Returns `true` if the record has a website or an Instagram profile.
    #[must_use]
    pub fn has_social_presence(&self) -> bool {
        is_known(&self.website) || is_known(&self.instagram)
    }

    /// Replaces the catalog, truncating to [`CATALOG_CAP`] entries.
    ///
    /// An empty list is stored as `None`.
    pub fn set_catalog(&mut self, mut items: Vec<String>) {
        items.truncate(CATALOG_CAP);
        self.catalog_items = if items.is_empty() { None } else { Some(items) };
    }
}
