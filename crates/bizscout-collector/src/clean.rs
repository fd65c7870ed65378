//! Post-collection cleaning and validation.
//!
//! Both passes take a record by reference and build a corrected copy; emitted
//! records are never modified in place.

use std::sync::LazyLock;

use bizscout_core::{is_known, CollectedRecord, INVALID};
use regex::Regex;

use crate::extract::filters::collapse_whitespace;

static EMAIL_SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email shape regex")
});

/// Cleaning knobs.
#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    /// Digits prefixed (with `+`) to phone numbers of ten or more digits that
    /// carry no country code.
    pub default_country_code: Option<String>,
}

/// Which fields [`validate_record`] checks.
#[derive(Debug, Clone, Copy)]
pub struct ValidationOptions {
    pub phone: bool,
    pub email: bool,
    pub website: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            phone: true,
            email: true,
            website: true,
        }
    }
}

/// Normalizes whitespace, phone, email, website and Instagram.
#[must_use]
pub fn clean_record(record: &CollectedRecord, options: &CleanOptions) -> CollectedRecord {
    let mut cleaned = record.clone();
    cleaned.name = map_known(&record.name, collapse_whitespace);
    cleaned.address = map_known(&record.address, collapse_whitespace);
    cleaned.phone = map_known(&record.phone, |p| {
        normalize_phone(p, options.default_country_code.as_deref())
    });
    cleaned.email = map_known(&record.email, |e| e.trim().to_lowercase());
    cleaned.website = map_known(&record.website, |w| ensure_scheme(w.trim()));
    cleaned.instagram = map_known(&record.instagram, instagram_url);
    cleaned.whatsapp = map_known(&record.whatsapp, |w| w.trim().to_owned());
    cleaned.niche = map_known(&record.niche, collapse_whitespace);
    if let Some(items) = &record.catalog_items {
        cleaned.set_catalog(
            items
                .iter()
                .map(|i| collapse_whitespace(i))
                .filter(|i| !i.is_empty())
                .collect(),
        );
    }
    cleaned
}

/// Marks malformed phone, email and website values as [`INVALID`].
#[must_use]
pub fn validate_record(record: &CollectedRecord, options: &ValidationOptions) -> CollectedRecord {
    let mut validated = record.clone();
    if options.phone && is_known(&record.phone) && !is_valid_phone(&record.phone) {
        INVALID.clone_into(&mut validated.phone);
    }
    if options.email && is_known(&record.email) && !EMAIL_SHAPE_RE.is_match(record.email.trim()) {
        INVALID.clone_into(&mut validated.email);
    }
    if options.website && is_known(&record.website) && !is_valid_website(&record.website) {
        INVALID.clone_into(&mut validated.website);
    }
    validated
}

fn map_known(value: &str, f: impl FnOnce(&str) -> String) -> String {
    if is_known(value) {
        f(value)
    } else {
        value.to_owned()
    }
}

/// Keeps digits and a leading `+`.
fn normalize_phone(raw: &str, default_country_code: Option<&str>) -> String {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with('+') {
        return format!("+{digits}");
    }
    match default_country_code {
        Some(cc) if digits.len() == 10 => format!("+{cc}{digits}"),
        Some(cc) if digits.len() > 10 && !digits.starts_with(cc) => format!("+{cc}{digits}"),
        Some(_) if digits.len() > 10 => format!("+{digits}"),
        _ => digits,
    }
}

/// `+` followed by 7 to 15 digits, or 7 to 15 bare digits.
fn is_valid_phone(phone: &str) -> bool {
    let body = phone.strip_prefix('+').unwrap_or(phone);
    (7..=15).contains(&body.len()) && body.chars().all(|c| c.is_ascii_digit())
}

fn is_valid_website(website: &str) -> bool {
    url::Url::parse(website).is_ok_and(|u| {
        matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| h.contains('.'))
    })
}

fn ensure_scheme(website: &str) -> String {
    if website.starts_with("http://") || website.starts_with("https://") {
        website.to_owned()
    } else {
        format!("https://{website}")
    }
}

/// `@acme` or `acme` → `https://www.instagram.com/acme/`. URLs pass through.
fn instagram_url(value: &str) -> String {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        return value.to_owned();
    }
    let handle = value.trim_start_matches('@').trim_matches('/');
    format!("https://www.instagram.com/{handle}/")
}
