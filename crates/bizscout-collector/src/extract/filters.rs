//! Per-field validity filters applied to every strategy result.

use bizscout_core::{INVALID, UNKNOWN};

use super::patterns::digit_count;

/// Strings some sources render where a value should be.
const PLACEHOLDERS: [&str; 6] = ["results", "unknown", "loading...", "sponsored", "", "-"];

/// Page titles that say nothing about the business behind them.
const GENERIC_TERMS: [&str; 16] = [
    "home",
    "welcome",
    "index",
    "page not found",
    "404",
    "access denied",
    "login",
    "log in",
    "sign in",
    "register",
    "contact us",
    "about us",
    "privacy policy",
    "terms of service",
    "sitemap",
    "search results",
];

const NAME_MAX_CHARS: usize = 120;

/// Title separators, widest first.
const TITLE_SEPARATORS: [&str; 7] = [" | ", " - ", " – ", " — ", " :: ", " » ", " · "];

/// Non-empty, not a sentinel, not a placeholder.
#[must_use]
pub fn is_meaningful(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    !PLACEHOLDERS.contains(&lowered.as_str())
        && !lowered.eq_ignore_ascii_case(UNKNOWN)
        && !lowered.eq_ignore_ascii_case(INVALID)
}

/// `true` when `value` is (or starts with) a generic page title such as
/// "Home" or "404 - Page Not Found".
#[must_use]
pub fn is_generic_title(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    GENERIC_TERMS.iter().any(|term| {
        lowered == *term
            || lowered.starts_with(&format!("{term} "))
            || lowered.ends_with(&format!(" {term}"))
    })
}

#[must_use]
pub fn valid_name(value: &str) -> bool {
    is_meaningful(value)
        && !is_generic_title(value)
        && value.chars().count() <= NAME_MAX_CHARS
        && value.chars().any(char::is_alphanumeric)
}

#[must_use]
pub fn valid_phone(value: &str) -> bool {
    is_meaningful(value) && (7..=15).contains(&digit_count(value))
}

#[must_use]
pub fn valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Absolute `http(s)` URL that does not point at a social network or a
/// search engine.
#[must_use]
pub fn valid_website(value: &str) -> bool {
    let Ok(parsed) = url::Url::parse(value) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    !host.is_empty() && !super::social::is_platform_host(&host)
}

/// At least one digit and more than three whitespace-separated tokens.
#[must_use]
pub fn valid_address(value: &str) -> bool {
    is_meaningful(value)
        && value.chars().any(|c| c.is_ascii_digit())
        && value.split_whitespace().count() > 3
}

#[must_use]
pub fn valid_niche(value: &str) -> bool {
    let len = value.chars().count();
    is_meaningful(value) && !is_generic_title(value) && (3..=200).contains(&len)
}

/// Picks the first name-like segment of a `<title>`:
/// `"Home | Acme Bakery"` yields `"Acme Bakery"`.
#[must_use]
pub fn clean_title(title: &str) -> Option<String> {
    let title = collapse_whitespace(title);
    let separator = TITLE_SEPARATORS.iter().find(|sep| title.contains(**sep));
    let segments: Vec<&str> = match separator {
        Some(sep) => title.split(*sep).map(str::trim).collect(),
        None => vec![title.trim()],
    };
    segments
        .into_iter()
        .find(|segment| valid_name(segment))
        .map(str::to_owned)
}

/// Collapses internal runs of whitespace to single spaces and trims.
#[must_use]
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_not_meaningful() {
        assert!(!is_meaningful("Results"));
        assert!(!is_meaningful("  "));
        assert!(!is_meaningful("N/A"));
        assert!(is_meaningful("Acme"));
    }

    #[test]
    fn generic_titles_are_rejected_as_names() {
        assert!(!valid_name("Home"));
        assert!(!valid_name("404 Page Not Found"));
        assert!(!valid_name("Search results"));
        assert!(valid_name("Homestead Bakery"));
    }

    #[test]
    fn address_needs_digit_and_four_tokens() {
        assert!(valid_address("12 Main St Springfield"));
        assert!(!valid_address("Main Street Springfield Illinois"));
        assert!(!valid_address("12 Main St"));
    }

    #[test]
    fn website_rejects_social_hosts() {
        assert!(valid_website("https://acme.com/"));
        assert!(!valid_website("https://www.facebook.com/acme"));
        assert!(!valid_website("acme.com"));
    }

    #[test]
    fn clean_title_skips_generic_segments() {
        assert_eq!(clean_title("Home | Acme Bakery").as_deref(), Some("Acme Bakery"));
        assert_eq!(
            clean_title("Acme Bakery - Fresh bread daily").as_deref(),
            Some("Acme Bakery")
        );
        assert!(clean_title("Login").is_none());
    }
}
