//! Free-text patterns shared by the field cascades and the email harvester.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Plain and obfuscated addresses: `a@b.com`, `a @ b.com`, `a[@]b.com`,
/// `a [at] b.com`, `a (at) b.com`, `a(a)b.com`.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b([a-z0-9._%+-]+)\s*(?:@|\[\s*@\s*\]|\[\s*at\s*\]|\(\s*(?:at|a)\s*\))\s*([a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,})\b",
    )
    .expect("valid email regex")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{2,4}\)|\d{2,4})[\s.-]?\d{3,4}[\s.-]?\d{3,4}")
        .expect("valid phone regex")
});

static INSTAGRAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://(?:www\.)?instagram\.com/([a-z0-9_.]{1,30})/?")
        .expect("valid instagram regex")
});

static WHATSAPP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:wa\.me/|api\.whatsapp\.com/send\?phone=|whatsapp://send\?phone=)\+?(\d{6,15})")
        .expect("valid whatsapp regex")
});

static STREET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d{1,6}\s+[a-z0-9.'\- ]{2,40}\b(?:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr|way|court|ct|place|pl|highway|hwy|parkway|pkwy)\b\.?(?:,\s*[a-z '\-]{2,40})?(?:,\s*[a-z]{2}\s*\d{5}(?:-\d{4})?)?",
    )
    .expect("valid street regex")
});

const IMAGE_SUFFIXES: [&str; 6] = ["png", "jpg", "jpeg", "gif", "svg", "webp"];

/// Instagram paths that are site sections rather than profiles.
const RESERVED_INSTAGRAM_PATHS: [&str; 8] = [
    "p", "explore", "accounts", "reel", "reels", "stories", "tv", "direct",
];

/// Finds every email in `text`, normalized to lowercase `local@domain`, in
/// first-seen order without repeats.
#[must_use]
pub fn find_emails(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for caps in EMAIL_RE.captures_iter(text) {
        let local = caps[1].trim_matches('.').to_lowercase();
        let domain = caps[2].to_lowercase();
        if local.is_empty() {
            continue;
        }
        // `logo@2x.png` style asset names.
        if domain
            .rsplit('.')
            .next()
            .is_some_and(|tld| IMAGE_SUFFIXES.contains(&tld))
        {
            continue;
        }
        let email = format!("{local}@{domain}");
        if seen.insert(email.clone()) {
            out.push(email);
        }
    }
    out
}

/// Returns the first email found in `text`.
#[must_use]
pub fn first_email(text: &str) -> Option<String> {
    find_emails(text).into_iter().next()
}

/// Returns the first phone-number-shaped run in `text` with at least seven digits.
#[must_use]
pub fn first_phone(text: &str) -> Option<String> {
    PHONE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_owned())
        .find(|candidate| digit_count(candidate) >= 7)
}

#[must_use]
pub fn digit_count(value: &str) -> usize {
    value.chars().filter(char::is_ascii_digit).count()
}

/// Returns a canonical `https://www.instagram.com/<handle>/` URL for the
/// first profile link in `text`.
#[must_use]
pub fn first_instagram(text: &str) -> Option<String> {
    INSTAGRAM_RE.captures_iter(text).find_map(|caps| {
        let handle = caps[1].trim_end_matches('.');
        let lowered = handle.to_ascii_lowercase();
        if handle.is_empty() || RESERVED_INSTAGRAM_PATHS.contains(&lowered.as_str()) {
            None
        } else {
            Some(format!("https://www.instagram.com/{handle}/"))
        }
    })
}

/// Returns a canonical `https://wa.me/<digits>` link for the first WhatsApp
/// reference in `text`.
#[must_use]
pub fn first_whatsapp(text: &str) -> Option<String> {
    WHATSAPP_RE
        .captures(text)
        .map(|caps| format!("https://wa.me/{}", &caps[1]))
}

/// Returns the first street-address-shaped phrase in `text`.
#[must_use]
pub fn first_street_address(text: &str) -> Option<String> {
    STREET_RE
        .find(text)
        .map(|m| m.as_str().trim().trim_end_matches(',').to_owned())
}
