//! URL domain, redaction and link-resolution helpers.

/// Query parameters that carry credentials and never appear in errors or logs.
const SECRET_PARAMS: &[&str] = &["key", "api_key", "apikey", "token", "access_token"];

/// Drops credential query parameters from a URL.
///
/// `"https://x.test/photo?ref=1&key=abc"` becomes `"https://x.test/photo?ref=1"`.
/// Unparseable input is cut at the query string.
#[must_use]
pub fn redact_credentials(raw: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(raw) else {
        return raw.split('?').next().unwrap_or_default().to_owned();
    };
    if parsed.query().is_none() {
        return parsed.into();
    }
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !SECRET_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    parsed.into()
}

/// Extracts the hostname (without a leading `www.`) from a URL.
///
/// Falls back to the input string if parsing fails.
#[must_use]
pub fn extract_domain(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_owned()))
        .unwrap_or_else(|| raw.to_owned())
}

/// Derives a display name from a URL's domain: `https://www.blue-fern.co.uk` → `"Blue-fern"`.
#[must_use]
pub fn name_from_domain(raw: &str) -> Option<String> {
    let host = url::Url::parse(raw).ok()?.host_str()?.to_lowercase();
    let host = host.trim_start_matches("www.");
    let label = host.split('.').next().filter(|l| !l.is_empty())?;
    if !host.contains('.') {
        return None;
    }
    let mut chars = label.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

/// Resolves `candidate` against `base`, returning only `http`/`https` results.
///
/// HTML-escaped ampersands are decoded first; fragments are stripped.
#[must_use]
pub fn absolutize(base: &str, candidate: &str) -> Option<String> {
    let candidate = candidate.trim().replace("&amp;", "&");
    if candidate.is_empty() {
        return None;
    }
    let base = url::Url::parse(base).ok()?;
    let mut joined = base.join(&candidate).ok()?;
    if !matches!(joined.scheme(), "http" | "https") {
        return None;
    }
    joined.set_fragment(None);
    Some(joined.to_string())
}

/// Unwraps search-engine redirect links (`/url?q=<target>&sa=..`) to their
/// target; any other URL is returned unchanged.
#[must_use]
pub fn unwrap_redirect(href: &str) -> String {
    let Ok(parsed) = url::Url::parse(href) else {
        return href.to_owned();
    };
    if parsed.path() != "/url" {
        return href.to_owned();
    }
    parsed
        .query_pairs()
        .find(|(k, _)| k == "q" || k == "url")
        .map_or_else(|| href.to_owned(), |(_, v)| v.into_owned())
}
