//! Multi-valued fields: opening hours, catalog snippets and the hero image.

use std::sync::LazyLock;

use bizscout_core::{HoursEntry, CATALOG_CAP};
use regex::Regex;
use serde_json::Value;

use super::filters::{collapse_whitespace, is_meaningful};
use super::page::{element_text, PageHandle};

/// Catalog entries taken from description blocks when no item list exists.
const FALLBACK_DESCRIPTION_CAP: usize = 5;

const DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

static DAY_INTERVAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b[\s:,]*((?:closed|open 24 hours|\d{1,2}(?::\d{2})?\s*(?:[ap]\.?m\.?)?\s*(?:-|–|to)\s*\d{1,2}(?::\d{2})?\s*(?:[ap]\.?m\.?)?))",
    )
    .expect("valid hours regex")
});

static BACKGROUND_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"background-image:\s*url\(\s*["']?([^"')]+)["']?\s*\)"#)
        .expect("valid background regex")
});

const CATALOG_ITEM_SELECTORS: &str = concat!(
    r#"[itemprop="itemListElement"] [itemprop="name"], "#,
    r#"[itemprop="hasMenuItem"] [itemprop="name"], "#,
    ".menu-item-title, .menu-item h3, .menu-item h4, ",
    ".product-title, .product-name, .product-card__title, .product-item-name, ",
    ".woocommerce-loop-product__title, [data-product-title]",
);

const DESCRIPTION_SELECTORS: &str =
    r#"[itemprop="description"], .description p, .fontBodyMedium, .service-description"#;

/// Day → interval table, tried as: table rows, `openingHours` microdata,
/// JSON-LD `openingHoursSpecification`, then free text.
#[must_use]
pub fn extract_hours(page: &PageHandle) -> Option<Vec<HoursEntry>> {
    let cascade: [fn(&PageHandle) -> Vec<HoursEntry>; 4] =
        [hours_table, hours_microdata, hours_json_ld, hours_text];
    cascade
        .iter()
        .map(|strategy| strategy(page))
        .find(|entries| !entries.is_empty())
}

/// Maps `"Mo"`, `"tue"`, `"Wednesday"`... to the full day name.
fn canonical_day(raw: &str) -> Option<&'static str> {
    let token: String = raw
        .trim()
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_lowercase();
    if token.len() < 2 {
        return None;
    }
    DAYS.iter()
        .copied()
        .find(|d| d.to_ascii_lowercase().starts_with(&token))
}

fn push_unique(entries: &mut Vec<HoursEntry>, day: &str, interval: &str) {
    let interval = collapse_whitespace(interval);
    if interval.is_empty() || entries.iter().any(|e| e.day == day) {
        return;
    }
    entries.push(HoursEntry {
        day: day.to_owned(),
        interval,
    });
}

fn hours_table(page: &PageHandle) -> Vec<HoursEntry> {
    let mut entries = Vec::new();
    for row in page.select("table tr") {
        let cells: Vec<String> = row
            .children()
            .filter_map(scraper::ElementRef::wrap)
            .map(|cell| element_text(&cell))
            .filter(|t| !t.is_empty())
            .collect();
        if cells.len() < 2 {
            continue;
        }
        if let Some(day) = canonical_day(&cells[0]) {
            push_unique(&mut entries, day, &cells[1..].join(", "));
        }
    }
    entries
}

fn hours_microdata(page: &PageHandle) -> Vec<HoursEntry> {
    let mut entries = Vec::new();
    for el in page.select(r#"[itemprop="openingHours"]"#) {
        let raw = el
            .value()
            .attr("content")
            .map_or_else(|| element_text(&el), str::to_owned);
        // "Mo-Fr 09:00-17:00" style spans are kept verbatim under their first day.
        if let Some((days, interval)) = raw.split_once(' ') {
            if let Some(day) = canonical_day(days) {
                push_unique(&mut entries, day, interval);
            }
        }
    }
    entries
}

fn hours_json_ld(page: &PageHandle) -> Vec<HoursEntry> {
    let mut entries = Vec::new();
    for obj in page.json_ld() {
        let Some(specs) = obj.get("openingHoursSpecification") else {
            continue;
        };
        let specs = match specs {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        for spec in specs {
            let opens = spec.get("opens").and_then(Value::as_str).unwrap_or_default();
            let closes = spec.get("closes").and_then(Value::as_str).unwrap_or_default();
            if opens.is_empty() || closes.is_empty() {
                continue;
            }
            let days = match spec.get("dayOfWeek") {
                Some(Value::String(d)) => vec![d.clone()],
                Some(Value::Array(ds)) => ds
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect(),
                _ => Vec::new(),
            };
            for raw_day in days {
                let name = raw_day.rsplit('/').next().unwrap_or_default();
                if let Some(day) = canonical_day(name) {
                    push_unique(&mut entries, day, &format!("{opens}–{closes}"));
                }
            }
        }
    }
    entries
}

fn hours_text(page: &PageHandle) -> Vec<HoursEntry> {
    let text = page.visible_text();
    let mut entries = Vec::new();
    for caps in DAY_INTERVAL_RE.captures_iter(&text) {
        if let Some(day) = canonical_day(&caps[1]) {
            push_unique(&mut entries, day, &caps[2]);
        }
    }
    entries
}

/// Menu items, products or services, at most [`CATALOG_CAP`].
///
/// Falls back to up to five description blocks when no item list is found.
#[must_use]
pub fn extract_catalog(page: &PageHandle) -> Vec<String> {
    let items = collect_distinct(page, CATALOG_ITEM_SELECTORS, CATALOG_CAP);
    if !items.is_empty() {
        return items;
    }
    collect_distinct(page, DESCRIPTION_SELECTORS, FALLBACK_DESCRIPTION_CAP)
}

fn collect_distinct(page: &PageHandle, css: &str, cap: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for el in page.select(css) {
        let text = element_text(&el);
        if is_meaningful(&text) && !out.contains(&text) {
            out.push(text);
            if out.len() == cap {
                break;
            }
        }
    }
    out
}

/// Absolute URL of the page's representative image: hero/photo button,
/// inline `background-image`, `og:image`, then microdata `image`.
#[must_use]
pub fn extract_image_url(page: &PageHandle) -> Option<String> {
    let candidates = [
        page.first_attr(r#"button[jsaction*="heroHeaderImage"] img"#, "src"),
        page.first_attr(r#"button[aria-label^="Photo"] img"#, "src"),
        page.select("[style]").into_iter().find_map(|el| {
            let style = el.value().attr("style")?;
            BACKGROUND_URL_RE
                .captures(style)
                .map(|caps| caps[1].to_owned())
        }),
        page.meta("og:image"),
        page.first_attr(r#"img[itemprop="image"]"#, "src"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter(|src| !src.starts_with("data:"))
        .find_map(|src| page.resolve(&src))
}
