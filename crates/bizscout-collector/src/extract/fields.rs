//! Strategy tables, one per [`FieldKind`], most specific first.

use serde_json::Value;

use super::filters::clean_title;
use super::page::PageHandle;
use super::patterns::{first_email, first_instagram, first_phone, first_street_address, first_whatsapp};
use super::{FieldKind, Strategy};
use crate::urls::unwrap_redirect;

/// JSON-LD types describing something other than the business itself.
const NON_BUSINESS_LD_TYPES: [&str; 7] = [
    "Product",
    "Offer",
    "BreadcrumbList",
    "ListItem",
    "ImageObject",
    "SearchAction",
    "Review",
];

const NICHE_MAX_CHARS: usize = 200;

macro_rules! strategy {
    ($name:literal, $f:expr) => {
        Strategy {
            name: $name,
            run: $f,
        }
    };
}

static NAME: [Strategy; 8] = [
    strategy!("itemprop-name", name_itemprop),
    strategy!("json-ld-name", |p| business_ld_str(p, "name")),
    strategy!("heading", |p| p.first_text("h1")),
    strategy!("og-site-name", |p| p.meta("og:site_name")),
    strategy!("application-name", |p| p.meta("application-name")),
    strategy!("logo-alt", name_logo_alt),
    strategy!("title", |p| p.first_text("title").and_then(|t| clean_title(&t))),
    strategy!("twitter-title", |p| p.meta("twitter:title").and_then(|t| clean_title(&t))),
];

static PHONE: [Strategy; 5] = [
    strategy!("tel-link", phone_tel_link),
    strategy!("phone-item", phone_item),
    strategy!("itemprop-telephone", |p| itemprop(p, "telephone")),
    strategy!("json-ld-telephone", |p| business_ld_str(p, "telephone")),
    strategy!("text-pattern", |p| first_phone(&p.visible_text())),
];

static EMAIL: [Strategy; 5] = [
    strategy!("mailto-link", email_mailto),
    strategy!("itemprop-email", |p| itemprop(p, "email").and_then(|e| first_email(&e))),
    strategy!("json-ld-email", |p| business_ld_str(p, "email").and_then(|e| first_email(&e))),
    strategy!("text-pattern", |p| first_email(&p.visible_text())),
    strategy!("markup-pattern", |p| first_email(p.raw())),
];

static WEBSITE: [Strategy; 5] = [
    strategy!("authority-link", |p| resolved_href(p, r#"a[data-item-id="authority"]"#)),
    strategy!("website-labelled-link", website_labelled),
    strategy!("itemprop-url", website_itemprop),
    strategy!("json-ld-url", |p| business_ld_str(p, "url").and_then(|u| p.resolve(&u))),
    strategy!("canonical", |p| resolved_href(p, r#"link[rel="canonical"]"#)),
];

static INSTAGRAM: [Strategy; 2] = [
    strategy!("profile-link", |p| p.absolute_links().iter().find_map(|h| first_instagram(h))),
    strategy!("markup-pattern", |p| first_instagram(p.raw())),
];

static WHATSAPP: [Strategy; 3] = [
    strategy!("chat-link", |p| p.absolute_links().iter().find_map(|h| first_whatsapp(h))),
    strategy!("markup-pattern", |p| first_whatsapp(p.raw())),
    strategy!("labelled-phone", whatsapp_labelled_phone),
];

static ADDRESS: [Strategy; 6] = [
    strategy!("address-item", address_item),
    strategy!("itemprop-address", |p| p.first_text(r#"[itemprop="address"]"#)),
    strategy!("json-ld-address", address_json_ld),
    strategy!("address-element", |p| p.first_text("address")),
    strategy!("text-pattern", |p| first_street_address(&p.visible_text())),
    strategy!("markup-pattern", |p| first_street_address(p.raw())),
];

static NICHE: [Strategy; 5] = [
    strategy!("meta-description", |p| p.meta("description").map(|d| truncate_words(&d))),
    strategy!("og-description", |p| p.meta("og:description").map(|d| truncate_words(&d))),
    strategy!("itemprop-description", |p| itemprop(p, "description").map(|d| truncate_words(&d))),
    strategy!("about-block", |p| {
        p.first_text(".product-description, .about, .site-description")
            .map(|d| truncate_words(&d))
    }),
    strategy!("json-ld-description", |p| {
        business_ld_str(p, "description").map(|d| truncate_words(&d))
    }),
];

/// The ordered strategy table for `kind`.
#[must_use]
pub fn strategies_for(kind: FieldKind) -> &'static [Strategy] {
    match kind {
        FieldKind::Name => &NAME,
        FieldKind::Phone => &PHONE,
        FieldKind::Email => &EMAIL,
        FieldKind::Website => &WEBSITE,
        FieldKind::Instagram => &INSTAGRAM,
        FieldKind::Whatsapp => &WHATSAPP,
        FieldKind::Address => &ADDRESS,
        FieldKind::Niche => &NICHE,
    }
}

fn name_itemprop(page: &PageHandle) -> Option<String> {
    page.first_text(
        r#"[itemtype*="Organization"] [itemprop="name"], [itemtype*="LocalBusiness"] [itemprop="name"]"#,
    )
}

fn name_logo_alt(page: &PageHandle) -> Option<String> {
    page.first_attr(
        r#"img[class*="logo"][alt], img[id*="logo"][alt], .logo img[alt], header img[alt]"#,
        "alt",
    )
}

fn itemprop(page: &PageHandle, prop: &str) -> Option<String> {
    let css = format!(r#"[itemprop="{prop}"]"#);
    page.first_attr(&css, "content").or_else(|| page.first_text(&css))
}

/// String `key` from the first JSON-LD object that describes a business.
fn business_ld_str(page: &PageHandle, key: &str) -> Option<String> {
    page.json_ld()
        .iter()
        .filter(|obj| !is_non_business(obj))
        .find_map(|obj| match obj.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            _ => None,
        })
}

fn is_non_business(obj: &Value) -> bool {
    match obj.get("@type") {
        Some(Value::String(t)) => NON_BUSINESS_LD_TYPES.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .all(|t| NON_BUSINESS_LD_TYPES.contains(&t)),
        _ => false,
    }
}

fn phone_tel_link(page: &PageHandle) -> Option<String> {
    page.first_attr(r#"a[href^="tel:"]"#, "href")
        .map(|href| href.trim_start_matches("tel:").replace("%20", " "))
}

fn phone_item(page: &PageHandle) -> Option<String> {
    page.first_attr(r#"[data-item-id^="phone"]"#, "aria-label")
        .or_else(|| page.first_attr(r#"button[aria-label^="Phone"]"#, "aria-label"))
        .or_else(|| page.first_text(r#"[data-item-id^="phone"]"#))
        .and_then(|label| first_phone(&label))
}

fn email_mailto(page: &PageHandle) -> Option<String> {
    page.select(r#"a[href^="mailto:"]"#)
        .into_iter()
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| {
            let target = href.trim_start_matches("mailto:");
            let target = target.split('?').next().unwrap_or_default();
            first_email(&target.replace("%40", "@"))
        })
}

fn resolved_href(page: &PageHandle, css: &str) -> Option<String> {
    page.first_attr(css, "href")
        .and_then(|href| page.resolve(&href))
        .map(|href| unwrap_redirect(&href))
}

fn website_labelled(page: &PageHandle) -> Option<String> {
    page.select("a[href]").into_iter().find_map(|a| {
        let el = a.value();
        let label = [el.attr("aria-label"), el.attr("data-tooltip"), el.attr("title")]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if !label.contains("website") {
            return None;
        }
        page.resolve(el.attr("href")?).map(|href| unwrap_redirect(&href))
    })
}

fn website_itemprop(page: &PageHandle) -> Option<String> {
    page.first_attr(r#"a[itemprop="url"]"#, "href")
        .or_else(|| page.first_attr(r#"[itemprop="url"]"#, "content"))
        .and_then(|href| page.resolve(&href))
}

fn whatsapp_labelled_phone(page: &PageHandle) -> Option<String> {
    let text = page.visible_text();
    let start = text.to_ascii_lowercase().find("whatsapp")?;
    let window: String = text[start..].chars().take(80).collect();
    first_phone(&window)
}

fn address_item(page: &PageHandle) -> Option<String> {
    page.first_attr(r#"[data-item-id="address"]"#, "aria-label")
        .or_else(|| page.first_attr(r#"button[aria-label^="Address"]"#, "aria-label"))
        .or_else(|| page.first_text(r#"[data-item-id="address"]"#))
        .map(|label| {
            label
                .trim_start_matches("Address:")
                .trim_start_matches("Address")
                .trim()
                .to_owned()
        })
}

fn address_json_ld(page: &PageHandle) -> Option<String> {
    page.json_ld()
        .iter()
        .filter(|obj| !is_non_business(obj))
        .find_map(|obj| match obj.get("address")? {
            Value::String(s) => Some(s.clone()),
            Value::Object(parts) => {
                let joined = [
                    "streetAddress",
                    "addressLocality",
                    "addressRegion",
                    "postalCode",
                    "addressCountry",
                ]
                .iter()
                .filter_map(|k| parts.get(*k).and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
                (!joined.is_empty()).then_some(joined)
            }
            _ => None,
        })
}

/// Cuts a description to at most `NICHE_MAX_CHARS`, on a word boundary.
fn truncate_words(text: &str) -> String {
    if text.chars().count() <= NICHE_MAX_CHARS {
        return text.to_owned();
    }
    let mut out = String::new();
    for word in text.split_whitespace() {
        if out.chars().count() + word.chars().count() + 1 > NICHE_MAX_CHARS {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
