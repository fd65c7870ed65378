//! Parsed page handle shared by every strategy.

use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;

use super::filters::collapse_whitespace;
use crate::urls::absolutize;

/// A parsed document (or fragment) plus the URL it was loaded from.
///
/// `scraper::Html` is not `Send`, so a handle is built and consumed inside
/// synchronous extraction code and never held across an `.await`.
pub struct PageHandle {
    doc: Html,
    url: Option<String>,
    raw: String,
}

impl PageHandle {
    /// Parses a full document served from `url`.
    #[must_use]
    pub fn parse(url: &str, html: &str) -> Self {
        Self {
            doc: Html::parse_document(html),
            url: Some(url.to_owned()),
            raw: html.to_owned(),
        }
    }

    /// Parses a detached element's outer HTML (a result-list entry).
    #[must_use]
    pub fn fragment(html: &str) -> Self {
        Self {
            doc: Html::parse_fragment(html),
            url: None,
            raw: html.to_owned(),
        }
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn document(&self) -> &Html {
        &self.doc
    }

    /// Elements matching `css`, in document order. Unparseable selectors match nothing.
    pub fn select<'a>(&'a self, css: &str) -> Vec<ElementRef<'a>> {
        match Selector::parse(css) {
            Ok(selector) => self.doc.select(&selector).collect(),
            Err(e) => {
                tracing::debug!(selector = css, error = %e, "invalid selector");
                Vec::new()
            }
        }
    }

    /// Collapsed visible text of the first element matching `css` that has any.
    #[must_use]
    pub fn first_text(&self, css: &str) -> Option<String> {
        self.select(css)
            .into_iter()
            .map(|el| element_text(&el))
            .find(|text| !text.is_empty())
    }

    /// First non-blank value of `attr` on elements matching `css`.
    #[must_use]
    pub fn first_attr(&self, css: &str, attr: &str) -> Option<String> {
        self.select(css)
            .into_iter()
            .filter_map(|el| el.value().attr(attr))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_owned)
    }

    /// Content of `<meta name=..>` or `<meta property=..>`.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<String> {
        self.first_attr(&format!(r#"meta[name="{key}"]"#), "content")
            .or_else(|| self.first_attr(&format!(r#"meta[property="{key}"]"#), "content"))
            .map(|v| collapse_whitespace(&v))
    }

    /// Visible text of the whole page: text nodes outside `script`, `style`,
    /// `noscript` and `template`, whitespace-collapsed.
    #[must_use]
    pub fn visible_text(&self) -> String {
        let mut parts = Vec::new();
        for node in self.doc.tree.root().descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let hidden = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
            });
            if !hidden {
                parts.push(&**text);
            }
        }
        collapse_whitespace(&parts.join(" "))
    }

    /// Every anchor `href` resolved against the page URL, in document order.
    /// Fragments without a URL keep only already-absolute links.
    #[must_use]
    pub fn absolute_links(&self) -> Vec<String> {
        self.select("a[href]")
            .into_iter()
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| self.resolve(href))
            .collect()
    }

    /// Anchors as `(absolute href, collapsed text)` pairs.
    #[must_use]
    pub fn anchors(&self) -> Vec<(String, String)> {
        self.select("a[href]")
            .into_iter()
            .filter_map(|a| {
                let href = self.resolve(a.value().attr("href")?)?;
                Some((href, element_text(&a)))
            })
            .collect()
    }

    /// Resolves `candidate` against the page URL.
    #[must_use]
    pub fn resolve(&self, candidate: &str) -> Option<String> {
        match &self.url {
            Some(base) => absolutize(base, candidate),
            None => url::Url::parse(candidate.trim())
                .ok()
                .filter(|u| matches!(u.scheme(), "http" | "https"))
                .map(|u| u.to_string()),
        }
    }

    /// Every JSON-LD object on the page, with `@graph` arrays and top-level
    /// arrays flattened.
    #[must_use]
    pub fn json_ld(&self) -> Vec<Value> {
        let mut out = Vec::new();
        for script in self.select(r#"script[type="application/ld+json"]"#) {
            let body: String = script.text().collect();
            let Ok(value) = serde_json::from_str::<Value>(body.trim()) else {
                continue;
            };
            flatten_json_ld(value, &mut out);
        }
        out
    }
}

fn flatten_json_ld(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_json_ld(item, out);
            }
        }
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_json_ld(graph, out);
            }
            if !map.is_empty() {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

/// Collapsed text content of one element.
#[must_use]
pub fn element_text(el: &ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}
