//! Low-confidence name/address read straight off a result-list entry.

use super::filters::{collapse_whitespace, valid_address, valid_name};
use super::page::PageHandle;

/// Values read from a result entry before its detail view is opened. Used
/// when the detail page itself only yields placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Seed {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Reads a seed from an entry's outer HTML and its rendered text.
#[must_use]
pub fn read_seed(html: &str, text: &str) -> Seed {
    let page = PageHandle::fragment(html);

    let name = [
        page.first_attr("a[aria-label]", "aria-label"),
        page.first_attr("[aria-label]", "aria-label"),
        page.first_text(r#"[role="heading"], .fontHeadlineSmall, h1, h2, h3, h4"#),
        text.lines().map(str::trim).find(|l| !l.is_empty()).map(str::to_owned),
    ]
    .into_iter()
    .flatten()
    .map(|n| collapse_whitespace(&n))
    .find(|n| valid_name(n));

    // Result rows render "Category · 12 Main St" style segments.
    let address = text
        .lines()
        .flat_map(|line| line.split('·'))
        .map(collapse_whitespace)
        .find(|segment| valid_address(segment));

    Seed { name, address }
}
