//! Field extraction heuristics.
//!
//! Every field has an ordered table of [`Strategy`] functions. [`extract_field`]
//! runs them in order and returns the first result that passes the field's
//! validity filter; when all are exhausted the field is `UNKNOWN`. Adding a
//! strategy means appending to a table in `fields.rs`, nothing else.

mod fields;
pub mod filters;
mod lists;
pub mod page;
pub mod patterns;
pub mod platform;
mod seed;
pub mod social;

use bizscout_core::UNKNOWN;

pub use fields::strategies_for;
pub use lists::{extract_catalog, extract_hours, extract_image_url};
pub use page::PageHandle;
pub use platform::{detect_platform, Platform};
pub use seed::{read_seed, Seed};
pub use social::extract_other_socials;

/// The single-valued fields the heuristics know how to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Name,
    Phone,
    Email,
    Website,
    Instagram,
    Whatsapp,
    Address,
    Niche,
}

impl FieldKind {
    pub const ALL: [FieldKind; 8] = [
        FieldKind::Name,
        FieldKind::Phone,
        FieldKind::Email,
        FieldKind::Website,
        FieldKind::Instagram,
        FieldKind::Whatsapp,
        FieldKind::Address,
        FieldKind::Niche,
    ];

    fn is_valid(self, value: &str) -> bool {
        match self {
            FieldKind::Name => filters::valid_name(value),
            FieldKind::Phone => filters::valid_phone(value),
            FieldKind::Email => filters::valid_email(value),
            FieldKind::Website => filters::valid_website(value),
            FieldKind::Address => filters::valid_address(value),
            FieldKind::Niche => filters::valid_niche(value),
            FieldKind::Instagram | FieldKind::Whatsapp => filters::is_meaningful(value),
        }
    }
}

/// One named way of deriving a value from a page.
///
/// Strategies are plain functions: a miss is `None`, never an error.
#[derive(Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    pub run: fn(&PageHandle) -> Option<String>,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy").field("name", &self.name).finish()
    }
}

/// Runs `strategies` in order and returns the first value accepted by `valid`,
/// together with the name of the strategy that produced it.
pub fn first_valid(
    page: &PageHandle,
    strategies: &[Strategy],
    valid: impl Fn(&str) -> bool,
) -> Option<(String, &'static str)> {
    for strategy in strategies {
        let Some(raw) = (strategy.run)(page) else {
            continue;
        };
        let value = filters::collapse_whitespace(&raw);
        if valid(&value) {
            return Some((value, strategy.name));
        }
        tracing::trace!(strategy = strategy.name, value, "strategy result rejected");
    }
    None
}

/// Extracts one field: `(value, true)` from the first passing strategy, or
/// `(UNKNOWN, false)` when every strategy missed.
///
/// Names fall back to a domain-derived guess when the page has a URL and all
/// textual strategies were rejected.
#[must_use]
pub fn extract_field(page: &PageHandle, kind: FieldKind) -> (String, bool) {
    if let Some((value, strategy)) = first_valid(page, strategies_for(kind), |v| kind.is_valid(v)) {
        tracing::trace!(field = ?kind, strategy, "field extracted");
        return (value, true);
    }
    if kind == FieldKind::Name {
        if let Some(name) = page.url().and_then(crate::urls::name_from_domain) {
            return (name, true);
        }
    }
    (UNKNOWN.to_owned(), false)
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
