//! Run-scoped duplicate suppression.

use std::collections::HashSet;
use std::sync::Mutex;

use bizscout_core::{is_known, CollectedRecord, SourceKind};
use sha2::{Digest, Sha256};

/// Compute the identity key for a record.
///
/// SHA-256 over the lower-cased, whitespace-collapsed name and a
/// discriminator: the address for listing and API records, the website
/// domain for web records. Hex-encoded.
#[must_use]
pub fn dedup_key(record: &CollectedRecord) -> String {
    let discriminator = match record.source_kind {
        SourceKind::Listing | SourceKind::PlacesApi => normalize(&record.address),
        SourceKind::Web => website_domain(&record.website),
    };
    let input = format!("{}\x00{}", normalize(&record.name), discriminator);
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn website_domain(website: &str) -> String {
    if !is_known(website) {
        return normalize(website);
    }
    let parsed = url::Url::parse(website)
        .or_else(|_| url::Url::parse(&format!("https://{}", website.trim())));
    parsed
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .map_or_else(
            || normalize(website),
            |host| host.trim_start_matches("www.").to_owned(),
        )
}

/// Set of identity keys seen during one run.
///
/// `admit` is atomic: when several workers race on the same key exactly one
/// of them is admitted.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: Mutex<HashSet<String>>,
}

impl Deduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the record's key. Returns `false` if it was already present.
    pub fn admit(&self, record: &CollectedRecord) -> bool {
        let key = dedup_key(record);
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn listing(name: &str, address: &str) -> CollectedRecord {
        let mut r = CollectedRecord::new(SourceKind::Listing);
        r.name = name.to_owned();
        r.address = address.to_owned();
        r
    }

    fn web(name: &str, website: &str) -> CollectedRecord {
        let mut r = CollectedRecord::new(SourceKind::Web);
        r.name = name.to_owned();
        r.website = website.to_owned();
        r
    }

    #[test]
    fn key_ignores_case_and_whitespace() {
        let a = listing("Acme  Bakery", "12 Main St,  Springfield");
        let b = listing(" acme bakery ", "12 MAIN ST, springfield");
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }

    #[test]
    fn same_name_different_address_is_distinct() {
        let a = listing("Acme Bakery", "12 Main St");
        let b = listing("Acme Bakery", "99 Oak Ave");
        assert_ne!(dedup_key(&a), dedup_key(&b));
    }

    #[test]
    fn web_records_key_on_domain_not_path() {
        let a = web("Acme", "https://www.acme.com/about");
        let b = web("Acme", "http://acme.com/");
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }

    #[test]
    fn admit_rejects_repeat() {
        let dedup = Deduplicator::new();
        assert!(dedup.admit(&listing("Acme", "1 Main St")));
        assert!(!dedup.admit(&listing("ACME", "1 main st")));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn concurrent_admits_of_same_key_admit_exactly_once() {
        let dedup = Arc::new(Deduplicator::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let dedup = Arc::clone(&dedup);
                std::thread::spawn(move || dedup.admit(&listing("Acme", "1 Main St")))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
