//! Contact email discovery on one site.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bizscout_core::UNKNOWN;
use tokio_util::sync::CancellationToken;

use crate::extract::patterns::find_emails;
use crate::extract::PageHandle;
use crate::fetch::PageFetcher;
use crate::identity::IdentityController;
use crate::urls::extract_domain;

/// Anchor-text fragments that mark a page as likely to carry contact details.
pub const CONTACT_KEYWORDS: [&str; 6] = ["contact", "about", "team", "staff", "reach", "connect"];

/// What one harvest found.
#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    /// Unique emails in discovery order.
    pub emails: Vec<String>,
    /// Pages attempted, including ones that failed to load.
    pub pages_visited: usize,
    /// Body of the root page, when it loaded.
    pub root_page: Option<String>,
}

/// Breadth-limited crawler that follows contact-like links from a site root.
#[derive(Clone)]
pub struct EmailHarvester {
    fetcher: Arc<dyn PageFetcher>,
    identity: Arc<IdentityController>,
    timeout: Duration,
}

impl EmailHarvester {
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        identity: Arc<IdentityController>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            identity,
            timeout,
        }
    }

    /// Visits at most `page_budget` pages starting at `root_url` (the root
    /// counts as one). Pages that fail to load are skipped without retry and
    /// still count against the budget. Stops early once `cancel` fires.
    pub async fn harvest(
        &self,
        root_url: &str,
        page_budget: usize,
        cancel: &CancellationToken,
    ) -> HarvestReport {
        let mut report = HarvestReport::default();
        let mut seen_emails = HashSet::new();
        let mut queued: HashSet<String> = HashSet::from([root_url.to_owned()]);
        let mut frontier = VecDeque::from([root_url.to_owned()]);
        let site = extract_domain(root_url);

        while report.pages_visited < page_budget {
            let Some(url) = frontier.pop_front() else {
                break;
            };
            if cancel.is_cancelled() {
                break;
            }
            report.pages_visited += 1;

            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.identity.before_request() => {}
            }
            let identity = self.identity.current();
            let body = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.fetcher.fetch(&url, self.timeout, &identity) => result,
            };
            let body = match body {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(url, error = %e, "harvest page failed to load");
                    continue;
                }
            };

            let (emails, links) = scan_page(&url, &body, &site);
            for email in emails {
                if seen_emails.insert(email.clone()) {
                    report.emails.push(email);
                }
            }
            for link in links {
                if queued.insert(link.clone()) {
                    frontier.push_back(link);
                }
            }
            if url == root_url {
                report.root_page = Some(body);
            }
        }

        tracing::debug!(
            root_url,
            pages_visited = report.pages_visited,
            emails = report.emails.len(),
            "harvest finished"
        );
        report
    }

    /// Like [`harvest`](Self::harvest) but returns only the emails, or a
    /// single `UNKNOWN` entry when none were found.
    pub async fn harvest_emails(
        &self,
        root_url: &str,
        page_budget: usize,
        cancel: &CancellationToken,
    ) -> Vec<String> {
        let report = self.harvest(root_url, page_budget, cancel).await;
        if report.emails.is_empty() {
            vec![UNKNOWN.to_owned()]
        } else {
            report.emails
        }
    }
}

/// Emails in the page's visible text and `mailto:` links, plus same-site
/// links whose anchor text contains a contact keyword.
fn scan_page(url: &str, body: &str, site: &str) -> (Vec<String>, Vec<String>) {
    let page = PageHandle::parse(url, body);

    let mut emails = find_emails(&page.visible_text());
    for a in page.select(r#"a[href^="mailto:"]"#) {
        if let Some(href) = a.value().attr("href") {
            let target = href.trim_start_matches("mailto:").replace("%40", "@");
            emails.extend(find_emails(target.split('?').next().unwrap_or_default()));
        }
    }

    let links = page
        .anchors()
        .into_iter()
        .filter(|(href, text)| {
            let text = text.to_lowercase();
            CONTACT_KEYWORDS.iter().any(|k| text.contains(k)) && extract_domain(href) == site
        })
        .map(|(href, _)| href)
        .collect();

    (emails, links)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_collects_text_and_mailto_emails() {
        let html = r#"<html><body>
            <p>Reach jane (at) shop.com</p>
            <a href="mailto:Orders@Shop.com?subject=hi">email us</a>
            <a href="/contact-us">Contact Us</a>
            <a href="/about">About the team</a>
            <a href="/shop">Shop</a>
            <a href="https://facebook.com/shop">Connect on Facebook</a>
        </body></html>"#;
        let (emails, links) = scan_page("https://shop.com/", html, "shop.com");
        assert_eq!(emails, ["jane@shop.com", "orders@shop.com"]);
        assert_eq!(
            links,
            ["https://shop.com/contact-us", "https://shop.com/about"]
        );
    }
}
