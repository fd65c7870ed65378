//! Social network links other than Instagram.

use bizscout_core::SocialLink;

use super::page::PageHandle;

/// `(label, host suffixes)` in the order links are reported.
const NETWORKS: [(&str, &[&str]); 6] = [
    ("Facebook", &["facebook.com", "fb.com"]),
    ("X", &["twitter.com", "x.com"]),
    ("LinkedIn", &["linkedin.com"]),
    ("TikTok", &["tiktok.com"]),
    ("YouTube", &["youtube.com", "youtu.be"]),
    ("Pinterest", &["pinterest.com"]),
];

/// Hosts that are never a business's own website.
const PLATFORM_HOSTS: [&str; 10] = [
    "instagram.com",
    "wa.me",
    "whatsapp.com",
    "google.com",
    "goo.gl",
    "bing.com",
    "yelp.com",
    "tripadvisor.com",
    "gstatic.com",
    "googleusercontent.com",
];

/// Path prefixes that are share widgets or site sections, not profiles.
const NON_PROFILE_PATHS: [&str; 6] = ["/sharer", "/share", "/intent", "/plugins", "/dialog", "/embed"];

fn host_matches(host: &str, suffix: &str) -> bool {
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

/// `true` if `host` belongs to a social network, search engine or review site.
#[must_use]
pub fn is_platform_host(host: &str) -> bool {
    let host = host.trim_start_matches("www.");
    PLATFORM_HOSTS.iter().any(|s| host_matches(host, s))
        || NETWORKS
            .iter()
            .flat_map(|(_, suffixes)| suffixes.iter())
            .any(|s| host_matches(host, s))
}

fn classify(href: &str) -> Option<&'static str> {
    let parsed = url::Url::parse(href).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let path = parsed.path();
    if path.len() <= 1 || NON_PROFILE_PATHS.iter().any(|p| path.starts_with(p)) {
        return None;
    }
    NETWORKS
        .iter()
        .find(|(_, suffixes)| suffixes.iter().any(|s| host_matches(&host, s)))
        .map(|(label, _)| *label)
}

/// Collects the first profile link per network from the page's anchors.
#[must_use]
pub fn extract_other_socials(page: &PageHandle) -> Vec<SocialLink> {
    let mut found: Vec<SocialLink> = Vec::new();
    for href in page.absolute_links() {
        let Some(label) = classify(&href) else {
            continue;
        };
        if found.iter().any(|link| link.label == label) {
            continue;
        }
        found.push(SocialLink {
            label: label.to_owned(),
            url: href,
        });
    }
    found.sort_by_key(|link| {
        NETWORKS
            .iter()
            .position(|(label, _)| *label == link.label)
            .unwrap_or(usize::MAX)
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_one_link_per_network_in_fixed_order() {
        let html = r#"<html><body>
            <a href="https://twitter.com/acme">t</a>
            <a href="https://www.facebook.com/sharer/sharer.php?u=x">share</a>
            <a href="https://www.facebook.com/acmebakery">f</a>
            <a href="https://facebook.com/other">f2</a>
            <a href="/about">about</a>
        </body></html>"#;
        let page = PageHandle::parse("https://acme.com/", html);
        let links = extract_other_socials(&page);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].label, "Facebook");
        assert_eq!(links[0].url, "https://www.facebook.com/acmebakery");
        assert_eq!(links[1].label, "X");
    }

    #[test]
    fn platform_hosts_include_subdomains() {
        assert!(is_platform_host("m.facebook.com"));
        assert!(is_platform_host("www.instagram.com"));
        assert!(!is_platform_host("acme.com"));
        assert!(!is_platform_host("notfacebook.com"));
    }
}
