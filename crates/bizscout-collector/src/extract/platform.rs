//! Storefront platform fingerprints.

use std::sync::LazyLock;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

/// E-commerce platforms the web collector can recognise and filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Shopify,
    WooCommerce,
    BigCommerce,
    Magento,
    Squarespace,
    Wix,
    PrestaShop,
}

impl Platform {
    pub const ALL: [Platform; 7] = [
        Platform::Shopify,
        Platform::WooCommerce,
        Platform::BigCommerce,
        Platform::Magento,
        Platform::Squarespace,
        Platform::Wix,
        Platform::PrestaShop,
    ];

    /// Display name, also stored in `CollectedRecord::platform`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Shopify => "Shopify",
            Platform::WooCommerce => "WooCommerce",
            Platform::BigCommerce => "BigCommerce",
            Platform::Magento => "Magento",
            Platform::Squarespace => "Squarespace",
            Platform::Wix => "Wix",
            Platform::PrestaShop => "PrestaShop",
        }
    }

    /// Extra search terms that bias results toward stores on this platform.
    #[must_use]
    pub fn query_hints(self) -> &'static [&'static str] {
        match self {
            Platform::Shopify => &["\"powered by shopify\"", "inurl:collections"],
            Platform::WooCommerce => &["\"woocommerce\"", "inurl:product-category"],
            Platform::BigCommerce => &["\"bigcommerce\""],
            Platform::Magento => &["\"magento\""],
            Platform::Squarespace => &["\"squarespace\""],
            Platform::Wix => &["\"wixsite\""],
            Platform::PrestaShop => &["\"prestashop\""],
        }
    }

    fn fingerprints(self) -> &'static [&'static str] {
        match self {
            Platform::Shopify => &[r"cdn\.shopify\.com", r"Shopify\.theme", r"myshopify\.com"],
            Platform::WooCommerce => &[r"woocommerce", r"wp-content/plugins/woocommerce"],
            Platform::BigCommerce => &[r"cdn\d*\.bigcommerce\.com", r"data-stencil"],
            Platform::Magento => &[r"Mage\.Cookies", r"/static/frontend/", r"magento"],
            Platform::Squarespace => &[r"static1\.squarespace\.com", r"Squarespace\.Constants"],
            Platform::Wix => &[r"static\.wixstatic\.com", r"wix-code", r"X-Wix-"],
            Platform::PrestaShop => &[r"prestashop", r"/modules/ps_"],
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown platform \"{s}\""))
    }
}

/// Fingerprint patterns flattened in `Platform::ALL` order, with the owning
/// platform for each index.
static FINGERPRINTS: LazyLock<(RegexSet, Vec<Platform>)> = LazyLock::new(|| {
    let mut owners = Vec::new();
    let mut patterns = Vec::new();
    for platform in Platform::ALL {
        for pattern in platform.fingerprints() {
            owners.push(platform);
            patterns.push(format!("(?i){pattern}"));
        }
    }
    (
        RegexSet::new(patterns).expect("valid platform fingerprints"),
        owners,
    )
});

/// Detects the storefront platform from raw page HTML. The first platform in
/// `Platform::ALL` order with a matching fingerprint wins.
#[must_use]
pub fn detect_platform(html: &str) -> Option<Platform> {
    let (set, owners) = &*FINGERPRINTS;
    set.matches(html).iter().next().map(|idx| owners[idx])
}
