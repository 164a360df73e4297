//! Rendered page snapshot and per-page classification types

use serde::{Deserialize, Serialize};

/// How a page's content was materialized by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMethod {
    /// Plain navigation, content taken after the wait strategy settled.
    Navigate,
    /// Navigation followed by scroll cycles before the snapshot.
    Scrolled,
    /// Screenshot-only capture for the vision fallback.
    Screenshot,
}

/// One rendered page as returned by the external renderer.
///
/// Immutable after creation and owned by the caller for the duration of a
/// single page-scrape operation. The document is re-parsed on demand; the
/// parsed tree is never held across an await point.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL that was requested.
    pub url: String,
    /// URL after redirects, when the renderer reports it.
    pub final_url: String,
    /// Page title as rendered.
    pub title: String,
    /// Full HTML snapshot of the document.
    pub html: String,
    /// Optional full-page screenshot (PNG bytes).
    pub screenshot: Option<Vec<u8>>,
    /// How the snapshot was produced.
    pub render_method: RenderMethod,
}

impl RenderedPage {
    /// Domain (host) this page was served from, without port.
    pub fn platform_domain(&self) -> String {
        url::Url::parse(&self.final_url)
            .or_else(|_| url::Url::parse(&self.url))
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_default()
    }
}

/// Content-delivery mode of a page, derived fresh per page.
///
/// `ApiBacked` is never inferred from markup; it is selected explicitly via
/// a site profile. `Unknown` is treated as `SinglePage` by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageClassification {
    SinglePage,
    TraditionalPagination,
    LoadMore,
    InfiniteScroll,
    ApiBacked,
    Unknown,
}

impl PageClassification {
    /// Whether this mode materializes additional content on the same URL.
    pub fn is_scroll_driven(self) -> bool {
        matches!(self, Self::LoadMore | Self::InfiniteScroll)
    }
}

/// Broad site category used to pick selector vocabularies and prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteType {
    Ecommerce,
    Travel,
    Generic,
}

/// Domain keywords that mark a travel booking site.
const TRAVEL_DOMAIN_KEYWORDS: &[&str] = &[
    "makemytrip", "mmt", "booking", "hotels", "expedia", "airbnb",
    "tripadvisor", "goibibo", "yatra", "cleartrip", "redbus", "abhibus",
    "irctc", "railway", "skyscanner", "kayak", "momondo", "travel", "trip",
    "journey",
];

impl SiteType {
    /// Classify a site by its domain name. Travel keywords win; everything
    /// else is assumed to be an e-commerce listing site, which shares its
    /// extraction path with generic content.
    pub fn from_domain(domain: &str) -> Self {
        let domain = domain.to_ascii_lowercase();
        if TRAVEL_DOMAIN_KEYWORDS.iter().any(|k| domain.contains(k)) {
            Self::Travel
        } else {
            Self::Ecommerce
        }
    }

    pub fn is_travel(self) -> bool {
        matches!(self, Self::Travel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_domains_are_detected() {
        assert_eq!(SiteType::from_domain("www.redbus.in"), SiteType::Travel);
        assert_eq!(SiteType::from_domain("booking.com"), SiteType::Travel);
        assert_eq!(SiteType::from_domain("www.amazon.in"), SiteType::Ecommerce);
    }

    #[test]
    fn platform_domain_prefers_final_url() {
        let page = RenderedPage {
            url: "https://a.example/x".into(),
            final_url: "https://b.example/y".into(),
            title: String::new(),
            html: String::new(),
            screenshot: None,
            render_method: RenderMethod::Navigate,
        };
        assert_eq!(page.platform_domain(), "b.example");
    }
}
