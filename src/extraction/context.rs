//! Extraction context
//!
//! Carries the page-scoped facts every tactic needs: where the page came
//! from (for link resolution and the platform domain) and which site
//! vocabulary applies. Built once per page by the orchestrator.

use url::Url;

use crate::domain::page::SiteType;
use crate::extraction::error::ExtractError;

/// Context for one extraction pass over one rendered page.
#[derive(Debug, Clone)]
pub struct ExtractContext {
    /// Parsed page URL, used to resolve relative links and images.
    pub base_url: Url,
    pub site_type: SiteType,
    /// 1-based page number within the scrape session.
    pub page_number: u32,
}

impl ExtractContext {
    pub fn new(page_url: &str, site_type: SiteType, page_number: u32) -> Result<Self, ExtractError> {
        let base_url = Url::parse(page_url).map_err(|source| ExtractError::BaseUrl {
            url: page_url.to_owned(),
            source,
        })?;
        Ok(Self { base_url, site_type, page_number })
    }

    /// Host the records will be attributed to.
    pub fn platform_domain(&self) -> String {
        self.base_url.host_str().unwrap_or_default().to_owned()
    }

    /// Resolve a possibly relative href/src against the page URL.
    pub fn resolve(&self, href: &str) -> Option<String> {
        if href.starts_with("http://") || href.starts_with("https://") {
            return Some(href.to_owned());
        }
        self.base_url.join(href).ok().map(Url::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_links() {
        let ctx = ExtractContext::new("https://shop.example/list?page=2", SiteType::Ecommerce, 2)
            .unwrap();
        assert_eq!(
            ctx.resolve("/item/42").unwrap(),
            "https://shop.example/item/42"
        );
        assert_eq!(
            ctx.resolve("https://cdn.example/a.png").unwrap(),
            "https://cdn.example/a.png"
        );
        assert_eq!(ctx.platform_domain(), "shop.example");
    }
}
