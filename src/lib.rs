//! Aurora Scraper - adaptive web content acquisition engine
//!
//! This crate discovers, loads, and extracts structured records (product
//! listings, travel fares, generic content items) from web pages whose
//! layout, pagination mechanism, and rendering behavior are unknown in
//! advance. The browser transport and the language-model oracle are
//! consumed through trait seams; everything in between - page-type
//! classification, scroll-driven content loading, the cascading item
//! extractor, and the multi-page orchestration loop - lives here.

pub mod crawl;
pub mod domain;
pub mod extraction;
pub mod infrastructure;

// Re-export the types most callers need.
pub use crawl::orchestrator::{PaginationOrchestrator, ScrapeOptions};
pub use domain::page::{PageClassification, RenderedPage, SiteType};
pub use domain::record::{Record, ScrapeSummary};
pub use infrastructure::config::AppConfig;
pub use infrastructure::oracle::ExtractionOracle;
pub use infrastructure::renderer::PageRenderer;
