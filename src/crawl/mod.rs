//! Crawl layer: classification, content loading, orchestration, fallback.
//!
//! Owns the async I/O loop. Everything here talks to the outside world
//! through the renderer and oracle seams and hands markup to the
//! synchronous extraction layer in between awaits.

pub mod classify;
pub mod loader;
pub mod orchestrator;
pub mod vision;

pub use classify::{classify_document, classify_html};
pub use loader::{ContentLoader, LoadedContent, PageHandle};
pub use orchestrator::{page_url, strip_pagination_params, PaginationOrchestrator, ScrapeOptions};
