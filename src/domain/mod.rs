//! Domain model for adaptive scraping
//!
//! Pure data types shared across the extraction and crawl layers:
//! rendered pages, extracted records, and per-scrape session state.

pub mod page;
pub mod record;
pub mod session;

pub use page::{PageClassification, RenderMethod, RenderedPage, SiteType};
pub use record::{
    ExtractionMethod, ProductFields, Record, RecordBase, RecordOrigin, ScrapeSummary,
    TravelFields, TravelKind,
};
pub use session::{PaginationSession, ScrollState, SessionStatus};
