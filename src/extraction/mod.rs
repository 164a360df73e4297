//! Record extraction from rendered markup.
//!
//! The pipeline is synchronous end to end: a rendered page's HTML goes in,
//! typed records come out, and no parsed document ever crosses an await.
//! `candidates` nominates container subtrees, `item` runs field tactics on
//! each, `structured` folds in embedded machine-readable data and `fields`
//! holds the pure text parsers underneath it all.

pub mod candidates;
pub mod context;
pub mod error;
pub mod fields;
pub mod item;
pub mod structured;

pub use candidates::{CandidateSelector, CandidateStrategy, ContainerCandidate};
pub use context::ExtractContext;
pub use error::{ExtractError, ExtractResult};
pub use item::{ItemExtractor, PageExtractor};
pub use structured::{read_structured_records, StructuredRecord};
