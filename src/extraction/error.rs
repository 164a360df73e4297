//! Extraction error types

use thiserror::Error;

/// Errors surfaced by the extraction layer. Zero candidates or zero
/// accepted records is never an error - absence of a valid record is an
/// expected outcome of an imperfect heuristic.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no usable selector compiled for strategy '{strategy}'")]
    NoSelectors { strategy: &'static str },

    #[error("invalid base URL '{url}': {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

pub type ExtractResult<T> = Result<T, ExtractError>;
