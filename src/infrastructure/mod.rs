//! Infrastructure: external transports, configuration and logging.

pub mod config;
pub mod logging;
pub mod oracle;
pub mod renderer;

pub use config::{AppConfig, ScrollProfile, SiteProfile, WaitStrategy};
pub use oracle::{ChatCompletionsOracle, ExtractionOracle, OracleError, OraclePayload, OracleRequest};
pub use renderer::{HttpRenderer, PageRenderer, RenderError, RenderRequest};
