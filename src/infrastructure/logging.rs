//! Logging initialization
//!
//! Console logging through an `EnvFilter` (RUST_LOG wins over the
//! configured level) with optional daily-rotated file output. The
//! non-blocking writer guard is kept alive for the process lifetime.

use std::sync::Mutex;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::infrastructure::config::LoggingConfig;

// Dropping the guard would silently stop file output.
static LOG_GUARDS: Lazy<Mutex<Vec<WorkerGuard>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Initialize logging from the given configuration. Call once at startup;
/// a second call fails because the global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log level in configuration")?;

    let console_layer = fmt::layer().with_target(true);

    if config.file_output {
        let appender = rolling::daily(&config.log_dir, "aurora-scraper.log");
        let (writer, guard) = non_blocking(appender);
        if let Ok(mut guards) = LOG_GUARDS.lock() {
            guards.push(guard);
        }
        let file_layer = fmt::layer().with_ansi(false).with_writer(writer);
        Registry::default()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to initialize logging")?;
        info!("Logging initialized with file output in {}", config.log_dir);
    } else {
        Registry::default()
            .with(filter)
            .with(console_layer)
            .try_init()
            .context("Failed to initialize logging")?;
        info!("Logging initialized");
    }
    Ok(())
}
