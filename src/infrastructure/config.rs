//! Configuration infrastructure
//!
//! Tiered application configuration loaded from a JSON file: crawling
//! limits, renderer and oracle endpoints, logging, and the site-profile
//! table that maps domain keywords to wait strategies and scroll timing.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub crawling: CrawlingConfig,
    pub renderer: RendererConfig,
    pub oracle: OracleConfig,
    pub logging: LoggingConfig,
    /// Per-site overrides, matched by domain keyword in declaration order.
    pub site_profiles: Vec<SiteProfile>,
}

/// Limits and timing of the multi-page loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlingConfig {
    /// Page ceiling per scrape session.
    pub max_pages: u32,
    /// Politeness delay between page fetches, in milliseconds.
    pub page_cooldown_ms: u64,
    /// Transport retry attempts per page.
    pub max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Render latency above this triggers the vision fallback, in seconds.
    pub slow_render_threshold_secs: u64,
}

impl Default for CrawlingConfig {
    fn default() -> Self {
        Self {
            max_pages: 5,
            page_cooldown_ms: 2000,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            slow_render_threshold_secs: 45,
        }
    }
}

/// Renderer proxy endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    pub base_url: String,
    pub user_agent: String,
    pub max_requests_per_second: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            user_agent: "aurora-scraper/1.0".to_string(),
            max_requests_per_second: 2,
        }
    }
}

/// Language-model oracle endpoint settings. The API key is read from the
/// environment variable when not set in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

impl OracleConfig {
    /// Configured key, falling back to the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset.
    pub level: String,
    pub file_output: bool,
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_output: false,
            log_dir: "logs".to_string(),
        }
    }
}

/// How long the renderer should wait before considering a page loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl WaitStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "domcontentloaded",
            Self::NetworkIdle => "networkidle",
        }
    }
}

/// Timing of the scroll-driven content loader, in milliseconds so tests can
/// compress the waits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScrollProfile {
    /// Wait after navigation before the first screenshot.
    pub initial_settle_ms: u64,
    /// Wait after each scroll step.
    pub settle_ms: u64,
    /// Single long wait at the bottom of the page before concluding the
    /// content is exhausted.
    pub bottom_grace_ms: u64,
    /// Hard ceiling on scroll cycles.
    pub max_cycles: u32,
}

impl Default for ScrollProfile {
    fn default() -> Self {
        Self {
            initial_settle_ms: 5000,
            settle_ms: 5000,
            bottom_grace_ms: 10_000,
            max_cycles: 50,
        }
    }
}

/// Per-site rendering profile. A URL matches the first profile with a
/// keyword contained in its host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    pub keywords: Vec<String>,
    pub wait_strategy: WaitStrategy,
    pub timeout_secs: u64,
    /// Marks a JSON API endpoint paged through query parameters. Never
    /// inferred from markup.
    pub api_backed: bool,
    pub scroll: ScrollProfile,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            wait_strategy: WaitStrategy::NetworkIdle,
            timeout_secs: 30,
            api_backed: false,
            scroll: ScrollProfile::default(),
        }
    }
}

/// Built-in profiles for sites with known load behavior.
pub fn default_site_profiles() -> Vec<SiteProfile> {
    vec![
        SiteProfile {
            keywords: vec!["amazon".to_string()],
            wait_strategy: WaitStrategy::DomContentLoaded,
            timeout_secs: 60,
            ..Default::default()
        },
        SiteProfile {
            keywords: vec!["flipkart".to_string()],
            wait_strategy: WaitStrategy::NetworkIdle,
            timeout_secs: 45,
            ..Default::default()
        },
    ]
}

impl AppConfig {
    /// Defaults plus the built-in site-profile table.
    pub fn with_default_profiles() -> Self {
        Self {
            site_profiles: default_site_profiles(),
            ..Default::default()
        }
    }

    /// Profile for a URL's host, falling back to the default profile.
    pub fn profile_for(&self, host: &str) -> SiteProfile {
        let host = host.to_lowercase();
        self.site_profiles
            .iter()
            .find(|p| p.keywords.iter().any(|k| host.contains(k.as_str())))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, raw)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_lookup_matches_host_keyword() {
        let config = AppConfig::with_default_profiles();
        let amazon = config.profile_for("www.amazon.in");
        assert_eq!(amazon.wait_strategy, WaitStrategy::DomContentLoaded);
        assert_eq!(amazon.timeout_secs, 60);

        let unknown = config.profile_for("shop.example");
        assert_eq!(unknown.wait_strategy, WaitStrategy::NetworkIdle);
        assert_eq!(unknown.timeout_secs, 30);
        assert!(!unknown.api_backed);
    }

    #[tokio::test]
    async fn config_round_trips_through_file() {
        let dir = std::env::temp_dir().join(format!("aurora-config-{}", std::process::id()));
        let path = dir.join("config.json");
        let mut config = AppConfig::with_default_profiles();
        config.crawling.max_pages = 9;
        config.save(&path).await.unwrap();
        let loaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(loaded.crawling.max_pages, 9);
        assert_eq!(loaded.site_profiles.len(), 2);
        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
