//! Renderer transport
//!
//! The crate never drives a browser itself; it consumes a `PageRenderer`
//! that turns a URL into rendered content. The bundled `HttpRenderer`
//! talks to the rendering proxy's HTTP endpoints (`/api/scrape`,
//! `/api/scrape_with_scroll`, `/api/screenshot`) with rate limiting.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::crawl::loader::PageHandle;
use crate::domain::page::{RenderMethod, RenderedPage};
use crate::infrastructure::config::{RendererConfig, SiteProfile, WaitStrategy};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render timed out for {url}")]
    Timeout { url: String },
    #[error("bot protection blocked {url}")]
    BotProtection { url: String },
    #[error("renderer returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("renderer reported failure for {url}: {detail}")]
    Failed { url: String, detail: String },
    #[error("failed to decode renderer response: {detail}")]
    Decode { detail: String },
    #[error("renderer transport error")]
    Transport(#[from] reqwest::Error),
    #[error("invalid renderer configuration: {detail}")]
    Config { detail: String },
}

/// One render request; wait strategy and timeout come from the site
/// profile, scroll hint cycles from the orchestrator.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: String,
    pub wait_strategy: WaitStrategy,
    pub timeout: Duration,
    /// Number of scroll-to-bottom cycles the renderer should perform before
    /// returning content. Zero means plain navigation.
    pub scroll_cycles: u32,
}

impl RenderRequest {
    pub fn from_profile(url: &str, profile: &SiteProfile) -> Self {
        Self {
            url: url.to_string(),
            wait_strategy: profile.wait_strategy,
            timeout: Duration::from_secs(profile.timeout_secs),
            scroll_cycles: 0,
        }
    }
}

/// Turns a URL into rendered content. Implementations must be safe to call
/// sequentially from the orchestration loop.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, RenderError>;

    /// Full-page screenshot of the current state of a URL, PNG bytes.
    async fn screenshot(&self, url: &str) -> Result<Vec<u8>, RenderError>;

    /// Open a live, scriptable page when the transport supports one. The
    /// default transport cannot, and the content loader then falls back to
    /// scroll-hint re-rendering.
    async fn open_page(
        &self,
        _url: &str,
        _profile: &SiteProfile,
    ) -> Result<Option<Box<dyn PageHandle>>, RenderError> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct ProxyScrapeBody {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProxyScreenshotBody {
    screenshot_base64: String,
}

/// HTTP client for the rendering proxy, rate limited so sequential page
/// loops stay polite.
pub struct HttpRenderer {
    client: Client,
    base_url: String,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpRenderer {
    pub fn new(config: &RendererConfig) -> Result<Self, RenderError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        let per_second = NonZeroU32::new(config.max_requests_per_second.max(1))
            .ok_or_else(|| RenderError::Config {
                detail: "max_requests_per_second must be positive".to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        timeout: Duration,
        url_for_errors: &str,
    ) -> Result<T, RenderError> {
        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    RenderError::Timeout { url: url_for_errors.to_string() }
                } else {
                    RenderError::Transport(err)
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Status {
                status: status.as_u16(),
                url: url_for_errors.to_string(),
            });
        }
        response.json::<T>().await.map_err(|err| RenderError::Decode {
            detail: err.to_string(),
        })
    }

    fn page_from_body(
        url: &str,
        body: ProxyScrapeBody,
        render_method: RenderMethod,
    ) -> Result<RenderedPage, RenderError> {
        match body.status.as_str() {
            "success" => Ok(RenderedPage {
                url: url.to_string(),
                final_url: body.url.unwrap_or_else(|| url.to_string()),
                title: body.title.unwrap_or_default(),
                html: body.content.unwrap_or_default(),
                screenshot: None,
                render_method,
            }),
            "blocked_by_cloudflare" => Err(RenderError::BotProtection { url: url.to_string() }),
            other => Err(RenderError::Failed {
                url: url.to_string(),
                detail: body.error.unwrap_or_else(|| other.to_string()),
            }),
        }
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, RenderError> {
        info!(
            "Rendering {} (wait: {}, scroll cycles: {})",
            request.url,
            request.wait_strategy.as_str(),
            request.scroll_cycles
        );
        let body: ProxyScrapeBody = if request.scroll_cycles > 0 {
            self.get_json(
                "/api/scrape_with_scroll",
                &[
                    ("url", request.url.clone()),
                    ("scroll_count", request.scroll_cycles.to_string()),
                    ("wait", request.wait_strategy.as_str().to_string()),
                ],
                request.timeout,
                &request.url,
            )
            .await?
        } else {
            self.get_json(
                "/api/scrape",
                &[
                    ("url", request.url.clone()),
                    ("wait", request.wait_strategy.as_str().to_string()),
                ],
                request.timeout,
                &request.url,
            )
            .await?
        };
        let method = if request.scroll_cycles > 0 {
            RenderMethod::Scrolled
        } else {
            RenderMethod::Navigate
        };
        let page = Self::page_from_body(&request.url, body, method)?;
        debug!("Rendered {} ({} bytes)", request.url, page.html.len());
        Ok(page)
    }

    async fn screenshot(&self, url: &str) -> Result<Vec<u8>, RenderError> {
        let body: ProxyScreenshotBody = self
            .get_json(
                "/api/screenshot",
                &[("url", url.to_string())],
                Duration::from_secs(60),
                url,
            )
            .await?;
        base64::engine::general_purpose::STANDARD
            .decode(body.screenshot_base64.as_bytes())
            .map_err(|err| RenderError::Decode { detail: err.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn renderer_for(server: &MockServer) -> HttpRenderer {
        HttpRenderer::new(&RendererConfig {
            base_url: server.uri(),
            user_agent: "test-agent".into(),
            max_requests_per_second: 100,
        })
        .unwrap()
    }

    fn request(url: &str) -> RenderRequest {
        RenderRequest {
            url: url.to_string(),
            wait_strategy: WaitStrategy::NetworkIdle,
            timeout: Duration::from_secs(5),
            scroll_cycles: 0,
        }
    }

    #[tokio::test]
    async fn successful_render_maps_to_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/scrape"))
            .and(query_param("url", "https://shop.example/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": "https://shop.example/list?ref=final",
                "title": "Listing",
                "content": "<html><body>ok</body></html>",
                "status": "success"
            })))
            .mount(&server)
            .await;

        let renderer = renderer_for(&server);
        let page = renderer.render(&request("https://shop.example/list")).await.unwrap();
        assert_eq!(page.title, "Listing");
        assert_eq!(page.final_url, "https://shop.example/list?ref=final");
        assert_eq!(page.render_method, RenderMethod::Navigate);
    }

    #[tokio::test]
    async fn bot_block_surfaces_as_bot_protection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/scrape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "blocked_by_cloudflare"
            })))
            .mount(&server)
            .await;

        let renderer = renderer_for(&server);
        let err = renderer.render(&request("https://shop.example/")).await.unwrap_err();
        assert!(matches!(err, RenderError::BotProtection { .. }));
    }

    #[tokio::test]
    async fn scroll_cycles_use_the_scroll_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/scrape_with_scroll"))
            .and(query_param("scroll_count", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "title": "Feed",
                "content": "<html></html>",
                "status": "success"
            })))
            .mount(&server)
            .await;

        let renderer = renderer_for(&server);
        let mut req = request("https://feed.example/");
        req.scroll_cycles = 3;
        let page = renderer.render(&req).await.unwrap();
        assert_eq!(page.render_method, RenderMethod::Scrolled);
    }

    #[tokio::test]
    async fn screenshot_decodes_base64_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/screenshot"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "screenshot_base64": base64::engine::general_purpose::STANDARD.encode(b"pngbytes")
            })))
            .mount(&server)
            .await;

        let renderer = renderer_for(&server);
        let bytes = renderer.screenshot("https://shop.example/").await.unwrap();
        assert_eq!(bytes, b"pngbytes");
    }

    #[tokio::test]
    async fn http_error_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/scrape"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let renderer = renderer_for(&server);
        let err = renderer.render(&request("https://shop.example/")).await.unwrap_err();
        assert!(matches!(err, RenderError::Status { status: 502, .. }));
    }
}
