//! Multi-page scrape orchestration
//!
//! The state machine that turns one URL into a ScrapeSummary: classify the
//! first page, then walk whatever continuation mechanism it revealed.
//! Traditional pagination advances a deterministic `page=N` URL, scroll
//! driven pages grow in place (live handle when the transport offers one,
//! scroll-hint re-rendering otherwise), API-backed endpoints page through
//! their own metadata. Pages are processed strictly sequentially with a
//! politeness cool-down in between. A failed page after the first returns
//! the partial results accumulated so far.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::crawl::classify;
use crate::crawl::loader::ContentLoader;
use crate::crawl::vision;
use crate::domain::page::{PageClassification, RenderedPage, SiteType};
use crate::domain::record::{
    ExtractionMethod, ProductFields, Record, RecordBase, RecordOrigin, ScrapeSummary,
};
use crate::domain::session::{PaginationSession, SessionStatus};
use crate::extraction::context::ExtractContext;
use crate::extraction::item::PageExtractor;
use crate::infrastructure::config::{AppConfig, SiteProfile};
use crate::infrastructure::oracle::ExtractionOracle;
use crate::infrastructure::renderer::{PageRenderer, RenderRequest};

/// Query parameters that carry pagination state and must be stripped before
/// the orchestrator takes over page counting.
const PAGINATION_PARAMS: &[&str] = &["page", "p", "pg", "offset", "start", "from"];

/// Remove pagination parameters from a URL, keeping everything else.
pub fn strip_pagination_params(url: &str) -> Result<String> {
    let mut parsed = Url::parse(url).with_context(|| format!("invalid URL: {url}"))?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !PAGINATION_PARAMS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let mut pairs = parsed.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        drop(pairs);
    }
    Ok(parsed.to_string())
}

/// URL for page N of a stripped base URL. Page 1 is the base itself.
pub fn page_url(base: &str, page: u32) -> Result<String> {
    if page <= 1 {
        return Ok(base.to_string());
    }
    let mut parsed = Url::parse(base).with_context(|| format!("invalid URL: {base}"))?;
    parsed.query_pairs_mut().append_pair("page", &page.to_string());
    Ok(parsed.to_string())
}

/// Per-scrape options; everything defaults to the configured behavior.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOptions {
    /// Override the configured page ceiling.
    pub max_pages: Option<u32>,
    /// Override domain-based site-type detection.
    pub site_type: Option<SiteType>,
    /// Run the vision fallback even when markup extraction succeeds.
    pub force_vision: bool,
    pub cancellation: CancellationToken,
}

/// Drives one scrape end to end over the renderer and oracle seams.
pub struct PaginationOrchestrator {
    renderer: Arc<dyn PageRenderer>,
    oracle: Option<Arc<dyn ExtractionOracle>>,
    extractor: PageExtractor,
    config: AppConfig,
}

impl PaginationOrchestrator {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        oracle: Option<Arc<dyn ExtractionOracle>>,
        config: AppConfig,
    ) -> Result<Self> {
        let extractor = PageExtractor::new().context("failed to build page extractor")?;
        Ok(Self { renderer, oracle, extractor, config })
    }

    /// Scrape a URL across however many pages it reveals.
    pub async fn scrape(&self, url: &str, options: ScrapeOptions) -> Result<ScrapeSummary> {
        let started = Instant::now();
        let parsed = Url::parse(url).with_context(|| format!("invalid URL: {url}"))?;
        let host = parsed.host_str().unwrap_or_default().to_string();
        let site_type = options.site_type.unwrap_or_else(|| SiteType::from_domain(&host));
        let profile = self.config.profile_for(&host);
        let base_url = strip_pagination_params(url)?;
        let max_pages = options.max_pages.unwrap_or(self.config.crawling.max_pages).max(1);
        let cancel = options.cancellation.clone();

        info!(
            "scrape started: {base_url} (site type {site_type:?}, up to {max_pages} pages)"
        );
        let mut session = PaginationSession::new(base_url, site_type);

        if profile.api_backed {
            self.run_api(&mut session, &profile, max_pages, &cancel).await?;
            return Ok(Self::summarize(session, ExtractionMethod::Api, started));
        }

        let mut used_vision = false;

        // First page decides the continuation mechanism. Its failure is
        // fatal; there is nothing partial to salvage.
        let first = self
            .render_with_retry(&session.base_url, &profile, 0, &cancel)
            .await
            .with_context(|| format!("first page failed: {}", session.base_url))?;
        let classification = classify::classify_html(&first.page.html);
        info!("page 1 classified as {classification:?}");

        let records = self
            .extract_with_fallback(&first, &session, &options, &mut used_vision)
            .await?;
        session.absorb_page(first.page.title.clone(), records);

        match classification {
            PageClassification::TraditionalPagination => {
                self.run_traditional(&mut session, &profile, max_pages, &options, &mut used_vision)
                    .await;
            }
            c if c.is_scroll_driven() => {
                self.run_scroll(&mut session, &profile, max_pages, &cancel).await;
            }
            _ => {
                session.has_more = false;
            }
        }

        let method = if used_vision { ExtractionMethod::Vision } else { ExtractionMethod::Markup };
        Ok(Self::summarize(session, method, started))
    }

    /// Deterministic `page=N` walk. Stops on the first page that adds no
    /// new records, on the page ceiling, or on a transport failure (the
    /// session then carries partial results).
    async fn run_traditional(
        &self,
        session: &mut PaginationSession,
        profile: &SiteProfile,
        max_pages: u32,
        options: &ScrapeOptions,
        used_vision: &mut bool,
    ) {
        let cancel = &options.cancellation;
        while session.has_more && session.pages_fetched < max_pages {
            if cancel.is_cancelled() {
                session.status = SessionStatus::Cancelled;
                return;
            }
            if self.cooldown(cancel).await.is_err() {
                session.status = SessionStatus::Cancelled;
                return;
            }

            let page_number = session.current_page;
            let url = match page_url(&session.base_url, page_number) {
                Ok(url) => url,
                Err(err) => {
                    warn!("could not build page {page_number} URL: {err}");
                    session.status = SessionStatus::Partial;
                    return;
                }
            };
            let fetched = match self.render_with_retry(&url, profile, 0, cancel).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    warn!("page {page_number} failed, returning partial results: {err}");
                    session.status = SessionStatus::Partial;
                    return;
                }
            };
            let records = match self
                .extract_with_fallback(&fetched, session, options, used_vision)
                .await
            {
                Ok(records) => records,
                Err(err) => {
                    warn!("page {page_number} extraction failed: {err}");
                    session.status = SessionStatus::Partial;
                    return;
                }
            };

            let added = session.absorb_page(fetched.page.title.clone(), records);
            info!("page {page_number}: {added} new records");
            if added == 0 {
                session.has_more = false;
            }
        }
        if session.pages_fetched >= max_pages {
            session.has_more = false;
        }
    }

    /// Same-URL growth. Prefers a live page handle driven by the content
    /// loader; without one, re-renders with increasing scroll-cycle hints
    /// and treats record-count growth as the stability signal.
    async fn run_scroll(
        &self,
        session: &mut PaginationSession,
        profile: &SiteProfile,
        max_pages: u32,
        cancel: &CancellationToken,
    ) {
        let live = self
            .renderer
            .open_page(&session.base_url, profile)
            .await
            .unwrap_or_default();
        if let Some(mut handle) = live {
            let loader = ContentLoader::new(profile.scroll, cancel.clone());
            match loader.load(handle.as_mut()).await {
                Ok(loaded) => {
                    debug!(
                        "live scroll finished: {} cycles, {} screenshots",
                        loaded.state.scroll_count, loaded.state.screenshots_taken
                    );
                    if let Some(records) = self.extract_new(session, &loaded.html) {
                        session.absorb_page(loaded.title, records);
                    }
                }
                Err(err) => {
                    warn!("live scroll failed, keeping first snapshot: {err}");
                    session.status = SessionStatus::Partial;
                }
            }
            session.has_more = false;
            return;
        }

        let mut cycles = 1u32;
        while session.has_more && session.pages_fetched < max_pages {
            if cancel.is_cancelled() {
                session.status = SessionStatus::Cancelled;
                return;
            }
            if self.cooldown(cancel).await.is_err() {
                session.status = SessionStatus::Cancelled;
                return;
            }
            let fetched = match self
                .render_with_retry(&session.base_url, profile, cycles, cancel)
                .await
            {
                Ok(fetched) => fetched,
                Err(err) => {
                    warn!("scroll render failed, returning partial results: {err}");
                    session.status = SessionStatus::Partial;
                    return;
                }
            };
            let added = match self.extract_new(session, &fetched.page.html) {
                Some(records) => session.absorb_page(fetched.page.title.clone(), records),
                None => 0,
            };
            info!("scroll pass with {cycles} cycles: {added} new records");
            if added == 0 {
                session.has_more = false;
            }
            cycles += 1;
        }
        session.has_more = false;
    }

    /// JSON API paging: the endpoint's own metadata says when to stop.
    async fn run_api(
        &self,
        session: &mut PaginationSession,
        profile: &SiteProfile,
        max_pages: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        while session.has_more && session.pages_fetched < max_pages {
            if cancel.is_cancelled() {
                session.status = SessionStatus::Cancelled;
                return Ok(());
            }
            if session.pages_fetched > 0 && self.cooldown(cancel).await.is_err() {
                session.status = SessionStatus::Cancelled;
                return Ok(());
            }

            let page_number = session.current_page;
            let url = page_url(&session.base_url, page_number)?;
            let fetched = match self.render_with_retry(&url, profile, 0, cancel).await {
                Ok(fetched) => fetched,
                Err(err) if page_number == 1 => {
                    return Err(err).with_context(|| format!("first page failed: {url}"));
                }
                Err(err) => {
                    warn!("API page {page_number} failed, returning partial results: {err}");
                    session.status = SessionStatus::Partial;
                    return Ok(());
                }
            };

            let body: Value = match serde_json::from_str(&fetched.page.html) {
                Ok(value) => value,
                Err(err) => {
                    warn!("API page {page_number} was not JSON: {err}");
                    session.has_more = false;
                    break;
                }
            };
            let mut records = api_records(&body, session, page_number);
            let mut seen: HashSet<String> =
                session.records.iter().map(Record::dedup_key).collect();
            records.retain(|r| seen.insert(r.dedup_key()));

            let has_more = api_has_more(&body, page_number).unwrap_or(!records.is_empty());
            let added = session.absorb_page(fetched.page.title.clone(), records);
            info!("API page {page_number}: {added} records, has_more={has_more}");
            session.has_more = has_more;
        }
        session.has_more = false;
        Ok(())
    }

    /// Markup extraction with the vision fallback. Vision runs at most once
    /// per page: on a zero-record page, a slow render, or explicit opt-in.
    async fn extract_with_fallback(
        &self,
        fetched: &FetchedPage,
        session: &PaginationSession,
        options: &ScrapeOptions,
        used_vision: &mut bool,
    ) -> Result<Vec<Record>> {
        let page_number = session.current_page;
        let ctx = ExtractContext::new(&fetched.page.final_url, session.site_type, page_number)
            .or_else(|_| ExtractContext::new(&fetched.page.url, session.site_type, page_number))?;
        let mut records = self.extractor.extract_records(&fetched.page.html, &ctx);

        let slow = fetched.elapsed
            >= Duration::from_secs(self.config.crawling.slow_render_threshold_secs);
        let wants_vision = records.is_empty() || slow || options.force_vision;
        if wants_vision {
            if let Some(oracle) = &self.oracle {
                info!(
                    "vision fallback on page {page_number} (records: {}, slow: {slow}, forced: {})",
                    records.len(),
                    options.force_vision
                );
                let vision_records = vision::extract_via_vision(
                    self.renderer.as_ref(),
                    oracle.as_ref(),
                    &fetched.page.url,
                    &ctx,
                )
                .await;
                if !vision_records.is_empty() {
                    *used_vision = true;
                    let mut seen: HashSet<String> =
                        records.iter().map(Record::dedup_key).collect();
                    records.extend(
                        vision_records
                            .into_iter()
                            .filter(|r| seen.insert(r.dedup_key())),
                    );
                }
            } else if records.is_empty() {
                debug!("page {page_number} yielded no records and no oracle is configured");
            }
        }

        // Cross-page dedup: a record seen on an earlier page is not new.
        let mut seen: HashSet<String> = session.records.iter().map(Record::dedup_key).collect();
        records.retain(|r| seen.insert(r.dedup_key()));
        Ok(records)
    }

    /// Extract and keep only records the session has not seen yet.
    fn extract_new(&self, session: &PaginationSession, html: &str) -> Option<Vec<Record>> {
        let ctx = ExtractContext::new(&session.base_url, session.site_type, session.current_page)
            .ok()?;
        let mut records = self.extractor.extract_records(html, &ctx);
        let mut seen: HashSet<String> = session.records.iter().map(Record::dedup_key).collect();
        records.retain(|r| seen.insert(r.dedup_key()));
        Some(records)
    }

    async fn render_with_retry(
        &self,
        url: &str,
        profile: &SiteProfile,
        scroll_cycles: u32,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage> {
        let mut request = RenderRequest::from_profile(url, profile);
        request.scroll_cycles = scroll_cycles;
        let max_retries = self.config.crawling.max_retries;
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                bail!("scrape cancelled");
            }
            let started = Instant::now();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => bail!("scrape cancelled"),
                result = self.renderer.render(&request) => result,
            };
            match outcome {
                Ok(page) => {
                    return Ok(FetchedPage { page, elapsed: started.elapsed() });
                }
                Err(err) => {
                    attempt += 1;
                    if attempt > max_retries {
                        return Err(err).with_context(|| {
                            format!("render failed after {attempt} attempts: {url}")
                        });
                    }
                    let backoff = self.config.crawling.retry_base_delay_ms
                        * 2u64.saturating_pow(attempt - 1)
                        + fastrand::u64(0..250);
                    warn!(
                        "render attempt {attempt}/{max_retries} failed for {url}: {err}; \
                         retrying in {backoff}ms"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => bail!("scrape cancelled"),
                        _ = tokio::time::sleep(Duration::from_millis(backoff)) => {}
                    }
                }
            }
        }
    }

    /// Politeness delay between page fetches. Errors only on cancellation.
    async fn cooldown(&self, cancel: &CancellationToken) -> Result<()> {
        let delay = Duration::from_millis(self.config.crawling.page_cooldown_ms);
        tokio::select! {
            _ = cancel.cancelled() => bail!("scrape cancelled"),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn summarize(
        mut session: PaginationSession,
        method: ExtractionMethod,
        started: Instant,
    ) -> ScrapeSummary {
        if session.status == SessionStatus::Running {
            session.status = SessionStatus::Completed;
        }
        info!(
            "scrape {} finished: {} records over {} pages ({:?})",
            session.id,
            session.records.len(),
            session.pages_fetched,
            session.status
        );
        ScrapeSummary {
            total_records: session.records.len(),
            pages_fetched: session.pages_fetched,
            site_type: session.site_type,
            extraction_method: method,
            page_titles: session.page_titles,
            started_at: session.started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
            records: session.records,
        }
    }
}

struct FetchedPage {
    page: RenderedPage,
    elapsed: Duration,
}

/// Pagination metadata from an API body: `pagination`, `meta.pagination`,
/// or a `page` object carrying current_page/total_pages (or an explicit
/// has_next flag). `None` when the body carries no recognizable metadata.
fn api_has_more(body: &Value, current_page: u32) -> Option<bool> {
    let candidates = [
        body.get("pagination"),
        body.get("meta").and_then(|m| m.get("pagination")),
        body.get("page"),
    ];
    for meta in candidates.into_iter().flatten() {
        for key in ["has_next", "hasNext", "has_more"] {
            if let Some(flag) = meta.get(key).and_then(Value::as_bool) {
                return Some(flag);
            }
        }
        let current = ["current_page", "currentPage", "current", "page"]
            .iter()
            .find_map(|k| meta.get(*k).and_then(Value::as_u64))
            .unwrap_or(u64::from(current_page));
        let total = ["total_pages", "totalPages", "pages"]
            .iter()
            .find_map(|k| meta.get(*k).and_then(Value::as_u64));
        if let Some(total) = total {
            return Some(current < total);
        }
    }
    None
}

/// Item objects from an API body, mapped generically onto product records.
fn api_records(body: &Value, session: &PaginationSession, page_number: u32) -> Vec<Record> {
    let items = match body {
        Value::Array(items) => Some(items),
        Value::Object(map) => ["data", "items", "results", "products"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array)),
        _ => None,
    };
    let Some(items) = items else { return Vec::new() };

    let platform_domain = Url::parse(&session.base_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default();

    let mut records = Vec::new();
    for item in items {
        let Value::Object(obj) = item else { continue };
        let field = |keys: &[&str]| -> Option<String> {
            keys.iter().find_map(|k| match obj.get(*k) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
        };
        let title = field(&["title", "name", "product_name"]);
        let price = field(&["price", "amount", "fare", "cost"]);
        if title.is_none() && price.is_none() {
            continue;
        }
        records.push(Record::Product {
            base: RecordBase {
                index: records.len() as u32 + 1,
                page_number,
                platform_domain: platform_domain.clone(),
                source_url: session.base_url.clone(),
                origin: RecordOrigin::Api,
            },
            fields: ProductFields {
                title,
                price,
                currency: field(&["currency"]),
                brand: field(&["brand"]),
                rating: obj.get("rating").and_then(Value::as_f64),
                image_url: field(&["image", "image_url", "thumbnail"]),
                product_url: field(&["url", "link", "product_url"]),
                ..Default::default()
            },
        });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_known_pagination_params_only() {
        let url = "https://shop.example/list?category=shoes&page=3&offset=60&sort=asc";
        let stripped = strip_pagination_params(url).unwrap();
        assert_eq!(stripped, "https://shop.example/list?category=shoes&sort=asc");
    }

    #[test]
    fn strip_leaves_clean_urls_alone() {
        let url = "https://shop.example/list";
        assert_eq!(strip_pagination_params(url).unwrap(), url);
    }

    #[test]
    fn page_url_appends_with_correct_separator() {
        assert_eq!(
            page_url("https://shop.example/list", 2).unwrap(),
            "https://shop.example/list?page=2"
        );
        assert_eq!(
            page_url("https://shop.example/list?sort=asc", 3).unwrap(),
            "https://shop.example/list?sort=asc&page=3"
        );
        assert_eq!(page_url("https://shop.example/list", 1).unwrap(), "https://shop.example/list");
    }

    #[test]
    fn api_metadata_shapes() {
        let flat = json!({ "pagination": { "current_page": 2, "total_pages": 5 } });
        assert_eq!(api_has_more(&flat, 2), Some(true));
        let nested = json!({ "meta": { "pagination": { "current_page": 5, "total_pages": 5 } } });
        assert_eq!(api_has_more(&nested, 5), Some(false));
        let page_obj = json!({ "page": { "has_next": false } });
        assert_eq!(api_has_more(&page_obj, 1), Some(false));
        let bare = json!({ "data": [] });
        assert_eq!(api_has_more(&bare, 1), None);
    }

    #[test]
    fn api_records_map_generic_item_arrays() {
        let session = PaginationSession::new("https://api.example/products".into(), SiteType::Ecommerce);
        let body = json!({
            "data": [
                { "name": "Widget", "price": 19.99, "brand": "Acme" },
                { "sku": "no-name-no-price" },
                { "title": "Gadget", "amount": "5.00" }
            ]
        });
        let records = api_records(&body, &session, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title(), Some("Widget"));
        assert_eq!(records[0].price(), Some("19.99"));
        assert_eq!(records[1].title(), Some("Gadget"));
        assert_eq!(records[0].base().origin, RecordOrigin::Api);
    }
}
