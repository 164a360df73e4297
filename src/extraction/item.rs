//! Per-container record extraction
//!
//! Turns one container candidate into at most one record by running ordered
//! field tactics against the subtree. Tactics degrade from dedicated
//! selectors through link/image attributes and structured data down to
//! regex inference over the flattened text, and the best-confidence
//! candidate wins per field. A container yields a record only when at least
//! one identifying field (title, price or route) survives.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::domain::page::SiteType;
use crate::domain::record::{
    ProductFields, Record, RecordBase, RecordOrigin, TravelFields, TravelKind,
};
use crate::extraction::candidates::{compile_selectors, CandidateSelector, ContainerCandidate};
use crate::extraction::context::ExtractContext;
use crate::extraction::error::ExtractResult;
use crate::extraction::fields::{self, Confidence, FieldCandidate, FieldKind};
use crate::extraction::structured::{read_structured_records, StructuredRecord};

const TITLE_SELECTORS: &[&str] = &[
    "h1", "h2", "h3", "h4",
    r#"[class*="title"]"#,
    r#"[class*="name"]"#,
    ".product-title",
    ".product-name",
];
const TITLE_ATTR_SELECTORS: &[&str] = &["a[title]", "img[alt]"];
const PRICE_SELECTORS: &[&str] = &[
    r#"[class*="price"]"#,
    "[data-price]",
    r#"span[class*="amount"]"#,
    r#"[class*="cost"]"#,
    r#"[class*="fare"]"#,
];
const ORIGINAL_PRICE_SELECTORS: &[&str] = &[
    "del",
    "s",
    r#"[class*="original"]"#,
    r#"[class*="was-price"]"#,
    r#"[class*="mrp"]"#,
    r#"[class*="strike"]"#,
    r#"[class*="list-price"]"#,
];
const DISCOUNT_SELECTORS: &[&str] = &[
    r#"[class*="discount"]"#,
    r#"[class*="off"]"#,
    r#"[class*="save"]"#,
    r#"[class*="deal"]"#,
];
const RATING_SELECTORS: &[&str] = &[
    r#"[class*="rating"]"#,
    r#"[class*="star"]"#,
    r#"[class*="review"]"#,
];
const BRAND_SELECTORS: &[&str] = &[r#"[class*="brand"]"#, "[data-brand]"];
const IMAGE_SELECTOR: &str = "img";
const LINK_SELECTORS: &[&str] = &["a[href]", "a[data-href]"];

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

/// Extracts one record from one candidate subtree.
pub struct ItemExtractor {
    title: Vec<Selector>,
    title_attr: Vec<Selector>,
    price: Vec<Selector>,
    original_price: Vec<Selector>,
    discount: Vec<Selector>,
    rating: Vec<Selector>,
    brand: Vec<Selector>,
    image: Selector,
    link: Vec<Selector>,
}

impl ItemExtractor {
    pub fn new() -> ExtractResult<Self> {
        Ok(Self {
            title: compile_selectors("item-title", TITLE_SELECTORS)?,
            title_attr: compile_selectors("item-title-attr", TITLE_ATTR_SELECTORS)?,
            price: compile_selectors("item-price", PRICE_SELECTORS)?,
            original_price: compile_selectors("item-original-price", ORIGINAL_PRICE_SELECTORS)?,
            discount: compile_selectors("item-discount", DISCOUNT_SELECTORS)?,
            rating: compile_selectors("item-rating", RATING_SELECTORS)?,
            brand: compile_selectors("item-brand", BRAND_SELECTORS)?,
            image: compile_selectors("item-image", &[IMAGE_SELECTOR])?.remove(0),
            link: compile_selectors("item-link", LINK_SELECTORS)?,
        })
    }

    /// Extract a record from one container, or `None` when no identifying
    /// field could be found. Pure over the container: same subtree, same
    /// record.
    pub fn extract(&self, candidate: &ContainerCandidate<'_>, ctx: &ExtractContext) -> Option<Record> {
        let base = RecordBase {
            index: 0,
            page_number: ctx.page_number,
            platform_domain: ctx.platform_domain(),
            source_url: ctx.base_url.to_string(),
            origin: RecordOrigin::Markup,
        };
        match ctx.site_type {
            SiteType::Travel => self.extract_travel(candidate, ctx, base),
            _ => self.extract_product(candidate, ctx, base),
        }
    }

    fn extract_product(
        &self,
        candidate: &ContainerCandidate<'_>,
        ctx: &ExtractContext,
        base: RecordBase,
    ) -> Option<Record> {
        let el = &candidate.element;
        let text = &candidate.text;

        let title = self.find_title(el, text);
        let price = self.find_price(el, text);
        if title.is_none() && price.is_none() {
            return None;
        }

        let currency = price.as_deref().and_then(fields::detect_currency);
        let original_price = self.find_original_price(el, price.as_deref());
        let discount = self
            .first_selector_text(&self.discount, el)
            .as_deref()
            .and_then(fields::first_discount)
            .or_else(|| fields::first_discount(text));
        let rating = self
            .first_selector_text(&self.rating, el)
            .as_deref()
            .and_then(fields::first_rating)
            .or_else(|| fields::first_rating(text));
        let brand = self
            .first_selector_text(&self.brand, el)
            .and_then(|t| fields::clean_title(&t))
            .or_else(|| title.as_deref().and_then(fields::brand_from_title));
        let year = title
            .as_deref()
            .and_then(fields::first_year)
            .or_else(|| fields::first_year(text));

        Some(Record::Product {
            base,
            fields: ProductFields {
                title,
                price,
                currency: currency.map(str::to_owned),
                original_price,
                discount,
                rating: rating.map(|r| r.value),
                rating_scale: rating.map(|r| r.scale),
                reviews_count: fields::first_review_count(text),
                brand,
                year,
                image_url: self.find_image(el, ctx),
                product_url: self.find_link(el, ctx),
            },
        })
    }

    fn extract_travel(
        &self,
        candidate: &ContainerCandidate<'_>,
        ctx: &ExtractContext,
        base: RecordBase,
    ) -> Option<Record> {
        let el = &candidate.element;
        let text = &candidate.text;

        let price = self.find_price(el, text);
        let route = fields::first_route(text);
        let operator = fields::first_operator(text);
        let title = self
            .find_title(el, text)
            .or_else(|| operator.clone())
            .or_else(|| route.clone());
        if title.is_none() && price.is_none() && route.is_none() {
            return None;
        }

        let times = fields::clock_times(text);
        let currency = price.as_deref().and_then(fields::detect_currency);

        Some(Record::TravelFare {
            base,
            fields: TravelFields {
                kind: detect_travel_kind(el, text),
                title,
                price,
                currency: currency.map(str::to_owned),
                departure_time: times.first().cloned(),
                arrival_time: times.get(1).cloned(),
                duration: fields::first_duration(text),
                operator,
                route,
                stops: fields::first_stops(text),
                image_url: self.find_image(el, ctx),
                booking_url: self.find_link(el, ctx),
            },
        })
    }

    /// Title candidates in confidence order: heading/name selectors, then
    /// link/image title attributes, then the longest plausible text run in
    /// the subtree. The best-confidence plausible candidate wins.
    fn find_title(&self, el: &ElementRef<'_>, text: &str) -> Option<String> {
        let mut candidates: Vec<FieldCandidate> = Vec::new();
        for selector in &self.title {
            for hit in el.select(selector) {
                candidates.push(FieldCandidate {
                    kind: FieldKind::Title,
                    raw_text: element_text(&hit),
                    confidence: Confidence::Selector,
                });
            }
        }
        for selector in &self.title_attr {
            for hit in el.select(selector) {
                if let Some(attr) = hit.value().attr("title").or_else(|| hit.value().attr("alt")) {
                    candidates.push(FieldCandidate {
                        kind: FieldKind::Title,
                        raw_text: attr.to_owned(),
                        confidence: Confidence::LinkAttr,
                    });
                }
            }
        }
        if let Some(longest) = text.split(['\n', '|']).filter_map(fields::clean_title).max_by_key(String::len) {
            candidates.push(FieldCandidate {
                kind: FieldKind::Title,
                raw_text: longest,
                confidence: Confidence::RegexInferred,
            });
        }
        candidates.sort_by_key(|c| c.confidence);
        candidates
            .iter()
            .find_map(|c| fields::clean_title(&c.raw_text))
    }

    fn find_price(&self, el: &ElementRef<'_>, text: &str) -> Option<String> {
        for selector in &self.price {
            for hit in el.select(selector) {
                if let Some(price) = fields::first_price(&element_text(&hit)) {
                    return Some(price.raw);
                }
            }
        }
        fields::first_price(text).map(|p| p.raw)
    }

    /// A struck-through price distinct from the current one.
    fn find_original_price(&self, el: &ElementRef<'_>, current: Option<&str>) -> Option<String> {
        for selector in &self.original_price {
            for hit in el.select(selector) {
                if let Some(price) = fields::first_price(&element_text(&hit)) {
                    if current != Some(price.raw.as_str()) {
                        return Some(price.raw);
                    }
                }
            }
        }
        None
    }

    fn first_selector_text(&self, selectors: &[Selector], el: &ElementRef<'_>) -> Option<String> {
        for selector in selectors {
            if let Some(hit) = el.select(selector).next() {
                let text = element_text(&hit);
                if !text.trim().is_empty() {
                    return Some(text);
                }
            }
        }
        None
    }

    fn find_image(&self, el: &ElementRef<'_>, ctx: &ExtractContext) -> Option<String> {
        for img in el.select(&self.image) {
            for attr in ["src", "data-src", "data-lazy-src"] {
                let Some(value) = img.value().attr(attr) else { continue };
                // Inline placeholders carry no retrievable image.
                if value.is_empty() || value.starts_with("data:") {
                    continue;
                }
                if let Some(resolved) = ctx.resolve(value) {
                    return Some(resolved);
                }
            }
        }
        None
    }

    fn find_link(&self, el: &ElementRef<'_>, ctx: &ExtractContext) -> Option<String> {
        for selector in &self.link {
            for a in el.select(selector) {
                let href = a.value().attr("href").or_else(|| a.value().attr("data-href"));
                let Some(href) = href else { continue };
                if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
                    continue;
                }
                if let Some(resolved) = ctx.resolve(href) {
                    return Some(resolved);
                }
            }
        }
        None
    }
}

/// Travel inventory kind from the container's class names and text.
fn detect_travel_kind(el: &ElementRef<'_>, text: &str) -> TravelKind {
    let mut haystack = el
        .value()
        .attr("class")
        .unwrap_or_default()
        .to_lowercase();
    haystack.push(' ');
    haystack.push_str(&text.to_lowercase());

    if ["flight", "airline", "airport"].iter().any(|k| haystack.contains(k)) {
        TravelKind::Flight
    } else if ["bus", "coach", "sleeper", "seater"].iter().any(|k| haystack.contains(k)) {
        TravelKind::Bus
    } else if ["hotel", "property", "room", "night"].iter().any(|k| haystack.contains(k)) {
        TravelKind::Hotel
    } else {
        TravelKind::Other
    }
}

/// Whole-page extraction: candidate cascade, per-container extraction,
/// structured-data fold-in, dedup, then 1-based reindexing.
pub struct PageExtractor {
    candidates: CandidateSelector,
    items: ItemExtractor,
}

impl PageExtractor {
    pub fn new() -> ExtractResult<Self> {
        Ok(Self {
            candidates: CandidateSelector::new()?,
            items: ItemExtractor::new()?,
        })
    }

    pub fn extract_records(&self, html: &str, ctx: &ExtractContext) -> Vec<Record> {
        let document = Html::parse_document(html);
        let candidates = self.candidates.select(&document, ctx.site_type);
        let structured = read_structured_records(&document);

        let mut records = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            if let Some(mut record) = self.items.extract(candidate, ctx) {
                enrich_from_structured(&mut record, &candidate.text, &structured);
                records.push(record);
            }
        }

        // Structured records nothing in the markup claimed become records of
        // their own on non-travel pages.
        if !ctx.site_type.is_travel() {
            append_unclaimed_structured(&mut records, &structured, ctx);
        }

        let mut seen = std::collections::HashSet::new();
        records.retain(|record| seen.insert(record.dedup_key()));
        for (position, record) in records.iter_mut().enumerate() {
            record.base_mut().index = position as u32 + 1;
        }
        debug!(
            "extracted {} records from {} candidates",
            records.len(),
            candidates.len()
        );
        records
    }
}

/// Fill gaps in a markup record from the structured record whose name
/// appears in the container text. Markup wins on conflict; structured data
/// only supplies what the selectors missed.
fn enrich_from_structured(record: &mut Record, container_text: &str, structured: &[StructuredRecord]) {
    let Record::Product { fields, .. } = record else { return };
    let lowered = container_text.to_lowercase();
    let Some(source) = structured.iter().find(|s| {
        s.name()
            .is_some_and(|name| name.len() >= 3 && lowered.contains(&name.to_lowercase()))
    }) else {
        return;
    };

    if fields.title.is_none() {
        fields.title = source.name();
    }
    if fields.price.is_none() {
        fields.price = source.price();
        fields.currency = source.property("priceCurrency");
    }
    if fields.brand.is_none() {
        fields.brand = source.property("brand");
    }
    if fields.image_url.is_none() {
        fields.image_url = source.property("image");
    }
}

fn append_unclaimed_structured(
    records: &mut Vec<Record>,
    structured: &[StructuredRecord],
    ctx: &ExtractContext,
) {
    let claimed: Vec<String> = records
        .iter()
        .filter_map(|r| r.title().map(str::to_lowercase))
        .collect();

    for source in structured {
        let Some(name) = source.name() else { continue };
        let name_lower = name.to_lowercase();
        if claimed.iter().any(|t| t.contains(&name_lower)) {
            continue;
        }
        records.push(Record::Product {
            base: RecordBase {
                index: 0,
                page_number: ctx.page_number,
                platform_domain: ctx.platform_domain(),
                source_url: ctx.base_url.to_string(),
                origin: RecordOrigin::StructuredData { source_id: source.source_id.clone() },
            },
            fields: ProductFields {
                title: Some(name),
                price: source.price(),
                currency: source.property("priceCurrency"),
                brand: source.property("brand"),
                image_url: source.property("image"),
                product_url: source.property("url").and_then(|u| ctx.resolve(&u)),
                ..Default::default()
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(site_type: SiteType) -> ExtractContext {
        ExtractContext::new("https://shop.example/list?page=1", site_type, 1).unwrap()
    }

    fn travel_ctx() -> ExtractContext {
        ExtractContext::new("https://bus.example/search", SiteType::Travel, 1).unwrap()
    }

    #[test]
    fn product_card_with_full_fields() {
        let html = r#"<html><body>
            <div class="product-card">
              <a href="/p/42"><img src="/img/42.jpg" alt="Acme Kettle"></a>
              <h3 class="product-title">Acme Electric Kettle 1.5L</h3>
              <span class="price">$34.99</span>
              <span class="original-price">$49.99</span>
              <span class="discount">30% off</span>
              <div class="rating">4.5 out of 5 stars</div>
              <span>2,143 reviews</span>
            </div>
        </body></html>"#;
        let extractor = PageExtractor::new().unwrap();
        let records = extractor.extract_records(html, &ctx(SiteType::Ecommerce));
        assert_eq!(records.len(), 1);
        let Record::Product { base, fields } = &records[0] else { panic!("expected product") };
        assert_eq!(base.index, 1);
        assert_eq!(fields.title.as_deref(), Some("Acme Electric Kettle 1.5L"));
        assert_eq!(fields.price.as_deref(), Some("$34.99"));
        assert_eq!(fields.currency.as_deref(), Some("USD"));
        assert_eq!(fields.original_price.as_deref(), Some("$49.99"));
        assert_eq!(fields.discount.as_deref(), Some("30% off"));
        assert_eq!(fields.rating, Some(4.5));
        assert_eq!(fields.rating_scale, Some(5));
        assert_eq!(fields.reviews_count.as_deref(), Some("2,143"));
        assert_eq!(fields.image_url.as_deref(), Some("https://shop.example/img/42.jpg"));
        assert_eq!(fields.product_url.as_deref(), Some("https://shop.example/p/42"));
    }

    #[test]
    fn container_without_title_or_price_is_dropped() {
        let html = r#"<div class="product-card"><span>Add</span><span>View</span></div>"#;
        let extractor = PageExtractor::new().unwrap();
        let records = extractor.extract_records(html, &ctx(SiteType::Ecommerce));
        assert!(records.is_empty());
    }

    #[test]
    fn title_only_record_is_accepted() {
        let html = r#"<div class="product-card"><h3>Mystery Box Bundle</h3></div>"#;
        let extractor = PageExtractor::new().unwrap();
        let records = extractor.extract_records(html, &ctx(SiteType::Ecommerce));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title(), Some("Mystery Box Bundle"));
        assert_eq!(records[0].price(), None);
    }

    #[test]
    fn duplicate_titles_collapse_to_one_record() {
        let html = r#"
            <div class="product-card"><h3>Same Widget</h3><span class="price">$10</span></div>
            <div class="product-card" data-x="1"><h3>Same  widget</h3><span class="price">$10</span></div>
            <div class="product-card"><h3>Other Widget</h3><span class="price">$12</span></div>"#;
        let extractor = PageExtractor::new().unwrap();
        let records = extractor.extract_records(html, &ctx(SiteType::Ecommerce));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].base().index, 1);
        assert_eq!(records[1].base().index, 2);
    }

    #[test]
    fn travel_card_extracts_fare_fields() {
        let html = r#"<div class="bus-card">
            <div class="operator-name">Operator: Blue Line Express</div>
            <span>06:30 AM</span> <span>11:45 PM</span>
            <span>Duration: 5h</span>
            <div>From Bangalore to Chennai</div>
            <span class="fare">₹899</span>
            <span>Non-stop</span>
        </div>"#;
        let extractor = PageExtractor::new().unwrap();
        let records = extractor.extract_records(html, &travel_ctx());
        assert_eq!(records.len(), 1);
        let Record::TravelFare { fields, .. } = &records[0] else { panic!("expected fare") };
        assert_eq!(fields.kind, TravelKind::Bus);
        assert_eq!(fields.price.as_deref(), Some("₹899"));
        assert_eq!(fields.currency.as_deref(), Some("INR"));
        assert_eq!(fields.departure_time.as_deref(), Some("06:30 AM"));
        assert_eq!(fields.arrival_time.as_deref(), Some("11:45 PM"));
        assert_eq!(fields.duration.as_deref(), Some("5h"));
        assert_eq!(fields.operator.as_deref(), Some("Blue Line Express"));
        assert_eq!(fields.route.as_deref(), Some("Bangalore to Chennai"));
        assert_eq!(fields.stops.as_deref(), Some("Non-stop"));
    }

    #[test]
    fn route_only_travel_card_is_accepted() {
        let html = r#"<div class="route-card">From Mumbai to Pune every hour</div>"#;
        let extractor = PageExtractor::new().unwrap();
        let records = extractor.extract_records(html, &travel_ctx());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].route(), Some("Mumbai to Pune"));
    }

    #[test]
    fn structured_data_fills_missing_fields() {
        let html = r#"<html><head>
            <script type="application/ld+json">
              {"@id":"sku-9","name":"Acme Kettle","brand":"Acme",
               "offers":{"price":"29.99","priceCurrency":"USD"}}
            </script></head><body>
            <div class="product-card"><h3>Acme Kettle</h3></div>
        </body></html>"#;
        let extractor = PageExtractor::new().unwrap();
        let records = extractor.extract_records(html, &ctx(SiteType::Ecommerce));
        assert_eq!(records.len(), 1);
        let Record::Product { base, fields } = &records[0] else { panic!("expected product") };
        assert_eq!(base.origin, RecordOrigin::Markup);
        assert_eq!(fields.price.as_deref(), Some("29.99"));
        assert_eq!(fields.currency.as_deref(), Some("USD"));
        assert_eq!(fields.brand.as_deref(), Some("Acme"));
    }

    #[test]
    fn unclaimed_structured_records_are_appended() {
        let html = r#"<html><head>
            <script type="application/ld+json">
              {"sku":"only-sd","name":"Ghost Product","offers":{"price":"5.00"}}
            </script></head><body><p>no product markup here</p></body></html>"#;
        let extractor = PageExtractor::new().unwrap();
        let records = extractor.extract_records(html, &ctx(SiteType::Ecommerce));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title(), Some("Ghost Product"));
        assert_eq!(
            records[0].base().origin,
            RecordOrigin::StructuredData { source_id: "only-sd".into() }
        );
    }

    #[test]
    fn extraction_is_pure_over_the_same_markup() {
        let html = r#"<div class="product-card"><h3>Stable Widget</h3><span class="price">$7</span></div>"#;
        let extractor = PageExtractor::new().unwrap();
        let first = extractor.extract_records(html, &ctx(SiteType::Ecommerce));
        let second = extractor.extract_records(html, &ctx(SiteType::Ecommerce));
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].dedup_key(), second[0].dedup_key());
    }
}
