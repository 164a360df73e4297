//! Vision fallback extraction
//!
//! Last resort for pages whose markup defeats the selector cascade: take a
//! full-page screenshot, ask the oracle to read the visible records, and
//! map whatever JSON array comes back onto the record schema. Every failure
//! on this path degrades to an empty result; the fallback must never sink
//! a scrape that already has partial records.

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::page::SiteType;
use crate::domain::record::{
    ProductFields, Record, RecordBase, RecordOrigin, TravelFields, TravelKind,
};
use crate::extraction::context::ExtractContext;
use crate::infrastructure::oracle::{ExtractionOracle, OraclePayload, OracleRequest};
use crate::infrastructure::renderer::PageRenderer;

/// Locate the first complete JSON array in free-form text. Depth-counted
/// and string-aware, so brackets inside string values do not confuse it.
pub fn find_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'[' if !in_string => depth += 1,
            b']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Instruction the oracle receives, per site vocabulary.
pub fn build_instruction(site_type: SiteType) -> String {
    let (noun, fields) = match site_type {
        SiteType::Travel => (
            "travel fares (bus, flight or hotel offers)",
            "title, price, departure_time, arrival_time, duration, operator, route, stops",
        ),
        _ => (
            "product listings",
            "title, price, original_price, discount, rating, brand, image_url",
        ),
    };
    format!(
        "You are reading a screenshot of a web page that lists {noun}. \
         Extract every visible item and reply with a JSON array of objects \
         with these keys where visible: {fields}. Use null for anything not \
         shown. Reply with the JSON array only."
    )
}

fn string_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match obj.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_owned()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// Map one oracle reply onto records. Objects with neither a title nor a
/// price nor a route are dropped, same acceptance rule as markup
/// extraction.
pub fn records_from_reply(reply: &str, ctx: &ExtractContext) -> Vec<Record> {
    let Some(array_text) = find_json_array(reply) else {
        warn!("oracle reply contained no JSON array");
        return Vec::new();
    };
    let parsed: Value = match serde_json::from_str(array_text) {
        Ok(value) => value,
        Err(err) => {
            warn!("oracle reply JSON failed to parse: {err}");
            return Vec::new();
        }
    };
    let Value::Array(items) = parsed else { return Vec::new() };

    let mut records = Vec::new();
    for item in items {
        let Value::Object(obj) = item else { continue };
        let base = RecordBase {
            index: records.len() as u32 + 1,
            page_number: ctx.page_number,
            platform_domain: ctx.platform_domain(),
            source_url: ctx.base_url.to_string(),
            origin: RecordOrigin::Vision,
        };
        let record = if ctx.site_type.is_travel() {
            let fields = TravelFields {
                kind: travel_kind_from(&obj),
                title: string_field(&obj, &["title", "name", "operator"]),
                price: string_field(&obj, &["price", "fare", "amount"]),
                currency: string_field(&obj, &["currency"]),
                departure_time: string_field(&obj, &["departure_time", "departure"]),
                arrival_time: string_field(&obj, &["arrival_time", "arrival"]),
                duration: string_field(&obj, &["duration"]),
                operator: string_field(&obj, &["operator", "airline"]),
                route: string_field(&obj, &["route"]),
                stops: string_field(&obj, &["stops"]),
                image_url: None,
                booking_url: None,
            };
            if fields.title.is_none() && fields.price.is_none() && fields.route.is_none() {
                continue;
            }
            Record::TravelFare { base, fields }
        } else {
            let fields = ProductFields {
                title: string_field(&obj, &["title", "name"]),
                price: string_field(&obj, &["price", "amount"]),
                currency: string_field(&obj, &["currency"]),
                original_price: string_field(&obj, &["original_price", "mrp"]),
                discount: string_field(&obj, &["discount"]),
                rating: obj.get("rating").and_then(Value::as_f64),
                rating_scale: None,
                reviews_count: string_field(&obj, &["reviews", "reviews_count"]),
                brand: string_field(&obj, &["brand"]),
                year: None,
                image_url: string_field(&obj, &["image_url", "image"]),
                product_url: string_field(&obj, &["product_url", "url"]),
            };
            if fields.title.is_none() && fields.price.is_none() {
                continue;
            }
            Record::Product { base, fields }
        };
        records.push(record);
    }
    debug!("vision reply mapped to {} records", records.len());
    records
}

fn travel_kind_from(obj: &serde_json::Map<String, Value>) -> TravelKind {
    let hint = string_field(obj, &["kind", "type"]).unwrap_or_default().to_lowercase();
    if hint.contains("flight") {
        TravelKind::Flight
    } else if hint.contains("bus") {
        TravelKind::Bus
    } else if hint.contains("hotel") {
        TravelKind::Hotel
    } else {
        TravelKind::Other
    }
}

/// Screenshot the page and ask the oracle to read it. Transport or parse
/// failures log and yield an empty set.
pub async fn extract_via_vision(
    renderer: &dyn PageRenderer,
    oracle: &dyn ExtractionOracle,
    url: &str,
    ctx: &ExtractContext,
) -> Vec<Record> {
    let screenshot = match renderer.screenshot(url).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("vision fallback could not capture {url}: {err}");
            return Vec::new();
        }
    };
    let request = OracleRequest {
        site_type: ctx.site_type,
        instruction: build_instruction(ctx.site_type),
        payload: OraclePayload::Image(screenshot),
    };
    match oracle.extract(&request).await {
        Ok(reply) => records_from_reply(&reply, ctx),
        Err(err) => {
            warn!("vision oracle call failed for {url}: {err}");
            Vec::new()
        }
    }
}
