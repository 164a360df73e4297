//! Extracted record model
//!
//! Records are the externally visible output of an extraction pass. A record
//! is built once, never mutated, and appended to its page's result list.
//! Product and travel-fare shapes share a common base and are kept as a
//! tagged union so a result set can mix origins without losing typing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::page::SiteType;

/// Where a record came from, used for dedup identity and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Extracted from the rendered markup by the selector cascade.
    Markup,
    /// Folded out of an embedded structured-data object; carries the source
    /// object identity (`@id` or name) used as the dedup key.
    StructuredData { source_id: String },
    /// Produced by the vision fallback path.
    Vision,
    /// Mapped from a JSON API response body.
    Api,
}

/// Fields shared by every record variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordBase {
    /// 1-based position within its page.
    pub index: u32,
    /// 1-based page number the record was found on.
    pub page_number: u32,
    /// Host the record was extracted from.
    pub platform_domain: String,
    /// URL of the page the record was extracted from.
    pub source_url: String,
    pub origin: RecordOrigin,
}

/// Product listing fields. All optional: a record is accepted as long as
/// the extractor found a title or a price.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductFields {
    pub title: Option<String>,
    pub price: Option<String>,
    pub currency: Option<String>,
    pub original_price: Option<String>,
    pub discount: Option<String>,
    pub rating: Option<f64>,
    pub rating_scale: Option<u8>,
    pub reviews_count: Option<String>,
    pub brand: Option<String>,
    pub year: Option<u16>,
    pub image_url: Option<String>,
    pub product_url: Option<String>,
}

/// Kind of travel inventory a fare describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelKind {
    Bus,
    Flight,
    Hotel,
    Other,
}

/// Travel fare fields: the product base plus route/timing data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelFields {
    pub kind: TravelKind,
    pub title: Option<String>,
    pub price: Option<String>,
    pub currency: Option<String>,
    pub departure_time: Option<String>,
    pub arrival_time: Option<String>,
    pub duration: Option<String>,
    pub operator: Option<String>,
    pub route: Option<String>,
    pub stops: Option<String>,
    pub image_url: Option<String>,
    pub booking_url: Option<String>,
}

impl Default for TravelFields {
    fn default() -> Self {
        Self {
            kind: TravelKind::Other,
            title: None,
            price: None,
            currency: None,
            departure_time: None,
            arrival_time: None,
            duration: None,
            operator: None,
            route: None,
            stops: None,
            image_url: None,
            booking_url: None,
        }
    }
}

/// One extracted entity, tagged by site variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum Record {
    Product {
        #[serde(flatten)]
        base: RecordBase,
        #[serde(flatten)]
        fields: ProductFields,
    },
    TravelFare {
        #[serde(flatten)]
        base: RecordBase,
        #[serde(flatten)]
        fields: TravelFields,
    },
}

impl Record {
    pub fn base(&self) -> &RecordBase {
        match self {
            Self::Product { base, .. } | Self::TravelFare { base, .. } => base,
        }
    }

    pub fn base_mut(&mut self) -> &mut RecordBase {
        match self {
            Self::Product { base, .. } | Self::TravelFare { base, .. } => base,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Product { fields, .. } => fields.title.as_deref(),
            Self::TravelFare { fields, .. } => fields.title.as_deref(),
        }
    }

    pub fn price(&self) -> Option<&str> {
        match self {
            Self::Product { fields, .. } => fields.price.as_deref(),
            Self::TravelFare { fields, .. } => fields.price.as_deref(),
        }
    }

    pub fn route(&self) -> Option<&str> {
        match self {
            Self::TravelFare { fields, .. } => fields.route.as_deref(),
            Self::Product { .. } => None,
        }
    }

    /// Identity used to deduplicate records within one extraction pass.
    ///
    /// Markup and vision records key on normalized title+price text;
    /// structured-data records key on their source object identity so two
    /// JSON-LD objects with identical display text stay distinct.
    pub fn dedup_key(&self) -> String {
        if let RecordOrigin::StructuredData { source_id } = &self.base().origin {
            return format!("sd:{source_id}");
        }
        let title = self.title().unwrap_or_default();
        let price = self.price().unwrap_or_default();
        let mut key = String::with_capacity(title.len() + price.len() + 1);
        for part in [title, price] {
            for word in part.split_whitespace() {
                key.push_str(&word.to_lowercase());
                key.push(' ');
            }
            key.push('|');
        }
        key
    }
}

/// How a page's result set was produced, reported in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Markup,
    Vision,
    Api,
}

/// Aggregate result of one multi-page scrape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeSummary {
    pub total_records: usize,
    pub pages_fetched: u32,
    pub site_type: SiteType,
    pub extraction_method: ExtractionMethod,
    pub page_titles: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub records: Vec<Record>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(origin: RecordOrigin) -> RecordBase {
        RecordBase {
            index: 1,
            page_number: 1,
            platform_domain: "shop.example".into(),
            source_url: "https://shop.example/list".into(),
            origin,
        }
    }

    #[test]
    fn dedup_key_normalizes_whitespace_and_case() {
        let a = Record::Product {
            base: base(RecordOrigin::Markup),
            fields: ProductFields {
                title: Some("Acme  Widget".into()),
                price: Some("$19.99".into()),
                ..Default::default()
            },
        };
        let b = Record::Product {
            base: base(RecordOrigin::Markup),
            fields: ProductFields {
                title: Some("ACME widget ".into()),
                price: Some(" $19.99".into()),
                ..Default::default()
            },
        };
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn structured_data_records_key_on_source_identity() {
        let a = Record::Product {
            base: base(RecordOrigin::StructuredData { source_id: "sku-1".into() }),
            fields: ProductFields { title: Some("Same".into()), ..Default::default() },
        };
        let b = Record::Product {
            base: base(RecordOrigin::StructuredData { source_id: "sku-2".into() }),
            fields: ProductFields { title: Some("Same".into()), ..Default::default() },
        };
        assert_ne!(a.dedup_key(), b.dedup_key());
    }
}
