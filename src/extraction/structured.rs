//! Embedded structured-data reader
//!
//! Harvests machine-readable records already present in a document:
//! JSON-LD `<script type="application/ld+json">` blocks and microdata
//! itemtype/itemprop attributes. These records are folded into item
//! extraction as a high-trust field source.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

/// One machine-readable record lifted out of the document.
#[derive(Debug, Clone)]
pub struct StructuredRecord {
    /// Stable identity of the source object: `@id` when present, else the
    /// object's name, else a positional fallback.
    pub source_id: String,
    /// Flattened property map (JSON-LD object or microdata itemprops).
    pub properties: serde_json::Map<String, Value>,
}

impl StructuredRecord {
    /// String-valued property, trimmed; numbers are stringified.
    pub fn property(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_owned())
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<String> {
        self.property("name").or_else(|| self.property("title"))
    }

    /// Price, looking through a nested JSON-LD `offers` object when the
    /// top-level property is absent.
    pub fn price(&self) -> Option<String> {
        if let Some(price) = self.property("price") {
            return Some(price);
        }
        let offers = match self.properties.get("offers")? {
            Value::Object(o) => o.clone(),
            Value::Array(items) => match items.first()? {
                Value::Object(o) => o.clone(),
                _ => return None,
            },
            _ => return None,
        };
        for key in ["price", "lowPrice"] {
            match offers.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => {
                    return Some(s.trim().to_owned());
                }
                Some(Value::Number(n)) => return Some(n.to_string()),
                _ => {}
            }
        }
        None
    }
}

static JSON_LD: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector")
});
static ITEMSCOPE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[itemtype]").expect("static selector"));
static ITEMPROP: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[itemprop]").expect("static selector"));

/// Read all structured records from a parsed document. Malformed JSON-LD
/// blocks are skipped, never fatal.
pub fn read_structured_records(document: &Html) -> Vec<StructuredRecord> {
    let mut records = Vec::new();

    for script in document.select(&JSON_LD) {
        let text: String = script.text().collect();
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => push_json_ld(&mut records, map),
            Ok(Value::Array(items)) => {
                for item in items {
                    if let Value::Object(map) = item {
                        push_json_ld(&mut records, map);
                    }
                }
            }
            Ok(_) => {}
            Err(err) => debug!("skipping malformed JSON-LD block: {err}"),
        }
    }

    for scope in document.select(&ITEMSCOPE) {
        let mut properties = serde_json::Map::new();
        for prop in scope.select(&ITEMPROP) {
            let Some(key) = prop.value().attr("itemprop") else { continue };
            let value = prop
                .value()
                .attr("content")
                .map(str::to_owned)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| prop.text().collect::<String>().trim().to_owned());
            if !value.is_empty() {
                properties.insert(key.to_owned(), Value::String(value));
            }
        }
        if !properties.is_empty() {
            let source_id = source_identity(&properties, records.len());
            records.push(StructuredRecord { source_id, properties });
        }
    }

    debug!("structured-data reader found {} records", records.len());
    records
}

fn push_json_ld(records: &mut Vec<StructuredRecord>, map: serde_json::Map<String, Value>) {
    // An ItemList wraps its entries; unwrap one level so list pages yield
    // one record per entry.
    if let Some(Value::Array(elements)) = map.get("itemListElement") {
        for element in elements {
            let obj = match element {
                Value::Object(o) => match o.get("item") {
                    Some(Value::Object(inner)) => inner.clone(),
                    _ => o.clone(),
                },
                _ => continue,
            };
            let source_id = source_identity(&obj, records.len());
            records.push(StructuredRecord { source_id, properties: obj });
        }
        return;
    }
    let source_id = source_identity(&map, records.len());
    records.push(StructuredRecord { source_id, properties: map });
}

fn source_identity(map: &serde_json::Map<String, Value>, position: usize) -> String {
    for key in ["@id", "sku", "name"] {
        if let Some(Value::String(s)) = map.get(key) {
            if !s.trim().is_empty() {
                return s.trim().to_owned();
            }
        }
    }
    format!("structured-{position}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_json_ld_objects_and_arrays() {
        let html = Html::parse_document(
            r#"<html><head>
            <script type="application/ld+json">{"@id":"p1","name":"Widget","offers":{"price":"19.99"}}</script>
            <script type="application/ld+json">[{"name":"Gadget"},{"name":"Gizmo"}]</script>
            <script type="application/ld+json">not json</script>
            </head><body></body></html>"#,
        );
        let records = read_structured_records(&html);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].source_id, "p1");
        assert_eq!(records[0].price().unwrap(), "19.99");
        assert_eq!(records[1].name().unwrap(), "Gadget");
    }

    #[test]
    fn unwraps_item_list_elements() {
        let html = Html::parse_document(
            r#"<script type="application/ld+json">
            {"@type":"ItemList","itemListElement":[
              {"@type":"ListItem","item":{"name":"First","sku":"A1"}},
              {"@type":"ListItem","item":{"name":"Second","sku":"A2"}}
            ]}</script>"#,
        );
        let records = read_structured_records(&html);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_id, "A1");
        assert_eq!(records[1].name().unwrap(), "Second");
    }

    #[test]
    fn reads_microdata_properties() {
        let html = Html::parse_document(
            r#"<div itemscope itemtype="https://schema.org/Product">
                 <span itemprop="name">Acme Kettle</span>
                 <meta itemprop="price" content="29.99">
               </div>"#,
        );
        let records = read_structured_records(&html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name().unwrap(), "Acme Kettle");
        assert_eq!(records[0].property("price").unwrap(), "29.99");
    }
}
