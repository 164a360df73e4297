//! Container candidate selection
//!
//! Produces an ordered, deduplicated list of DOM subtrees likely to
//! represent one record each. Selection cascades from specific to generic:
//! curated domain-vocabulary selectors first, then a currency-pattern scan,
//! then (travel only) a clock-time scan. Cascading this way trades
//! precision for recall only when precision fails.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::domain::page::SiteType;
use crate::extraction::error::{ExtractError, ExtractResult};
use crate::extraction::fields;

/// A subtree nominated as one record, valid only while the parsed page is
/// alive. Carries its flattened text so downstream tactics scan it once.
#[derive(Debug, Clone)]
pub struct ContainerCandidate<'a> {
    pub element: ElementRef<'a>,
    pub text: String,
}

impl<'a> ContainerCandidate<'a> {
    fn new(element: ElementRef<'a>) -> Self {
        // Newline-joined so labeled patterns ("Operator: X") stop at the
        // text node they were written in.
        let text = element.text().collect::<Vec<_>>().join("\n");
        Self { element, text }
    }
}

/// One named way of producing candidates. Strategies run in priority order
/// and the cascade stops at the first one that yields anything, which keeps
/// each heuristic independently testable.
pub trait CandidateStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn applies_to(&self, site_type: SiteType) -> bool;
    fn find<'a>(&self, document: &'a Html, site_type: SiteType) -> Vec<ElementRef<'a>>;
}

/// A selector must beat this count for its strategy to short-circuit the
/// rest of the vocabulary list.
const SHORT_CIRCUIT_THRESHOLD: usize = 3;

/// Caps bound downstream extraction cost per page.
const ECOMMERCE_CANDIDATE_CAP: usize = 30;
const TRAVEL_CANDIDATE_CAP: usize = 20;

const ECOMMERCE_CONTAINER_SELECTORS: &[&str] = &[
    "[data-id]",
    "[data-product-id]",
    "[data-item-id]",
    "[data-asin]",
    r#"[data-component-type="s-search-result"]"#,
    ".product",
    ".product-item",
    ".product-card",
    ".product-tile",
    ".product-container",
    ".s-result-item",
    ".listing-item",
    ".item-card",
    r#"li[class*="product"]"#,
    r#"div[class*="product"]"#,
    r#"[class*="product"]"#,
    r#"[class*="listing"]"#,
    r#"[class*="search-result"]"#,
    r#"[class*="item"]"#,
    r#"[class*="card"]"#,
    r#"[class*="result"]"#,
];

const TRAVEL_CONTAINER_SELECTORS: &[&str] = &[
    r#"[data-testid*="bus"]"#,
    r#"[data-testid*="flight"]"#,
    r#"[data-testid*="hotel"]"#,
    r#"div[class*="bus"]"#,
    r#"div[class*="ticket"]"#,
    r#"[class*="route"]"#,
    r#"[class*="journey"]"#,
    r#"[class*="fare"]"#,
    r#"[class*="flight"]"#,
    r#"[class*="airline"]"#,
    r#"[class*="hotel"]"#,
    r#"[class*="property"]"#,
    r#"[class*="operator"]"#,
    r#"[class*="card"]"#,
    r#"[class*="listing"]"#,
    r#"[class*="result"]"#,
    r#"[class*="option"]"#,
];

const GENERIC_CONTAINER_SELECTORS: &[&str] = &[
    "article",
    ".post",
    ".item",
    ".card",
    ".listing",
    r#"[class*="item"]"#,
    r#"[class*="card"]"#,
    r#"[class*="post"]"#,
];

/// Travel vocabulary a price/time match must co-occur with.
const TRAVEL_TEXT_KEYWORDS: &[&str] = &[
    "bus", "flight", "hotel", "route", "departure", "arrival", "operator",
    "duration", "seat", "fare", "ticket",
];

static SCAN_TARGETS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div, li, article, section").expect("static selector"));
static IMG_OR_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img, a[href]").expect("static selector"));

pub(crate) fn compile_selectors(
    strategy: &'static str,
    sources: &[&str],
) -> ExtractResult<Vec<Selector>> {
    let mut compiled = Vec::with_capacity(sources.len());
    for source in sources {
        match Selector::parse(source) {
            Ok(selector) => compiled.push(selector),
            Err(err) => warn!("failed to compile selector '{source}': {err}"),
        }
    }
    if compiled.is_empty() {
        return Err(ExtractError::NoSelectors { strategy });
    }
    Ok(compiled)
}

fn has_travel_keyword(text: &str) -> bool {
    let lowered = text.to_lowercase();
    TRAVEL_TEXT_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Tier 1: curated container selectors per site vocabulary. The first
/// selector producing more than the threshold short-circuits the list.
pub struct DomainSelectorStrategy {
    ecommerce: Vec<Selector>,
    travel: Vec<Selector>,
    generic: Vec<Selector>,
}

impl DomainSelectorStrategy {
    pub fn new() -> ExtractResult<Self> {
        Ok(Self {
            ecommerce: compile_selectors("domain-selectors", ECOMMERCE_CONTAINER_SELECTORS)?,
            travel: compile_selectors("domain-selectors", TRAVEL_CONTAINER_SELECTORS)?,
            generic: compile_selectors("domain-selectors", GENERIC_CONTAINER_SELECTORS)?,
        })
    }

    fn vocabulary(&self, site_type: SiteType) -> &[Selector] {
        match site_type {
            SiteType::Ecommerce => &self.ecommerce,
            SiteType::Travel => &self.travel,
            SiteType::Generic => &self.generic,
        }
    }
}

impl CandidateStrategy for DomainSelectorStrategy {
    fn name(&self) -> &'static str {
        "domain-selectors"
    }

    fn applies_to(&self, _site_type: SiteType) -> bool {
        true
    }

    fn find<'a>(&self, document: &'a Html, site_type: SiteType) -> Vec<ElementRef<'a>> {
        let mut found = Vec::new();
        for selector in self.vocabulary(site_type) {
            let matched: Vec<ElementRef<'a>> = document.select(selector).collect();
            if matched.is_empty() {
                continue;
            }
            debug!("selector matched {} containers", matched.len());
            let short_circuit = matched.len() > SHORT_CIRCUIT_THRESHOLD;
            found.extend(matched);
            if short_circuit {
                break;
            }
        }
        found
    }
}

/// Tier 2: any generic container whose text carries a currency-formatted
/// price. Travel sites additionally require a travel keyword; everything
/// else requires product-like structure (an image or link descendant).
pub struct PricePatternStrategy;

impl CandidateStrategy for PricePatternStrategy {
    fn name(&self) -> &'static str {
        "price-pattern"
    }

    fn applies_to(&self, _site_type: SiteType) -> bool {
        true
    }

    fn find<'a>(&self, document: &'a Html, site_type: SiteType) -> Vec<ElementRef<'a>> {
        document
            .select(&SCAN_TARGETS)
            .filter(|el| {
                let text: String = el.text().collect::<Vec<_>>().join(" ");
                if fields::first_price(&text).is_none() {
                    return false;
                }
                if site_type.is_travel() {
                    has_travel_keyword(&text)
                } else {
                    el.select(&IMG_OR_LINK).next().is_some()
                }
            })
            .collect()
    }
}

/// Tier 3, travel only: clock-time patterns co-located with travel
/// vocabulary catch fare cards that show no price until selection.
pub struct TimePatternStrategy;

impl CandidateStrategy for TimePatternStrategy {
    fn name(&self) -> &'static str {
        "time-pattern"
    }

    fn applies_to(&self, site_type: SiteType) -> bool {
        site_type.is_travel()
    }

    fn find<'a>(&self, document: &'a Html, _site_type: SiteType) -> Vec<ElementRef<'a>> {
        document
            .select(&SCAN_TARGETS)
            .filter(|el| {
                let text: String = el.text().collect::<Vec<_>>().join(" ");
                !fields::clock_times(&text).is_empty() && has_travel_keyword(&text)
            })
            .collect()
    }
}

/// Ordered cascade over the registered strategies.
pub struct CandidateSelector {
    strategies: Vec<Box<dyn CandidateStrategy>>,
}

impl CandidateSelector {
    pub fn new() -> ExtractResult<Self> {
        Ok(Self {
            strategies: vec![
                Box::new(DomainSelectorStrategy::new()?),
                Box::new(PricePatternStrategy),
                Box::new(TimePatternStrategy),
            ],
        })
    }

    /// Run the cascade: first applicable strategy with any candidates wins.
    /// The result is deduplicated by serialized subtree content (first-seen
    /// order preserved) and truncated to the per-site cap. Two runs over
    /// the same unchanged document yield identical lists.
    pub fn select<'a>(&self, document: &'a Html, site_type: SiteType) -> Vec<ContainerCandidate<'a>> {
        let cap = match site_type {
            SiteType::Travel => TRAVEL_CANDIDATE_CAP,
            _ => ECOMMERCE_CANDIDATE_CAP,
        };

        for strategy in &self.strategies {
            if !strategy.applies_to(site_type) {
                continue;
            }
            let found = strategy.find(document, site_type);
            if found.is_empty() {
                debug!("strategy '{}' found no containers, cascading", strategy.name());
                continue;
            }

            let mut seen: HashSet<blake3::Hash> = HashSet::with_capacity(found.len());
            let mut accepted_ids: HashSet<NodeId> = HashSet::new();
            let mut unique = Vec::new();
            for element in found {
                // A subtree nested inside an accepted container is part of
                // that container's record, not a record of its own.
                if element.ancestors().any(|a| accepted_ids.contains(&a.id())) {
                    continue;
                }
                let hash = blake3::hash(element.html().as_bytes());
                if seen.insert(hash) {
                    accepted_ids.insert(element.id());
                    unique.push(ContainerCandidate::new(element));
                    if unique.len() >= cap {
                        break;
                    }
                }
            }
            debug!(
                "strategy '{}' selected {} unique containers",
                strategy.name(),
                unique.len()
            );
            return unique;
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_page(n: usize) -> Html {
        let mut body = String::new();
        for i in 0..n {
            body.push_str(&format!(
                r#"<div class="product-card"><h3>Item {i}</h3><span>${i}9.99</span></div>"#
            ));
        }
        Html::parse_document(&format!("<html><body>{body}</body></html>"))
    }

    #[test]
    fn distinct_containers_yield_one_candidate_each() {
        let document = product_page(6);
        let selector = CandidateSelector::new().unwrap();
        let candidates = selector.select(&document, SiteType::Ecommerce);
        assert_eq!(candidates.len(), 6);
        // Order preserved
        assert!(candidates[0].text.contains("Item 0"));
        assert!(candidates[5].text.contains("Item 5"));
    }

    #[test]
    fn duplicate_subtrees_are_deduplicated() {
        let html = r#"<div class="product-card"><h3>Same</h3></div>
                      <div class="product-card"><h3>Same</h3></div>
                      <div class="product-card"><h3>Same</h3></div>
                      <div class="product-card"><h3>Other</h3></div>
                      <div class="product-card"><h3>Third</h3></div>"#;
        let document = Html::parse_document(html);
        let selector = CandidateSelector::new().unwrap();
        let candidates = selector.select(&document, SiteType::Ecommerce);
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn selection_is_idempotent() {
        let document = product_page(5);
        let selector = CandidateSelector::new().unwrap();
        let first: Vec<String> = selector
            .select(&document, SiteType::Ecommerce)
            .iter()
            .map(|c| c.text.clone())
            .collect();
        let second: Vec<String> = selector
            .select(&document, SiteType::Ecommerce)
            .iter()
            .map(|c| c.text.clone())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn price_pattern_scan_catches_unlabeled_markup() {
        // No curated class names anywhere; only the price scan can bite.
        let html = r#"<div><a href="/x"><img src="a.png"></a><p>Mystery thing $249.00</p></div>"#;
        let document = Html::parse_document(html);
        let selector = CandidateSelector::new().unwrap();
        let candidates = selector.select(&document, SiteType::Ecommerce);
        assert!(!candidates.is_empty());
        assert!(candidates[0].text.contains("$249.00"));
    }

    #[test]
    fn travel_time_scan_requires_travel_vocabulary() {
        let html = r#"<div><span>06:30 AM</span> departure from Central</div>
                      <div><span>09:00</span> staff meeting notes</div>"#;
        let document = Html::parse_document(html);
        let strategy = TimePatternStrategy;
        let found = strategy.find(&document, SiteType::Travel);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn candidate_list_is_capped() {
        let document = product_page(60);
        let selector = CandidateSelector::new().unwrap();
        let candidates = selector.select(&document, SiteType::Ecommerce);
        assert_eq!(candidates.len(), 30);
    }
}
