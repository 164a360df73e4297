//! Page-type classification
//!
//! Decides how a page delivers additional content. Priority cascade, first
//! match wins: numbered pagination controls, then load-more vocabulary,
//! then infinite-scroll markers, else Unknown. Misclassification is
//! recoverable downstream, a wrong guess only degrades to single-page
//! semantics.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;

use crate::domain::page::PageClassification;

static PAGINATION_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        ".pagination",
        ".pager",
        ".page-numbers",
        ".paging",
        r#"[class*="pagination"]"#,
        r#"[class*="pager"]"#,
        r#"nav[aria-label="pagination"]"#,
    ]
    .iter()
    .filter_map(|s| Selector::parse(s).ok())
    .collect()
});

static LOAD_MORE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        r#"[class*="load-more"]"#,
        r#"[class*="loadmore"]"#,
        r#"[class*="show-more"]"#,
        "[data-load-more]",
    ]
    .iter()
    .filter_map(|s| Selector::parse(s).ok())
    .collect()
});

static INFINITE_SCROLL_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        r#"[class*="infinite-scroll"]"#,
        r#"[class*="lazy-load"]"#,
        r#"[class*="auto-load"]"#,
        "[data-infinite]",
        "[data-lazy]",
    ]
    .iter()
    .filter_map(|s| Selector::parse(s).ok())
    .collect()
});

static CLICKABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a, button").expect("static selector"));

fn matches_any(document: &Html, selectors: &[Selector]) -> bool {
    selectors.iter().any(|s| document.select(s).next().is_some())
}

/// Next/previous link text next to digit-only page links also counts as
/// numbered pagination even without the usual class names.
fn has_textual_pagination(document: &Html) -> bool {
    let mut has_nav_word = false;
    let mut has_page_digit = false;
    for el in document.select(&CLICKABLE) {
        let text = el.text().collect::<String>();
        let text = text.trim();
        if text.len() > 12 {
            continue;
        }
        let lowered = text.to_lowercase();
        if matches!(lowered.as_str(), "next" | "previous" | "prev" | "›" | "»" | "‹" | "«") {
            has_nav_word = true;
        } else if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
            has_page_digit = true;
        }
        if has_nav_word && has_page_digit {
            return true;
        }
    }
    false
}

fn load_more_text(document: &Html) -> bool {
    document.select(&CLICKABLE).any(|el| {
        let text = el.text().collect::<String>().trim().to_lowercase();
        matches!(text.as_str(), "load more" | "show more" | "view more" | "see more")
    })
}

/// Classify a parsed document. `ApiBacked` is never returned from here; it
/// is selected through site profiles only.
pub fn classify_document(document: &Html) -> PageClassification {
    let classification = if matches_any(document, &PAGINATION_SELECTORS)
        || has_textual_pagination(document)
    {
        PageClassification::TraditionalPagination
    } else if matches_any(document, &LOAD_MORE_SELECTORS) || load_more_text(document) {
        PageClassification::LoadMore
    } else if matches_any(document, &INFINITE_SCROLL_SELECTORS) {
        PageClassification::InfiniteScroll
    } else {
        PageClassification::Unknown
    };
    debug!("classified page as {classification:?}");
    classification
}

pub fn classify_html(html: &str) -> PageClassification {
    classify_document(&Html::parse_document(html))
}
