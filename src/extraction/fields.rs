//! Pure field parsers
//!
//! Map raw container text to typed field candidates: price+currency,
//! rating+scale, clock times, duration, discount, brand, review count,
//! year. All pattern tables are compiled once; every function is a pure
//! text-in/value-out mapping with no document access, so each heuristic is
//! independently testable.

use once_cell::sync::Lazy;
use regex::Regex;

/// Semantic kind of an extracted field candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Price,
    Rating,
    Title,
    Brand,
    Duration,
    Route,
    Time,
    Discount,
}

/// How strongly a tactic vouches for its candidate. Lower ordinal wins:
/// dedicated selectors beat link attributes beat structured data beats
/// regex inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Selector,
    LinkAttr,
    StructuredData,
    RegexInferred,
}

/// One candidate value for a semantic field. Multiple candidates may exist
/// per field per container; the item extractor picks by confidence order.
#[derive(Debug, Clone)]
pub struct FieldCandidate {
    pub kind: FieldKind,
    pub raw_text: String,
    pub confidence: Confidence,
}

/// A currency-formatted price as found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrice {
    pub raw: String,
    pub currency: Option<&'static str>,
}

/// A rating with the scale its pattern implies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedRating {
    pub value: f64,
    pub scale: u8,
}

static PRICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"₹[\d,]+(?:\.\d{2})?",
        r"\$[\d,]+(?:\.\d+)?",
        r"£[\d,]+(?:\.\d+)?",
        r"€[\d,]+(?:\.\d+)?",
        r"[\d,]+(?:\.\d+)?\s*(?:USD|INR|GBP|EUR)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static price pattern"))
    .collect()
});

/// Rating patterns in priority order, each carrying its scale.
static RATING_PATTERNS: Lazy<Vec<(Regex, u8)>> = Lazy::new(|| {
    [
        (r"(?i)(\d+(?:\.\d+)?)\s*out\s*of\s*5(?:\s*stars?)?", 5),
        (r"(?i)(\d+(?:\.\d+)?)\s*out\s*of\s*10", 10),
        (r"(\d+(?:\.\d+)?)\s*/\s*10", 10),
        (r"(\d+(?:\.\d+)?)\s*/\s*5", 5),
        (r"(?i)(\d+(?:\.\d+)?)\s*stars?", 5),
        (r"(?i)rating:\s*(\d+(?:\.\d+)?)", 5),
        (r"(\d+(?:\.\d+)?)\s*★", 5),
    ]
    .iter()
    .map(|(p, s)| (Regex::new(p).expect("static rating pattern"), *s))
    .collect()
});

static CLOCK_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}:\d{2})\s*([AaPp][Mm])?").expect("static time pattern"));

static DURATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)duration:\s*(\d+h\s*\d*m?)",
        r"(\d+h\s*\d+m)",
        r"(\d+h)\b",
        r"(?i)(\d+)\s*hours?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static duration pattern"))
    .collect()
});

static DISCOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(\d+)%\s*off",
        r"(?i)(\d+)%\s*discount",
        r"(?i)save\s*(\d+)%",
        r"(?i)up\s*to\s*(\d+)%\s*off",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static discount pattern"))
    .collect()
});

static REVIEW_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:,\d+)*)\s*(?:reviews?|ratings?)").expect("static review pattern")
});

static YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})\b").expect("static year pattern"));

static BRAND_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)brand:\s*([A-Za-z][\w&-]*)",
        r"(?i)\bby\s+([A-Z][\w&-]*)",
        r"(?i)\bfrom\s+([A-Z][\w&-]*)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static brand pattern"))
    .collect()
});

static OPERATOR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)operator:\s*([^\n,|]+)",
        r"(?i)airline:\s*([^\n,|]+)",
        r"(?i)operated\s+by\s+([^\n,|]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static operator pattern"))
    .collect()
});

static ROUTE_LABELED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)route:\s*([^\n|]+)").expect("static route pattern"));
// Endpoints are capitalized word runs so trailing prose ("every hour")
// stays out of the destination.
static ROUTE_FROM_TO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[Ff]rom\s+([A-Z][a-z]+(?: [A-Z][a-z]+)*)\s+[Tt]o\s+([A-Z][a-z]+(?: [A-Z][a-z]+)*)")
        .expect("static route pattern")
});
static ROUTE_BARE_TO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Z][A-Za-z]{2,20})\s+to\s+([A-Z][A-Za-z]{2,20})").expect("static route pattern")
});

static STOPS_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*stops?").expect("static stops pattern"));
static NONSTOP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(non-?stop|direct)\b").expect("static stops pattern"));

/// Navigation/UI chrome that must never be mistaken for a title.
static UI_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(home|shop|buy|sale|deal|offer|discount|free|shipping|delivery|click|view|see|more|details|info|add|cart|wishlist|compare|share|review|rating|login|sign in|register|account|search|filter|sort)$",
    )
    .expect("static noise pattern")
});

static ONLY_DIGITS_OR_SYMBOLS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\s\-\.,%]+$").expect("static digits pattern"));

/// First price-looking substring that is not an "original price" label
/// (MRP / was / original), with its detected currency.
pub fn first_price(text: &str) -> Option<ParsedPrice> {
    for pattern in PRICE_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            // A struck-out price is usually labeled just before the amount.
            let lead_start = text[..m.start()]
                .char_indices()
                .rev()
                .take(16)
                .last()
                .map_or(m.start(), |(i, _)| i);
            let lead = text[lead_start..m.start()].to_lowercase();
            if ["mrp", "was", "original"].iter().any(|w| lead.contains(w)) {
                continue;
            }
            let raw = m.as_str().trim().to_owned();
            let currency = detect_currency(&raw);
            return Some(ParsedPrice { raw, currency });
        }
    }
    None
}

/// Currency of a price string, from its symbol or ISO code.
pub fn detect_currency(raw: &str) -> Option<&'static str> {
    let upper = raw.to_uppercase();
    if raw.contains('₹') || upper.contains("INR") {
        Some("INR")
    } else if raw.contains('£') || upper.contains("GBP") {
        Some("GBP")
    } else if raw.contains('€') || upper.contains("EUR") {
        Some("EUR")
    } else if raw.contains('$') || upper.contains("USD") {
        Some("USD")
    } else {
        None
    }
}

/// First rating in pattern-priority order. Values outside [0, 10] are
/// rejected as accidental matches.
pub fn first_rating(text: &str) -> Option<ParsedRating> {
    for (pattern, scale) in RATING_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let Ok(value) = caps[1].parse::<f64>() else { continue };
            if (0.0..=10.0).contains(&value) {
                return Some(ParsedRating { value, scale: *scale });
            }
        }
    }
    None
}

/// All clock-time occurrences (`H:MM` with optional meridiem), in order.
pub fn clock_times(text: &str) -> Vec<String> {
    CLOCK_TIME
        .captures_iter(text)
        .map(|caps| match caps.get(2) {
            Some(meridiem) => format!("{} {}", &caps[1], meridiem.as_str().to_uppercase()),
            None => caps[1].to_owned(),
        })
        .collect()
}

/// First duration-looking substring (`2h 30m`, `3h`, `2 hours`).
pub fn first_duration(text: &str) -> Option<String> {
    DURATION_PATTERNS
        .iter()
        .find_map(|p| p.captures(text).map(|caps| caps[1].trim().to_owned()))
}

/// First percentage discount, normalized to `"NN% off"`.
pub fn first_discount(text: &str) -> Option<String> {
    DISCOUNT_PATTERNS
        .iter()
        .find_map(|p| p.captures(text).map(|caps| format!("{}% off", &caps[1])))
}

/// First review/rating count, digits with thousands separators kept as-is.
pub fn first_review_count(text: &str) -> Option<String> {
    REVIEW_COUNT.captures(text).map(|caps| caps[1].to_owned())
}

/// First 4-digit number in 1980-2030, treated as a year.
///
/// Best-effort filter, not a validated parse: any 4-digit number in range
/// passes, so callers must tolerate false positives.
pub fn first_year(text: &str) -> Option<u16> {
    YEAR.captures_iter(text)
        .filter_map(|caps| caps[1].parse::<u16>().ok())
        .find(|y| (1980..=2030).contains(y))
}

/// Brand from a labeled pattern, else the leading word of the title when it
/// looks like a proper noun.
pub fn brand_from_title(title: &str) -> Option<String> {
    for pattern in BRAND_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(title) {
            return Some(caps[1].trim().to_owned());
        }
    }
    let first = title.split_whitespace().next()?;
    let word: String = first.chars().filter(|c| c.is_alphanumeric() || *c == '-').collect();
    (word.len() >= 2 && word.chars().next().is_some_and(|c| c.is_alphabetic()))
        .then_some(word)
}

/// First operator/airline mention.
pub fn first_operator(text: &str) -> Option<String> {
    OPERATOR_PATTERNS
        .iter()
        .find_map(|p| p.captures(text).map(|caps| caps[1].trim().to_owned()))
}

/// First route mention, normalized to `"Origin to Destination"`.
pub fn first_route(text: &str) -> Option<String> {
    if let Some(caps) = ROUTE_LABELED.captures(text) {
        return Some(caps[1].trim().to_owned());
    }
    if let Some(caps) = ROUTE_FROM_TO.captures(text) {
        return Some(format!("{} to {}", caps[1].trim(), caps[2].trim()));
    }
    ROUTE_BARE_TO
        .captures(text)
        .map(|caps| format!("{} to {}", caps[1].trim(), caps[2].trim()))
}

/// Stop count normalized to `"N stops"` / `"Non-stop"`.
pub fn first_stops(text: &str) -> Option<String> {
    if let Some(caps) = STOPS_COUNT.captures(text) {
        let n = &caps[1];
        return Some(if n == "0" { "Non-stop".to_owned() } else { format!("{n} stops") });
    }
    NONSTOP.is_match(text).then(|| "Non-stop".to_owned())
}

/// Whether a text fragment plausibly names a record (length bounds, not
/// pure digits/symbols, not navigation chrome).
pub fn is_plausible_title(text: &str) -> bool {
    let text = text.trim();
    if text.len() < 3 || text.len() > 200 {
        return false;
    }
    if ONLY_DIGITS_OR_SYMBOLS.is_match(text) {
        return false;
    }
    // Strings built entirely of chrome words ("Add View") are not titles.
    !text.split_whitespace().all(|word| UI_NOISE.is_match(word))
}

/// Collapse whitespace and drop the fragment entirely if it fails the
/// plausibility check after cleaning.
pub fn clean_title(text: &str) -> Option<String> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    is_plausible_title(&cleaned).then_some(cleaned)
}
