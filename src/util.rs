use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use chrono_tz::Asia::Karachi;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Cell values that mean "no value" on the scraped pages.
const ABSENT_MARKERS: [&str; 4] = ["", "-", "--", "N/A"];

/// Accepted date layouts, tried in this order. The first match wins, so
/// `01-02-2024` is always 1 February 2024.
const DATE_FORMATS: [&str; 10] = [
    "%b %d, %Y",
    "%b %d %Y",
    "%d-%b-%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%b-%y",
    "%d %b %Y",
    "%d %B %Y",
];

static MARKET_DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:As of|Date:?)\s+(\w+ \d{1,2},?\s*\d{4})",
        r"(\w{3} \d{1,2},?\s*\d{4})",
        r"(\d{2}-\d{2}-\d{4})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("invalid regex: market date"))
    .collect()
});

/// Parse a numeric cell.
///
/// Thousands separators, percent signs and `+` are stripped. Empty cells,
/// dash placeholders and `N/A` are absent, as is any other non-numeric text.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '%' | '+'))
        .collect();
    let cleaned = cleaned.trim();

    if ABSENT_MARKERS.contains(&cleaned) {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a date cell against the fixed format list.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(text, fmt)
            .ok()
            // chrono reads `%Y` from as few as one digit; require a full year
            .filter(|d| !fmt.contains("%Y") || d.year() >= 1000)
    })
}

/// Same as [`parse_date`], rendered as `YYYY-MM-DD`.
pub fn normalize_date(text: &str) -> Option<String> {
    parse_date(text).map(|d| d.format("%Y-%m-%d").to_string())
}

/// Find the market/business date mentioned in a page's text.
pub fn extract_market_date(page_text: &str) -> Option<NaiveDate> {
    MARKET_DATE_PATTERNS.iter().find_map(|re| {
        re.captures(page_text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_date(m.as_str()))
    })
}

/// Current time in Pakistan Standard Time (UTC+5).
pub fn now_pkt() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&Karachi).fixed_offset()
}

pub fn today_pkt() -> NaiveDate {
    now_pkt().date_naive()
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Most frequent date; ties go to the earliest.
pub fn modal_date(dates: impl IntoIterator<Item = NaiveDate>) -> Option<NaiveDate> {
    let mut counts: HashMap<NaiveDate, usize> = HashMap::new();
    for date in dates {
        *counts.entry(date).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(da, ca), (db, cb)| ca.cmp(cb).then(db.cmp(da)))
        .map(|(date, _)| date)
}
