//! Read-side filtering, sorting and paging over a published snapshot.

use crate::models::{FundRecord, IndexRecord, Snapshot, StockRecord};
use crate::services::aggregates::{self, FundStats, Summarize};
use crate::services::snapshot_cache::Published;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

pub const DEFAULT_LIST_LIMIT: usize = 1000;
pub const MAX_LIST_LIMIT: usize = 5000;
pub const DEFAULT_TOP_LIMIT: usize = 20;
pub const MAX_TOP_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("{name} must be between 1 and {max}, got {value}")]
    OutOfRange { name: &'static str, value: usize, max: usize },

    #[error("{0} must not be negative")]
    Negative(&'static str),

    #[error("Invalid field '{0}'")]
    InvalidField(String),

    #[error("Query must not be empty")]
    EmptyQuery,

    #[error("{0}")]
    NoMatch(String),
}

/// A field value used for sorting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
    Date(NaiveDate),
}

impl FieldValue<'_> {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Number(a), FieldValue::Number(b)) => a.total_cmp(b),
            (FieldValue::Date(a), FieldValue::Date(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Records that can be sorted by field name.
pub trait Sortable {
    const FIELDS: &'static [&'static str];

    /// `None` when the record has no value for `name`.
    fn field(&self, name: &str) -> Option<FieldValue<'_>>;
}

impl Sortable for FundRecord {
    const FIELDS: &'static [&'static str] = &[
        "fund_name",
        "fund_category",
        "inception_date",
        "offer_price",
        "repurchase_price",
        "nav",
        "date_updated",
        "trustee",
    ];

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "fund_name" => Some(FieldValue::Text(&self.fund_name)),
            "fund_category" => Some(FieldValue::Text(&self.fund_category)),
            "inception_date" => self.inception_date.map(FieldValue::Date),
            "offer_price" => self.offer_price.map(FieldValue::Number),
            "repurchase_price" => self.repurchase_price.map(FieldValue::Number),
            "nav" => Some(FieldValue::Number(self.nav)),
            "date_updated" => Some(FieldValue::Date(self.date_updated)),
            "trustee" => Some(FieldValue::Text(&self.trustee)),
            _ => None,
        }
    }
}

impl Sortable for StockRecord {
    const FIELDS: &'static [&'static str] = &[
        "symbol",
        "sector",
        "ldcp",
        "open",
        "high",
        "low",
        "current",
        "change",
        "change_pct",
        "volume",
        "date",
    ];

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "symbol" => Some(FieldValue::Text(&self.symbol)),
            "sector" => self.sector.as_deref().map(FieldValue::Text),
            "ldcp" => self.ldcp.map(FieldValue::Number),
            "open" => self.open.map(FieldValue::Number),
            "high" => self.high.map(FieldValue::Number),
            "low" => self.low.map(FieldValue::Number),
            "current" => self.current.map(FieldValue::Number),
            "change" => self.change.map(FieldValue::Number),
            "change_pct" => self.change_pct.map(FieldValue::Number),
            "volume" => Some(FieldValue::Number(self.volume as f64)),
            "date" => Some(FieldValue::Date(self.date)),
            _ => None,
        }
    }
}

/// Stable sort on `field`; records without a value go last in either
/// direction.
pub fn sort_records<R: Sortable>(records: &mut [R], field: &str, ascending: bool) {
    records.sort_by(|a, b| match (a.field(field), b.field(field)) {
        (Some(x), Some(y)) => {
            let ord = x.compare(&y);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// One page of a filtered listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<R> {
    pub count: usize,
    pub total_filtered: usize,
    pub total_available: usize,
    pub offset: usize,
    pub limit: usize,
    pub data: Vec<R>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FundFilter {
    pub category: Option<String>,
    pub trustee: Option<String>,
    pub min_nav: Option<f64>,
    pub max_nav: Option<f64>,
    pub sort_by: Option<String>,
    pub ascending: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StockFilter {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_volume: Option<i64>,
    pub min_change_pct: Option<f64>,
    pub max_change_pct: Option<f64>,
    pub sort_by: Option<String>,
    pub ascending: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn check_limit(name: &'static str, value: Option<usize>, default: usize, max: usize) -> Result<usize, QueryError> {
    let value = value.unwrap_or(default);
    if value == 0 || value > max {
        return Err(QueryError::OutOfRange { name, value, max });
    }
    Ok(value)
}

fn check_non_negative(name: &'static str, value: Option<f64>) -> Result<(), QueryError> {
    match value {
        Some(v) if v < 0.0 => Err(QueryError::Negative(name)),
        _ => Ok(()),
    }
}

fn check_sort_field<R: Sortable>(field: &str) -> Result<(), QueryError> {
    if R::FIELDS.contains(&field) {
        Ok(())
    } else {
        Err(QueryError::InvalidField(field.to_string()))
    }
}

fn paginate<R: Sortable + Clone>(
    mut filtered: Vec<R>,
    total_available: usize,
    sort_by: &str,
    ascending: bool,
    offset: usize,
    limit: usize,
) -> Page<R> {
    let total_filtered = filtered.len();
    sort_records(&mut filtered, sort_by, ascending);
    let data: Vec<R> = filtered.into_iter().skip(offset).take(limit).collect();

    Page {
        count: data.len(),
        total_filtered,
        total_available,
        offset,
        limit,
        data,
    }
}

pub fn list_funds(snapshot: &Snapshot<FundRecord>, filter: &FundFilter) -> Result<Page<FundRecord>, QueryError> {
    let limit = check_limit("limit", filter.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT)?;
    check_non_negative("min_nav", filter.min_nav)?;
    check_non_negative("max_nav", filter.max_nav)?;
    let sort_by = filter.sort_by.as_deref().unwrap_or("fund_name");
    check_sort_field::<FundRecord>(sort_by)?;

    let filtered: Vec<FundRecord> = snapshot
        .records
        .iter()
        .filter(|f| filter.category.as_deref().map_or(true, |c| contains_ci(&f.fund_category, c)))
        .filter(|f| filter.trustee.as_deref().map_or(true, |t| contains_ci(&f.trustee, t)))
        .filter(|f| filter.min_nav.map_or(true, |min| f.nav >= min))
        .filter(|f| filter.max_nav.map_or(true, |max| f.nav <= max))
        .cloned()
        .collect();

    Ok(paginate(
        filtered,
        snapshot.len(),
        sort_by,
        filter.ascending.unwrap_or(true),
        filter.offset.unwrap_or(0),
        limit,
    ))
}

/// Case-insensitive substring search on `fund_name`, `fund_category` or
/// `trustee`.
pub fn search_funds(funds: &[FundRecord], query: &str, field: Option<&str>) -> Result<Vec<FundRecord>, QueryError> {
    if query.is_empty() {
        return Err(QueryError::EmptyQuery);
    }
    let field = field.unwrap_or("fund_name");
    let select: fn(&FundRecord) -> &str = match field {
        "fund_name" => |f| f.fund_name.as_str(),
        "fund_category" => |f| f.fund_category.as_str(),
        "trustee" => |f| f.trustee.as_str(),
        other => return Err(QueryError::InvalidField(other.to_string())),
    };

    Ok(funds.iter().filter(|f| contains_ci(select(f), query)).cloned().collect())
}

pub fn funds_by_category(funds: &[FundRecord], category: &str) -> Result<Vec<FundRecord>, QueryError> {
    let matched: Vec<FundRecord> = funds
        .iter()
        .filter(|f| contains_ci(&f.fund_category, category))
        .cloned()
        .collect();
    if matched.is_empty() {
        return Err(QueryError::NoMatch(format!("No funds found for category '{}'", category)));
    }
    Ok(matched)
}

/// Highest NAVs first, optionally within a category.
pub fn top_nav(funds: &[FundRecord], limit: Option<usize>, category: Option<&str>) -> Result<Vec<FundRecord>, QueryError> {
    let limit = check_limit("limit", limit, DEFAULT_TOP_LIMIT, MAX_TOP_LIMIT)?;
    let mut matched: Vec<FundRecord> = funds
        .iter()
        .filter(|f| category.map_or(true, |c| contains_ci(&f.fund_category, c)))
        .cloned()
        .collect();
    sort_records(&mut matched, "nav", false);
    matched.truncate(limit);
    Ok(matched)
}

/// Cached stats for the whole snapshot, or stats computed for one category.
pub fn fund_stats(published: &Published<FundRecord>, category: Option<&str>) -> Result<FundStats, QueryError> {
    let Some(category) = category else {
        return Ok(published.summary.stats.clone());
    };

    let matched = funds_by_category(&published.snapshot.records, category)
        .map_err(|_| QueryError::NoMatch("No data matches the filter".to_string()))?;
    Ok(aggregates::fund_stats(&matched))
}

pub fn list_stocks(snapshot: &Snapshot<StockRecord>, filter: &StockFilter) -> Result<Page<StockRecord>, QueryError> {
    let limit = check_limit("limit", filter.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT)?;
    check_non_negative("min_price", filter.min_price)?;
    check_non_negative("max_price", filter.max_price)?;
    if filter.min_volume.is_some_and(|v| v < 0) {
        return Err(QueryError::Negative("min_volume"));
    }
    let sort_by = filter.sort_by.as_deref().unwrap_or("volume");
    check_sort_field::<StockRecord>(sort_by)?;

    let in_range = |value: Option<f64>, min: Option<f64>, max: Option<f64>| {
        min.map_or(true, |m| value.is_some_and(|v| v >= m)) && max.map_or(true, |m| value.is_some_and(|v| v <= m))
    };

    let filtered: Vec<StockRecord> = snapshot
        .records
        .iter()
        .filter(|s| in_range(s.current, filter.min_price, filter.max_price))
        .filter(|s| filter.min_volume.map_or(true, |min| s.volume >= min))
        .filter(|s| in_range(s.change_pct, filter.min_change_pct, filter.max_change_pct))
        .cloned()
        .collect();

    Ok(paginate(
        filtered,
        snapshot.len(),
        sort_by,
        filter.ascending.unwrap_or(false),
        filter.offset.unwrap_or(0),
        limit,
    ))
}

pub fn search_stocks(stocks: &[StockRecord], symbol: &str) -> Result<Vec<StockRecord>, QueryError> {
    if symbol.is_empty() {
        return Err(QueryError::EmptyQuery);
    }
    Ok(stocks.iter().filter(|s| contains_ci(&s.symbol, symbol)).cloned().collect())
}

fn top_by<F>(stocks: &[StockRecord], limit: Option<usize>, keep: F, field: &str, ascending: bool) -> Result<Vec<StockRecord>, QueryError>
where
    F: Fn(&StockRecord) -> bool,
{
    let limit = check_limit("limit", limit, DEFAULT_TOP_LIMIT, MAX_TOP_LIMIT)?;
    let mut matched: Vec<StockRecord> = stocks
        .iter()
        .filter(|s| keep(*s) && s.field(field).is_some())
        .cloned()
        .collect();
    sort_records(&mut matched, field, ascending);
    matched.truncate(limit);
    Ok(matched)
}

/// Rising stocks by change% descending.
pub fn top_gainers(stocks: &[StockRecord], limit: Option<usize>) -> Result<Vec<StockRecord>, QueryError> {
    top_by(stocks, limit, |s| s.change.is_some_and(|c| c > 0.0), "change_pct", false)
}

/// Falling stocks by change% ascending.
pub fn top_losers(stocks: &[StockRecord], limit: Option<usize>) -> Result<Vec<StockRecord>, QueryError> {
    top_by(stocks, limit, |s| s.change.is_some_and(|c| c < 0.0), "change_pct", true)
}

pub fn most_active(stocks: &[StockRecord], limit: Option<usize>) -> Result<Vec<StockRecord>, QueryError> {
    top_by(stocks, limit, |_| true, "volume", false)
}

/// Exact symbol match, ignoring case.
pub fn stock_detail(stocks: &[StockRecord], symbol: &str) -> Result<StockRecord, QueryError> {
    stocks
        .iter()
        .find(|s| s.symbol.eq_ignore_ascii_case(symbol))
        .cloned()
        .ok_or_else(|| QueryError::NoMatch(format!("Stock '{}' not found", symbol)))
}

pub fn list_indices(snapshot: &Snapshot<IndexRecord>) -> Vec<IndexRecord> {
    snapshot.records.clone()
}

/// Summary of a published snapshot; a plain clone of the cached value.
pub fn summary<R: Summarize>(published: &Published<R>) -> R::Summary {
    published.summary.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use crate::util::now_pkt;

    fn fund(name: &str, category: &str, nav: f64, offer: Option<f64>, trustee: &str) -> FundRecord {
        FundRecord {
            fund_name: name.to_string(),
            fund_category: category.to_string(),
            inception_date: None,
            offer_price: offer,
            repurchase_price: None,
            nav,
            date_updated: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            trustee: trustee.to_string(),
            scrape_timestamp: None,
        }
    }

    fn stock(symbol: &str, current: f64, change: Option<f64>, change_pct: Option<f64>, volume: i64) -> StockRecord {
        StockRecord {
            symbol: symbol.to_string(),
            sector: None,
            ldcp: None,
            open: None,
            high: None,
            low: None,
            current: Some(current),
            change,
            change_pct,
            volume,
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            scrape_timestamp: None,
        }
    }

    fn snapshot<R>(source: Source, records: Vec<R>) -> Snapshot<R> {
        Snapshot {
            source,
            records,
            captured_at: now_pkt(),
            market_date: None,
            used_fallback: false,
        }
    }

    fn funds() -> Snapshot<FundRecord> {
        snapshot(
            Source::Funds,
            vec![
                fund("Bravo Income Fund", "Income", 12.0, Some(12.5), "CDC"),
                fund("Alpha Equity Fund", "Equity", 55.0, None, "MCBFSL"),
                fund("Charlie Islamic Equity", "Islamic Equity", 8.5, Some(9.0), "CDC"),
                fund("Delta Money Market", "Money Market", 101.0, Some(101.2), ""),
            ],
        )
    }

    fn stocks() -> Snapshot<StockRecord> {
        snapshot(
            Source::Stocks,
            vec![
                stock("HBL", 120.0, Some(1.5), Some(1.27), 2_000),
                stock("OGDC", 102.0, Some(2.0), Some(2.0), 350_000),
                stock("PPL", 80.0, Some(-0.5), Some(-0.62), 50_000),
                stock("LUCK", 700.0, Some(-10.0), Some(-1.41), 10_000),
                stock("KEL", 4.0, Some(0.0), None, 9_000_000),
            ],
        )
    }

    #[test]
    fn fund_listing_filters_sorts_and_pages() {
        let snapshot = funds();
        let page = list_funds(&snapshot, &FundFilter::default()).unwrap();
        assert_eq!(page.total_available, 4);
        assert_eq!(page.limit, DEFAULT_LIST_LIMIT);
        assert_eq!(page.data[0].fund_name, "Alpha Equity Fund");

        let filter = FundFilter {
            category: Some("EQUITY".to_string()),
            sort_by: Some("nav".to_string()),
            ascending: Some(false),
            ..Default::default()
        };
        let page = list_funds(&snapshot, &filter).unwrap();
        assert_eq!(page.total_filtered, 2);
        let names: Vec<&str> = page.data.iter().map(|f| f.fund_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha Equity Fund", "Charlie Islamic Equity"]);

        let filter = FundFilter {
            min_nav: Some(10.0),
            max_nav: Some(100.0),
            offset: Some(1),
            limit: Some(1),
            ..Default::default()
        };
        let page = list_funds(&snapshot, &filter).unwrap();
        assert_eq!(page.total_filtered, 2);
        assert_eq!(page.count, 1);
        assert_eq!(page.data[0].fund_name, "Bravo Income Fund");
    }

    #[test]
    fn absent_values_sort_last_both_ways() {
        let mut records = funds().records;
        sort_records(&mut records, "offer_price", true);
        assert_eq!(records[0].offer_price, Some(9.0));
        assert_eq!(records[3].offer_price, None);

        sort_records(&mut records, "offer_price", false);
        assert_eq!(records[0].offer_price, Some(101.2));
        assert_eq!(records[3].offer_price, None);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let snapshot = funds();
        let filter = FundFilter { limit: Some(0), ..Default::default() };
        assert!(matches!(list_funds(&snapshot, &filter), Err(QueryError::OutOfRange { .. })));

        let filter = FundFilter { limit: Some(5001), ..Default::default() };
        assert!(list_funds(&snapshot, &filter).is_err());

        let filter = FundFilter { sort_by: Some("price".to_string()), ..Default::default() };
        assert_eq!(
            list_funds(&snapshot, &filter).unwrap_err(),
            QueryError::InvalidField("price".to_string())
        );

        assert!(top_nav(&snapshot.records, Some(101), None).is_err());
        assert_eq!(search_funds(&snapshot.records, "", None).unwrap_err(), QueryError::EmptyQuery);
        assert!(search_funds(&snapshot.records, "x", Some("nav")).is_err());
    }

    #[test]
    fn fund_search_and_top_nav() {
        let snapshot = funds();
        let hits = search_funds(&snapshot.records, "cdc", Some("trustee")).unwrap();
        assert_eq!(hits.len(), 2);

        let top = top_nav(&snapshot.records, Some(2), None).unwrap();
        assert_eq!(top[0].nav, 101.0);
        assert_eq!(top[1].nav, 55.0);

        let top = top_nav(&snapshot.records, None, Some("islamic")).unwrap();
        assert_eq!(top.len(), 1);

        assert!(matches!(funds_by_category(&snapshot.records, "Commodity"), Err(QueryError::NoMatch(_))));
    }

    #[test]
    fn stock_listing_defaults_to_volume_descending() {
        let snapshot = stocks();
        let page = list_stocks(&snapshot, &StockFilter::default()).unwrap();
        assert_eq!(page.data[0].symbol, "KEL");

        let filter = StockFilter {
            min_price: Some(50.0),
            max_change_pct: Some(0.0),
            ..Default::default()
        };
        let page = list_stocks(&snapshot, &filter).unwrap();
        let symbols: Vec<&str> = page.data.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["PPL", "LUCK"]);
    }

    #[test]
    fn movers_and_detail() {
        let records = stocks().records;

        let gainers = top_gainers(&records, None).unwrap();
        let symbols: Vec<&str> = gainers.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["OGDC", "HBL"]);

        let losers = top_losers(&records, Some(1)).unwrap();
        assert_eq!(losers[0].symbol, "LUCK");

        let active = most_active(&records, Some(2)).unwrap();
        assert_eq!(active[0].symbol, "KEL");
        assert_eq!(active[1].symbol, "OGDC");

        assert_eq!(search_stocks(&records, "l").unwrap().len(), 4);
        assert_eq!(stock_detail(&records, "ogdc").unwrap().current, Some(102.0));
        assert!(matches!(stock_detail(&records, "OG"), Err(QueryError::NoMatch(_))));
    }
}
