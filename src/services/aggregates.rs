//! Derived values recomputed once per publish.

use crate::models::{FundRecord, IndexRecord, ScrapedRecord, Snapshot, StockRecord};
use crate::util::{modal_date, round_to};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

/// Records whose snapshots carry a precomputed aggregate.
pub trait Summarize: ScrapedRecord {
    type Summary: Debug + Clone + Send + Sync + Serialize + 'static;

    fn summarize(snapshot: &Snapshot<Self>) -> Self::Summary;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation, absent for fewer than two funds
    pub std: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceStats {
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundStats {
    pub total_funds: usize,
    pub total_categories: usize,
    pub nav: Option<NavStats>,
    pub offer_price: PriceStats,
    /// Most common validity date
    pub data_date: Option<NaiveDate>,
    pub trustees: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundAggregate {
    pub categories: Vec<CategoryCount>,
    pub stats: FundStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSummary {
    pub total_stocks: usize,
    pub gainers: usize,
    pub losers: usize,
    pub unchanged: usize,
    pub total_volume: i64,
    pub avg_change_pct: Option<f64>,
    pub total_traded_value: f64,
    pub market_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexOverview {
    pub count: usize,
    pub advancing: usize,
    pub declining: usize,
}

impl Summarize for FundRecord {
    type Summary = FundAggregate;

    fn summarize(snapshot: &Snapshot<Self>) -> FundAggregate {
        FundAggregate {
            categories: category_counts(&snapshot.records),
            stats: fund_stats(&snapshot.records),
        }
    }
}

impl Summarize for StockRecord {
    type Summary = MarketSummary;

    fn summarize(snapshot: &Snapshot<Self>) -> MarketSummary {
        market_summary(&snapshot.records, snapshot.market_date)
    }
}

impl Summarize for IndexRecord {
    type Summary = IndexOverview;

    fn summarize(snapshot: &Snapshot<Self>) -> IndexOverview {
        let changes = snapshot.records.iter().filter_map(|r| r.change);
        IndexOverview {
            count: snapshot.len(),
            advancing: changes.clone().filter(|c| *c > 0.0).count(),
            declining: changes.filter(|c| *c < 0.0).count(),
        }
    }
}

/// Funds per category, sorted by category name.
pub fn category_counts(funds: &[FundRecord]) -> Vec<CategoryCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for fund in funds {
        *counts.entry(fund.fund_category.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(category, count)| CategoryCount { category: category.to_string(), count })
        .collect()
}

pub fn fund_stats(funds: &[FundRecord]) -> FundStats {
    let navs: Vec<f64> = funds.iter().map(|f| f.nav).collect();
    let offers: Vec<f64> = funds.iter().filter_map(|f| f.offer_price).collect();

    let categories: BTreeSet<&str> = funds.iter().map(|f| f.fund_category.as_str()).collect();
    let trustees: BTreeSet<&str> = funds
        .iter()
        .map(|f| f.trustee.as_str())
        .filter(|t| !t.is_empty())
        .collect();

    FundStats {
        total_funds: funds.len(),
        total_categories: categories.len(),
        nav: nav_stats(&navs),
        offer_price: PriceStats {
            mean: mean(&offers).map(|v| round_to(v, 4)),
            min: min(&offers).map(|v| round_to(v, 4)),
            max: max(&offers).map(|v| round_to(v, 4)),
        },
        data_date: modal_date(funds.iter().map(|f| f.date_updated)),
        trustees: trustees.into_iter().map(str::to_string).collect(),
    }
}

fn nav_stats(values: &[f64]) -> Option<NavStats> {
    Some(NavStats {
        mean: round_to(mean(values)?, 4),
        median: round_to(median(values)?, 4),
        min: round_to(min(values)?, 4),
        max: round_to(max(values)?, 4),
        std: sample_std(values).map(|v| round_to(v, 4)),
    })
}

pub fn market_summary(stocks: &[StockRecord], market_date: Option<NaiveDate>) -> MarketSummary {
    let gainers = stocks.iter().filter(|s| s.change.is_some_and(|c| c > 0.0)).count();
    let losers = stocks.iter().filter(|s| s.change.is_some_and(|c| c < 0.0)).count();
    let change_pcts: Vec<f64> = stocks.iter().filter_map(|s| s.change_pct).collect();
    let traded_value: f64 = stocks
        .iter()
        .filter_map(|s| s.current.map(|price| price * s.volume as f64))
        .sum();

    MarketSummary {
        total_stocks: stocks.len(),
        gainers,
        losers,
        unchanged: stocks.len() - gainers - losers,
        total_volume: stocks.iter().fold(0i64, |total, s| total.saturating_add(s.volume)),
        avg_change_pct: mean(&change_pcts).map(|v| round_to(v, 2)),
        total_traded_value: round_to(traded_value, 0),
        market_date: market_date.or_else(|| stocks.first().map(|s| s.date)),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}
