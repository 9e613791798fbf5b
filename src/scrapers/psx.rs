use crate::models::{IndexName, IndexRecord, Source, StockRecord};
use crate::scrapers::base::{parse_table_document, PageParser, ParseContext, ParsedPage};
use crate::scrapers::positional::{is_alphabetic, numbers_after};
use crate::scrapers::table::{element_text, ColumnMap, ColumnRule, RowCells, TableSchema};
use crate::util::{extract_market_date, parse_number};
use chrono::NaiveDate;
use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;

/// Column rules for the PSX market watch table.
pub struct StockSchema;

impl TableSchema for StockSchema {
    type Record = StockRecord;

    const NAME: &'static str = "PSX";

    const REQUIRED_HEADERS: &'static [&'static [&'static str]] = &[&["symbol"], &["current", "ldcp"]];

    const COLUMN_RULES: &'static [ColumnRule] = &[
        ColumnRule { field: "symbol", matches: |h| h.contains("symbol") },
        ColumnRule { field: "sector", matches: |h| h.contains("sector") },
        ColumnRule { field: "ldcp", matches: |h| h.contains("ldcp") },
        ColumnRule { field: "open", matches: |h| h.contains("open") },
        ColumnRule { field: "high", matches: |h| h.contains("high") },
        ColumnRule { field: "low", matches: |h| h.contains("low") },
        ColumnRule { field: "current", matches: |h| h.contains("current") },
        ColumnRule { field: "change_pct", matches: |h| h.contains("change") && h.contains('%') },
        ColumnRule { field: "change", matches: |h| h.contains("change") },
        ColumnRule { field: "volume", matches: |h| h.contains("volume") },
    ];

    const MIN_CELLS: usize = 5;
    const FALLBACK_MIN_TABLE_ROWS: usize = 1;
    const FALLBACK_MIN_CELLS: usize = 8;

    fn from_mapped_row(row: &RowCells, columns: &ColumnMap, ctx: &ParseContext) -> Option<StockRecord> {
        let symbol = columns
            .get("symbol")
            .and_then(|idx| row.identifier(idx))
            .or_else(|| row.identifier(0))
            .filter(|s| !s.is_empty())?;
        let current = row.field_number(columns, "current")?;

        Some(StockRecord {
            symbol: symbol.to_string(),
            sector: row
                .field_text(columns, "sector")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            ldcp: row.field_number(columns, "ldcp"),
            open: row.field_number(columns, "open"),
            high: row.field_number(columns, "high"),
            low: row.field_number(columns, "low"),
            current: Some(current),
            change: row.field_number(columns, "change"),
            change_pct: row.field_number(columns, "change_pct"),
            volume: row.field_number(columns, "volume").map_or(0, share_volume),
            date: ctx.business_date(),
            scrape_timestamp: None,
        })
    }

    /// Fixed order: LDCP, Open, High, Low, Current, Change, Change%, Volume.
    fn from_positional_row(row: &RowCells, ctx: &ParseContext) -> Option<StockRecord> {
        let symbol = row.identifier(0)?;
        if !symbol.starts_with(|c: char| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            return None;
        }
        if is_alphabetic(row.text(1)?) {
            return None;
        }

        let nums = numbers_after(row, 1);
        if nums.len() < 8 {
            return None;
        }

        Some(StockRecord {
            symbol: symbol.to_string(),
            sector: None,
            ldcp: Some(nums[0]),
            open: Some(nums[1]),
            high: Some(nums[2]),
            low: Some(nums[3]),
            current: Some(nums[4]),
            change: Some(nums[5]),
            change_pct: Some(nums[6]),
            volume: share_volume(nums[7]),
            date: ctx.business_date(),
            scrape_timestamp: None,
        })
    }
}

/// Share counts outside `0..=i64::MAX` read as no volume.
fn share_volume(value: f64) -> i64 {
    if (0.0..=i64::MAX as f64).contains(&value) {
        value as i64
    } else {
        0
    }
}

/// Parser for the PSX market watch page.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketWatchParser;

impl MarketWatchParser {
    pub fn new() -> Self {
        Self
    }
}

impl PageParser for MarketWatchParser {
    type Record = StockRecord;

    fn source(&self) -> Source {
        Source::Stocks
    }

    fn parse(&self, html: &str, today: NaiveDate) -> ParsedPage<StockRecord> {
        let document = Html::parse_document(html);
        let market_date = extract_market_date(&element_text(document.root_element()));
        let ctx = ParseContext::new(today).with_market_date(market_date);
        parse_table_document::<StockSchema>(&document, &ctx)
    }
}

static INDEX_PATTERNS: LazyLock<Vec<(IndexName, Regex)>> = LazyLock::new(|| {
    IndexName::ALL
        .iter()
        .map(|name| {
            let pattern = format!(
                r"\b{}\s+([\d,]+\.?\d*)\s+([+-]?[\d,]+\.?\d*)\s+\(([+-]?[\d.]+%?)\)",
                regex::escape(name.as_str())
            );
            (*name, Regex::new(&pattern).expect("invalid regex: index quote"))
        })
        .collect()
});

/// Parser for the index ticker on the PSX home page.
///
/// Index quotes are not in a table; each one is read from the page text as
/// `NAME value change (change%)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicesParser;

impl IndicesParser {
    pub fn new() -> Self {
        Self
    }
}

impl PageParser for IndicesParser {
    type Record = IndexRecord;

    fn source(&self) -> Source {
        Source::Indices
    }

    fn parse(&self, html: &str, today: NaiveDate) -> ParsedPage<IndexRecord> {
        let document = Html::parse_document(html);
        let text = element_text(document.root_element());
        let ctx = ParseContext::new(today).with_market_date(extract_market_date(&text));

        let records = INDEX_PATTERNS
            .iter()
            .filter_map(|(name, re)| {
                let caps = re.captures(&text)?;
                Some(IndexRecord {
                    index_name: *name,
                    value: parse_number(&caps[1]),
                    change: parse_number(&caps[2]),
                    change_pct: parse_number(&caps[3]),
                    date: ctx.business_date(),
                    scrape_timestamp: None,
                })
            })
            .collect();

        ParsedPage {
            records,
            used_fallback: false,
            market_date: ctx.market_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKET_WATCH: &str = r##"<html><body>
        <div class="date">As of Jan 05, 2024</div>
        <table>
          <thead><tr>
            <th>Symbol</th><th>LDCP</th><th>Open</th><th>High</th><th>Low</th>
            <th>Current</th><th>Change</th><th>Change (%)</th><th>Volume</th>
          </tr></thead>
          <tbody>
            <tr><td>ABC</td><td>10.00</td><td>10.50</td><td>11.00</td><td>9.50</td>
                <td>10.80</td><td>+0.80</td><td>+8.00%</td><td>1,500,000</td></tr>
          </tbody>
        </table>
    </body></html>"##;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()
    }

    #[test]
    fn single_row_market_watch() {
        let page = MarketWatchParser::new().parse(MARKET_WATCH, today());
        assert!(!page.used_fallback);
        assert_eq!(page.market_date, NaiveDate::from_ymd_opt(2024, 1, 5));

        let expected = StockRecord {
            symbol: "ABC".to_string(),
            sector: None,
            ldcp: Some(10.00),
            open: Some(10.50),
            high: Some(11.00),
            low: Some(9.50),
            current: Some(10.80),
            change: Some(0.80),
            change_pct: Some(8.00),
            volume: 1_500_000,
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            scrape_timestamp: None,
        };
        assert_eq!(page.records, vec![expected]);
    }

    #[test]
    fn rows_without_current_price_are_dropped() {
        let html = r#"<table>
            <thead><tr><th>SYMBOL</th><th>SECTOR</th><th>LDCP</th><th>CURRENT</th><th>VOLUME</th></tr></thead>
            <tbody>
              <tr><td><a href="/company/HBL">HBL</a></td><td>Commercial Banks</td><td>120.00</td><td>121.50</td><td>2,000</td></tr>
              <tr><td>XYZ</td><td>Cement</td><td>5.00</td><td>-</td><td>0</td></tr>
              <tr><td>SHORT</td><td>1</td></tr>
            </tbody></table>"#;
        let page = MarketWatchParser::new().parse(html, today());
        assert_eq!(page.len(), 1);

        let hbl = &page.records[0];
        assert_eq!(hbl.symbol, "HBL");
        assert_eq!(hbl.sector.as_deref(), Some("Commercial Banks"));
        assert_eq!(hbl.change, None);
        assert_eq!(hbl.volume, 2000);
        assert_eq!(hbl.date, today());
    }

    #[test]
    fn positional_fallback_assigns_fixed_order() {
        let html = r#"<table>
            <tr><td>Symbol</td><td>Prev</td><td>Open</td><td>High</td><td>Low</td><td>Last</td><td>Chg</td><td>Chg%</td><td>Vol</td></tr>
            <tr><td>OGDC</td><td>100.00</td><td>101.00</td><td>103.00</td><td>99.00</td><td>102.00</td><td>2.00</td><td>2.00%</td><td>350,000</td></tr>
            <tr><td>lower</td><td>1</td><td>2</td><td>3</td><td>4</td><td>5</td><td>6</td><td>7</td><td>8</td></tr>
            <tr><td>PPL</td><td>80.00</td><td>N/A</td><td>81.00</td><td>79.00</td><td>80.50</td><td>0.50</td><td>0.63%</td><td>1,000</td></tr>
          </table>"#;
        let page = MarketWatchParser::new().parse(html, today());
        assert!(page.used_fallback);
        assert_eq!(page.len(), 1);

        let ogdc = &page.records[0];
        assert_eq!(ogdc.symbol, "OGDC");
        assert_eq!(ogdc.ldcp, Some(100.0));
        assert_eq!(ogdc.current, Some(102.0));
        assert_eq!(ogdc.change_pct, Some(2.0));
        assert_eq!(ogdc.volume, 350_000);
    }

    #[test]
    fn header_rows_suppress_fallback() {
        // a second table shaped for the fallback must not be read
        let html = format!(
            "{}<table><tr><td>ZZZ</td><td>1</td><td>2</td><td>3</td><td>4</td><td>5</td><td>6</td><td>7</td><td>8</td></tr></table>",
            MARKET_WATCH
        );
        let page = MarketWatchParser::new().parse(&html, today());
        assert!(!page.used_fallback);
        assert_eq!(page.len(), 1);
        assert_eq!(page.records[0].symbol, "ABC");
    }

    #[test]
    fn oversized_volumes_are_bounded() {
        let html = r#"<table>
            <thead><tr><th>Symbol</th><th>LDCP</th><th>Open</th><th>Current</th><th>Volume</th></tr></thead>
            <tbody>
              <tr><td>AAA</td><td>10</td><td>10</td><td>10.00</td><td>9,000,000,000,000,000,000</td></tr>
              <tr><td>BBB</td><td>11</td><td>11</td><td>11.00</td><td>9,000,000,000,000,000,000</td></tr>
              <tr><td>CCC</td><td>12</td><td>12</td><td>12.00</td><td>20,000,000,000,000,000,000</td></tr>
              <tr><td>DDD</td><td>13</td><td>13</td><td>13.00</td><td>-500</td></tr>
            </tbody></table>"#;
        let page = MarketWatchParser::new().parse(html, today());
        let volumes: Vec<i64> = page.records.iter().map(|s| s.volume).collect();
        assert_eq!(volumes, vec![9_000_000_000_000_000_000, 9_000_000_000_000_000_000, 0, 0]);

        let summary = crate::services::aggregates::market_summary(&page.records, page.market_date);
        assert_eq!(summary.total_volume, i64::MAX);
    }

    #[test]
    fn index_quotes_from_page_text() {
        let html = r#"<html><body><ul>
            <li><span>KSE100</span> <span>65,432.10</span> <span>+321.55</span> <span>(0.49%)</span></li>
            <li><span>KMIALLSHR</span> <span>30,100.00</span> <span>-12.40</span> <span>(-0.04%)</span></li>
            <li><span>KSE30</span> <span>N/A</span></li>
        </ul></body></html>"#;
        let page = IndicesParser::new().parse(html, today());
        assert_eq!(page.len(), 2);

        let kse = &page.records[0];
        assert_eq!(kse.index_name, IndexName::Kse100);
        assert_eq!(kse.value, Some(65_432.10));
        assert_eq!(kse.change, Some(321.55));
        assert_eq!(kse.change_pct, Some(0.49));
        assert_eq!(kse.date, today());

        // ALLSHR must not match inside KMIALLSHR
        let names: Vec<IndexName> = page.records.iter().map(|r| r.index_name).collect();
        assert_eq!(names, vec![IndexName::Kse100, IndexName::KmiAllShr]);
        assert_eq!(page.records[1].change_pct, Some(-0.04));
    }
}
