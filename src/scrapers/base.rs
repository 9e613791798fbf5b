use crate::errors::Result;
use crate::models::{ScrapedRecord, Source};
use crate::scrapers::positional::parse_positional;
use crate::scrapers::table::{locate_and_map, parse_rows, TableSchema};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{info, warn};
use scraper::Html;

/// Source of raw page bodies
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` and return the response body. Non-2xx responses and
    /// network failures are errors.
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

/// Per-parse values that do not come from the row itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseContext {
    /// Scrape day in PKT
    pub today: NaiveDate,
    /// Business date found in the page text
    pub market_date: Option<NaiveDate>,
}

impl ParseContext {
    pub fn new(today: NaiveDate) -> Self {
        Self { today, market_date: None }
    }

    pub fn with_market_date(mut self, market_date: Option<NaiveDate>) -> Self {
        self.market_date = market_date;
        self
    }

    /// Market date when the page shows one, the scrape day otherwise.
    pub fn business_date(&self) -> NaiveDate {
        self.market_date.unwrap_or(self.today)
    }
}

/// Records extracted from one page, tagged with the path that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage<R> {
    pub records: Vec<R>,
    pub used_fallback: bool,
    pub market_date: Option<NaiveDate>,
}

impl<R> ParsedPage<R> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Turns a fetched page into typed records for one source.
///
/// Parsing is synchronous and CPU-bound; the orchestrator runs it on the
/// blocking pool.
pub trait PageParser: Send + Sync + 'static {
    type Record: ScrapedRecord;

    /// Which snapshot the records belong to
    fn source(&self) -> Source;

    /// Parse a full HTML document. `today` is the scrape day in PKT.
    fn parse(&self, html: &str, today: NaiveDate) -> ParsedPage<Self::Record>;
}

/// Header-driven parse of `document`, falling back to the positional scan
/// only when the header-driven pass yields no records.
pub fn parse_table_document<S: TableSchema>(
    document: &Html,
    ctx: &ParseContext,
) -> ParsedPage<S::Record> {
    if let Some(located) = locate_and_map(document, S::REQUIRED_HEADERS, S::COLUMN_RULES) {
        info!(
            "{} column map: {:?} (headers: {:?})",
            S::NAME,
            located.columns,
            located.headers
        );

        let records: Vec<S::Record> = parse_rows::<S>(&located, ctx).collect();
        if !records.is_empty() {
            return ParsedPage {
                records,
                used_fallback: false,
                market_date: ctx.market_date,
            };
        }
    }

    warn!(
        "Header-based parsing found 0 {} records, trying positional fallback",
        S::NAME
    );
    let records = parse_positional::<S>(document, ctx);
    info!("Positional fallback found {} {} records", records.len(), S::NAME);

    ParsedPage {
        records,
        used_fallback: true,
        market_date: ctx.market_date,
    }
}
