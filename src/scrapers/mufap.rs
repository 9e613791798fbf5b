use crate::models::{FundRecord, Source};
use crate::scrapers::base::{parse_table_document, PageParser, ParseContext, ParsedPage};
use crate::scrapers::table::{ColumnMap, ColumnRule, RowCells, TableSchema};
use crate::util::{modal_date, parse_date, parse_number};
use chrono::NaiveDate;
use scraper::Html;

/// NAVs above this are treated as stray totals by the positional parser.
const MAX_POSITIONAL_NAV: f64 = 100_000_000.0;

/// Column rules for the MUFAP daily NAV table.
pub struct FundSchema;

impl TableSchema for FundSchema {
    type Record = FundRecord;

    const NAME: &'static str = "MUFAP";

    const REQUIRED_HEADERS: &'static [&'static [&'static str]] = &[&["fund"], &["nav"]];

    const COLUMN_RULES: &'static [ColumnRule] = &[
        ColumnRule {
            field: "fund_name",
            matches: |h| h.contains("fund") && !h.contains("category"),
        },
        ColumnRule { field: "fund_category", matches: |h| h.contains("category") },
        ColumnRule { field: "inception_date", matches: |h| h.contains("inception") },
        ColumnRule { field: "offer_price", matches: |h| h.contains("offer") },
        ColumnRule {
            field: "repurchase_price",
            matches: |h| h.contains("repurchase") || h.contains("redemption"),
        },
        ColumnRule { field: "nav", matches: |h| h.contains("nav") },
        ColumnRule {
            field: "date_updated",
            matches: |h| h.contains("validity") || (h.contains("date") && !h.contains("inception")),
        },
        ColumnRule { field: "trustee", matches: |h| h.contains("trustee") },
    ];

    const MIN_CELLS: usize = 3;
    const FALLBACK_MIN_TABLE_ROWS: usize = 3;
    const FALLBACK_MIN_CELLS: usize = 4;

    fn from_mapped_row(row: &RowCells, columns: &ColumnMap, ctx: &ParseContext) -> Option<FundRecord> {
        let fund_name = row
            .identifier(columns.get("fund_name")?)
            .filter(|name| !name.is_empty())?;
        let nav = row.field_number(columns, "nav").filter(|nav| *nav > 0.0)?;

        let text = |field| row.field_text(columns, field).filter(|t| !t.is_empty());

        Some(FundRecord {
            fund_name: fund_name.to_string(),
            fund_category: text("fund_category").unwrap_or("Unknown").to_string(),
            inception_date: text("inception_date").and_then(parse_date),
            offer_price: row.field_number(columns, "offer_price"),
            repurchase_price: row.field_number(columns, "repurchase_price"),
            nav,
            date_updated: text("date_updated").and_then(parse_date).unwrap_or(ctx.today),
            trustee: text("trustee").unwrap_or_default().to_string(),
            scrape_timestamp: None,
        })
    }

    fn from_positional_row(row: &RowCells, ctx: &ParseContext) -> Option<FundRecord> {
        let fund_name = row.identifier(0)?;
        if fund_name.chars().count() < 3 || parse_number(fund_name).is_some() {
            return None;
        }

        let mut numbers = Vec::new();
        let mut date = None;
        let mut category = None;

        for text in row.texts().skip(1) {
            if let Some(n) = parse_number(text) {
                numbers.push(n);
            } else if date.is_none() {
                if let Some(d) = parse_date(text) {
                    date = Some(d);
                } else if category.is_none()
                    && text.chars().count() > 3
                    && !text.starts_with(|c: char| c.is_ascii_digit())
                {
                    category = Some(text.to_string());
                }
            }
        }

        // the NAV column sits after the offer/repurchase prices
        let nav = numbers
            .iter()
            .rev()
            .copied()
            .find(|n| *n > 0.0 && *n < MAX_POSITIONAL_NAV)?;

        Some(FundRecord {
            fund_name: fund_name.to_string(),
            fund_category: category.unwrap_or_else(|| "Unknown".to_string()),
            inception_date: None,
            offer_price: if numbers.len() > 1 { Some(numbers[0]) } else { None },
            repurchase_price: if numbers.len() > 2 { Some(numbers[1]) } else { None },
            nav,
            date_updated: date.unwrap_or(ctx.today),
            trustee: String::new(),
            scrape_timestamp: None,
        })
    }
}

/// Parser for the MUFAP industry daily NAV page.
#[derive(Debug, Clone, Copy, Default)]
pub struct MufapNavParser;

impl MufapNavParser {
    pub fn new() -> Self {
        Self
    }
}

impl PageParser for MufapNavParser {
    type Record = FundRecord;

    fn source(&self) -> Source {
        Source::Funds
    }

    fn parse(&self, html: &str, today: NaiveDate) -> ParsedPage<FundRecord> {
        let document = Html::parse_document(html);
        let mut page = parse_table_document::<FundSchema>(&document, &ParseContext::new(today));
        // the NAV page has no single as-of line; use the most common validity date
        page.market_date = modal_date(page.records.iter().map(|f| f.date_updated));
        page
    }
}
