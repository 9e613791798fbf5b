//! Header-driven table parsing.
//!
//! A page is scanned for the first `<table>` whose `<thead>` mentions every
//! required header group; its header cells are then mapped to canonical
//! field names with an ordered list of substring rules. The map is rebuilt on
//! every scrape because the source pages reorder and rename columns.

use crate::models::ScrapedRecord;
use crate::scrapers::base::ParseContext;
use crate::util::parse_number;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

pub(crate) static TABLE: LazyLock<Selector> = LazyLock::new(|| css("table"));
static THEAD: LazyLock<Selector> = LazyLock::new(|| css("thead"));
static HEADER_CELL: LazyLock<Selector> = LazyLock::new(|| css("th, td"));
static TBODY: LazyLock<Selector> = LazyLock::new(|| css("tbody"));
pub(crate) static ROW: LazyLock<Selector> = LazyLock::new(|| css("tr"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| css("a"));

fn css(selector: &str) -> Selector {
    Selector::parse(selector).expect("invalid CSS selector")
}

/// Cell tags read by the header-driven parser.
pub const ANY_CELL: &[&str] = &["td", "th"];
/// Cell tags read by the positional fallback.
pub const DATA_CELL: &[&str] = &["td"];

/// Maps a lowercase header string to a canonical field.
#[derive(Clone, Copy)]
pub struct ColumnRule {
    pub field: &'static str,
    pub matches: fn(&str) -> bool,
}

impl fmt::Debug for ColumnRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnRule").field("field", &self.field).finish()
    }
}

/// Source-specific rules for the header-driven and positional parsers.
pub trait TableSchema {
    type Record: ScrapedRecord;

    /// Name used in log lines.
    const NAME: &'static str;

    /// Every group must match some header; any member of a group will do.
    const REQUIRED_HEADERS: &'static [&'static [&'static str]];

    /// Evaluated in order for each header cell.
    const COLUMN_RULES: &'static [ColumnRule];

    /// Body rows with fewer cells are skipped.
    const MIN_CELLS: usize;

    /// Positional fallback only reads tables with at least this many rows.
    const FALLBACK_MIN_TABLE_ROWS: usize;

    /// Positional fallback only reads rows with at least this many `td` cells.
    const FALLBACK_MIN_CELLS: usize;

    fn from_mapped_row(row: &RowCells, columns: &ColumnMap, ctx: &ParseContext) -> Option<Self::Record>;

    fn from_positional_row(row: &RowCells, ctx: &ParseContext) -> Option<Self::Record>;
}

/// Canonical field name → zero-based column position.
///
/// A field missing from the map is "not available" for every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    columns: BTreeMap<&'static str, usize>,
}

impl ColumnMap {
    /// Assign each header to the first rule it matches whose field is still
    /// unassigned. An assigned field is never moved to a later header.
    pub fn build(headers: &[String], rules: &[ColumnRule]) -> Self {
        let mut columns = BTreeMap::new();

        for (idx, header) in headers.iter().enumerate() {
            let header = header.to_lowercase();
            let rule = rules
                .iter()
                .find(|rule| !columns.contains_key(rule.field) && (rule.matches)(&header));

            if let Some(rule) = rule {
                columns.insert(rule.field, idx);
            }
        }

        Self { columns }
    }

    pub fn get(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A table that passed the header requirements, with its column map.
#[derive(Debug)]
pub struct LocatedTable<'a> {
    pub table: ElementRef<'a>,
    pub headers: Vec<String>,
    pub columns: ColumnMap,
}

/// Find the first table (document order) whose header row satisfies
/// `required`, and map its columns.
pub fn locate_and_map<'a>(
    document: &'a Html,
    required: &[&[&str]],
    rules: &[ColumnRule],
) -> Option<LocatedTable<'a>> {
    document.select(&TABLE).find_map(|table| {
        let headers = header_texts(table)?;
        if !meets_requirements(&headers, required) {
            return None;
        }
        let columns = ColumnMap::build(&headers, rules);
        Some(LocatedTable { table, headers, columns })
    })
}

/// Lowercased header cell texts, `None` when the table has no `<thead>`.
pub fn header_texts(table: ElementRef<'_>) -> Option<Vec<String>> {
    let thead = table.select(&THEAD).next()?;
    Some(
        thead
            .select(&HEADER_CELL)
            .map(|cell| element_text(cell).to_lowercase())
            .collect(),
    )
}

pub fn meets_requirements(headers: &[String], required: &[&[&str]]) -> bool {
    required.iter().all(|group| {
        group.iter().any(|needle| {
            let needle = needle.to_lowercase();
            headers.iter().any(|h| h.to_lowercase().contains(&needle))
        })
    })
}

/// Walk the body rows of a located table, yielding one record per row that
/// the schema accepts. Rows are read once, in document order.
pub fn parse_rows<'a, S>(
    located: &'a LocatedTable<'a>,
    ctx: &'a ParseContext,
) -> impl Iterator<Item = S::Record> + 'a
where
    S: TableSchema,
{
    let body = located.table.select(&TBODY).next().unwrap_or(located.table);
    body.select(&ROW).filter_map(move |tr| {
        let row = RowCells::from_row(tr, ANY_CELL);
        if row.len() < S::MIN_CELLS {
            return None;
        }
        S::from_mapped_row(&row, &located.columns, ctx)
    })
}

/// Text content with each text node trimmed and blank nodes dropped.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    /// Text of the first link inside the cell, if any
    pub link_text: Option<String>,
}

/// The cells of one `<tr>`, extracted once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowCells {
    cells: Vec<Cell>,
}

impl RowCells {
    /// Collect the row's direct child cells whose tag is in `tags`.
    pub fn from_row(row: ElementRef<'_>, tags: &[&str]) -> Self {
        let cells = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| tags.contains(&el.value().name()))
            .map(|el| Cell {
                text: element_text(el),
                link_text: el.select(&ANCHOR).next().map(element_text),
            })
            .collect();
        Self { cells }
    }

    pub fn from_texts<S: AsRef<str>>(texts: &[S]) -> Self {
        Self {
            cells: texts
                .iter()
                .map(|t| Cell { text: t.as_ref().trim().to_string(), link_text: None })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, idx: usize) -> Option<&Cell> {
        self.cells.get(idx)
    }

    pub fn text(&self, idx: usize) -> Option<&str> {
        self.cells.get(idx).map(|c| c.text.as_str())
    }

    /// Non-empty text of a cell.
    pub fn non_empty_text(&self, idx: usize) -> Option<&str> {
        self.text(idx).filter(|t| !t.is_empty())
    }

    /// Identifier text, preferring the link text over the raw cell text.
    pub fn identifier(&self, idx: usize) -> Option<&str> {
        self.cells
            .get(idx)
            .map(|c| c.link_text.as_deref().unwrap_or(&c.text).trim())
    }

    pub fn number(&self, idx: usize) -> Option<f64> {
        self.text(idx).and_then(parse_number)
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|c| c.text.as_str())
    }

    /// Text of the column mapped to `field`.
    pub fn field_text<'r>(&'r self, columns: &ColumnMap, field: &str) -> Option<&'r str> {
        columns.get(field).and_then(|idx| self.text(idx))
    }

    /// Number in the column mapped to `field`.
    pub fn field_number(&self, columns: &ColumnMap, field: &str) -> Option<f64> {
        self.field_text(columns, field).and_then(parse_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANGE_RULES: &[ColumnRule] = &[
        ColumnRule { field: "symbol", matches: |h| h.contains("symbol") },
        ColumnRule { field: "change_pct", matches: |h| h.contains("change") && h.contains('%') },
        ColumnRule { field: "change", matches: |h| h.contains("change") },
    ];

    fn headers(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn first_match_wins_for_change_columns() {
        let map = ColumnMap::build(&headers(&["Symbol", "Change", "Change (%)"]), CHANGE_RULES);
        assert_eq!(map.get("symbol"), Some(0));
        assert_eq!(map.get("change"), Some(1));
        assert_eq!(map.get("change_pct"), Some(2));
    }

    #[test]
    fn assigned_field_is_never_overwritten() {
        let map = ColumnMap::build(&headers(&["Symbol", "Symbol Name", "Change"]), CHANGE_RULES);
        assert_eq!(map.get("symbol"), Some(0));
        assert_eq!(map.get("change"), Some(2));
        assert_eq!(map.len(), 2);
        assert!(!map.contains("change_pct"));
    }

    #[test]
    fn locate_skips_tables_without_required_headers() {
        let html = r#"
            <table><thead><tr><th>Name</th><th>Price</th></tr></thead>
              <tbody><tr><td>x</td><td>1</td></tr></tbody></table>
            <table><tr><td>Symbol</td><td>Current</td></tr></table>
            <table id="target"><thead><tr><th>SYMBOL</th><th>LDCP</th></tr></thead></table>
            <table><thead><tr><th>Symbol</th><th>Current</th></tr></thead></table>
        "#;
        let doc = Html::parse_document(html);
        let located = locate_and_map(&doc, &[&["symbol"], &["current", "ldcp"]], CHANGE_RULES)
            .expect("table found");
        assert_eq!(located.table.value().attr("id"), Some("target"));
        assert_eq!(located.headers, vec!["symbol", "ldcp"]);
        assert_eq!(located.columns.get("symbol"), Some(0));
    }

    #[test]
    fn locate_returns_none_when_nothing_qualifies() {
        let doc = Html::parse_document("<table><thead><tr><th>Fund</th></tr></thead></table>");
        assert!(locate_and_map(&doc, &[&["fund"], &["nav"]], CHANGE_RULES).is_none());
    }

    #[test]
    fn row_cells_prefer_link_text() {
        let html = r#"<table><tr>
            <td><a href="/company/ABC">ABC</a><span>Pharma</span></td>
            <td> 1,234.50 </td><th>N/A</th></tr></table>"#;
        let doc = Html::parse_document(html);
        let tr = doc.select(&ROW).next().unwrap();

        let row = RowCells::from_row(tr, ANY_CELL);
        assert_eq!(row.len(), 3);
        assert_eq!(row.text(0), Some("ABC Pharma"));
        assert_eq!(row.identifier(0), Some("ABC"));
        assert_eq!(row.number(1), Some(1234.5));
        assert_eq!(row.number(2), None);

        let data_only = RowCells::from_row(tr, DATA_CELL);
        assert_eq!(data_only.len(), 2);
    }
}
