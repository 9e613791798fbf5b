//! Positional recovery parser.
//!
//! Used only after the header-driven pass comes back empty. Every table is
//! scanned, rows are judged by shape alone and their values are assigned to
//! fields in a fixed order chosen by the schema.

use crate::scrapers::base::ParseContext;
use crate::scrapers::table::{RowCells, TableSchema, DATA_CELL, ROW, TABLE};
use scraper::{ElementRef, Html};

pub fn parse_positional<S: TableSchema>(document: &Html, ctx: &ParseContext) -> Vec<S::Record> {
    let mut records = Vec::new();

    for table in document.select(&TABLE) {
        let rows: Vec<ElementRef<'_>> = own_rows(table).collect();
        if rows.len() < S::FALLBACK_MIN_TABLE_ROWS {
            continue;
        }

        for tr in rows {
            let row = RowCells::from_row(tr, DATA_CELL);
            if row.len() < S::FALLBACK_MIN_CELLS {
                continue;
            }
            if let Some(record) = S::from_positional_row(&row, ctx) {
                records.push(record);
            }
        }
    }

    records
}

/// Rows whose nearest enclosing table is `table`, so nested tables are not
/// read twice.
fn own_rows<'a>(table: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    let table_id = table.id();
    table.select(&ROW).filter(move |tr| {
        tr.ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "table")
            .map(|el| el.id())
            == Some(table_id)
    })
}

/// Every parseable number in the row, skipping the first `skip` cells.
pub fn numbers_after(row: &RowCells, skip: usize) -> Vec<f64> {
    (skip..row.len()).filter_map(|idx| row.number(idx)).collect()
}

/// `true` for text made only of letters (and not empty).
pub fn is_alphabetic(text: &str) -> bool {
    !text.is_empty() && text.chars().all(char::is_alphabetic)
}
