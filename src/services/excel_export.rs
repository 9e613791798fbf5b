//! Formatted spreadsheet rendering of published snapshots.

use crate::errors::Result;
use crate::models::{FundRecord, Snapshot, StockRecord};
use crate::services::data_service::SnapshotSink;
use crate::services::query::sort_records;
use crate::util::{now_pkt, round_to};
use chrono::{DateTime, FixedOffset};
use log::info;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const FUND_HEADERS: [&str; 9] = [
    "Fund Category",
    "Fund Name",
    "Inception Date",
    "Offer Price (PKR)",
    "Repurchase Price (PKR)",
    "NAV (PKR)",
    "Validity Date",
    "Trustee",
    "Scraped At",
];
const FUND_WIDTHS: [f64; 9] = [30.0, 45.0, 16.0, 18.0, 20.0, 18.0, 16.0, 14.0, 22.0];

const STOCK_HEADERS: [&str; 11] = [
    "Symbol", "Sector", "LDCP", "Open", "High", "Low", "Current", "Change", "Change %", "Volume", "Date",
];
const STOCK_WIDTHS: [f64; 11] = [14.0, 18.0, 12.0, 12.0, 12.0, 12.0, 12.0, 12.0, 12.0, 16.0, 14.0];

/// Header row of the main sheets; data starts on the row below.
const HEADER_ROW: u32 = 4;
/// Rows on the performer sheets.
const TOP_ROWS: usize = 20;

const FUND_BLUE: u32 = 0x1F4E79;
const PSX_GREEN: u32 = 0x1B5E20;
const GAIN_GREEN: u32 = 0x006600;
const LOSS_RED: u32 = 0xCC0000;
const VOLUME_BLUE: u32 = 0x1565C0;

const PRICE_FORMAT: &str = "#,##0.00";
const NAV_FORMAT: &str = "#,##0.0000";
const CHANGE_FORMAT: &str = "+#,##0.00;-#,##0.00;0.00";
const CHANGE_PCT_FORMAT: &str = r#"+0.00"%";-0.00"%";0.00"%""#;
const VOLUME_FORMAT: &str = "#,##0";

/// Writes one workbook per published snapshot into `output_dir`.
#[derive(Debug, Clone)]
pub struct ExcelExporter {
    output_dir: PathBuf,
}

impl ExcelExporter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn save_funds(&self, snapshot: &Snapshot<FundRecord>) -> Result<PathBuf> {
        let mut workbook = funds_workbook(snapshot, now_pkt())?;
        self.save(&mut workbook, "mutual_funds_nav")
    }

    pub fn save_stocks(&self, snapshot: &Snapshot<StockRecord>) -> Result<PathBuf> {
        let mut workbook = stocks_workbook(snapshot, now_pkt())?;
        self.save(&mut workbook, "psx_market_data")
    }

    fn save(&self, workbook: &mut Workbook, prefix: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(file_name(prefix, now_pkt()));
        workbook.save(&path)?;
        info!("Excel file saved to: {}", path.display());
        Ok(path)
    }
}

impl SnapshotSink<FundRecord> for ExcelExporter {
    fn export(&self, snapshot: &Snapshot<FundRecord>) -> Result<PathBuf> {
        self.save_funds(snapshot)
    }
}

impl SnapshotSink<StockRecord> for ExcelExporter {
    fn export(&self, snapshot: &Snapshot<StockRecord>) -> Result<PathBuf> {
        self.save_stocks(snapshot)
    }
}

/// `<prefix>_<YYYYmmdd_HHMMSS>.xlsx`
pub fn file_name(prefix: &str, at: DateTime<FixedOffset>) -> String {
    format!("{}_{}.xlsx", prefix, at.format("%Y%m%d_%H%M%S"))
}

pub fn funds_to_buffer(snapshot: &Snapshot<FundRecord>) -> Result<Vec<u8>> {
    Ok(funds_workbook(snapshot, now_pkt())?.save_to_buffer()?)
}

pub fn stocks_to_buffer(snapshot: &Snapshot<StockRecord>) -> Result<Vec<u8>> {
    Ok(stocks_workbook(snapshot, now_pkt())?.save_to_buffer()?)
}

pub fn funds_workbook(snapshot: &Snapshot<FundRecord>, generated_at: DateTime<FixedOffset>) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    workbook.push_worksheet(fund_sheet(snapshot, generated_at)?);
    workbook.push_worksheet(category_summary_sheet(&snapshot.records)?);
    Ok(workbook)
}

pub fn stocks_workbook(snapshot: &Snapshot<StockRecord>, generated_at: DateTime<FixedOffset>) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    workbook.push_worksheet(market_watch_sheet(snapshot, generated_at)?);

    if !snapshot.is_empty() {
        let mut by_change = snapshot.records.clone();
        sort_records(&mut by_change, "change_pct", false);
        workbook.push_worksheet(performers_sheet("Top Gainers", GAIN_GREEN, &by_change)?);

        sort_records(&mut by_change, "change_pct", true);
        workbook.push_worksheet(performers_sheet("Top Losers", LOSS_RED, &by_change)?);

        let mut by_volume = snapshot.records.clone();
        sort_records(&mut by_volume, "volume", false);
        workbook.push_worksheet(volume_leaders_sheet(&by_volume)?);
    }

    Ok(workbook)
}

fn thin(format: Format) -> Format {
    format.set_border(FormatBorder::Thin)
}

fn title_format(color: u32, size: f64) -> Format {
    Format::new()
        .set_bold()
        .set_font_size(size)
        .set_font_color(Color::RGB(color))
        .set_align(FormatAlign::Center)
}

fn subtitle_format() -> Format {
    Format::new()
        .set_italic()
        .set_font_size(10)
        .set_font_color(Color::RGB(0x808080))
        .set_align(FormatAlign::Center)
}

fn header_format(fill: u32) -> Format {
    thin(
        Format::new()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(fill))
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_text_wrap(),
    )
}

fn write_headers(sheet: &mut Worksheet, row: u32, headers: &[&str], format: &Format) -> Result<()> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(row, col as u16, *header, format)?;
    }
    Ok(())
}

fn write_opt_number(sheet: &mut Worksheet, row: u32, col: u16, value: Option<f64>, format: &Format) -> Result<()> {
    match value {
        Some(v) => sheet.write_number_with_format(row, col, v, format)?,
        None => sheet.write_blank(row, col, format)?,
    };
    Ok(())
}

fn set_widths(sheet: &mut Worksheet, widths: &[f64]) -> Result<()> {
    for (col, width) in widths.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }
    Ok(())
}

fn fund_sheet(snapshot: &Snapshot<FundRecord>, generated_at: DateTime<FixedOffset>) -> Result<Worksheet> {
    let mut sheet = Worksheet::new();
    sheet.set_name("Mutual Funds NAV")?;

    let last_col = (FUND_HEADERS.len() - 1) as u16;
    sheet.merge_range(0, 0, 0, last_col, "Pakistan Mutual Funds - Daily NAV Report", &title_format(FUND_BLUE, 16.0))?;
    sheet.merge_range(
        1,
        0,
        1,
        last_col,
        &format!("Generated on: {}", generated_at.format("%B %d, %Y at %I:%M %p")),
        &subtitle_format(),
    )?;
    sheet.merge_range(
        2,
        0,
        2,
        last_col,
        &format!("Source: www.mufap.com.pk | Total Funds: {}", snapshot.len()),
        &subtitle_format(),
    )?;
    write_headers(&mut sheet, HEADER_ROW, &FUND_HEADERS, &header_format(FUND_BLUE))?;

    let mut previous_category: Option<&str> = None;
    for (i, fund) in snapshot.records.iter().enumerate() {
        let row = HEADER_ROW + 1 + i as u32;

        // rows starting a new category are shaded
        let shaded = previous_category != Some(fund.fund_category.as_str());
        previous_category = Some(fund.fund_category.as_str());

        let shade = |format: Format| {
            let format = thin(format.set_align(FormatAlign::VerticalCenter));
            if shaded {
                format.set_background_color(Color::RGB(0xD6E4F0))
            } else {
                format
            }
        };
        let text = shade(Format::new());
        let date = shade(Format::new().set_align(FormatAlign::Center));
        let price = shade(
            Format::new()
                .set_bold()
                .set_font_color(Color::RGB(GAIN_GREEN))
                .set_num_format(NAV_FORMAT)
                .set_align(FormatAlign::Right),
        );

        let inception = fund.inception_date.map(|d| d.to_string()).unwrap_or_default();
        let scraped = fund
            .scrape_timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();

        sheet.write_string_with_format(row, 0, &fund.fund_category, &text)?;
        sheet.write_string_with_format(row, 1, &fund.fund_name, &text)?;
        sheet.write_string_with_format(row, 2, &inception, &date)?;
        write_opt_number(&mut sheet, row, 3, fund.offer_price, &price)?;
        write_opt_number(&mut sheet, row, 4, fund.repurchase_price, &price)?;
        sheet.write_number_with_format(row, 5, fund.nav, &price)?;
        sheet.write_string_with_format(row, 6, fund.date_updated.to_string(), &date)?;
        sheet.write_string_with_format(row, 7, &fund.trustee, &text)?;
        sheet.write_string_with_format(row, 8, &scraped, &date)?;
    }

    set_widths(&mut sheet, &FUND_WIDTHS)?;
    sheet.set_freeze_panes(HEADER_ROW + 1, 0)?;
    sheet.autofilter(HEADER_ROW, 0, HEADER_ROW + snapshot.len() as u32, last_col)?;

    Ok(sheet)
}

fn category_summary_sheet(funds: &[FundRecord]) -> Result<Worksheet> {
    let mut sheet = Worksheet::new();
    sheet.set_name("Summary")?;
    sheet.write_string_with_format(0, 0, "Category Summary", &title_format(FUND_BLUE, 16.0))?;

    let headers = ["Fund Category", "Total Funds", "Average NAV", "Min NAV", "Max NAV"];
    write_headers(&mut sheet, 2, &headers, &header_format(FUND_BLUE))?;

    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for fund in funds {
        groups.entry(fund.fund_category.as_str()).or_default().push(fund.nav);
    }

    let cell = thin(Format::new());
    for (i, (category, navs)) in groups.iter().enumerate() {
        let row = 3 + i as u32;
        let avg = navs.iter().sum::<f64>() / navs.len() as f64;
        let min = navs.iter().copied().fold(f64::INFINITY, f64::min);
        let max = navs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        sheet.write_string_with_format(row, 0, *category, &cell)?;
        sheet.write_number_with_format(row, 1, navs.len() as f64, &cell)?;
        sheet.write_number_with_format(row, 2, round_to(avg, 4), &cell)?;
        sheet.write_number_with_format(row, 3, round_to(min, 4), &cell)?;
        sheet.write_number_with_format(row, 4, round_to(max, 4), &cell)?;
    }

    set_widths(&mut sheet, &[25.0; 5])?;
    Ok(sheet)
}

fn market_watch_sheet(snapshot: &Snapshot<StockRecord>, generated_at: DateTime<FixedOffset>) -> Result<Worksheet> {
    let mut sheet = Worksheet::new();
    sheet.set_name("Market Watch")?;

    let stocks = &snapshot.records;
    let gainers = stocks.iter().filter(|s| s.change.is_some_and(|c| c > 0.0)).count();
    let losers = stocks.iter().filter(|s| s.change.is_some_and(|c| c < 0.0)).count();
    let unchanged = stocks.iter().filter(|s| s.change == Some(0.0)).count();

    let last_col = (STOCK_HEADERS.len() - 1) as u16;
    sheet.merge_range(0, 0, 0, last_col, "Pakistan Stock Exchange (PSX) - Market Watch", &title_format(PSX_GREEN, 16.0))?;
    sheet.merge_range(
        1,
        0,
        1,
        last_col,
        &format!(
            "Generated: {} (UTC+5) | Total Stocks: {}",
            generated_at.format("%B %d, %Y %I:%M %p"),
            stocks.len()
        ),
        &subtitle_format(),
    )?;
    sheet.merge_range(
        2,
        0,
        2,
        last_col,
        &format!("Gainers: {} | Losers: {} | Unchanged: {}", gainers, losers, unchanged),
        &Format::new().set_bold().set_font_size(10).set_align(FormatAlign::Center),
    )?;
    write_headers(&mut sheet, HEADER_ROW, &STOCK_HEADERS, &header_format(PSX_GREEN))?;

    for (i, stock) in stocks.iter().enumerate() {
        let row = HEADER_ROW + 1 + i as u32;
        // alternate shading, matching even spreadsheet row numbers
        let striped = (row + 1) % 2 == 0;
        let base = |format: Format| {
            let format = thin(format.set_font_size(10));
            if striped {
                format.set_background_color(Color::RGB(0xF5F5F5))
            } else {
                format
            }
        };
        let movement = |format: Format| match stock.change {
            Some(c) if c > 0.0 => format.set_bold().set_font_color(Color::RGB(GAIN_GREEN)),
            Some(c) if c < 0.0 => format.set_bold().set_font_color(Color::RGB(LOSS_RED)),
            _ => format,
        };

        let symbol = base(Format::new().set_bold().set_font_color(Color::RGB(PSX_GREEN)));
        let text = base(Format::new());
        let price = base(Format::new().set_num_format(PRICE_FORMAT).set_align(FormatAlign::Right));
        let change = movement(base(Format::new().set_num_format(CHANGE_FORMAT).set_align(FormatAlign::Right)));
        let change_pct = movement(base(Format::new().set_num_format(CHANGE_PCT_FORMAT).set_align(FormatAlign::Right)));
        let volume = base(Format::new().set_num_format(VOLUME_FORMAT).set_align(FormatAlign::Right));
        let date = base(Format::new().set_align(FormatAlign::Center));

        sheet.write_string_with_format(row, 0, &stock.symbol, &symbol)?;
        sheet.write_string_with_format(row, 1, stock.sector.as_deref().unwrap_or(""), &text)?;
        write_opt_number(&mut sheet, row, 2, stock.ldcp, &price)?;
        write_opt_number(&mut sheet, row, 3, stock.open, &price)?;
        write_opt_number(&mut sheet, row, 4, stock.high, &price)?;
        write_opt_number(&mut sheet, row, 5, stock.low, &price)?;
        write_opt_number(&mut sheet, row, 6, stock.current, &price)?;
        write_opt_number(&mut sheet, row, 7, stock.change, &change)?;
        write_opt_number(&mut sheet, row, 8, stock.change_pct, &change_pct)?;
        sheet.write_number_with_format(row, 9, stock.volume as f64, &volume)?;
        sheet.write_string_with_format(row, 10, stock.date.to_string(), &date)?;
    }

    set_widths(&mut sheet, &STOCK_WIDTHS)?;
    sheet.set_freeze_panes(HEADER_ROW + 1, 0)?;
    sheet.autofilter(HEADER_ROW, 0, HEADER_ROW + stocks.len() as u32, last_col)?;

    Ok(sheet)
}

/// Top rows of `sorted` by change%; the caller picks the direction.
fn performers_sheet(name: &str, color: u32, sorted: &[StockRecord]) -> Result<Worksheet> {
    let mut sheet = Worksheet::new();
    sheet.set_name(name)?;
    sheet.write_string_with_format(0, 0, name, &title_format(color, 14.0).set_align(FormatAlign::Left))?;

    let headers = ["Symbol", "Current", "Change", "Change %", "Volume"];
    write_headers(&mut sheet, 2, &headers, &header_format(color))?;

    let cell = thin(Format::new());
    for (i, stock) in sorted.iter().take(TOP_ROWS).enumerate() {
        let row = 3 + i as u32;
        sheet.write_string_with_format(row, 0, &stock.symbol, &cell)?;
        write_opt_number(&mut sheet, row, 1, stock.current, &cell)?;
        write_opt_number(&mut sheet, row, 2, stock.change, &cell)?;
        write_opt_number(&mut sheet, row, 3, stock.change_pct, &cell)?;
        sheet.write_number_with_format(row, 4, stock.volume as f64, &cell)?;
    }

    set_widths(&mut sheet, &[16.0; 5])?;
    Ok(sheet)
}

fn volume_leaders_sheet(by_volume: &[StockRecord]) -> Result<Worksheet> {
    let mut sheet = Worksheet::new();
    sheet.set_name("Volume Leaders")?;
    sheet.write_string_with_format(
        0,
        0,
        "Volume Leaders",
        &title_format(VOLUME_BLUE, 14.0).set_align(FormatAlign::Left),
    )?;

    let headers = ["Symbol", "Current", "Change %", "Volume"];
    write_headers(&mut sheet, 2, &headers, &header_format(VOLUME_BLUE))?;

    let cell = thin(Format::new());
    for (i, stock) in by_volume.iter().take(TOP_ROWS).enumerate() {
        let row = 3 + i as u32;
        sheet.write_string_with_format(row, 0, &stock.symbol, &cell)?;
        write_opt_number(&mut sheet, row, 1, stock.current, &cell)?;
        write_opt_number(&mut sheet, row, 2, stock.change_pct, &cell)?;
        sheet.write_number_with_format(row, 3, stock.volume as f64, &cell)?;
    }

    set_widths(&mut sheet, &[18.0; 4])?;
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_names_carry_timestamp() {
        let at = FixedOffset::east_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 5, 15, 30, 9)
            .unwrap();
        assert_eq!(file_name("mutual_funds_nav", at), "mutual_funds_nav_20240105_153009.xlsx");
        assert_eq!(file_name("psx_market_data", at), "psx_market_data_20240105_153009.xlsx");
    }
}
