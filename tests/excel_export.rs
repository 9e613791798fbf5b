use calamine::{open_workbook_auto, DataType, Range, Reader};
use chrono::NaiveDate;
use pkfinance_datahub::models::{FundRecord, Snapshot, Source, StockRecord};
use pkfinance_datahub::services::excel_export::{funds_to_buffer, ExcelExporter};
use pkfinance_datahub::util::now_pkt;
use std::path::Path;

fn jan5() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
}

fn fund(category: &str, name: &str, offer: Option<f64>, nav: f64) -> FundRecord {
    FundRecord {
        fund_name: name.to_string(),
        fund_category: category.to_string(),
        inception_date: NaiveDate::from_ymd_opt(2009, 6, 28),
        offer_price: offer,
        repurchase_price: offer.map(|o| o - 0.5),
        nav,
        date_updated: jan5(),
        trustee: "CDC".to_string(),
        scrape_timestamp: Some(now_pkt()),
    }
}

fn stock(symbol: &str, current: f64, change: f64, change_pct: f64, volume: i64) -> StockRecord {
    StockRecord {
        symbol: symbol.to_string(),
        sector: Some("CEMENT".to_string()),
        ldcp: Some(current - change),
        open: Some(current),
        high: Some(current + 1.0),
        low: Some(current - 1.0),
        current: Some(current),
        change: Some(change),
        change_pct: Some(change_pct),
        volume,
        date: jan5(),
        scrape_timestamp: Some(now_pkt()),
    }
}

fn snapshot<R>(source: Source, records: Vec<R>) -> Snapshot<R> {
    Snapshot {
        source,
        records,
        captured_at: now_pkt(),
        market_date: Some(jan5()),
        used_fallback: false,
    }
}

fn sheet(path: &Path, name: &str) -> Range<DataType> {
    let mut workbook = open_workbook_auto(path).unwrap();
    workbook.worksheet_range(name).unwrap().unwrap()
}

fn text(range: &Range<DataType>, row: u32, col: u32) -> String {
    range.get_value((row, col)).map(|v| v.to_string()).unwrap_or_default()
}

#[test]
fn funds_workbook_layout() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = ExcelExporter::new(dir.path().join("nested/output"));
    let funds = snapshot(
        Source::Funds,
        vec![
            fund("Equity", "ABL Stock Fund", Some(18.5), 18.1234),
            fund("Equity", "HBL Equity Fund", Some(120.0), 118.25),
            fund("Income", "UBL Income Fund", None, 105.44),
        ],
    );

    let path = exporter.save_funds(&funds).unwrap();
    assert!(path.starts_with(exporter.output_dir()));
    let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("mutual_funds_nav_"), "{}", file_name);

    let workbook = open_workbook_auto(&path).unwrap();
    assert_eq!(workbook.sheet_names().to_vec(), vec!["Mutual Funds NAV", "Summary"]);

    let nav = sheet(&path, "Mutual Funds NAV");
    assert_eq!(text(&nav, 0, 0), "Pakistan Mutual Funds - Daily NAV Report");
    assert!(text(&nav, 2, 0).ends_with("Total Funds: 3"));
    assert_eq!(text(&nav, 4, 0), "Fund Category");
    assert_eq!(text(&nav, 4, 5), "NAV (PKR)");
    assert_eq!(text(&nav, 5, 1), "ABL Stock Fund");
    assert_eq!(text(&nav, 5, 2), "2009-06-28");
    assert_eq!(nav.get_value((5, 5)), Some(&DataType::Float(18.1234)));
    assert_eq!(text(&nav, 5, 6), "2024-01-05");
    assert_eq!(text(&nav, 7, 1), "UBL Income Fund");
    assert_eq!(text(&nav, 7, 3), "");

    let summary = sheet(&path, "Summary");
    assert_eq!(text(&summary, 0, 0), "Category Summary");
    assert_eq!(text(&summary, 3, 0), "Equity");
    assert_eq!(summary.get_value((3, 1)), Some(&DataType::Float(2.0)));
    assert_eq!(summary.get_value((3, 2)), Some(&DataType::Float(68.1867)));
    assert_eq!(summary.get_value((3, 4)), Some(&DataType::Float(118.25)));
    assert_eq!(text(&summary, 4, 0), "Income");
}

#[test]
fn stocks_workbook_sheets_and_rankings() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = ExcelExporter::new(dir.path());
    let stocks = snapshot(
        Source::Stocks,
        vec![
            stock("HBL", 122.4, 2.4, 2.0, 3_250_000),
            stock("OGDC", 98.5, -1.5, -1.5, 5_400_000),
            stock("LUCK", 750.0, 0.0, 0.0, 210_500),
            stock("KEL", 4.41, -0.09, -2.0, 25_000_000),
        ],
    );

    let path = exporter.save_stocks(&stocks).unwrap();
    let workbook = open_workbook_auto(&path).unwrap();
    assert_eq!(
        workbook.sheet_names().to_vec(),
        vec!["Market Watch", "Top Gainers", "Top Losers", "Volume Leaders"]
    );

    let watch = sheet(&path, "Market Watch");
    assert_eq!(text(&watch, 2, 0), "Gainers: 1 | Losers: 2 | Unchanged: 1");
    assert_eq!(text(&watch, 4, 0), "Symbol");
    assert_eq!(text(&watch, 5, 0), "HBL");
    assert_eq!(text(&watch, 5, 1), "CEMENT");
    assert_eq!(watch.get_value((8, 9)), Some(&DataType::Float(25_000_000.0)));

    let gainers = sheet(&path, "Top Gainers");
    assert_eq!(text(&gainers, 2, 3), "Change %");
    assert_eq!(text(&gainers, 3, 0), "HBL");
    assert_eq!(text(&gainers, 6, 0), "KEL");

    let losers = sheet(&path, "Top Losers");
    assert_eq!(text(&losers, 3, 0), "KEL");
    assert_eq!(text(&losers, 4, 0), "OGDC");

    let volume = sheet(&path, "Volume Leaders");
    assert_eq!(text(&volume, 2, 3), "Volume");
    assert_eq!(text(&volume, 3, 0), "KEL");
    assert_eq!(text(&volume, 4, 0), "OGDC");
}

#[test]
fn empty_market_gets_only_the_watch_sheet() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = ExcelExporter::new(dir.path());
    let path = exporter
        .save_stocks(&snapshot::<StockRecord>(Source::Stocks, Vec::new()))
        .unwrap();

    let workbook = open_workbook_auto(&path).unwrap();
    assert_eq!(workbook.sheet_names().to_vec(), vec!["Market Watch"]);
}

#[test]
fn buffer_rendering_is_a_zip_container() {
    let funds = snapshot(Source::Funds, vec![fund("Equity", "ABL Stock Fund", None, 18.1234)]);
    let bytes = funds_to_buffer(&funds).unwrap();
    assert!(bytes.starts_with(b"PK"));
}
