//! Parse a saved PSX market watch page and print the market summary.
//!
//! ```text
//! cargo run --example parse_saved_page -- tests/fixtures/market_watch.html
//! ```

use pkfinance_datahub::models::{Snapshot, Source};
use pkfinance_datahub::scrapers::{MarketWatchParser, PageParser};
use pkfinance_datahub::services::aggregates::market_summary;
use pkfinance_datahub::services::query::{self, StockFilter};
use pkfinance_datahub::util::{now_pkt, today_pkt};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/fixtures/market_watch.html".to_string());
    let html = std::fs::read_to_string(&path)?;

    let page = MarketWatchParser::new().parse(&html, today_pkt());
    let snapshot = Snapshot {
        source: Source::Stocks,
        records: page.records,
        captured_at: now_pkt(),
        market_date: page.market_date,
        used_fallback: page.used_fallback,
    };

    let summary = market_summary(&snapshot.records, snapshot.market_date);
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let filter = StockFilter {
        limit: Some(5),
        ..StockFilter::default()
    };
    for stock in query::list_stocks(&snapshot, &filter)?.data {
        println!("{:<10} {:>10.2} {:>12}", stock.symbol, stock.current.unwrap_or_default(), stock.volume);
    }

    Ok(())
}
