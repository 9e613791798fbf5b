use pkfinance_datahub::config::Config;
use pkfinance_datahub::models::{ScrapeOutcome, Source};
use pkfinance_datahub::scrapers::{IndicesParser, MarketWatchParser, MufapNavParser, PageParser};
use pkfinance_datahub::server;
use pkfinance_datahub::services::{DataService, Scheduler};
use pkfinance_datahub::util::today_pkt;

use anyhow::{anyhow, Context};
use clap::{App, Arg, SubCommand};
use log::{error, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn parse_sources(value: &str) -> anyhow::Result<Vec<Source>> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(Source::ALL.to_vec());
    }
    value.parse::<Source>().map(|s| vec![s]).map_err(|e| anyhow!(e))
}

fn report(source: Source, outcome: &ScrapeOutcome) -> anyhow::Result<()> {
    if let ScrapeOutcome::Error { message } = outcome {
        error!("{} scrape failed: {}", source, message);
    }
    println!("{}: {}", source, serde_json::to_string(outcome)?);
    Ok(())
}

fn print_parsed<P: PageParser>(parser: P, html: &str, limit: usize) -> anyhow::Result<()> {
    let page = parser.parse(html, today_pkt());
    println!(
        "{}: {} records (fallback: {}, market date: {})",
        parser.source(),
        page.len(),
        page.used_fallback,
        page.market_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
    );
    for record in page.records.iter().take(limit) {
        println!("{}", serde_json::to_string(record)?);
    }
    if page.len() > limit {
        println!("... and {} more records", page.len() - limit);
    }
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let port = config.port;
    let interval = config.scrape_interval;
    let service = Arc::new(DataService::new(config)?);

    info!("Running initial scrape of every source");
    for (source, outcome) in service.scrape_all().await {
        info!("Initial {} scrape: {}", source, outcome.status());
    }

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(Arc::clone(&service), interval, shutdown.clone()).spawn();

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("Shutdown requested");
        ctrl_c.cancel();
    });

    server::serve(service, port, shutdown.clone()).await?;
    shutdown.cancel();
    scheduler.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app = App::new("PK Finance DataHub")
        .version(env!("CARGO_PKG_VERSION"))
        .about("MUFAP fund NAV and PSX market data scraper")
        .subcommand(
            SubCommand::with_name("serve")
                .about("Scrape on a schedule and serve the HTTP API")
                .arg(
                    Arg::with_name("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .help("Port to listen on (overrides PORT)")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("interval")
                        .short('i')
                        .long("interval")
                        .value_name("MINUTES")
                        .help("Minutes between scheduled scrapes (overrides SCRAPE_INTERVAL_MINUTES)")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("scrape")
                .about("Run one scrape and print the outcomes")
                .arg(
                    Arg::with_name("source")
                        .short('s')
                        .long("source")
                        .value_name("SOURCE")
                        .help("Source to scrape (funds, stocks, indices, all)")
                        .takes_value(true)
                        .default_value("all"),
                )
                .arg(
                    Arg::with_name("export")
                        .short('x')
                        .long("export")
                        .help("Write an Excel workbook for each published snapshot")
                        .takes_value(false),
                ),
        )
        .subcommand(
            SubCommand::with_name("parse")
                .about("Parse a saved page without fetching")
                .arg(
                    Arg::with_name("source")
                        .short('s')
                        .long("source")
                        .value_name("SOURCE")
                        .help("Page type (funds, stocks, indices)")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("file")
                        .short('f')
                        .long("file")
                        .value_name("FILE")
                        .help("Saved HTML file")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("limit")
                        .short('l')
                        .long("limit")
                        .value_name("LIMIT")
                        .help("Records to print")
                        .takes_value(true)
                        .default_value("10"),
                ),
        );

    let matches = app.get_matches();
    let mut config = Config::from_env();

    if let Some(matches) = matches.subcommand_matches("serve") {
        if let Some(port) = matches.value_of("port") {
            config = config.with_port(port.parse().context("invalid --port")?);
        }
        if let Some(minutes) = matches.value_of("interval") {
            config = config.with_scrape_interval_minutes(minutes.parse().context("invalid --interval")?);
        }
        serve(config).await?;
    } else if let Some(matches) = matches.subcommand_matches("scrape") {
        let sources = parse_sources(matches.value_of("source").unwrap_or("all"))?;
        config = config.with_export_on_publish(matches.is_present("export"));

        let service = DataService::new(config)?;
        let mut failed = false;
        for source in sources {
            let outcome = service.scrape(source).await;
            failed |= !outcome.is_success();
            report(source, &outcome)?;
        }
        if failed {
            warn!("At least one source did not publish");
        }
    } else if let Some(matches) = matches.subcommand_matches("parse") {
        let path = matches.value_of("file").unwrap_or_default();
        let html = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
        let limit = matches.value_of("limit").unwrap_or("10").parse::<usize>().unwrap_or(10);

        match matches.value_of("source").unwrap_or_default().parse::<Source>().map_err(|e| anyhow!(e))? {
            Source::Funds => print_parsed(MufapNavParser::new(), &html, limit)?,
            Source::Stocks => print_parsed(MarketWatchParser::new(), &html, limit)?,
            Source::Indices => print_parsed(IndicesParser::new(), &html, limit)?,
        }
    } else {
        info!("No command specified. Use --help for usage information.");
    }

    Ok(())
}
