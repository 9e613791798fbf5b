use crate::config::Config;
use crate::errors::Result;
use crate::models::{FundRecord, IndexRecord, ScrapeOutcome, ScrapedRecord, Snapshot, Source, StockRecord};
use crate::scrapers::{HttpFetcher, IndicesParser, MarketWatchParser, MufapNavParser, PageFetcher, PageParser};
use crate::services::aggregates::Summarize;
use crate::services::excel_export::ExcelExporter;
use crate::services::snapshot_cache::SnapshotCache;
use crate::util::{now_pkt, today_pkt};
use chrono::{DateTime, FixedOffset};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

/// Receives every freshly published snapshot (spreadsheet export).
pub trait SnapshotSink<R>: Send + Sync {
    fn export(&self, snapshot: &Snapshot<R>) -> Result<PathBuf>;
}

/// Runs fetch → parse → validate → publish for one source.
///
/// At most one run is in flight; a concurrent trigger returns
/// [`ScrapeOutcome::Skipped`] instead of waiting. Failures never escape
/// [`Orchestrator::run`], they become an outcome and the previous snapshot
/// stays in the cache.
pub struct Orchestrator<P: PageParser>
where
    P::Record: Summarize,
{
    parser: Arc<P>,
    fetcher: Arc<dyn PageFetcher>,
    url: String,
    cache: Arc<SnapshotCache<P::Record>>,
    sink: Option<Arc<dyn SnapshotSink<P::Record>>>,
    in_flight: Mutex<()>,
}

impl<P: PageParser> Orchestrator<P>
where
    P::Record: Summarize,
{
    pub fn new(parser: P, fetcher: Arc<dyn PageFetcher>, url: &str) -> Self {
        let source = parser.source();
        Self {
            parser: Arc::new(parser),
            fetcher,
            url: url.to_string(),
            cache: Arc::new(SnapshotCache::new(source)),
            sink: None,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn SnapshotSink<P::Record>>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn source(&self) -> Source {
        self.parser.source()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cache(&self) -> &Arc<SnapshotCache<P::Record>> {
        &self.cache
    }

    pub async fn run(&self) -> ScrapeOutcome {
        let source = self.source();

        let outcome = match self.in_flight.try_lock() {
            Ok(_guard) => match self.scrape().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("{} scrape failed: {}", source, e);
                    ScrapeOutcome::Error { message: e.to_string() }
                }
            },
            Err(_) => {
                info!("{} scrape already in progress - skipping", source);
                ScrapeOutcome::Skipped {
                    reason: "already_running".to_string(),
                }
            }
        };

        match &outcome {
            ScrapeOutcome::Success { count, used_fallback, .. } => info!(
                "{} scrape outcome: success, {} records (fallback: {})",
                source, count, used_fallback
            ),
            other => info!(
                "{} scrape outcome: {}, {} records",
                source,
                other.status(),
                other.record_count()
            ),
        }

        outcome
    }

    async fn scrape(&self) -> Result<ScrapeOutcome> {
        let source = self.source();
        info!("Starting {} scrape from {}", source, self.url);

        let html = self.fetcher.fetch_page(&self.url).await?;

        let parser = Arc::clone(&self.parser);
        let today = today_pkt();
        let page = tokio::task::spawn_blocking(move || parser.parse(&html, today)).await?;

        let parsed = page.len();
        let mut records: Vec<P::Record> = page.records.into_iter().filter(|r| r.is_valid()).collect();
        if records.len() < parsed {
            debug!("Dropped {} invalid {} records", parsed - records.len(), source);
        }

        if records.is_empty() {
            warn!("{} scrape returned no data", source);
            return Ok(ScrapeOutcome::NoData { count: 0 });
        }

        let scraped_at = now_pkt();
        for record in &mut records {
            record.stamp(scraped_at);
        }

        let count = records.len();
        let snapshot = Snapshot {
            source,
            records,
            captured_at: scraped_at,
            market_date: page.market_date,
            used_fallback: page.used_fallback,
        };
        let scrape_count = self.cache.publish(snapshot);

        self.export_latest().await;

        Ok(ScrapeOutcome::Success {
            count,
            used_fallback: page.used_fallback,
            scraped_at,
            scrape_count,
        })
    }

    /// Hand the current snapshot to the sink. Errors are logged only.
    async fn export_latest(&self) {
        let (Some(sink), Ok(entry)) = (self.sink.clone(), self.cache.read()) else {
            return;
        };

        match tokio::task::spawn_blocking(move || sink.export(&entry.snapshot)).await {
            Ok(Ok(path)) => info!("{} data saved to Excel: {}", self.source(), path.display()),
            Ok(Err(e)) => error!("{} Excel export failed: {}", self.source(), e),
            Err(e) => error!("{} Excel export task failed: {}", self.source(), e),
        }
    }
}

/// Process-wide service context: one orchestrator and cache per source.
pub struct DataService {
    config: Config,
    funds: Orchestrator<MufapNavParser>,
    stocks: Orchestrator<MarketWatchParser>,
    indices: Orchestrator<IndicesParser>,
    next_scrape: RwLock<Option<DateTime<FixedOffset>>>,
}

impl DataService {
    /// Service backed by the pooled HTTP client.
    pub fn new(config: Config) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
        Ok(Self::with_fetcher(config, fetcher))
    }

    pub fn with_fetcher(config: Config, fetcher: Arc<dyn PageFetcher>) -> Self {
        let mut funds = Orchestrator::new(MufapNavParser::new(), Arc::clone(&fetcher), &config.mufap_nav_url);
        let mut stocks =
            Orchestrator::new(MarketWatchParser::new(), Arc::clone(&fetcher), &config.psx_market_watch_url);
        let indices = Orchestrator::new(IndicesParser::new(), fetcher, &config.psx_home_url);

        if config.export_on_publish {
            let exporter = Arc::new(ExcelExporter::new(&config.excel_output_dir));
            funds = funds.with_sink(exporter.clone());
            stocks = stocks.with_sink(exporter);
        }

        Self {
            config,
            funds,
            stocks,
            indices,
            next_scrape: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn funds(&self) -> &Arc<SnapshotCache<FundRecord>> {
        self.funds.cache()
    }

    pub fn stocks(&self) -> &Arc<SnapshotCache<StockRecord>> {
        self.stocks.cache()
    }

    pub fn indices(&self) -> &Arc<SnapshotCache<IndexRecord>> {
        self.indices.cache()
    }

    pub async fn scrape(&self, source: Source) -> ScrapeOutcome {
        match source {
            Source::Funds => self.funds.run().await,
            Source::Stocks => self.stocks.run().await,
            Source::Indices => self.indices.run().await,
        }
    }

    /// Scrape every source concurrently.
    pub async fn scrape_all(&self) -> Vec<(Source, ScrapeOutcome)> {
        let (funds, stocks, indices) = tokio::join!(self.funds.run(), self.stocks.run(), self.indices.run());
        vec![
            (Source::Funds, funds),
            (Source::Stocks, stocks),
            (Source::Indices, indices),
        ]
    }

    pub fn next_scrape(&self) -> Option<DateTime<FixedOffset>> {
        *self.next_scrape.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_next_scrape(&self, at: Option<DateTime<FixedOffset>>) {
        *self.next_scrape.write().unwrap_or_else(PoisonError::into_inner) = at;
    }
}
