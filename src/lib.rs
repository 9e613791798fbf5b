//! Scrapes Pakistani mutual fund NAVs (MUFAP) and PSX market data, keeps the
//! latest validated snapshot of each source in memory and serves it over a
//! small HTTP API.

pub mod config;
pub mod errors;
pub mod models;
pub mod scrapers;
pub mod server;
pub mod services;
pub mod util;

pub use config::Config;
pub use errors::{DataHubError, Result};
pub use models::{FundRecord, IndexName, IndexRecord, ScrapeOutcome, Snapshot, Source, StockRecord};
pub use services::{DataService, Scheduler};
