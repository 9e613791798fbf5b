pub mod fund;
pub mod snapshot;
pub mod stock;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

pub use fund::FundRecord;
pub use snapshot::{ScrapeOutcome, Snapshot, Source};
pub use stock::{IndexName, IndexRecord, StockRecord};

/// A typed row produced by one of the source parsers.
pub trait ScrapedRecord: Clone + Send + Sync + Serialize + 'static {
    /// Required-field invariant checked before a snapshot is published.
    fn is_valid(&self) -> bool;

    /// Stamps the capture time during post-processing.
    fn stamp(&mut self, scraped_at: DateTime<FixedOffset>);
}
