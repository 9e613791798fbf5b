use super::ScrapedRecord;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;

/// One mutual fund row from the MUFAP daily NAV table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundRecord {
    pub fund_name: String,
    pub fund_category: String,
    pub inception_date: Option<NaiveDate>,
    pub offer_price: Option<f64>,
    pub repurchase_price: Option<f64>,
    pub nav: f64,
    /// Validity date of the NAV
    pub date_updated: NaiveDate,
    pub trustee: String,
    pub scrape_timestamp: Option<DateTime<FixedOffset>>,
}

impl ScrapedRecord for FundRecord {
    fn is_valid(&self) -> bool {
        self.nav.is_finite() && self.nav > 0.0 && !self.fund_name.is_empty()
    }

    fn stamp(&mut self, scraped_at: DateTime<FixedOffset>) {
        self.scrape_timestamp = Some(scraped_at);
    }
}
