use super::ScrapedRecord;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use std::fmt;

/// One row of the PSX market watch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockRecord {
    pub symbol: String,
    pub sector: Option<String>,
    pub ldcp: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub current: Option<f64>,
    pub change: Option<f64>,
    pub change_pct: Option<f64>,
    pub volume: i64,
    /// Market date shown on the page (scrape day when the page has none)
    pub date: NaiveDate,
    pub scrape_timestamp: Option<DateTime<FixedOffset>>,
}

impl ScrapedRecord for StockRecord {
    fn is_valid(&self) -> bool {
        !self.symbol.is_empty() && self.current.is_some_and(f64::is_finite)
    }

    fn stamp(&mut self, scraped_at: DateTime<FixedOffset>) {
        self.scrape_timestamp = Some(scraped_at);
    }
}

/// Indices published on the PSX home page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IndexName {
    #[serde(rename = "KSE100")]
    Kse100,
    #[serde(rename = "KSE100PR")]
    Kse100Pr,
    #[serde(rename = "ALLSHR")]
    AllShr,
    #[serde(rename = "KSE30")]
    Kse30,
    #[serde(rename = "KMI30")]
    Kmi30,
    #[serde(rename = "BKTI")]
    Bkti,
    #[serde(rename = "OGTI")]
    Ogti,
    #[serde(rename = "KMIALLSHR")]
    KmiAllShr,
    #[serde(rename = "PSXDIV20")]
    PsxDiv20,
    #[serde(rename = "UPP9")]
    Upp9,
    #[serde(rename = "NITPGI")]
    Nitpgi,
    #[serde(rename = "NBPPGI")]
    Nbppgi,
    #[serde(rename = "MZNPI")]
    Mznpi,
    #[serde(rename = "JSMFI")]
    Jsmfi,
    #[serde(rename = "ACI")]
    Aci,
    #[serde(rename = "JSGBKTI")]
    Jsgbkti,
    #[serde(rename = "HBLTTI")]
    Hbltti,
    #[serde(rename = "MII30")]
    Mii30,
}

impl IndexName {
    pub const ALL: [IndexName; 18] = [
        IndexName::Kse100,
        IndexName::Kse100Pr,
        IndexName::AllShr,
        IndexName::Kse30,
        IndexName::Kmi30,
        IndexName::Bkti,
        IndexName::Ogti,
        IndexName::KmiAllShr,
        IndexName::PsxDiv20,
        IndexName::Upp9,
        IndexName::Nitpgi,
        IndexName::Nbppgi,
        IndexName::Mznpi,
        IndexName::Jsmfi,
        IndexName::Aci,
        IndexName::Jsgbkti,
        IndexName::Hbltti,
        IndexName::Mii30,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexName::Kse100 => "KSE100",
            IndexName::Kse100Pr => "KSE100PR",
            IndexName::AllShr => "ALLSHR",
            IndexName::Kse30 => "KSE30",
            IndexName::Kmi30 => "KMI30",
            IndexName::Bkti => "BKTI",
            IndexName::Ogti => "OGTI",
            IndexName::KmiAllShr => "KMIALLSHR",
            IndexName::PsxDiv20 => "PSXDIV20",
            IndexName::Upp9 => "UPP9",
            IndexName::Nitpgi => "NITPGI",
            IndexName::Nbppgi => "NBPPGI",
            IndexName::Mznpi => "MZNPI",
            IndexName::Jsmfi => "JSMFI",
            IndexName::Aci => "ACI",
            IndexName::Jsgbkti => "JSGBKTI",
            IndexName::Hbltti => "HBLTTI",
            IndexName::Mii30 => "MII30",
        }
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index level scraped from the PSX home page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRecord {
    pub index_name: IndexName,
    pub value: Option<f64>,
    pub change: Option<f64>,
    pub change_pct: Option<f64>,
    pub date: NaiveDate,
    pub scrape_timestamp: Option<DateTime<FixedOffset>>,
}

impl ScrapedRecord for IndexRecord {
    fn is_valid(&self) -> bool {
        self.value.is_some_and(f64::is_finite)
    }

    fn stamp(&mut self, scraped_at: DateTime<FixedOffset>) {
        self.scrape_timestamp = Some(scraped_at);
    }
}
