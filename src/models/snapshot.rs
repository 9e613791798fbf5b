use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The three scraped data sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Funds,
    Stocks,
    Indices,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Funds, Source::Stocks, Source::Indices];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Funds => "funds",
            Source::Stocks => "stocks",
            Source::Indices => "indices",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "funds" | "mufap" => Ok(Source::Funds),
            "stocks" | "psx" => Ok(Source::Stocks),
            "indices" => Ok(Source::Indices),
            other => Err(format!("Unknown source: {}", other)),
        }
    }
}

/// Immutable, fully validated collection of records for one source.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<R> {
    pub source: Source,
    pub records: Vec<R>,
    pub captured_at: DateTime<FixedOffset>,
    /// Business date read from the page, best-effort
    pub market_date: Option<NaiveDate>,
    pub used_fallback: bool,
}

impl<R> Snapshot<R> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScrapeOutcome {
    Success {
        count: usize,
        used_fallback: bool,
        scraped_at: DateTime<FixedOffset>,
        scrape_count: u64,
    },
    NoData {
        count: usize,
    },
    Skipped {
        reason: String,
    },
    Error {
        message: String,
    },
}

impl ScrapeOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ScrapeOutcome::Success { .. } => "success",
            ScrapeOutcome::NoData { .. } => "no_data",
            ScrapeOutcome::Skipped { .. } => "skipped",
            ScrapeOutcome::Error { .. } => "error",
        }
    }

    pub fn record_count(&self) -> usize {
        match self {
            ScrapeOutcome::Success { count, .. } | ScrapeOutcome::NoData { count } => *count,
            _ => 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScrapeOutcome::Success { .. })
    }
}
