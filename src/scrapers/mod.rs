pub mod base;
pub mod fetcher;
pub mod mufap;
pub mod positional;
pub mod psx;
pub mod table;

pub use base::{PageFetcher, PageParser, ParseContext, ParsedPage};
pub use fetcher::HttpFetcher;
pub use mufap::MufapNavParser;
pub use psx::{IndicesParser, MarketWatchParser};
