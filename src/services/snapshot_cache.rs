use crate::models::{Snapshot, Source};
use crate::services::aggregates::Summarize;
use chrono::{DateTime, FixedOffset};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Returned by reads before the first successful scrape of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("No {0} data available yet. Service is still loading initial data.")]
pub struct NotReady(pub Source);

/// A published snapshot together with its precomputed summary.
#[derive(Debug)]
pub struct Published<R: Summarize> {
    pub snapshot: Snapshot<R>,
    pub summary: R::Summary,
}

/// Latest snapshot of one source.
///
/// Publishing swaps in a new `Arc` under a short write lock, so a reader
/// holds either the whole previous entry or the whole new one. Readers never
/// wait for a scrape, only for the pointer swap.
#[derive(Debug)]
pub struct SnapshotCache<R: Summarize> {
    source: Source,
    current: RwLock<Option<Arc<Published<R>>>>,
    scrape_count: AtomicU64,
}

impl<R: Summarize> SnapshotCache<R> {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            scrape_count: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Replace the current entry with `snapshot` and its summary. Returns
    /// the scrape count after this publish.
    pub fn publish(&self, snapshot: Snapshot<R>) -> u64 {
        let summary = R::summarize(&snapshot);
        let entry = Arc::new(Published { snapshot, summary });

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(entry);
        self.scrape_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn read(&self) -> Result<Arc<Published<R>>, NotReady> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(NotReady(self.source))
    }

    pub fn is_ready(&self) -> bool {
        self.read().is_ok()
    }

    /// Records in the current snapshot, 0 before the first publish.
    pub fn record_count(&self) -> usize {
        self.read().map_or(0, |p| p.snapshot.len())
    }

    pub fn scrape_count(&self) -> u64 {
        self.scrape_count.load(Ordering::SeqCst)
    }

    pub fn last_scraped_at(&self) -> Option<DateTime<FixedOffset>> {
        self.read().ok().map(|p| p.snapshot.captured_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FundRecord;
    use crate::util::now_pkt;
    use chrono::NaiveDate;

    fn funds(count: usize, nav: f64) -> Snapshot<FundRecord> {
        let records = (0..count)
            .map(|i| FundRecord {
                fund_name: format!("Fund {}", i),
                fund_category: "Equity".to_string(),
                inception_date: None,
                offer_price: None,
                repurchase_price: None,
                nav,
                date_updated: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                trustee: String::new(),
                scrape_timestamp: None,
            })
            .collect();
        Snapshot {
            source: Source::Funds,
            records,
            captured_at: now_pkt(),
            market_date: None,
            used_fallback: false,
        }
    }

    #[test]
    fn read_before_publish_is_not_ready() {
        let cache: SnapshotCache<FundRecord> = SnapshotCache::new(Source::Funds);
        assert_eq!(cache.read().unwrap_err(), NotReady(Source::Funds));
        assert_eq!(cache.record_count(), 0);
        assert!(cache.last_scraped_at().is_none());
    }

    #[test]
    fn publish_replaces_wholesale() {
        let cache = SnapshotCache::new(Source::Funds);
        assert_eq!(cache.publish(funds(3, 10.0)), 1);
        assert_eq!(cache.publish(funds(2, 20.0)), 2);

        let current = cache.read().unwrap();
        assert_eq!(current.snapshot.len(), 2);
        assert!(current.snapshot.records.iter().all(|r| r.nav == 20.0));
        assert_eq!(current.summary.stats.total_funds, 2);
        assert_eq!(cache.scrape_count(), 2);
    }

    #[test]
    fn readers_never_see_mixed_snapshots() {
        let cache = SnapshotCache::new(Source::Funds);
        cache.publish(funds(50, 1.0));

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for generation in 2..200 {
                    let count = 50 + generation % 7;
                    cache.publish(funds(count, generation as f64));
                }
            });

            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        let entry = cache.read().unwrap();
                        let nav = entry.snapshot.records[0].nav;
                        assert!(entry.snapshot.records.iter().all(|r| r.nav == nav));
                        assert_eq!(entry.summary.stats.total_funds, entry.snapshot.len());
                    }
                });
            }
        });

        assert_eq!(cache.scrape_count(), 199);
    }
}
