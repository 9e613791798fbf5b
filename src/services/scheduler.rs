use crate::services::data_service::DataService;
use crate::util::now_pkt;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Fixed-interval background scrape loop.
///
/// The timer and the scrape job are separate tasks: each tick spawns a job
/// running every source, and the loop only checks for cancellation between
/// iterations. A job abandoned at shutdown cannot corrupt the caches since
/// publishing happens after validation.
pub struct Scheduler {
    service: Arc<DataService>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(service: Arc<DataService>, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            service,
            interval,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!(
            "Background scheduler started: scraping every {:.0}s",
            self.interval.as_secs_f64()
        );

        loop {
            let next = chrono::Duration::from_std(self.interval)
                .ok()
                .map(|step| now_pkt() + step);
            self.service.set_next_scrape(next);

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.cancelled() => break,
            }

            info!("Scheduled scrape starting");
            let service = Arc::clone(&self.service);
            let job = tokio::spawn(async move { service.scrape_all().await });

            tokio::select! {
                result = job => match result {
                    Ok(outcomes) => {
                        for (source, outcome) in outcomes {
                            info!("Scheduled {} scrape: {}", source, outcome.status());
                        }
                    }
                    Err(e) => error!("Scheduled scrape task failed: {}", e),
                },
                _ = self.shutdown.cancelled() => break,
            }
        }

        self.service.set_next_scrape(None);
        info!("Background scheduler stopped");
    }
}
