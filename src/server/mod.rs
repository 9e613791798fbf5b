pub mod api;

use crate::errors::Result;
use crate::services::DataService;
use axum::routing::{get, post};
use axum::Router;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DataService>,
}

pub fn router(service: Arc<DataService>) -> Router {
    let mufap = Router::new()
        .route("/health", get(api::mufap_health))
        .route("/scrape", post(api::mufap_scrape))
        .route("/scrape/sync", post(api::mufap_scrape_sync))
        .route("/funds", get(api::list_funds))
        .route("/funds/search", get(api::search_funds))
        .route("/funds/categories", get(api::fund_categories))
        .route("/funds/category/{category}", get(api::funds_by_category))
        .route("/funds/top-nav", get(api::top_nav))
        .route("/funds/stats", get(api::fund_stats))
        .route("/export/excel", get(api::export_funds));

    let psx = Router::new()
        .route("/health", get(api::psx_health))
        .route("/scrape", post(api::psx_scrape))
        .route("/scrape/sync", post(api::psx_scrape_sync))
        .route("/scrape/indices", post(api::psx_scrape_indices))
        .route("/stocks", get(api::list_stocks))
        .route("/stocks/search", get(api::search_stocks))
        .route("/stocks/gainers", get(api::top_gainers))
        .route("/stocks/losers", get(api::top_losers))
        .route("/stocks/active", get(api::most_active))
        .route("/stocks/summary", get(api::market_summary))
        .route("/stocks/{symbol}", get(api::stock_detail))
        .route("/indices", get(api::list_indices))
        .route("/export/excel", get(api::export_stocks));

    Router::new()
        .route("/api/health", get(api::health))
        .nest("/api/mufap", mufap)
        .nest("/api/psx", psx)
        .with_state(AppState { service })
}

/// Serve the HTTP API until `shutdown` is cancelled.
pub async fn serve(service: Arc<DataService>, port: u16, shutdown: CancellationToken) -> Result<()> {
    let app = router(service);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Registering routes under /api/health, /api/mufap and /api/psx");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Server stopped");
    Ok(())
}
