use crate::errors::DataHubError;
use crate::models::{FundRecord, ScrapeOutcome, Source, StockRecord};
use crate::server::AppState;
use crate::services::aggregates::{CategoryCount, FundStats, MarketSummary};
use crate::services::excel_export::{self, XLSX_CONTENT_TYPE};
use crate::services::query::{self, FundFilter, Page, QueryError, StockFilter};
use crate::services::snapshot_cache::NotReady;
use crate::util::now_pkt;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, FixedOffset};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Handler error mapped onto an HTTP status with a `detail` message.
#[derive(Debug)]
pub enum ApiError {
    NotReady(NotReady),
    Query(QueryError),
    Internal(DataHubError),
}

impl From<NotReady> for ApiError {
    fn from(e: NotReady) -> Self {
        ApiError::NotReady(e)
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        ApiError::Query(e)
    }
}

impl From<DataHubError> for ApiError {
    fn from(e: DataHubError) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::NotReady(e) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Query(e @ QueryError::NoMatch(_)) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Query(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Internal(e) => {
                error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct Listing<R> {
    pub count: usize,
    pub data: Vec<R>,
}

impl<R> From<Vec<R>> for Listing<R> {
    fn from(data: Vec<R>) -> Self {
        Self { count: data.len(), data }
    }
}

#[derive(Debug, Serialize)]
pub struct PageResponse<R> {
    #[serde(flatten)]
    pub page: Page<R>,
    pub last_scrape: DateTime<FixedOffset>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopQuery {
    pub limit: Option<usize>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FundSearchQuery {
    #[serde(default)]
    pub q: String,
    pub field: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StockSearchQuery {
    #[serde(default)]
    pub symbol: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub category: Option<String>,
}

fn status_label(ready: bool) -> &'static str {
    if ready {
        "healthy"
    } else {
        "warming_up"
    }
}

// ── health ──────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let service = &state.service;
    let funds = service.funds();
    let stocks = service.stocks();

    Json(json!({
        "status": status_label(funds.is_ready() && stocks.is_ready()),
        "mufap": {
            "ready": funds.is_ready(),
            "cached": funds.record_count(),
            "last_scrape": funds.last_scraped_at(),
        },
        "psx": {
            "ready": stocks.is_ready(),
            "cached": stocks.record_count(),
            "last_scrape": stocks.last_scraped_at(),
        },
        "next_scrape": service.next_scrape(),
    }))
}

pub async fn mufap_health(State(state): State<AppState>) -> impl IntoResponse {
    let funds = state.service.funds();
    Json(json!({
        "status": status_label(funds.is_ready()),
        "ready": funds.is_ready(),
        "last_scrape": funds.last_scraped_at(),
        "scrape_count": funds.scrape_count(),
        "cached_records": funds.record_count(),
        "next_scrape": state.service.next_scrape(),
    }))
}

pub async fn psx_health(State(state): State<AppState>) -> impl IntoResponse {
    let stocks = state.service.stocks();
    Json(json!({
        "status": status_label(stocks.is_ready()),
        "ready": stocks.is_ready(),
        "last_scrape": stocks.last_scraped_at(),
        "scrape_count": stocks.scrape_count(),
        "cached_stocks": stocks.record_count(),
        "cached_indices": state.service.indices().record_count(),
        "next_scrape": state.service.next_scrape(),
    }))
}

// ── scrape triggers ─────────────────────────────────────────────

pub async fn mufap_scrape(State(state): State<AppState>) -> impl IntoResponse {
    let service = Arc::clone(&state.service);
    tokio::spawn(async move {
        let outcome = service.scrape(Source::Funds).await;
        info!("Background funds scrape finished: {}", outcome.status());
    });
    Json(json!({ "status": "scrape_started", "message": "Scraping MUFAP in background." }))
}

pub async fn mufap_scrape_sync(State(state): State<AppState>) -> Json<ScrapeOutcome> {
    Json(state.service.scrape(Source::Funds).await)
}

pub async fn psx_scrape(State(state): State<AppState>) -> impl IntoResponse {
    let service = Arc::clone(&state.service);
    tokio::spawn(async move {
        let (stocks, indices) = tokio::join!(service.scrape(Source::Stocks), service.scrape(Source::Indices));
        info!(
            "Background PSX scrape finished: stocks {}, indices {}",
            stocks.status(),
            indices.status()
        );
    });
    Json(json!({ "status": "scrape_started", "message": "Scraping PSX in background." }))
}

pub async fn psx_scrape_sync(State(state): State<AppState>) -> impl IntoResponse {
    let service = &state.service;
    let (stocks, indices) = tokio::join!(service.scrape(Source::Stocks), service.scrape(Source::Indices));
    Json(json!({ "stocks": stocks, "indices": indices }))
}

pub async fn psx_scrape_indices(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let outcome = state.service.scrape(Source::Indices).await;
    let published = state.service.indices().read()?;
    let data = query::list_indices(&published.snapshot);
    Ok(Json(json!({
        "status": outcome.status(),
        "count": data.len(),
        "data": data,
    })))
}

// ── funds ───────────────────────────────────────────────────────

pub async fn list_funds(
    State(state): State<AppState>,
    Query(filter): Query<FundFilter>,
) -> ApiResult<Json<PageResponse<FundRecord>>> {
    let published = state.service.funds().read()?;
    let page = query::list_funds(&published.snapshot, &filter)?;
    Ok(Json(PageResponse {
        page,
        last_scrape: published.snapshot.captured_at,
    }))
}

pub async fn search_funds(
    State(state): State<AppState>,
    Query(params): Query<FundSearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let published = state.service.funds().read()?;
    let field = params.field.as_deref().unwrap_or("fund_name");
    let data = query::search_funds(&published.snapshot.records, &params.q, Some(field))?;
    Ok(Json(json!({
        "query": params.q,
        "field": field,
        "count": data.len(),
        "data": data,
    })))
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub total_categories: usize,
    pub categories: Vec<CategoryCount>,
}

pub async fn fund_categories(State(state): State<AppState>) -> ApiResult<Json<CategoriesResponse>> {
    let published = state.service.funds().read()?;
    let categories = published.summary.categories.clone();
    Ok(Json(CategoriesResponse {
        total_categories: categories.len(),
        categories,
    }))
}

pub async fn funds_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let published = state.service.funds().read()?;
    let data = query::funds_by_category(&published.snapshot.records, &category)?;
    Ok(Json(json!({
        "category": category,
        "count": data.len(),
        "data": data,
    })))
}

pub async fn top_nav(
    State(state): State<AppState>,
    Query(params): Query<TopQuery>,
) -> ApiResult<Json<Listing<FundRecord>>> {
    let published = state.service.funds().read()?;
    let data = query::top_nav(&published.snapshot.records, params.limit, params.category.as_deref())?;
    Ok(Json(data.into()))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: FundStats,
    pub last_scrape: DateTime<FixedOffset>,
    pub category_filter: Option<String>,
}

pub async fn fund_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsQuery>,
) -> ApiResult<Json<StatsResponse>> {
    let published = state.service.funds().read()?;
    let stats = query::fund_stats(&published, params.category.as_deref())?;
    Ok(Json(StatsResponse {
        stats,
        last_scrape: published.snapshot.captured_at,
        category_filter: params.category,
    }))
}

// ── stocks ──────────────────────────────────────────────────────

pub async fn list_stocks(
    State(state): State<AppState>,
    Query(filter): Query<StockFilter>,
) -> ApiResult<Json<PageResponse<StockRecord>>> {
    let published = state.service.stocks().read()?;
    let page = query::list_stocks(&published.snapshot, &filter)?;
    Ok(Json(PageResponse {
        page,
        last_scrape: published.snapshot.captured_at,
    }))
}

pub async fn search_stocks(
    State(state): State<AppState>,
    Query(params): Query<StockSearchQuery>,
) -> ApiResult<Json<Listing<StockRecord>>> {
    let published = state.service.stocks().read()?;
    Ok(Json(query::search_stocks(&published.snapshot.records, &params.symbol)?.into()))
}

pub async fn top_gainers(
    State(state): State<AppState>,
    Query(params): Query<TopQuery>,
) -> ApiResult<Json<Listing<StockRecord>>> {
    let published = state.service.stocks().read()?;
    Ok(Json(query::top_gainers(&published.snapshot.records, params.limit)?.into()))
}

pub async fn top_losers(
    State(state): State<AppState>,
    Query(params): Query<TopQuery>,
) -> ApiResult<Json<Listing<StockRecord>>> {
    let published = state.service.stocks().read()?;
    Ok(Json(query::top_losers(&published.snapshot.records, params.limit)?.into()))
}

pub async fn most_active(
    State(state): State<AppState>,
    Query(params): Query<TopQuery>,
) -> ApiResult<Json<Listing<StockRecord>>> {
    let published = state.service.stocks().read()?;
    Ok(Json(query::most_active(&published.snapshot.records, params.limit)?.into()))
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    #[serde(flatten)]
    pub summary: MarketSummary,
    pub last_scrape: DateTime<FixedOffset>,
    pub scrape_count: u64,
    pub auto_refresh_minutes: u64,
}

pub async fn market_summary(State(state): State<AppState>) -> ApiResult<Json<SummaryResponse>> {
    let stocks = state.service.stocks();
    let published = stocks.read()?;
    Ok(Json(SummaryResponse {
        summary: query::summary(&*published),
        last_scrape: published.snapshot.captured_at,
        scrape_count: stocks.scrape_count(),
        auto_refresh_minutes: state.service.config().scrape_interval_minutes(),
    }))
}

pub async fn stock_detail(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let published = state.service.stocks().read()?;
    let data = query::stock_detail(&published.snapshot.records, &symbol)?;
    Ok(Json(json!({ "symbol": symbol.to_uppercase(), "data": data })))
}

pub async fn list_indices(State(state): State<AppState>) -> ApiResult<Json<Listing<crate::models::IndexRecord>>> {
    let published = state.service.indices().read()?;
    Ok(Json(query::list_indices(&published.snapshot).into()))
}

// ── export ──────────────────────────────────────────────────────

fn xlsx_response(bytes: Vec<u8>, prefix: &str) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"",
        excel_export::file_name(prefix, now_pkt())
    );
    (
        StatusCode::OK,
        [(CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()), (CONTENT_DISPOSITION, disposition)],
        bytes,
    )
        .into_response()
}

pub async fn export_funds(State(state): State<AppState>) -> ApiResult<Response> {
    let published = state.service.funds().read()?;
    let bytes = tokio::task::spawn_blocking(move || excel_export::funds_to_buffer(&published.snapshot))
        .await
        .map_err(DataHubError::from)??;
    Ok(xlsx_response(bytes, "mutual_funds_nav"))
}

pub async fn export_stocks(State(state): State<AppState>) -> ApiResult<Response> {
    let published = state.service.stocks().read()?;
    let bytes = tokio::task::spawn_blocking(move || excel_export::stocks_to_buffer(&published.snapshot))
        .await
        .map_err(DataHubError::from)??;
    Ok(xlsx_response(bytes, "psx_market_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        let not_ready = ApiError::from(NotReady(Source::Funds)).into_response();
        assert_eq!(not_ready.status(), StatusCode::NOT_FOUND);

        let bad_limit = ApiError::from(QueryError::OutOfRange {
            name: "limit",
            value: 0,
            max: 5000,
        })
        .into_response();
        assert_eq!(bad_limit.status(), StatusCode::BAD_REQUEST);

        let missing = ApiError::from(QueryError::NoMatch("Stock 'X' not found".to_string())).into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let internal = ApiError::from(DataHubError::Unknown("boom".to_string())).into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
