use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{FixedOffset, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::errors::PipelineError;
use crate::events::LedgerStore;
use crate::exchange::{fetch_fills_with_retry, RetryPolicy, TradeHistoryClient};
use crate::models::Event;
use crate::notify::format::{format_event_report, format_fill_report};
use crate::reports::{aggregate_events, aggregate_fills, compute_pnl, ReportWindow};

const DEFAULT_RECENT: usize = 20;
const MAX_RECENT: usize = 500;
const DEFAULT_FILLS: u32 = 50;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LedgerStore>,
    pub exchange: Option<Arc<TradeHistoryClient>>,
    pub retry: RetryPolicy,
    pub reporting_currency: String,
    pub report_offset: FixedOffset,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/events/recent", get(get_recent_events))
        .route("/api/report", get(get_event_report))
        .route("/api/fills/report", get(get_fill_report))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(HealthResponse {
        status: "ok",
        events: state.store.len()?,
    }))
}

/// Most recent ledger entries, newest first
async fn get_recent_events(
    State(state): State<AppState>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT).clamp(1, MAX_RECENT);
    let events = state.store.query_recent(limit)?;
    Ok(Json(EventsResponse {
        count: events.len(),
        events,
    }))
}

/// Windowed event statistics from the ledger
async fn get_event_report(
    State(state): State<AppState>,
    Query(params): Query<ReportQuery>,
) -> Result<Response, ApiError> {
    let window = ReportWindow::from_bounds(
        params.from.as_deref(),
        params.to.as_deref(),
        state.report_offset,
        Utc::now(),
    )?;
    let balances = parse_balances(params.start_balance.as_deref(), params.end_balance.as_deref())?;

    let events = state.store.query_range(window.start, window.end)?;
    let report = aggregate_events(
        &events,
        window.start,
        window.end,
        &state.reporting_currency,
        balances,
    )?;

    Ok(match params.format {
        OutputFormat::Json => Json(report).into_response(),
        OutputFormat::Text => format_event_report(&report, state.report_offset).into_response(),
    })
}

/// Live fill statistics from the exchange
async fn get_fill_report(
    State(state): State<AppState>,
    Query(params): Query<FillsQuery>,
) -> Result<Response, ApiError> {
    let client = state.exchange.as_ref().ok_or(ApiError::ExchangeUnavailable)?;
    let balances = parse_balances(params.start_balance.as_deref(), params.end_balance.as_deref())?;
    let symbol = params.symbol.as_deref().filter(|s| !s.trim().is_empty());

    let fills = fetch_fills_with_retry(
        client,
        symbol,
        params.limit.unwrap_or(DEFAULT_FILLS),
        state.retry,
    )
    .await?;
    let report = aggregate_fills(&fills, balances)?;

    Ok(match params.format {
        OutputFormat::Json => Json(report).into_response(),
        OutputFormat::Text => format_fill_report(&report, symbol).into_response(),
    })
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, ApiError> {
    Decimal::from_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("{field} must be a decimal number, got '{raw}'")))
}

fn parse_balances(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Option<(Decimal, Decimal)>, ApiError> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(s), Some(e)) => {
            let start = parse_decimal("start_balance", s)?;
            let end = parse_decimal("end_balance", e)?;
            // reject balances whose delta cannot be represented
            compute_pnl(start, end).map_err(|err| ApiError::BadRequest(err.to_string()))?;
            Ok(Some((start, end)))
        }
        _ => Err(ApiError::BadRequest(
            "start_balance and end_balance must be given together".to_string(),
        )),
    }
}

// ===== Request/Response Types =====

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OutputFormat {
    #[default]
    Json,
    Text,
}

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ReportQuery {
    from: Option<String>,
    to: Option<String>,
    start_balance: Option<String>,
    end_balance: Option<String>,
    #[serde(default)]
    format: OutputFormat,
}

#[derive(Deserialize)]
struct FillsQuery {
    symbol: Option<String>,
    limit: Option<u32>,
    start_balance: Option<String>,
    end_balance: Option<String>,
    #[serde(default)]
    format: OutputFormat,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    events: usize,
}

#[derive(Serialize)]
struct EventsResponse {
    count: usize,
    events: Vec<Event>,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    BadRequest(String),
    ExchangeUnavailable,
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::ExchangeUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "exchange credentials not configured".to_string(),
            ),
            ApiError::Pipeline(err) => match err {
                PipelineError::Parse(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                PipelineError::Transport(_)
                | PipelineError::HttpStatus { .. }
                | PipelineError::Vendor { .. } => {
                    tracing::warn!("Exchange error: {}", err);
                    (StatusCode::BAD_GATEWAY, err.to_string())
                }
                PipelineError::Overflow(_) => {
                    tracing::warn!("Report not computable: {}", err);
                    (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
                }
                PipelineError::Storage(_) | PipelineError::Configuration(_) => {
                    tracing::error!("Internal error: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
                }
            },
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
