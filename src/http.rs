use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::calendar::Timestamp;
use crate::model::market::MarketKind;
use crate::notify::NotificationReceipt;
use crate::scheduler::shutdown_requested;
use crate::tracker::CandleTracker;

const TEST_CALL_MESSAGE: &str = "Test call from Trading Assistant";

#[derive(Clone)]
pub struct HttpState {
    pub tracker: Arc<CandleTracker>,
    /// Zone used to render every timestamp in responses.
    pub display_tz: Tz,
}

#[derive(Debug)]
pub struct ApiError(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": self.0 })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct NextCandleTimes {
    pub success: bool,
    pub current_time: String,
    pub next_nse_15min: Option<String>,
    /// One `next_<symbol>_4h` entry per crypto instrument.
    #[serde(flatten)]
    pub next_crypto_4h: BTreeMap<String, String>,
    pub nse_market_open: bool,
}

#[derive(Debug, Serialize)]
pub struct TestCallResponse {
    pub success: bool,
    pub message: String,
    pub details: NotificationReceipt,
}

#[derive(Debug, Serialize)]
pub struct TrackingEntry {
    pub instrument: String,
    pub market: MarketKind,
    pub last_acted_boundary: Option<String>,
}

/// Read-mostly endpoints for manual inspection plus a test notification.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/test-call", post(test_call))
        .route("/next-candle-times", get(next_candle_times))
        .route("/tracking", get(tracking))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    state: HttpState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown_requested(&mut shutdown).await })
        .await?;
    Ok(())
}

fn render(ts: &Timestamp, tz: Tz) -> String {
    ts.with_timezone(&tz).to_rfc3339()
}

async fn root(State(state): State<HttpState>) -> Json<Value> {
    let nse: Vec<String> = state
        .tracker
        .instruments(MarketKind::Nse)
        .into_iter()
        .map(|i| i.symbol)
        .collect();
    let crypto: Vec<String> = state
        .tracker
        .instruments(MarketKind::Crypto)
        .into_iter()
        .map(|i| i.symbol)
        .collect();
    Json(json!({
        "message": "Trading Assistant API is running",
        "status": "active",
        "features": {
            "nse_15min_candles": format!("Tracking 15-minute candle closes for {}", nse.join(", ")),
            "crypto_4h_candles": format!("Tracking 4-hour candle closes for {}", crypto.join(", ")),
        }
    }))
}

async fn health(State(state): State<HttpState>) -> Json<Value> {
    let now = chrono::Utc::now().with_timezone(&state.display_tz);
    Json(json!({ "status": "healthy", "timestamp": now.to_rfc3339() }))
}

async fn test_call(
    State(state): State<HttpState>,
) -> Result<Json<TestCallResponse>, ApiError> {
    let receipt = state
        .tracker
        .notifier()
        .send_notification(TEST_CALL_MESSAGE)
        .await
        .map_err(|e| ApiError(e.to_string()))?;
    Ok(Json(TestCallResponse {
        success: true,
        message: "Call initiated".to_string(),
        details: receipt,
    }))
}

async fn next_candle_times(
    State(state): State<HttpState>,
) -> Result<Json<NextCandleTimes>, ApiError> {
    let now = chrono::Utc::now().with_timezone(&state.display_tz);
    next_candle_times_at(&state, &now).map(Json)
}

/// Next expected boundaries as seen at `now`.
pub fn next_candle_times_at(
    state: &HttpState,
    now: &Timestamp,
) -> Result<NextCandleTimes, ApiError> {
    let tz = state.display_tz;
    let nse = state.tracker.calendar(MarketKind::Nse);
    let crypto = state.tracker.calendar(MarketKind::Crypto);

    let mut next_crypto_4h = BTreeMap::new();
    for instrument in state.tracker.instruments(MarketKind::Crypto) {
        let next = crypto.next_boundary(now).ok_or_else(|| {
            ApiError(format!("no upcoming 4-hour boundary for {}", instrument.symbol))
        })?;
        next_crypto_4h.insert(
            format!("next_{}_4h", instrument.symbol.to_ascii_lowercase()),
            render(&next, tz),
        );
    }

    Ok(NextCandleTimes {
        success: true,
        current_time: render(now, tz),
        next_nse_15min: nse.next_boundary(now).map(|b| render(&b, tz)),
        next_crypto_4h,
        nse_market_open: nse.is_market_open(now),
    })
}

async fn tracking(State(state): State<HttpState>) -> Json<Vec<TrackingEntry>> {
    Json(tracking_entries(&state))
}

pub fn tracking_entries(state: &HttpState) -> Vec<TrackingEntry> {
    state
        .tracker
        .snapshot()
        .into_iter()
        .map(|(instrument, last)| TrackingEntry {
            instrument: instrument.symbol,
            market: instrument.market,
            last_acted_boundary: last.map(|b| render(&b, state.display_tz)),
        })
        .collect()
}
