use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeZone;
use chrono_tz::Asia::Kolkata;
use serde_json::Value;
use tokio::net::TcpListener;

use candle_bell::calendar::{Timestamp, TradingCalendar};
use candle_bell::error::AppError;
use candle_bell::http::{next_candle_times_at, router, tracking_entries, HttpState};
use candle_bell::model::market::{Instrument, MarketKind};
use candle_bell::notify::{LogNotifier, NotificationReceipt, Notifier};
use candle_bell::tracker::CandleTracker;

struct RejectingNotifier;

#[async_trait]
impl Notifier for RejectingNotifier {
    async fn send_notification(&self, _message: &str) -> Result<NotificationReceipt, AppError> {
        Err(AppError::NotificationApi {
            status: 401,
            msg: "{\"message\": \"bad auth\"}".to_string(),
        })
    }
}

fn ist(y: i32, m: u32, d: u32, h: u32, mi: u32) -> Timestamp {
    Kolkata.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
}

fn state() -> HttpState {
    state_with(Arc::new(LogNotifier))
}

fn state_with(notifier: Arc<dyn Notifier>) -> HttpState {
    let tracker = CandleTracker::new(
        notifier,
        TradingCalendar::nse(Kolkata),
        TradingCalendar::crypto_4h(),
        vec![
            Instrument::new(MarketKind::Nse, "NSE"),
            Instrument::new(MarketKind::Crypto, "BTC"),
            Instrument::new(MarketKind::Crypto, "ETH"),
        ],
    );
    HttpState {
        tracker: Arc::new(tracker),
        display_tz: Kolkata,
    }
}

#[test]
fn next_candle_times_during_session() {
    let view = next_candle_times_at(&state(), &ist(2025, 1, 6, 10, 7)).unwrap();
    assert!(view.success);
    assert!(view.nse_market_open);
    assert_eq!(view.current_time, "2025-01-06T10:07:00+05:30");
    assert_eq!(
        view.next_nse_15min.as_deref(),
        Some("2025-01-06T10:15:00+05:30")
    );

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["next_btc_4h"], "2025-01-06T13:30:00+05:30");
    assert_eq!(json["next_eth_4h"], "2025-01-06T13:30:00+05:30");
    assert_eq!(json["nse_market_open"], true);
}

#[test]
fn next_candle_times_on_weekend_points_at_monday_open() {
    let view = next_candle_times_at(&state(), &ist(2025, 1, 11, 12, 0)).unwrap();
    assert!(!view.nse_market_open);
    assert_eq!(
        view.next_nse_15min.as_deref(),
        Some("2025-01-13T09:15:00+05:30")
    );
    assert_eq!(
        view.next_crypto_4h.get("next_btc_4h").map(String::as_str),
        Some("2025-01-11T13:30:00+05:30")
    );
}

#[tokio::test]
async fn tracking_entries_reflect_committed_boundaries() {
    let state = state();
    let before = tracking_entries(&state);
    assert_eq!(before.len(), 3);
    assert!(before.iter().all(|e| e.last_acted_boundary.is_none()));

    state
        .tracker
        .check_market(MarketKind::Crypto, &ist(2025, 1, 7, 2, 0))
        .await;
    let after = tracking_entries(&state);
    assert_eq!(after[0].instrument, "NSE");
    assert_eq!(after[0].last_acted_boundary, None);
    assert_eq!(
        after[1].last_acted_boundary.as_deref(),
        Some("2025-01-07T01:30:00+05:30")
    );
    assert_eq!(after[2].market, MarketKind::Crypto);
}

async fn spawn_api(state: HttpState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router(state)).await.unwrap() });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_call_reports_receipt() {
    let base = spawn_api(state()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/test-call", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Call initiated");
    assert_eq!(body["details"]["delivery_status"], "logged");
}

#[tokio::test]
async fn failed_test_call_is_a_500_with_detail() {
    let base = spawn_api(state_with(Arc::new(RejectingNotifier))).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/test-call", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 500);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["detail"],
        "notification API error (status 401): {\"message\": \"bad auth\"}"
    );
}

#[tokio::test]
async fn tracking_endpoint_lists_every_instrument() {
    let base = spawn_api(state()).await;
    let body: Value = reqwest::get(format!("{}/tracking", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["instrument"], "NSE");
    assert_eq!(entries[0]["market"], "nse");
    assert!(entries[0]["last_acted_boundary"].is_null());
}
