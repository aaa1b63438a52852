use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::TimeZone;
use chrono_tz::Asia::Kolkata;

use candle_bell::calendar::{Timestamp, TradingCalendar};
use candle_bell::error::AppError;
use candle_bell::model::market::{Instrument, MarketKind};
use candle_bell::notify::{NotificationReceipt, Notifier};
use candle_bell::tracker::{CandleTracker, CheckOutcome};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_notification(&self, message: &str) -> Result<NotificationReceipt, AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::NotificationApi {
                status: 503,
                msg: "service unavailable".to_string(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.to_string());
        Ok(NotificationReceipt {
            identifier: format!("CA{}", sent.len()),
            delivery_status: "queued".to_string(),
        })
    }
}

fn ist(y: i32, m: u32, d: u32, h: u32, mi: u32) -> Timestamp {
    Kolkata.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
}

fn tracker(notifier: Arc<RecordingNotifier>) -> CandleTracker {
    CandleTracker::new(
        notifier,
        TradingCalendar::nse(Kolkata),
        TradingCalendar::crypto_4h(),
        vec![
            Instrument::new(MarketKind::Nse, "NSE"),
            Instrument::new(MarketKind::Crypto, "BTC"),
            Instrument::new(MarketKind::Crypto, "ETH"),
            Instrument::new(MarketKind::Crypto, "btc"),
        ],
    )
}

#[tokio::test]
/// Verifies the bootstrap fire and its commit:
/// the first in-session poll notifies once, the repeat poll at the same instant does not.
async fn first_poll_notifies_once_and_commits() {
    let notifier = Arc::new(RecordingNotifier::default());
    let tracker = tracker(notifier.clone());
    let now = ist(2025, 1, 6, 10, 7);

    let outcomes = tracker.check_market(MarketKind::Nse, &now).await;
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0].1 {
        CheckOutcome::Notified { boundary, receipt } => {
            assert_eq!(*boundary, ist(2025, 1, 6, 10, 0));
            assert_eq!(receipt.identifier, "CA1");
        }
        other => panic!("expected notification, got {:?}", other),
    }

    let repeat = tracker.check_market(MarketKind::Nse, &now).await;
    assert_eq!(repeat[0].1, CheckOutcome::Pending);
    assert_eq!(
        notifier.sent(),
        vec!["NSE NSE candle closed. Check your trading platform for details.".to_string()]
    );
}

#[tokio::test]
/// Verifies commit-on-success:
/// a failed dispatch leaves the state untouched and the next poll retries the same boundary.
async fn failed_dispatch_is_retried_next_poll() {
    let notifier = Arc::new(RecordingNotifier::default());
    let tracker = tracker(notifier.clone());
    tracker
        .check_market(MarketKind::Nse, &ist(2025, 1, 6, 9, 20))
        .await;

    notifier.failing.store(true, Ordering::SeqCst);
    let failed = tracker
        .check_market(MarketKind::Nse, &ist(2025, 1, 6, 9, 30))
        .await;
    assert!(matches!(
        &failed[0].1,
        CheckOutcome::DispatchFailed { boundary, .. } if *boundary == ist(2025, 1, 6, 9, 30)
    ));
    let snapshot = tracker.snapshot();
    assert_eq!(snapshot[0].1, Some(ist(2025, 1, 6, 9, 15)));

    notifier.failing.store(false, Ordering::SeqCst);
    let retried = tracker
        .check_market(MarketKind::Nse, &ist(2025, 1, 6, 9, 31))
        .await;
    assert!(matches!(
        &retried[0].1,
        CheckOutcome::Notified { boundary, .. } if *boundary == ist(2025, 1, 6, 9, 30)
    ));
    assert_eq!(notifier.sent().len(), 2);
}

#[tokio::test]
async fn crypto_check_covers_each_symbol_independently() {
    let notifier = Arc::new(RecordingNotifier::default());
    let tracker = tracker(notifier.clone());

    assert_eq!(tracker.instruments(MarketKind::Crypto).len(), 2);

    let outcomes = tracker
        .check_market(MarketKind::Crypto, &ist(2025, 1, 7, 2, 0))
        .await;
    let symbols: Vec<&str> = outcomes.iter().map(|(i, _)| i.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BTC", "ETH"]);
    assert!(outcomes.iter().all(|(_, o)| matches!(
        o,
        CheckOutcome::Notified { boundary, .. } if *boundary == ist(2025, 1, 7, 1, 30)
    )));
    assert_eq!(
        notifier.sent(),
        vec![
            "Crypto BTC candle closed. Check your trading platform for details.".to_string(),
            "Crypto ETH candle closed. Check your trading platform for details.".to_string(),
        ]
    );

    // NSE state untouched by crypto checks.
    let snapshot = tracker.snapshot();
    assert_eq!(snapshot[0].0.market, MarketKind::Nse);
    assert_eq!(snapshot[0].1, None);
}

#[tokio::test]
async fn concurrent_checks_fire_once_per_boundary() {
    let notifier = Arc::new(RecordingNotifier::default());
    let tracker = Arc::new(tracker(notifier.clone()));
    let now = ist(2025, 1, 6, 10, 7);

    let a = {
        let tracker = tracker.clone();
        tokio::spawn(async move { tracker.check_market(MarketKind::Nse, &now).await })
    };
    let b = {
        let tracker = tracker.clone();
        tokio::spawn(async move { tracker.check_market(MarketKind::Nse, &now).await })
    };
    a.await.unwrap();
    b.await.unwrap();

    assert_eq!(notifier.sent().len(), 1);
}

struct GatedNotifier {
    entered: tokio::sync::Notify,
    release: tokio::sync::Notify,
}

#[async_trait]
impl Notifier for GatedNotifier {
    async fn send_notification(&self, _message: &str) -> Result<NotificationReceipt, AppError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(NotificationReceipt {
            identifier: "CA-gated".to_string(),
            delivery_status: "queued".to_string(),
        })
    }
}

#[tokio::test]
async fn snapshot_does_not_wait_for_in_flight_dispatch() {
    let notifier = Arc::new(GatedNotifier {
        entered: tokio::sync::Notify::new(),
        release: tokio::sync::Notify::new(),
    });
    let tracker = Arc::new(CandleTracker::new(
        notifier.clone(),
        TradingCalendar::nse(Kolkata),
        TradingCalendar::crypto_4h(),
        vec![Instrument::new(MarketKind::Nse, "NSE")],
    ));

    let check = {
        let tracker = tracker.clone();
        tokio::spawn(async move {
            tracker
                .check_market(MarketKind::Nse, &ist(2025, 1, 6, 10, 7))
                .await
        })
    };
    notifier.entered.notified().await;

    // The dispatch is parked while holding the instrument's lock.
    assert_eq!(tracker.snapshot()[0].1, None);

    notifier.release.notify_one();
    let outcomes = check.await.unwrap();
    assert!(matches!(outcomes[0].1, CheckOutcome::Notified { .. }));
    assert_eq!(tracker.snapshot()[0].1, Some(ist(2025, 1, 6, 10, 0)));
}
