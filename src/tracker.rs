use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::calendar::{Timestamp, TradingCalendar};
use crate::detector::{poll_for_close, CloseCheck};
use crate::model::market::{Instrument, MarketKind};
use crate::model::tracking::TrackingState;
use crate::notify::{format_candle_message, NotificationReceipt, Notifier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pending,
    Notified {
        boundary: Timestamp,
        receipt: NotificationReceipt,
    },
    /// The boundary stays uncommitted and is retried on the next poll.
    DispatchFailed { boundary: Timestamp, error: String },
}

struct TrackedInstrument {
    instrument: Instrument,
    // Held across detection, dispatch and commit.
    state: Mutex<TrackingState>,
    // Last committed boundary, readable while a dispatch holds `state`.
    committed: watch::Sender<Option<Timestamp>>,
}

/// Owns the tracking state of every instrument and turns detected closes into
/// notifications.
pub struct CandleTracker {
    notifier: Arc<dyn Notifier>,
    nse: TradingCalendar,
    crypto: TradingCalendar,
    tracked: Vec<TrackedInstrument>,
}

impl CandleTracker {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        nse: TradingCalendar,
        crypto: TradingCalendar,
        instruments: Vec<Instrument>,
    ) -> Self {
        let mut tracked: Vec<TrackedInstrument> = Vec::new();
        for instrument in instruments {
            if tracked.iter().any(|t| t.instrument == instrument) {
                continue;
            }
            tracked.push(TrackedInstrument {
                instrument,
                state: Mutex::new(TrackingState::default()),
                committed: watch::Sender::new(None),
            });
        }
        Self {
            notifier,
            nse,
            crypto,
            tracked,
        }
    }

    pub fn calendar(&self, market: MarketKind) -> &TradingCalendar {
        match market {
            MarketKind::Nse => &self.nse,
            MarketKind::Crypto => &self.crypto,
        }
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    pub fn instruments(&self, market: MarketKind) -> Vec<Instrument> {
        self.tracked
            .iter()
            .filter(|t| t.instrument.market == market)
            .map(|t| t.instrument.clone())
            .collect()
    }

    pub async fn check_bounded_market(&self) {
        self.check_market(MarketKind::Nse, &now()).await;
    }

    pub async fn check_crypto_market(&self) {
        self.check_market(MarketKind::Crypto, &now()).await;
    }

    /// Poll every instrument of `market` at `now`. Failures are logged and
    /// reported in the outcome, never returned as errors.
    pub async fn check_market(
        &self,
        market: MarketKind,
        now: &Timestamp,
    ) -> Vec<(Instrument, CheckOutcome)> {
        let mut outcomes = Vec::new();
        for tracked in self.tracked.iter().filter(|t| t.instrument.market == market) {
            let outcome = self.check_instrument(tracked, now).await;
            outcomes.push((tracked.instrument.clone(), outcome));
        }
        outcomes
    }

    async fn check_instrument(
        &self,
        tracked: &TrackedInstrument,
        now: &Timestamp,
    ) -> CheckOutcome {
        let instrument = &tracked.instrument;
        let calendar = self.calendar(instrument.market);
        let mut state = tracked.state.lock().await;

        let boundary = match poll_for_close(state.last_acted(), now, calendar) {
            CloseCheck::Closed(boundary) => boundary,
            CloseCheck::Pending => return CheckOutcome::Pending,
        };

        tracing::info!(
            instrument = %instrument,
            boundary = %boundary.to_rfc3339(),
            "{} candle closed",
            instrument.market.candle_label()
        );

        let message = format_candle_message(instrument.market, &instrument.symbol);
        match self.notifier.send_notification(&message).await {
            Ok(receipt) => {
                if state.advance(boundary) {
                    tracked.committed.send_replace(state.last_acted());
                } else {
                    tracing::warn!(
                        instrument = %instrument,
                        boundary = %boundary.to_rfc3339(),
                        "boundary not after last acted boundary; state unchanged"
                    );
                }
                tracing::info!(
                    instrument = %instrument,
                    identifier = %receipt.identifier,
                    status = %receipt.delivery_status,
                    "Notification dispatched"
                );
                CheckOutcome::Notified { boundary, receipt }
            }
            Err(e) => {
                tracing::error!(
                    instrument = %instrument,
                    boundary = %boundary.to_rfc3339(),
                    error = %e,
                    "Notification failed; boundary will be retried"
                );
                CheckOutcome::DispatchFailed {
                    boundary,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Last committed boundary per instrument, in registration order. Does
    /// not wait for in-flight dispatches.
    pub fn snapshot(&self) -> Vec<(Instrument, Option<Timestamp>)> {
        self.tracked
            .iter()
            .map(|t| (t.instrument.clone(), *t.committed.borrow()))
            .collect()
    }
}

fn now() -> Timestamp {
    chrono::Utc::now().with_timezone(&chrono_tz::UTC)
}
