use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::tracker::CandleTracker;

/// Time until the next multiple of `period` since the Unix epoch, so a
/// 60-second period fires at second 0 of each minute.
pub fn delay_until_aligned(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_ms = period.as_millis() as i64;
    if period_ms <= 0 {
        return Duration::ZERO;
    }
    let into_period = now.timestamp_millis().rem_euclid(period_ms);
    if into_period == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((period_ms - into_period) as u64)
    }
}

/// Resolves once `true` is published. A dropped sender never requests
/// shutdown.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Run `job` every `period` until `shutdown` flips to `true`.
///
/// The check is awaited before the next tick, so a job never overlaps
/// itself. A panicking check is logged and does not stop later runs. Missed
/// ticks are skipped.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    job: F,
) where
    F: Fn() -> Fut + Send,
    Fut: Future<Output = ()> + Send + 'static,
{
    let start = tokio::time::Instant::now() + delay_until_aligned(Utc::now(), period);
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(job = name, period_secs = period.as_secs_f64(), "Job scheduled");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = tokio::spawn(job()).await {
                    tracing::error!(job = name, error = %e, "Scheduled check aborted");
                }
            }
            _ = shutdown_requested(&mut shutdown) => break,
        }
    }
    tracing::info!(job = name, "Job stopped");
}

pub fn spawn_market_jobs(
    tracker: Arc<CandleTracker>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let nse_tracker = tracker.clone();
    let nse_job = tokio::spawn(run_periodic(
        "nse_15min_check",
        period,
        shutdown.clone(),
        move || {
            let tracker = nse_tracker.clone();
            async move { tracker.check_bounded_market().await }
        },
    ));

    let crypto_job = tokio::spawn(run_periodic(
        "crypto_4h_check",
        period,
        shutdown,
        move || {
            let tracker = tracker.clone();
            async move { tracker.check_crypto_market().await }
        },
    ));

    vec![nse_job, crypto_job]
}
