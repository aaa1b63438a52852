use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;

use candle_bell::calendar::TradingCalendar;
use candle_bell::config::{Config, NotifierMode};
use candle_bell::error::AppError;
use candle_bell::http::{self, HttpState};
use candle_bell::model::market::MarketKind;
use candle_bell::notify::{LogNotifier, Notifier, TwilioNotifier};
use candle_bell::scheduler;
use candle_bell::tracker::CandleTracker;

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    match config.notifier.mode {
        NotifierMode::Log => Ok(Arc::new(LogNotifier)),
        NotifierMode::Twilio => {
            let credentials = config.notifier.twilio.clone().ok_or_else(|| {
                AppError::Config("Twilio credentials were not loaded".to_string())
            })?;
            let notifier = TwilioNotifier::new(
                &config.notifier.api_base_url,
                &config.notifier.voice,
                credentials,
            )
            .context("failed to build Twilio client")?;
            Ok(Arc::new(notifier))
        }
    }
}

async fn wait_for_ctrl_c(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        // Holding the sender keeps the service running without a signal handler.
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!(
                "Make sure .env sets TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN, \
                 TWILIO_PHONE_NUMBER and YOUR_PHONE_NUMBER"
            );
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::try_new(&config.logging.level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    });
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let tz = config.markets.tz()?;
    tracing::info!(
        timezone = %tz,
        bind_addr = %config.server.bind_addr,
        notifier = ?config.notifier.mode,
        "Starting candle-bell"
    );

    let notifier = build_notifier(&config)?;
    let mut instruments = config.markets.instruments(MarketKind::Nse);
    instruments.extend(config.markets.instruments(MarketKind::Crypto));
    let tracker = Arc::new(CandleTracker::new(
        notifier,
        TradingCalendar::nse(tz),
        TradingCalendar::crypto_4h(),
        instruments,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let jobs = scheduler::spawn_market_jobs(
        tracker.clone(),
        Duration::from_secs(config.scheduler.poll_interval_secs),
        shutdown_rx.clone(),
    );
    tracing::info!("Monitoring NSE 15-minute candles");
    tracing::info!("Monitoring crypto 4-hour candles");

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    tokio::spawn(wait_for_ctrl_c(shutdown_tx));

    let state = HttpState {
        tracker,
        display_tz: tz,
    };
    http::serve(listener, state, shutdown_rx).await?;

    for job in jobs {
        let _ = job.await;
    }
    tracing::info!("Stopped");
    Ok(())
}
