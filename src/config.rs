use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::model::market::{Instrument, MarketKind};

pub const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub markets: MarketsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketsConfig {
    /// Zone of the NSE session arithmetic and of rendered timestamps. The
    /// crypto grid is always computed in UTC.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_bounded_instruments")]
    pub bounded_instruments: Vec<String>,
    #[serde(default = "default_crypto_instruments")]
    pub crypto_instruments: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierMode {
    Twilio,
    Log,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_notifier_mode")]
    pub mode: NotifierMode,
    #[serde(default = "default_twilio_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(skip)]
    pub twilio: Option<TwilioCredentials>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub to_number: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_bounded_instruments() -> Vec<String> {
    vec!["NSE".to_string()]
}

fn default_crypto_instruments() -> Vec<String> {
    vec!["BTC".to_string(), "ETH".to_string()]
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_notifier_mode() -> NotifierMode {
    NotifierMode::Twilio
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_voice() -> String {
    "alice".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            bounded_instruments: default_bounded_instruments(),
            crypto_instruments: default_crypto_instruments(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            mode: default_notifier_mode(),
            api_base_url: default_twilio_base_url(),
            voice: default_voice(),
            twilio: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Keeps the auth token out of logs.
impl std::fmt::Debug for TwilioCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioCredentials")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"***")
            .field("from_number", &self.from_number)
            .field("to_number", &self.to_number)
            .finish()
    }
}

impl TwilioCredentials {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// All four values are required; blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        match (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_PHONE_NUMBER"),
            get("YOUR_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number), Some(to_number)) => Ok(Self {
                account_sid,
                auth_token,
                from_number,
                to_number,
            }),
            _ => Err(AppError::Config(
                "missing Twilio configuration: set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN, \
                 TWILIO_PHONE_NUMBER and YOUR_PHONE_NUMBER in .env or environment"
                    .to_string(),
            )),
        }
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow!("invalid timezone '{}': {}", name, e))
}

fn normalized_symbols(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for sym in symbols {
        let s = sym.trim().to_ascii_uppercase();
        if !s.is_empty() && !out.iter().any(|v| v == &s) {
            out.push(s);
        }
    }
    out
}

impl MarketsConfig {
    pub fn tz(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }

    pub fn instruments(&self, market: MarketKind) -> Vec<Instrument> {
        let symbols = match market {
            MarketKind::Nse => &self.bounded_instruments,
            MarketKind::Crypto => &self.crypto_instruments,
        };
        normalized_symbols(symbols)
            .iter()
            .map(|s| Instrument::new(market, s))
            .collect()
    }
}

fn config_path() -> PathBuf {
    std::env::var("CANDLE_BELL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = config_path();
        let mut config = Self::load_from_path(&path)?;

        if let Ok(tz) = std::env::var("TIMEZONE") {
            if !tz.trim().is_empty() {
                config.markets.timezone = tz.trim().to_string();
            }
        }
        config.validate()?;

        if config.notifier.mode == NotifierMode::Twilio {
            config.notifier.twilio =
                Some(TwilioCredentials::from_env().context("notifier.mode is \"twilio\"")?);
        }

        Ok(config)
    }

    /// Missing file means built-in defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Self::from_toml_str("");
        }
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&config_str)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("invalid config TOML")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.markets.tz().context("markets.timezone is invalid")?;
        if self.scheduler.poll_interval_secs == 0 {
            bail!("scheduler.poll_interval_secs must be > 0");
        }
        if self.markets.instruments(MarketKind::Nse).is_empty()
            && self.markets.instruments(MarketKind::Crypto).is_empty()
        {
            bail!("no instruments configured for any market");
        }
        Ok(())
    }
}
