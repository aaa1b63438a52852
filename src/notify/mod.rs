pub mod dry_run;
pub mod twilio;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AppError;
use crate::model::market::MarketKind;

pub use dry_run::LogNotifier;
pub use twilio::TwilioNotifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationReceipt {
    pub identifier: String,
    pub delivery_status: String,
}

/// Outbound channel used by the tracker and `/test-call`. The concrete
/// implementation is picked from configuration at startup.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification(&self, message: &str) -> Result<NotificationReceipt, AppError>;
}

pub fn format_candle_message(market: MarketKind, symbol: &str) -> String {
    format!(
        "{} {} candle closed. Check your trading platform for details.",
        market.as_message_str(),
        symbol
    )
}

/// Escape text for use inside an XML element or attribute value.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}
