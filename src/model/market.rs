use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    Nse,
    Crypto,
}

impl MarketKind {
    /// Market name as spoken in the call message.
    pub fn as_message_str(&self) -> &'static str {
        match self {
            MarketKind::Nse => "NSE",
            MarketKind::Crypto => "Crypto",
        }
    }

    pub fn candle_label(&self) -> &'static str {
        match self {
            MarketKind::Nse => "15-minute",
            MarketKind::Crypto => "4-hour",
        }
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketKind::Nse => write!(f, "nse"),
            MarketKind::Crypto => write!(f, "crypto"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instrument {
    pub market: MarketKind,
    pub symbol: String,
}

impl Instrument {
    pub fn new(market: MarketKind, symbol: &str) -> Self {
        Self {
            market,
            symbol: symbol.trim().to_ascii_uppercase(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.market, self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_normalizes_symbol() {
        let inst = Instrument::new(MarketKind::Crypto, " btc ");
        assert_eq!(inst.symbol, "BTC");
        assert_eq!(inst.to_string(), "crypto:BTC");
    }
}
