use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::indicators::LevelId;

/// OHLCV candlestick, timestamped in exchange-local time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A candle at daily resolution
pub type DailyBar = Candle;

impl Candle {
    /// Exchange-local trading date of the candle
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Classic floor pivot `(high + low + close) / 3`
    pub fn pivot_point(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// True when the session closed below where it opened
    pub fn is_decline(&self) -> bool {
        self.close < self.open
    }
}

/// Candle resolution requested from a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Daily,
    Minutes(u32),
}

impl Resolution {
    pub fn is_daily(&self) -> bool {
        matches!(self, Resolution::Daily)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Daily => write!(f, "D"),
            Resolution::Minutes(m) => write!(f, "{}", m),
        }
    }
}

/// Tradable symbol with its provider-specific identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub symbol: String,
    pub provider_id: String,
    pub display_name: Option<String>,
}

/// A symbol ranked by its opening-candle change versus the prior close
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeclineCandidate {
    pub symbol: String,
    pub provider_id: String,
    pub display_name: String,
    pub opening_close: f64,
    pub prior_close: f64,
    pub change_pct: f64,
}

/// Short-trade candidate: terminal output of a scan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeCandidate {
    pub symbol: String,
    pub display_name: String,
    pub date: NaiveDate,
    pub entry_price: Decimal,
    pub stop_r1: Decimal,
    pub stop_r2: Decimal,
    pub target_s4: Decimal,
    pub target_s5: Decimal,
    pub broken_level: LevelId,
    pub change_pct: Decimal,
}
