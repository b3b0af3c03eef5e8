//! Market data payloads kept in the cache
//!
//! These are the values the fetching collaborators produce: a current quote
//! per symbol and OHLC history series. The cache itself treats them as opaque
//! JSON; this module also knows how cache keys are spelled for them.

pub mod quote;

pub use quote::{parse_quote_line, parse_quote_output, QuoteLine, QuoteParseError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fetch::normalize_symbol;

/// Cache key for a symbol's current quote
pub fn quote_key(symbol: &str) -> String {
    format!("quote:{}", normalize_symbol(symbol))
}

/// Cache key for a symbol's price history
pub fn historical_key(symbol: &str) -> String {
    format!("historical:{}", normalize_symbol(symbol))
}

/// Latest price for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol, uppercased
    pub symbol: String,
    /// Last traded (or closing) price
    pub price: f64,
    /// Previous session's close
    pub previous_close: f64,
    /// ISO currency code, when the source reports one
    pub currency: Option<String>,
    /// When this data was fetched
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    /// Absolute change since the previous close
    pub fn change(&self) -> f64 {
        self.price - self.previous_close
    }

    /// Percentage change since the previous close, or 0 without a usable close
    pub fn change_percent(&self) -> f64 {
        if self.previous_close == 0.0 {
            return 0.0;
        }
        self.change() / self.previous_close * 100.0
    }
}

/// One OHLC bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Price history for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub symbol: String,
    /// Span requested from the source, e.g. "1mo"
    pub period: String,
    /// Bar width, e.g. "1d"
    pub interval: String,
    pub bars: Vec<OhlcBar>,
}

impl HistoricalSeries {
    /// Most recent close, if any bars exist
    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|bar| bar.close)
    }
}
