//! Parser for the quote script's line protocol
//!
//! The external fetch script prints one line per requested symbol:
//! `SYMBOL,PRICE,PREV_CLOSE` on success or `SYMBOL,FETCH_FAILED` when no
//! usable price could be obtained.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::Quote;
use crate::fetch::normalize_symbol;

/// Marker the script prints in place of prices
const FETCH_FAILED: &str = "FETCH_FAILED";

/// Errors that can occur when parsing script output
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuoteParseError {
    /// Line does not have the expected number of fields
    #[error("Malformed quote line: '{0}'")]
    Malformed(String),

    /// Symbol field is empty
    #[error("Quote line has no symbol: '{0}'")]
    MissingSymbol(String),

    /// A price field is not a finite number
    #[error("Invalid price '{value}' for {symbol}")]
    InvalidPrice { symbol: String, value: String },
}

/// One parsed line of script output
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteLine {
    /// Prices were returned
    Quote(Quote),
    /// The script gave up on this symbol
    Failed(String),
}

impl QuoteLine {
    pub fn symbol(&self) -> &str {
        match self {
            QuoteLine::Quote(quote) => &quote.symbol,
            QuoteLine::Failed(symbol) => symbol,
        }
    }
}

fn parse_price(symbol: &str, value: &str) -> Result<f64, QuoteParseError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| QuoteParseError::InvalidPrice {
            symbol: symbol.to_string(),
            value: value.trim().to_string(),
        })
}

/// Parses a single output line, stamping quotes with `fetched_at`
pub fn parse_quote_line(line: &str, fetched_at: DateTime<Utc>) -> Result<QuoteLine, QuoteParseError> {
    let line = line.trim();
    let fields: Vec<&str> = line.split(',').collect();

    let symbol = normalize_symbol(fields[0]);
    if symbol.is_empty() {
        return Err(QuoteParseError::MissingSymbol(line.to_string()));
    }

    match fields.as_slice() {
        [_, marker] if marker.trim() == FETCH_FAILED => Ok(QuoteLine::Failed(symbol)),
        [_, price, previous_close] => {
            let price = parse_price(&symbol, price)?;
            let previous_close = parse_price(&symbol, previous_close)?;
            Ok(QuoteLine::Quote(Quote {
                symbol,
                price,
                previous_close,
                currency: None,
                fetched_at,
            }))
        }
        _ => Err(QuoteParseError::Malformed(line.to_string())),
    }
}

/// Parses a whole batch of output, skipping blank lines
///
/// Malformed lines are returned as errors alongside the good ones so one bad
/// symbol never hides the rest of the batch.
pub fn parse_quote_output(
    output: &str,
    fetched_at: DateTime<Utc>,
) -> Vec<Result<QuoteLine, QuoteParseError>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_quote_line(line, fetched_at))
        .collect()
}
