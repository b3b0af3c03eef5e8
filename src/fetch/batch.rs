//! Quote source backed by one run of the batch quote script

use async_trait::async_trait;
use std::collections::HashMap;

use super::{normalize_symbol, QuoteSource, SourceError};
use crate::data::{Quote, QuoteLine};

/// Answers fetches from lines already produced by the quote script
///
/// Symbols the script reported as failed, and symbols it never mentioned,
/// fail to fetch.
#[derive(Debug, Clone, Default)]
pub struct BatchSource {
    results: HashMap<String, Option<Quote>>,
    order: Vec<String>,
}

impl BatchSource {
    pub fn from_lines(lines: impl IntoIterator<Item = QuoteLine>) -> Self {
        let mut source = Self::default();
        for line in lines {
            let (symbol, quote) = match line {
                QuoteLine::Quote(quote) => (normalize_symbol(&quote.symbol), Some(quote)),
                QuoteLine::Failed(symbol) => (normalize_symbol(&symbol), None),
            };
            if !source.results.contains_key(&symbol) {
                source.order.push(symbol.clone());
            }
            // Later lines win
            source.results.insert(symbol, quote);
        }
        source
    }

    /// Symbols in the order the script first reported them
    pub fn symbols(&self) -> &[String] {
        &self.order
    }
}

#[async_trait]
impl QuoteSource for BatchSource {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, SourceError> {
        match self.results.get(&normalize_symbol(symbol)) {
            Some(Some(quote)) => Ok(quote.clone()),
            Some(None) => Err(SourceError::Failed(format!("{} reported FETCH_FAILED", symbol))),
            None => Err(SourceError::NoData(symbol.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn quote(symbol: &str, price: f64) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            price,
            previous_close: price,
            currency: None,
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_batch_source_answers_from_lines() {
        let source = BatchSource::from_lines(vec![
            QuoteLine::Quote(quote("AAPL", 190.0)),
            QuoteLine::Failed("msft".to_string()),
        ]);

        assert_eq!(source.symbols(), ["AAPL".to_string(), "MSFT".to_string()]);
        assert_eq!(source.fetch_quote("aapl").await.unwrap().price, 190.0);
        assert!(matches!(
            source.fetch_quote("MSFT").await,
            Err(SourceError::Failed(_))
        ));
        assert!(matches!(
            source.fetch_quote("TSLA").await,
            Err(SourceError::NoData(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_source_later_line_wins() {
        let source = BatchSource::from_lines(vec![
            QuoteLine::Failed("AAPL".to_string()),
            QuoteLine::Quote(quote("AAPL", 191.5)),
        ]);

        assert_eq!(source.symbols().len(), 1);
        assert_eq!(source.fetch_quote("AAPL").await.unwrap().price, 191.5);
    }
}
