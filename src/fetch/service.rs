//! Fetch coordination: ask the breaker, fetch, report, cache
//!
//! [`QuoteService`] is the control flow a refresh timer or a "Refresh Now"
//! button drives. It never fetches a symbol the tracker says to leave alone,
//! and always falls back to whatever the cache holds.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::{normalize_symbol, FetchStateTracker, FetchStatus};
use crate::cache::{CacheError, TieredCache};
use crate::clock::Clock;
use crate::data::{historical_key, quote_key, HistoricalSeries, Quote, QuoteLine};

/// Errors reported by a quote source
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source answered but had no price for the symbol
    #[error("No data returned for {0}")]
    NoData(String),

    /// The source could not be reached or crashed
    #[error("Quote source failed: {0}")]
    Failed(String),
}

/// Anything that can produce a current quote (HTTP client, helper script, ...)
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, SourceError>;
}

/// Result of one refresh attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// A new quote was fetched and cached
    Fetched(Quote),
    /// The tracker did not permit a fetch; `cached` is the best available value
    Skipped {
        status: FetchStatus,
        cached: Option<Quote>,
    },
    /// The fetch failed; `status` reflects the failure just recorded
    Failed {
        status: FetchStatus,
        error: String,
        cached: Option<Quote>,
    },
}

impl RefreshOutcome {
    /// The quote to display, fresh or cached
    pub fn quote(&self) -> Option<&Quote> {
        match self {
            RefreshOutcome::Fetched(quote) => Some(quote),
            RefreshOutcome::Skipped { cached, .. } | RefreshOutcome::Failed { cached, .. } => {
                cached.as_ref()
            }
        }
    }
}

/// Ties a quote source to the tracker and the cache
pub struct QuoteService<S> {
    source: S,
    cache: TieredCache,
    tracker: Arc<FetchStateTracker>,
    clock: Arc<dyn Clock>,
}

impl<S: QuoteSource> QuoteService<S> {
    pub fn new(
        source: S,
        cache: TieredCache,
        tracker: Arc<FetchStateTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            cache,
            tracker,
            clock,
        }
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn tracker(&self) -> &FetchStateTracker {
        &self.tracker
    }

    /// Current status of `symbol`
    pub fn status(&self, symbol: &str) -> FetchStatus {
        self.tracker.classify(symbol, self.clock.now())
    }

    /// Fetches `symbol` if the tracker allows it, otherwise serves the cache
    pub async fn refresh_quote(&self, symbol: &str) -> RefreshOutcome {
        let symbol = normalize_symbol(symbol);
        let now = self.clock.now();
        let status = self.tracker.classify(&symbol, now);

        if !status.permits_fetch() {
            debug!(symbol = %symbol, status = %status, "Skipping fetch");
            return RefreshOutcome::Skipped {
                status,
                cached: self.cached_quote(&symbol).await,
            };
        }

        match self.source.fetch_quote(&symbol).await {
            Ok(quote) => {
                self.tracker.record_success(&symbol, now);
                self.cache_quote(&quote).await;
                RefreshOutcome::Fetched(quote)
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Quote fetch failed");
                self.tracker.record_failure(&symbol, now);
                RefreshOutcome::Failed {
                    status: self.tracker.classify(&symbol, now),
                    error: e.to_string(),
                    cached: self.cached_quote(&symbol).await,
                }
            }
        }
    }

    /// Refreshes each symbol in order
    pub async fn refresh_all<I, T>(&self, symbols: I) -> Vec<(String, RefreshOutcome)>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut outcomes = Vec::new();
        for symbol in symbols {
            let symbol = normalize_symbol(symbol.as_ref());
            let outcome = self.refresh_quote(&symbol).await;
            outcomes.push((symbol, outcome));
        }
        outcomes
    }

    /// Records a result produced outside the service, e.g. a batch script run
    pub async fn ingest(&self, line: QuoteLine) -> FetchStatus {
        let now = self.clock.now();
        match line {
            QuoteLine::Quote(quote) => {
                self.tracker.record_success(&quote.symbol, now);
                self.cache_quote(&quote).await;
                self.tracker.classify(&quote.symbol, now)
            }
            QuoteLine::Failed(symbol) => {
                self.tracker.record_failure(&symbol, now);
                self.tracker.classify(&symbol, now)
            }
        }
    }

    async fn cache_quote(&self, quote: &Quote) {
        if let Err(e) = self.cache.store(&quote_key(&quote.symbol), quote, None).await {
            warn!(symbol = %quote.symbol, error = %e, "Failed to cache quote");
        }
    }

    /// Cached quote for `symbol`, without fetching
    pub async fn cached_quote(&self, symbol: &str) -> Option<Quote> {
        self.read(&quote_key(symbol)).await
    }

    /// Stores a price history (routed to the archive tier)
    pub async fn store_history(&self, series: &HistoricalSeries) -> Result<(), CacheError> {
        self.cache
            .store(&historical_key(&series.symbol), series, None)
            .await
            .map(|_| ())
    }

    /// Cached price history for `symbol`
    pub async fn cached_history(&self, symbol: &str) -> Option<HistoricalSeries> {
        self.read(&historical_key(symbol)).await
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.retrieve(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Cache read rejected");
                None
            }
        }
    }

    /// "Retry Now": lifts a suspension so the next refresh may fetch
    pub fn retry_now(&self, symbol: &str) {
        self.tracker.clear_suspension(symbol);
    }

    /// "Clear All Caches": drops cached data and fetch history
    pub async fn clear_all(&self) {
        self.cache.clear_all().await;
        self.tracker.clear_all();
    }
}
