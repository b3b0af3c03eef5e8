//! Fetch coordination for quote symbols
//!
//! The tracker is a per-symbol circuit breaker; the service wires it to a
//! quote source and the tiered cache.

mod batch;
mod service;
mod tracker;

pub use batch::BatchSource;
pub use service::{QuoteService, QuoteSource, RefreshOutcome, SourceError};
pub use tracker::{normalize_symbol, FetchStateTracker, FetchStatus, SymbolFetchState, TrackerPolicy};
