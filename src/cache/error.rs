//! Error types for the tiered cache

use thiserror::Error;

use super::TierKind;

/// Errors that can occur inside the cache
///
/// Only [`CacheError::EmptyKey`] and [`CacheError::Serialization`] ever reach
/// callers of the coordinator; the rest are logged and degraded to a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Keys must contain at least one non-whitespace character
    #[error("Cache key must not be empty")]
    EmptyKey,

    /// Value could not be turned into (or back from) JSON
    #[error("Failed to serialize cache value: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Tier persistence failed
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes did not decode into an entry
    #[error("Corrupt cache entry for '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// The worker owning a tier has stopped
    #[error("Cache tier '{0}' is unavailable")]
    TierUnavailable(TierKind),
}
