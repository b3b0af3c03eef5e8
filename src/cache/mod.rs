//! Three-tier cache for quote and historical payloads
//!
//! Values are serialized to JSON, optionally compressed, and kept in one of
//! three tiers: memory (small, short-lived), disk (one file per entry) and
//! archive (heavily compressed, bounded by total size). Each tier is owned by
//! its own worker thread; [`TieredCache`] coordinates them. Losing cached data
//! is always tolerable, so storage failures surface as misses.

mod disk;
mod entry;
mod error;
mod manager;
mod memory;
mod stats;
mod tier;
mod version;
mod worker;

pub use disk::{entry_file_name, FileTier};
pub use entry::{CacheEntry, CompressionLevel};
pub use error::CacheError;
pub use manager::{route_key, CleanupReport, TieredCache};
pub use memory::MemoryTier;
pub use stats::{CacheStatistics, StatsRecorder, TierStats};
pub use tier::{Capacity, SweepOutcome, TierKind, TierPolicy, TierStore, TierSummary};
pub use version::VersionGate;
pub use worker::TierHandle;
