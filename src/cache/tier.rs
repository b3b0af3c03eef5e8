//! Tier identities, policies and the store contract shared by all tiers

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{CacheEntry, CacheError, CompressionLevel};

/// One of the three cache tiers, fastest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    /// In-process map
    Memory,
    /// One file per entry, lightly compressed
    Disk,
    /// One file per entry, heavily compressed, size-bounded
    Archive,
}

impl TierKind {
    /// Lookup order used by the coordinator
    pub const ALL: [TierKind; 3] = [TierKind::Memory, TierKind::Disk, TierKind::Archive];

    /// Lowercase name, also used for worker thread names
    pub fn as_str(self) -> &'static str {
        match self {
            TierKind::Memory => "memory",
            TierKind::Disk => "disk",
            TierKind::Archive => "archive",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(TierKind::Memory),
            "disk" => Ok(TierKind::Disk),
            "archive" => Ok(TierKind::Archive),
            _ => Err(format!("Unknown tier: {}", s)),
        }
    }
}

/// Size bound of a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// At most this many entries
    MaxItems(usize),
    /// At most this many stored payload bytes
    MaxTotalBytes(u64),
}

/// Retention and compression rules for one tier
#[derive(Debug, Clone, PartialEq)]
pub struct TierPolicy {
    /// Entries older than this are swept; `None` keeps them until evicted by size
    pub max_age: Option<Duration>,
    pub capacity: Capacity,
    pub compression: CompressionLevel,
}

impl TierPolicy {
    /// Returns true if an entry created at `created_at` has outlived `max_age`
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.max_age {
            Some(max_age) => now - created_at > max_age,
            None => false,
        }
    }
}

/// What a sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOutcome {
    /// Removed for exceeding `max_age`
    pub expired: usize,
    /// Removed to get back under capacity
    pub evicted: usize,
}

/// Current occupancy of a tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSummary {
    pub entry_count: usize,
    pub total_bytes: u64,
}

/// Key/entry storage owned by a single tier worker
///
/// Implementations never see concurrent calls; the worker serializes them.
pub trait TierStore: Send {
    /// Which tier this store backs
    fn kind(&self) -> TierKind;

    /// Retention rules in force
    fn policy(&self) -> &TierPolicy;

    /// Stores `entry`, replacing any entry with the same key.
    ///
    /// Returns entries pushed out to make room.
    fn put(&mut self, entry: CacheEntry) -> Result<Vec<CacheEntry>, CacheError>;

    /// Returns the entry for `key` after recording the access.
    ///
    /// Missing and undecodable entries are both `None`; undecodable ones are removed.
    fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry>;

    /// Version of the entry stored under `key`, without recording an access
    fn version(&mut self, key: &str) -> Option<u64>;

    /// Removes `key`, returning whether anything was there
    fn delete(&mut self, key: &str) -> Result<bool, CacheError>;

    /// Removes every entry
    fn clear(&mut self) -> Result<(), CacheError>;

    /// Applies the age and capacity rules
    fn sweep_expired(&mut self, now: DateTime<Utc>) -> Result<SweepOutcome, CacheError>;

    /// Copies of every entry created before `cutoff`, oldest first
    fn entries_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<CacheEntry>, CacheError>;

    /// Entry count and stored bytes
    fn summary(&mut self) -> TierSummary;
}
