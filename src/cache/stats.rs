//! Hit/miss accounting for the tiered cache

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{TierKind, TierSummary};

#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
    promotions: AtomicU64,
}

impl TierCounters {
    fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.stores,
            &self.evictions,
            &self.promotions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn snapshot(&self, summary: TierSummary) -> TierStats {
        TierStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            entry_count: summary.entry_count,
            total_bytes: summary.total_bytes,
        }
    }
}

/// Live counters shared by every clone of a cache
#[derive(Debug, Default)]
pub struct StatsRecorder {
    memory: TierCounters,
    disk: TierCounters,
    archive: TierCounters,
    last_cleanup: Mutex<Option<DateTime<Utc>>>,
}

impl StatsRecorder {
    fn tier(&self, kind: TierKind) -> &TierCounters {
        match kind {
            TierKind::Memory => &self.memory,
            TierKind::Disk => &self.disk,
            TierKind::Archive => &self.archive,
        }
    }

    pub fn record_hit(&self, kind: TierKind) {
        self.tier(kind).hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self, kind: TierKind) {
        self.tier(kind).misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store(&self, kind: TierKind) {
        self.tier(kind).stores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, kind: TierKind, count: usize) {
        self.tier(kind)
            .evictions
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Counts a value promoted out of `from`
    pub fn record_promotion(&self, from: TierKind) {
        self.tier(from).promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cleanup(&self, at: DateTime<Utc>) {
        *self.last_cleanup.lock().unwrap_or_else(|e| e.into_inner()) = Some(at);
    }

    /// Zeroes every counter and forgets the last cleanup
    pub fn reset(&self) {
        self.memory.reset();
        self.disk.reset();
        self.archive.reset();
        *self.last_cleanup.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Combines the counters with per-tier occupancy
    pub fn snapshot(
        &self,
        memory: TierSummary,
        disk: TierSummary,
        archive: TierSummary,
    ) -> CacheStatistics {
        CacheStatistics {
            memory: self.memory.snapshot(memory),
            disk: self.disk.snapshot(disk),
            archive: self.archive.snapshot(archive),
            last_cleanup: *self.last_cleanup.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}

/// Counters and occupancy for one tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub promotions: u64,
    pub entry_count: usize,
    pub total_bytes: u64,
}

impl TierStats {
    /// Hits as a fraction of lookups that reached this tier
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Read-only view of the cache for display
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub memory: TierStats,
    pub disk: TierStats,
    pub archive: TierStats,
    pub last_cleanup: Option<DateTime<Utc>>,
}

impl CacheStatistics {
    pub fn tier(&self, kind: TierKind) -> &TierStats {
        match kind {
            TierKind::Memory => &self.memory,
            TierKind::Disk => &self.disk,
            TierKind::Archive => &self.archive,
        }
    }

    /// Fraction of `retrieve` calls answered by any tier
    ///
    /// Every full miss falls through to the archive, so archive misses count
    /// each lookup nobody could answer.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory.hits + self.disk.hits + self.archive.hits;
        let lookups = hits + self.archive.misses;
        if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        }
    }

    pub fn total_entries(&self) -> usize {
        self.memory.entry_count + self.disk.entry_count + self.archive.entry_count
    }

    pub fn total_bytes(&self) -> u64 {
        self.memory.total_bytes + self.disk.total_bytes + self.archive.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_land_on_their_tier() {
        let recorder = StatsRecorder::default();
        recorder.record_hit(TierKind::Memory);
        recorder.record_miss(TierKind::Memory);
        recorder.record_hit(TierKind::Disk);
        recorder.record_store(TierKind::Archive);
        recorder.record_evictions(TierKind::Memory, 3);

        let stats = recorder.snapshot(TierSummary::default(), TierSummary::default(), TierSummary::default());

        assert_eq!(stats.memory.hits, 1);
        assert_eq!(stats.memory.misses, 1);
        assert_eq!(stats.memory.evictions, 3);
        assert_eq!(stats.disk.hits, 1);
        assert_eq!(stats.archive.stores, 1);
        assert_eq!(stats.tier(TierKind::Disk).misses, 0);
    }

    #[test]
    fn test_hit_rates() {
        let recorder = StatsRecorder::default();
        // One memory hit, one disk hit after a memory miss, one full miss
        recorder.record_hit(TierKind::Memory);
        recorder.record_miss(TierKind::Memory);
        recorder.record_hit(TierKind::Disk);
        recorder.record_miss(TierKind::Memory);
        recorder.record_miss(TierKind::Disk);
        recorder.record_miss(TierKind::Archive);

        let stats = recorder.snapshot(TierSummary::default(), TierSummary::default(), TierSummary::default());

        assert!((stats.memory.hit_rate() - 1.0 / 3.0).abs() < 1e-9);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(TierStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let recorder = StatsRecorder::default();
        recorder.record_hit(TierKind::Archive);
        recorder.record_cleanup(Utc::now());

        recorder.reset();
        let stats = recorder.snapshot(TierSummary::default(), TierSummary::default(), TierSummary::default());

        assert_eq!(stats, CacheStatistics::default());
    }

    #[test]
    fn test_totals_include_occupancy() {
        let recorder = StatsRecorder::default();
        let stats = recorder.snapshot(
            TierSummary { entry_count: 2, total_bytes: 100 },
            TierSummary { entry_count: 3, total_bytes: 50 },
            TierSummary { entry_count: 1, total_bytes: 10 },
        );

        assert_eq!(stats.total_entries(), 6);
        assert_eq!(stats.total_bytes(), 160);
    }
}
