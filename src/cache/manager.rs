//! Tiered cache coordinator
//!
//! Routes stores to a tier, answers reads from the fastest tier holding the
//! key, promotes hot values upward and ages cold ones into the archive.
//! Storage trouble never reaches the caller: a failing tier just looks empty.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    CacheEntry, CacheError, CacheStatistics, FileTier, MemoryTier, StatsRecorder, SweepOutcome,
    TierHandle, TierKind, TierPolicy, TierSummary, VersionGate,
};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;

/// Picks a tier from the wording of a key
///
/// `recent`/`current` keys are hot, `historical`/`archive` keys are cold,
/// everything else lands on disk.
pub fn route_key(key: &str) -> TierKind {
    let key = key.to_lowercase();
    if key.contains("recent") || key.contains("current") {
        TierKind::Memory
    } else if key.contains("historical") || key.contains("archive") {
        TierKind::Archive
    } else {
        TierKind::Disk
    }
}

/// What one cleanup pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub memory: SweepOutcome,
    pub disk: SweepOutcome,
    pub archive: SweepOutcome,
    /// Disk entries moved into the archive
    pub compacted: usize,
}

/// Three-tier cache shared by fetchers, the UI and analytics readers
///
/// Cheap to clone; clones share the same tiers and statistics.
#[derive(Debug, Clone)]
pub struct TieredCache {
    memory: TierHandle,
    disk: TierHandle,
    archive: TierHandle,
    memory_policy: TierPolicy,
    disk_policy: TierPolicy,
    archive_policy: TierPolicy,
    max_memory_entry_bytes: u64,
    compaction_age: Duration,
    clock: Arc<dyn Clock>,
    stats: Arc<StatsRecorder>,
    versions: Arc<VersionGate>,
}

impl TieredCache {
    /// Starts the tier workers with the given configuration
    ///
    /// Disk files go under `root/disk`, archive files under `root/archive`.
    pub fn open(config: &CacheConfig, root: PathBuf, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        let memory_policy = config.tier_policy(TierKind::Memory);
        let disk_policy = config.tier_policy(TierKind::Disk);
        let archive_policy = config.tier_policy(TierKind::Archive);

        let versions = Arc::new(VersionGate::new());
        let memory = TierHandle::spawn(MemoryTier::new(memory_policy.clone()), versions.clone())?;
        let disk = TierHandle::spawn(
            FileTier::new(TierKind::Disk, disk_policy.clone(), root.join("disk")),
            versions.clone(),
        )?;
        let archive = TierHandle::spawn(
            FileTier::new(TierKind::Archive, archive_policy.clone(), root.join("archive")),
            versions.clone(),
        )?;

        debug!(root = %root.display(), "Opened tiered cache");

        Ok(Self {
            memory,
            disk,
            archive,
            memory_policy,
            disk_policy,
            archive_policy,
            max_memory_entry_bytes: config.max_memory_entry_bytes,
            compaction_age: config.compaction_age(),
            clock,
            stats: Arc::new(StatsRecorder::default()),
            versions,
        })
    }

    /// Opens a cache with default settings rooted at `root`
    pub fn with_dir(root: PathBuf) -> Result<Self, CacheError> {
        Self::open(&CacheConfig::default(), root, Arc::new(SystemClock))
    }

    fn handle(&self, kind: TierKind) -> &TierHandle {
        match kind {
            TierKind::Memory => &self.memory,
            TierKind::Disk => &self.disk,
            TierKind::Archive => &self.archive,
        }
    }

    fn policy(&self, kind: TierKind) -> &TierPolicy {
        match kind {
            TierKind::Memory => &self.memory_policy,
            TierKind::Disk => &self.disk_policy,
            TierKind::Archive => &self.archive_policy,
        }
    }

    fn validate_key(key: &str) -> Result<(), CacheError> {
        if key.trim().is_empty() {
            return Err(CacheError::EmptyKey);
        }
        Ok(())
    }

    /// Stores `value` under `key`, returning the tier it was written to
    ///
    /// Without a hint the tier comes from [`route_key`]. Values too large for
    /// the memory tier go to disk. Any older copy of the key in another tier
    /// is dropped so reads never see an older value, and copies of the old
    /// value still in flight between tiers are refused.
    pub async fn store<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        tier_hint: Option<TierKind>,
    ) -> Result<TierKind, CacheError> {
        Self::validate_key(key)?;
        let raw = serde_json::to_vec(value)?;

        let mut tier = tier_hint.unwrap_or_else(|| route_key(key));
        if tier == TierKind::Memory && raw.len() as u64 > self.max_memory_entry_bytes {
            debug!(key, size = raw.len(), "Value too large for memory tier, storing on disk");
            tier = TierKind::Disk;
        }

        let now = self.clock.now();
        let mut entry = match CacheEntry::from_bytes(key, &raw, self.policy(tier).compression, now) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, tier = %tier, error = %e, "Failed to encode cache entry");
                return Ok(tier);
            }
        };
        let version = self.versions.issue(key);
        entry.version = version;

        if self.put(tier, entry).await {
            self.stats.record_store(tier);
        }

        for other in TierKind::ALL.into_iter().filter(|t| *t != tier) {
            if let Err(e) = self.handle(other).delete_older_than(key, version).await {
                warn!(key, tier = %other, error = %e, "Failed to drop superseded entry");
            }
        }

        Ok(tier)
    }

    /// Writes an entry to a tier, demoting anything the memory tier evicts
    ///
    /// Returns false if the write failed or a newer write of the key won.
    async fn put(&self, tier: TierKind, entry: CacheEntry) -> bool {
        let key = entry.key.clone();
        let evicted = match self.handle(tier).put(entry).await {
            Ok(Some(evicted)) => evicted,
            Ok(None) => {
                debug!(key = %key, tier = %tier, "Skipped write superseded by a newer one");
                return false;
            }
            Err(e) => {
                warn!(key = %key, tier = %tier, error = %e, "Cache write failed");
                return false;
            }
        };

        if !evicted.is_empty() {
            self.stats.record_evictions(tier, evicted.len());
        }
        if tier == TierKind::Memory {
            for entry in evicted {
                let key = entry.key.clone();
                match self.disk.put(entry).await {
                    Ok(Some(_)) => debug!(key = %key, "Demoted evicted entry to disk"),
                    Ok(None) => debug!(key = %key, "Dropped evicted entry superseded by a newer one"),
                    Err(e) => warn!(key = %key, tier = %TierKind::Disk, error = %e, "Failed to demote entry"),
                }
            }
        }
        true
    }

    /// Reads the value for `key` from the fastest tier that has it
    ///
    /// Disk hits are copied into memory and archive hits onto disk. Entries
    /// that no longer decode as `T` are dropped and treated as misses.
    pub async fn retrieve<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        Self::validate_key(key)?;
        let now = self.clock.now();

        for tier in TierKind::ALL {
            let entry = match self.handle(tier).get(key, now).await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    self.stats.record_miss(tier);
                    continue;
                }
                Err(e) => {
                    warn!(key, tier = %tier, error = %e, "Cache read failed");
                    self.stats.record_miss(tier);
                    continue;
                }
            };

            let value = match entry.decode::<T>() {
                Ok(value) => value,
                Err(e) => {
                    warn!(key, tier = %tier, error = %e, "Dropping undecodable cache entry");
                    let _ = self
                        .handle(tier)
                        .delete_older_than(key, entry.version.saturating_add(1))
                        .await;
                    self.stats.record_miss(tier);
                    continue;
                }
            };

            self.stats.record_hit(tier);
            self.promote(tier, entry).await;
            return Ok(Some(value));
        }

        Ok(None)
    }

    /// Copies a hit one step toward memory
    async fn promote(&self, from: TierKind, entry: CacheEntry) {
        let target = match from {
            TierKind::Memory => return,
            TierKind::Disk => TierKind::Memory,
            TierKind::Archive => TierKind::Disk,
        };

        let raw = match entry.logical_bytes() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %entry.key, error = %e, "Skipping promotion of unreadable entry");
                return;
            }
        };
        if target == TierKind::Memory && raw.len() as u64 > self.max_memory_entry_bytes {
            return;
        }

        let key = entry.key.clone();
        let mut promoted = match CacheEntry::from_bytes(
            key.clone(),
            &raw,
            self.policy(target).compression,
            entry.created_at,
        ) {
            Ok(promoted) => promoted,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to re-encode entry for promotion");
                return;
            }
        };
        promoted.access_count = entry.access_count;
        promoted.last_accessed_at = entry.last_accessed_at;
        promoted.version = entry.version;

        if self.put(target, promoted).await {
            debug!(key = %key, from = %from, to = %target, "Promoted cache entry");
            self.stats.record_promotion(from);
        }
    }

    /// Deletes `key` from every tier; removing an absent key is not an error
    ///
    /// Copies of the removed value still moving between tiers are refused.
    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        Self::validate_key(key)?;
        let version = self.versions.issue(key);
        let (memory, disk, archive) = futures::join!(
            self.memory.delete_older_than(key, version),
            self.disk.delete_older_than(key, version),
            self.archive.delete_older_than(key, version)
        );
        for (tier, result) in [
            (TierKind::Memory, memory),
            (TierKind::Disk, disk),
            (TierKind::Archive, archive),
        ] {
            if let Err(e) = result {
                warn!(key, tier = %tier, error = %e, "Cache delete failed");
            }
        }
        Ok(())
    }

    /// Empties every tier and resets the statistics
    pub async fn clear_all(&self) {
        self.versions.reset();
        let (memory, disk, archive) =
            futures::join!(self.memory.clear(), self.disk.clear(), self.archive.clear());
        for (tier, result) in [
            (TierKind::Memory, memory),
            (TierKind::Disk, disk),
            (TierKind::Archive, archive),
        ] {
            if let Err(e) = result {
                warn!(tier = %tier, error = %e, "Failed to clear cache tier");
            }
        }
        self.stats.reset();
        info!("Cleared all cache tiers");
    }

    /// Runs one maintenance pass at the clock's current time
    pub async fn run_cleanup(&self) -> CleanupReport {
        self.run_cleanup_at(self.clock.now()).await
    }

    /// Expiry sweeps for memory, disk and archive, then disk-to-archive compaction
    pub async fn run_cleanup_at(&self, now: DateTime<Utc>) -> CleanupReport {
        let mut report = CleanupReport {
            memory: self.sweep(TierKind::Memory, now).await,
            disk: self.sweep(TierKind::Disk, now).await,
            archive: self.sweep(TierKind::Archive, now).await,
            compacted: 0,
        };
        let cutoff = now
            .checked_sub_signed(self.compaction_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        report.compacted = self.compact(cutoff).await;

        let forgotten = self.versions.prune();
        debug!(forgotten, "Pruned write versions");
        self.stats.record_cleanup(now);
        info!(
            memory_expired = report.memory.expired,
            disk_expired = report.disk.expired,
            disk_evicted = report.disk.evicted,
            archive_evicted = report.archive.evicted,
            compacted = report.compacted,
            "Cache cleanup finished"
        );
        report
    }

    async fn sweep(&self, tier: TierKind, now: DateTime<Utc>) -> SweepOutcome {
        match self.handle(tier).sweep_expired(now).await {
            Ok(outcome) => {
                if outcome.evicted > 0 {
                    self.stats.record_evictions(tier, outcome.evicted);
                }
                outcome
            }
            Err(e) => {
                warn!(tier = %tier, error = %e, "Cache sweep failed");
                SweepOutcome::default()
            }
        }
    }

    /// Moves disk entries created before `cutoff` into the archive
    ///
    /// Each entry is written to the archive before it is deleted from disk. A
    /// disk entry rewritten meanwhile stays where it is.
    async fn compact(&self, cutoff: DateTime<Utc>) -> usize {
        let old = match self.disk.entries_older_than(cutoff).await {
            Ok(old) => old,
            Err(e) => {
                warn!(error = %e, "Failed to list disk entries for compaction");
                return 0;
            }
        };

        let mut moved = 0;
        for entry in old {
            let key = entry.key.clone();
            let version = entry.version;
            match self.archive.put(entry).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!(key = %key, "Skipped compaction of superseded entry");
                    continue;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to archive disk entry");
                    continue;
                }
            }
            if let Err(e) = self.disk.delete_older_than(&key, version.saturating_add(1)).await {
                warn!(key = %key, error = %e, "Archived entry could not be removed from disk");
            }
            moved += 1;
        }
        moved
    }

    /// Counters plus current occupancy of each tier
    pub async fn statistics(&self) -> CacheStatistics {
        let (memory, disk, archive) = futures::join!(
            self.memory.summary(),
            self.disk.summary(),
            self.archive.summary()
        );
        let summarize = |tier: TierKind, result: Result<TierSummary, CacheError>| {
            result.unwrap_or_else(|e| {
                warn!(tier = %tier, error = %e, "Failed to summarize cache tier");
                TierSummary::default()
            })
        };
        self.stats.snapshot(
            summarize(TierKind::Memory, memory),
            summarize(TierKind::Disk, disk),
            summarize(TierKind::Archive, archive),
        )
    }
}
