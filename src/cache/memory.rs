//! Fast in-process tier with frequency-biased LRU eviction

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use super::{Capacity, CacheEntry, CacheError, SweepOutcome, TierKind, TierPolicy, TierStore, TierSummary};

/// In-memory tier
///
/// When over `MaxItems`, evicts the entry with the lowest
/// `(access_count, last_accessed_at)`; the entry just written is never the victim.
#[derive(Debug)]
pub struct MemoryTier {
    policy: TierPolicy,
    entries: HashMap<String, CacheEntry>,
}

impl MemoryTier {
    pub fn new(policy: TierPolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    fn max_items(&self) -> Option<usize> {
        match self.policy.capacity {
            Capacity::MaxItems(n) => Some(n),
            Capacity::MaxTotalBytes(_) => None,
        }
    }

    fn over_capacity(&self) -> bool {
        match self.policy.capacity {
            Capacity::MaxItems(n) => self.entries.len() > n,
            Capacity::MaxTotalBytes(max) => self.total_bytes() > max,
        }
    }

    fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }

    /// Picks the least valuable entry other than `keep`
    fn victim(&self, keep: &str) -> Option<String> {
        self.entries
            .values()
            .filter(|e| e.key != keep)
            .min_by(|a, b| {
                a.access_count
                    .cmp(&b.access_count)
                    .then(a.last_accessed_at.cmp(&b.last_accessed_at))
            })
            .map(|e| e.key.clone())
    }

    fn evict_for(&mut self, keep: &str) -> Vec<CacheEntry> {
        let mut evicted = Vec::new();
        while self.over_capacity() {
            let Some(key) = self.victim(keep) else { break };
            if let Some(entry) = self.entries.remove(&key) {
                debug!(key = %entry.key, access_count = entry.access_count, "Evicted from memory tier");
                evicted.push(entry);
            }
        }
        evicted
    }
}

impl TierStore for MemoryTier {
    fn kind(&self) -> TierKind {
        TierKind::Memory
    }

    fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    fn put(&mut self, entry: CacheEntry) -> Result<Vec<CacheEntry>, CacheError> {
        let key = entry.key.clone();
        self.entries.insert(key.clone(), entry);
        Ok(self.evict_for(&key))
    }

    fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entry = self.entries.get_mut(key)?;
        entry.touch(now);
        Some(entry.clone())
    }

    fn version(&mut self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|e| e.version)
    }

    fn delete(&mut self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }

    fn sweep_expired(&mut self, now: DateTime<Utc>) -> Result<SweepOutcome, CacheError> {
        let before = self.entries.len();
        let policy = &self.policy;
        self.entries.retain(|_, e| !policy.is_expired(e.created_at, now));
        let expired = before - self.entries.len();

        let mut evicted = 0;
        if let Some(max) = self.max_items() {
            while self.entries.len() > max {
                let Some(key) = self.victim("") else { break };
                self.entries.remove(&key);
                evicted += 1;
            }
        }

        Ok(SweepOutcome { expired, evicted })
    }

    fn entries_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<CacheEntry>, CacheError> {
        let mut old: Vec<CacheEntry> = self
            .entries
            .values()
            .filter(|e| e.created_at < cutoff)
            .cloned()
            .collect();
        old.sort_by_key(|e| e.created_at);
        Ok(old)
    }

    fn summary(&mut self) -> TierSummary {
        TierSummary {
            entry_count: self.entries.len(),
            total_bytes: self.total_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CompressionLevel;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, 9, 30, 0).unwrap()
    }

    fn tier(max_items: usize) -> MemoryTier {
        MemoryTier::new(TierPolicy {
            max_age: Some(Duration::hours(1)),
            capacity: Capacity::MaxItems(max_items),
            compression: CompressionLevel::None,
        })
    }

    fn entry(key: &str, at: DateTime<Utc>) -> CacheEntry {
        CacheEntry::encode(key, &key.len(), CompressionLevel::None, at).unwrap()
    }

    #[test]
    fn test_put_overwrites_same_key() {
        let mut tier = tier(4);
        tier.put(entry("quote:AAPL", t0())).unwrap();
        let replacement = CacheEntry::encode("quote:AAPL", &"new", CompressionLevel::None, t0()).unwrap();

        tier.put(replacement).unwrap();

        assert_eq!(tier.summary().entry_count, 1);
        let got = tier.get("quote:AAPL", t0()).unwrap();
        assert_eq!(got.decode::<String>().unwrap(), "new");
    }

    #[test]
    fn test_get_records_access() {
        let mut tier = tier(4);
        tier.put(entry("k", t0())).unwrap();

        tier.get("k", t0() + Duration::minutes(1));
        let got = tier.get("k", t0() + Duration::minutes(2)).unwrap();

        assert_eq!(got.access_count, 2);
        assert_eq!(got.last_accessed_at, t0() + Duration::minutes(2));
    }

    #[test]
    fn test_get_missing_is_none() {
        let mut tier = tier(4);
        assert!(tier.get("nope", t0()).is_none());
    }

    #[test]
    fn test_eviction_prefers_least_accessed() {
        let mut tier = tier(2);
        tier.put(entry("a", t0())).unwrap();
        tier.put(entry("b", t0() + Duration::seconds(1))).unwrap();
        // "a" is older but more popular
        tier.get("a", t0() + Duration::seconds(2));

        let evicted = tier.put(entry("c", t0() + Duration::seconds(3))).unwrap();

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, "b");
        assert!(tier.get("a", t0()).is_some());
        assert!(tier.get("c", t0()).is_some());
    }

    #[test]
    fn test_eviction_ties_broken_by_recency() {
        let mut tier = tier(2);
        tier.put(entry("old", t0())).unwrap();
        tier.put(entry("newer", t0() + Duration::seconds(10))).unwrap();

        let evicted = tier.put(entry("newest", t0() + Duration::seconds(20))).unwrap();

        assert_eq!(evicted[0].key, "old");
    }

    #[test]
    fn test_new_entry_is_never_its_own_victim() {
        let mut tier = tier(1);
        tier.put(entry("popular", t0())).unwrap();
        for _ in 0..5 {
            tier.get("popular", t0());
        }

        let evicted = tier.put(entry("fresh", t0() + Duration::seconds(1))).unwrap();

        assert_eq!(evicted[0].key, "popular");
        assert!(tier.get("fresh", t0()).is_some());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let mut tier = tier(10);
        tier.put(entry("stale", t0())).unwrap();
        tier.put(entry("recent", t0() + Duration::minutes(50))).unwrap();

        let outcome = tier.sweep_expired(t0() + Duration::minutes(90)).unwrap();

        assert_eq!(outcome.expired, 1);
        assert!(tier.get("stale", t0()).is_none());
        assert!(tier.get("recent", t0()).is_some());
    }

    #[test]
    fn test_entries_older_than_sorted_oldest_first() {
        let mut tier = tier(10);
        tier.put(entry("b", t0() + Duration::minutes(2))).unwrap();
        tier.put(entry("a", t0())).unwrap();
        tier.put(entry("c", t0() + Duration::minutes(30))).unwrap();

        let old = tier.entries_older_than(t0() + Duration::minutes(10)).unwrap();

        let keys: Vec<_> = old.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_delete_and_clear() {
        let mut tier = tier(10);
        tier.put(entry("a", t0())).unwrap();
        tier.put(entry("b", t0())).unwrap();

        assert!(tier.delete("a").unwrap());
        assert!(!tier.delete("a").unwrap());
        tier.clear().unwrap();

        assert_eq!(tier.summary(), TierSummary::default());
    }
}
