//! Write ordering across tiers
//!
//! Every `store` and `remove` draws a version for its key before touching any
//! tier. Tier workers refuse copies (promotions, demotions, compaction) whose
//! version is older than the latest one issued for that key, so a copy that
//! was read before a newer write can never land after it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Issues entry versions and remembers the newest one per key
#[derive(Debug)]
pub struct VersionGate {
    next: AtomicU64,
    /// Anything older was issued before the last `clear_all`
    global_floor: AtomicU64,
    /// Value of `next` at the previous prune
    watermark: AtomicU64,
    floors: Mutex<HashMap<String, u64>>,
}

impl Default for VersionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionGate {
    /// Starts numbering at the current Unix time in nanoseconds, so versions
    /// keep increasing across restarts over the same cache directory
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX / 2))
            .unwrap_or(1);
        Self::starting_at(seed)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
            global_floor: AtomicU64::new(0),
            watermark: AtomicU64::new(0),
            floors: Mutex::new(HashMap::new()),
        }
    }

    fn floors(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.floors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Issues a version for a new write of `key`
    ///
    /// From now on copies of `key` older than the returned version are refused.
    pub fn issue(&self, key: &str) -> u64 {
        let version = self.next.fetch_add(1, Ordering::SeqCst);
        let mut floors = self.floors();
        let floor = floors.entry(key.to_string()).or_insert(version);
        *floor = (*floor).max(version);
        version
    }

    /// Whether an entry of `key` at `version` may still be written
    pub fn admits(&self, key: &str, version: u64) -> bool {
        if version < self.global_floor.load(Ordering::SeqCst) {
            return false;
        }
        self.floors().get(key).map_or(true, |floor| version >= *floor)
    }

    /// Refuses every version issued so far; used when all tiers are emptied
    pub fn reset(&self) {
        let version = self.next.fetch_add(1, Ordering::SeqCst);
        self.global_floor.fetch_max(version, Ordering::SeqCst);
        self.floors().clear();
    }

    /// Forgets floors issued before the previous prune
    ///
    /// Called once per cleanup pass, so only copies in flight across a whole
    /// cleanup interval lose their protection.
    pub fn prune(&self) -> usize {
        let previous = self.watermark.swap(self.next.load(Ordering::SeqCst), Ordering::SeqCst);
        let mut floors = self.floors();
        let before = floors.len();
        floors.retain(|_, floor| *floor >= previous);
        before - floors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_increase() {
        let gate = VersionGate::starting_at(10);
        let a = gate.issue("k");
        let b = gate.issue("other");
        let c = gate.issue("k");

        assert!(a < b && b < c);
    }

    #[test]
    fn test_older_copy_is_refused_after_new_write() {
        let gate = VersionGate::starting_at(1);
        let old = gate.issue("quote:AAPL");
        assert!(gate.admits("quote:AAPL", old));

        let new = gate.issue("quote:AAPL");

        assert!(!gate.admits("quote:AAPL", old));
        assert!(gate.admits("quote:AAPL", new));
        // Other keys are unaffected
        assert!(gate.admits("quote:MSFT", old));
    }

    #[test]
    fn test_unknown_key_admits_persisted_versions() {
        let gate = VersionGate::starting_at(1_000);
        assert!(gate.admits("quote:AAPL", 0));
        assert!(gate.admits("quote:AAPL", 500));
    }

    #[test]
    fn test_reset_refuses_everything_issued_before() {
        let gate = VersionGate::starting_at(1);
        let a = gate.issue("a");
        let unrelated_copy = 0;

        gate.reset();
        let b = gate.issue("a");

        assert!(!gate.admits("a", a));
        assert!(!gate.admits("z", unrelated_copy));
        assert!(gate.admits("a", b));
    }

    #[test]
    fn test_prune_keeps_recent_floors() {
        let gate = VersionGate::starting_at(1);
        let old = gate.issue("old");
        gate.prune();
        let recent = gate.issue("recent");

        assert_eq!(gate.prune(), 1);
        assert!(gate.admits("old", old - 1));
        assert!(!gate.admits("recent", recent - 1));
    }
}
