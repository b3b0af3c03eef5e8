//! File-backed tiers (disk and archive)
//!
//! Each entry lives in its own JSON file named from the key, so a corrupt or
//! half-written file only ever costs one entry.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{Capacity, CacheEntry, CacheError, SweepOutcome, TierKind, TierPolicy, TierStore, TierSummary};

/// File name for `key`: a readable prefix plus a hash so distinct keys never collide
pub fn entry_file_name(key: &str, extension: &str) -> String {
    let readable: String = key
        .chars()
        .take(48)
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let digest = Sha256::digest(key.as_bytes());
    format!("{}-{}.{}", readable, &hex::encode(digest)[..16], extension)
}

/// Directory-per-tier store used for both the disk and archive tiers
#[derive(Debug)]
pub struct FileTier {
    kind: TierKind,
    policy: TierPolicy,
    dir: PathBuf,
    extension: &'static str,
}

impl FileTier {
    /// Creates a store rooted at `dir`; the directory is created on first write
    pub fn new(kind: TierKind, policy: TierPolicy, dir: PathBuf) -> Self {
        let extension = match kind {
            TierKind::Archive => "archive",
            TierKind::Memory | TierKind::Disk => "cache",
        };
        Self {
            kind,
            policy,
            dir,
            extension,
        }
    }

    /// Directory holding this tier's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path to the file for the given key
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(entry_file_name(key, self.extension))
    }

    fn write_entry(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec_pretty(entry)?;
        let path = self.entry_path(&entry.key);
        // Write beside the target then rename so readers never see a torn file
        let tmp = path.with_extension(format!("{}.tmp", self.extension));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read_entry(&self, path: &Path) -> Option<CacheEntry> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(tier = %self.kind, path = %path.display(), error = %e, "Failed to read cache file");
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(tier = %self.kind, path = %path.display(), error = %e, "Removing corrupt cache file");
                self.remove_file(path);
                None
            }
        }
    }

    fn remove_file(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(tier = %self.kind, path = %path.display(), error = %e, "Failed to remove cache file");
                false
            }
        }
    }

    /// Loads every readable entry, dropping corrupt files along the way
    fn scan(&self) -> Result<Vec<(PathBuf, CacheEntry)>, CacheError> {
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for item in dir {
            let path = item?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(self.extension) {
                continue;
            }
            if let Some(entry) = self.read_entry(&path) {
                entries.push((path, entry));
            }
        }
        Ok(entries)
    }
}

impl TierStore for FileTier {
    fn kind(&self) -> TierKind {
        self.kind
    }

    fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    fn put(&mut self, entry: CacheEntry) -> Result<Vec<CacheEntry>, CacheError> {
        let entry = entry.recompress(self.policy.compression)?;
        self.write_entry(&entry)?;
        Ok(Vec::new())
    }

    fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let mut entry = self.read_entry(&path)?;
        if entry.key != key {
            warn!(tier = %self.kind, key, found = %entry.key, "Removing cache file with mismatched key");
            self.remove_file(&path);
            return None;
        }

        entry.touch(now);
        // Only the disk tier persists access bookkeeping
        if self.kind == TierKind::Disk {
            if let Err(e) = self.write_entry(&entry) {
                debug!(tier = %self.kind, key, error = %e, "Failed to persist access time");
            }
        }
        Some(entry)
    }

    fn version(&mut self, key: &str) -> Option<u64> {
        self.read_entry(&self.entry_path(key))
            .filter(|entry| entry.key == key)
            .map(|entry| entry.version)
    }

    fn delete(&mut self, key: &str) -> Result<bool, CacheError> {
        Ok(self.remove_file(&self.entry_path(key)))
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        for (path, _) in self.scan()? {
            self.remove_file(&path);
        }
        Ok(())
    }

    fn sweep_expired(&mut self, now: DateTime<Utc>) -> Result<SweepOutcome, CacheError> {
        let mut outcome = SweepOutcome::default();
        let mut live = Vec::new();
        for (path, entry) in self.scan()? {
            if self.policy.is_expired(entry.created_at, now) {
                if self.remove_file(&path) {
                    outcome.expired += 1;
                }
            } else {
                live.push((path, entry));
            }
        }

        live.sort_by_key(|(_, e)| e.created_at);
        let mut total: u64 = live.iter().map(|(_, e)| e.size_bytes).sum();
        let mut count = live.len();
        for (path, entry) in &live {
            let over = match self.policy.capacity {
                Capacity::MaxItems(max) => count > max,
                Capacity::MaxTotalBytes(max) => total > max,
            };
            if !over {
                break;
            }
            debug!(tier = %self.kind, key = %entry.key, "Evicting oldest entry over capacity");
            if self.remove_file(path) {
                outcome.evicted += 1;
            }
            total -= entry.size_bytes;
            count -= 1;
        }

        Ok(outcome)
    }

    fn entries_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<CacheEntry>, CacheError> {
        let mut old: Vec<CacheEntry> = self
            .scan()?
            .into_iter()
            .map(|(_, e)| e)
            .filter(|e| e.created_at < cutoff)
            .collect();
        old.sort_by_key(|e| e.created_at);
        Ok(old)
    }

    fn summary(&mut self) -> TierSummary {
        match self.scan() {
            Ok(entries) => TierSummary {
                entry_count: entries.len(),
                total_bytes: entries.iter().map(|(_, e)| e.size_bytes).sum(),
            },
            Err(e) => {
                warn!(tier = %self.kind, error = %e, "Failed to scan cache directory");
                TierSummary::default()
            }
        }
    }
}
