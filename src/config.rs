//! Configuration for the cache and the fetch tracker
//!
//! Every field has a default, so an empty (or absent) TOML file yields a
//! working setup. Tier sections may set any subset of their fields; the rest
//! fall back to that tier's own defaults.

use chrono::Duration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cache::{Capacity, CompressionLevel, TierKind, TierPolicy};
use crate::fetch::TrackerPolicy;

/// Largest serialized value the memory tier will hold (512 KiB)
pub const DEFAULT_MAX_MEMORY_ENTRY_BYTES: u64 = 512 * 1024;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for this schema
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Overrides for one tier; unset fields use the tier's defaults
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TierConfig {
    /// Maximum entry age in seconds
    pub max_age_secs: Option<u64>,
    /// Entry limit (memory and disk)
    pub max_items: Option<usize>,
    /// Stored-byte limit (archive)
    pub max_total_bytes: Option<u64>,
    pub compression: Option<CompressionLevel>,
}

impl TierConfig {
    /// Merges these overrides onto the defaults for `kind`
    pub fn policy(&self, kind: TierKind) -> TierPolicy {
        let defaults = default_policy(kind);
        let capacity = match defaults.capacity {
            Capacity::MaxItems(n) => Capacity::MaxItems(self.max_items.unwrap_or(n)),
            Capacity::MaxTotalBytes(n) => Capacity::MaxTotalBytes(self.max_total_bytes.unwrap_or(n)),
        };
        TierPolicy {
            max_age: self.max_age_secs.map(seconds_or_max).or(defaults.max_age),
            capacity,
            compression: self.compression.unwrap_or(defaults.compression),
        }
    }
}

/// Converts a seconds setting, or `None` if chrono cannot represent it
fn seconds(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

/// Out-of-range settings are rejected by `validate`; unvalidated ones saturate
fn seconds_or_max(secs: u64) -> Duration {
    seconds(secs).unwrap_or(Duration::MAX)
}

/// Built-in policy for each tier
pub fn default_policy(kind: TierKind) -> TierPolicy {
    match kind {
        TierKind::Memory => TierPolicy {
            max_age: Some(Duration::hours(1)),
            capacity: Capacity::MaxItems(200),
            compression: CompressionLevel::None,
        },
        TierKind::Disk => TierPolicy {
            max_age: Some(Duration::days(7)),
            capacity: Capacity::MaxItems(2000),
            compression: CompressionLevel::Light,
        },
        TierKind::Archive => TierPolicy {
            max_age: None,
            capacity: Capacity::MaxTotalBytes(100 * 1024 * 1024),
            compression: CompressionLevel::Heavy,
        },
    }
}

/// Fetch-state windows, in seconds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub fresh_secs: u64,
    pub stale_secs: u64,
    pub retry_secs: u64,
    pub suspend_threshold: u32,
    pub suspend_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            fresh_secs: 15 * 60,
            stale_secs: 60 * 60,
            retry_secs: 5 * 60,
            suspend_threshold: 5,
            suspend_secs: 60 * 60,
        }
    }
}

impl TrackerConfig {
    pub fn policy(&self) -> TrackerPolicy {
        TrackerPolicy {
            fresh_window: seconds_or_max(self.fresh_secs),
            stale_window: seconds_or_max(self.stale_secs),
            retry_interval: seconds_or_max(self.retry_secs),
            suspend_threshold: self.suspend_threshold,
            suspend_duration: seconds_or_max(self.suspend_secs),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "quotecache=debug")
    pub level: String,
    /// Output format (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory for the disk and archive tiers
    pub cache_dir: Option<PathBuf>,
    pub memory: TierConfig,
    pub disk: TierConfig,
    pub archive: TierConfig,
    /// Values larger than this are stored on disk even when routed to memory
    pub max_memory_entry_bytes: u64,
    /// Disk entries older than this move to the archive during cleanup
    pub compaction_age_secs: u64,
    /// Period of the background cleanup
    pub cleanup_interval_secs: u64,
    pub tracker: TrackerConfig,
    pub logging: LoggingConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            memory: TierConfig::default(),
            disk: TierConfig::default(),
            archive: TierConfig::default(),
            max_memory_entry_bytes: DEFAULT_MAX_MEMORY_ENTRY_BYTES,
            compaction_age_secs: 24 * 60 * 60,
            cleanup_interval_secs: 60 * 60,
            tracker: TrackerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Reads and validates a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the configured cache directory, or the XDG cache directory
    ///
    /// Uses `~/.cache/quotecache/` on Linux. Returns `None` if neither is available.
    pub fn resolve_cache_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Some(dir.clone());
        }
        let project_dirs = ProjectDirs::from("", "", "quotecache")?;
        Some(project_dirs.cache_dir().to_path_buf())
    }

    /// Policy for `kind` after applying overrides
    pub fn tier_policy(&self, kind: TierKind) -> TierPolicy {
        match kind {
            TierKind::Memory => self.memory.policy(kind),
            TierKind::Disk => self.disk.policy(kind),
            TierKind::Archive => self.archive.policy(kind),
        }
    }

    pub fn compaction_age(&self) -> Duration {
        seconds_or_max(self.compaction_age_secs)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Rejects values that would make the cache or tracker misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut durations = vec![
            ("compaction_age_secs".to_string(), self.compaction_age_secs),
            ("cleanup_interval_secs".to_string(), self.cleanup_interval_secs),
            ("tracker.fresh_secs".to_string(), self.tracker.fresh_secs),
            ("tracker.stale_secs".to_string(), self.tracker.stale_secs),
            ("tracker.retry_secs".to_string(), self.tracker.retry_secs),
            ("tracker.suspend_secs".to_string(), self.tracker.suspend_secs),
        ];
        for (kind, tier) in [
            (TierKind::Memory, &self.memory),
            (TierKind::Disk, &self.disk),
            (TierKind::Archive, &self.archive),
        ] {
            if let Some(secs) = tier.max_age_secs {
                durations.push((format!("{}.max_age_secs", kind), secs));
            }
        }
        for (name, secs) in durations {
            if seconds(secs).is_none() {
                return Err(ConfigError::Invalid(format!("{} is out of range: {}", name, secs)));
            }
        }

        for kind in TierKind::ALL {
            let policy = self.tier_policy(kind);
            if policy.max_age.is_some_and(|age| age <= Duration::zero()) {
                return Err(ConfigError::Invalid(format!("{} max_age_secs must be positive", kind)));
            }
            let empty = match policy.capacity {
                Capacity::MaxItems(n) => n == 0,
                Capacity::MaxTotalBytes(n) => n == 0,
            };
            if empty {
                return Err(ConfigError::Invalid(format!("{} capacity must be positive", kind)));
            }
        }
        if self.max_memory_entry_bytes == 0 {
            return Err(ConfigError::Invalid("max_memory_entry_bytes must be positive".to_string()));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid("cleanup_interval_secs must be positive".to_string()));
        }
        if self.tracker.stale_secs <= self.tracker.fresh_secs {
            return Err(ConfigError::Invalid(
                "tracker.stale_secs must be greater than tracker.fresh_secs".to_string(),
            ));
        }
        if self.tracker.suspend_threshold == 0 {
            return Err(ConfigError::Invalid("tracker.suspend_threshold must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_toml_is_default() {
        let config = CacheConfig::from_toml("").unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_default_policies() {
        let config = CacheConfig::default();

        let memory = config.tier_policy(TierKind::Memory);
        assert_eq!(memory.capacity, Capacity::MaxItems(200));
        assert_eq!(memory.compression, CompressionLevel::None);

        let archive = config.tier_policy(TierKind::Archive);
        assert!(archive.max_age.is_none());
        assert_eq!(archive.compression, CompressionLevel::Heavy);
        assert_eq!(config.max_memory_entry_bytes, 512 * 1024);
    }

    #[test]
    fn test_partial_tier_section_keeps_tier_defaults() {
        let config = CacheConfig::from_toml(
            r#"
            [disk]
            max_items = 10

            [archive]
            max_total_bytes = 4096
            "#,
        )
        .unwrap();

        let disk = config.tier_policy(TierKind::Disk);
        assert_eq!(disk.capacity, Capacity::MaxItems(10));
        assert_eq!(disk.max_age, Some(Duration::days(7)));
        assert_eq!(disk.compression, CompressionLevel::Light);
        assert_eq!(
            config.tier_policy(TierKind::Archive).capacity,
            Capacity::MaxTotalBytes(4096)
        );
    }

    #[test]
    fn test_tracker_section() {
        let config = CacheConfig::from_toml(
            r#"
            [tracker]
            fresh_secs = 60
            stale_secs = 120
            "#,
        )
        .unwrap();

        let policy = config.tracker.policy();
        assert_eq!(policy.fresh_window, Duration::minutes(1));
        assert_eq!(policy.stale_window, Duration::minutes(2));
        assert_eq!(policy.suspend_threshold, 5);
    }

    #[test]
    fn test_compression_names_in_toml() {
        let config = CacheConfig::from_toml(
            r#"
            [memory]
            compression = "light"
            "#,
        )
        .unwrap();

        assert_eq!(config.tier_policy(TierKind::Memory).compression, CompressionLevel::Light);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(CacheConfig::from_toml("[memory]\nmax_items = 0").is_err());
        assert!(CacheConfig::from_toml("[disk]\nmax_age_secs = 0").is_err());
        assert!(CacheConfig::from_toml("[tracker]\nfresh_secs = 600\nstale_secs = 600").is_err());
        assert!(CacheConfig::from_toml("[tracker]\nsuspend_threshold = 0").is_err());
        assert!(CacheConfig::from_toml("cleanup_interval_secs = 0").is_err());
    }

    #[test]
    fn test_huge_durations_are_rejected() {
        let result = CacheConfig::from_toml("[memory]\nmax_age_secs = 10000000000000000");
        assert!(
            matches!(&result, Err(ConfigError::Invalid(msg)) if msg.contains("memory.max_age_secs")),
            "got {:?}",
            result
        );

        for toml in [
            "compaction_age_secs = 9300000000000000",
            "cleanup_interval_secs = 10000000000000000",
            "[tracker]\nsuspend_threshold = 1\nsuspend_secs = 10000000000000000",
        ] {
            assert!(
                matches!(CacheConfig::from_toml(toml), Err(ConfigError::Invalid(_))),
                "accepted {}",
                toml
            );
        }
    }

    #[test]
    fn test_unvalidated_huge_durations_saturate() {
        let config = CacheConfig {
            memory: TierConfig {
                max_age_secs: Some(u64::MAX),
                ..Default::default()
            },
            compaction_age_secs: u64::MAX,
            ..Default::default()
        };

        assert_eq!(config.tier_policy(TierKind::Memory).max_age, Some(Duration::MAX));
        assert_eq!(config.compaction_age(), Duration::MAX);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_long_but_representable_suspension_is_accepted() {
        let config =
            CacheConfig::from_toml("[tracker]\nsuspend_threshold = 1\nsuspend_secs = 9000000000000").unwrap();

        assert_eq!(config.tracker.policy().suspend_duration, Duration::seconds(9_000_000_000_000));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let result = CacheConfig::from_toml("memory = [");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("quotecache.toml");
        fs::write(&path, "cache_dir = \"/tmp/qc\"\ncompaction_age_secs = 3600\n").unwrap();

        let config = CacheConfig::load(&path).unwrap();

        assert_eq!(config.resolve_cache_dir(), Some(PathBuf::from("/tmp/qc")));
        assert_eq!(config.compaction_age(), Duration::hours(1));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = CacheConfig::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_default_cache_dir_is_xdg_compliant() {
        if let Some(dir) = CacheConfig::default().resolve_cache_dir() {
            assert!(dir.to_string_lossy().contains("quotecache"));
        }
        // Passes without a home directory too
    }
}
