//! Background cache maintenance
//!
//! Runs [`TieredCache::run_cleanup`] on a fixed period in its own tokio task
//! and reports each pass over a channel, so the app can show when the cache
//! was last tidied.

use std::time::Duration;
use tokio::sync::mpsc;

use crate::cache::{CleanupReport, TieredCache};
use crate::config::CacheConfig;

/// Messages sent from the background cleanup to the app
#[derive(Debug, Clone, PartialEq)]
pub enum CleanupMessage {
    /// A cleanup pass started
    Started,
    /// A cleanup pass finished
    Completed(CleanupReport),
}

/// Configuration for the cleanup schedule
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Time between cleanup passes
    pub interval: Duration,
    /// Whether periodic cleanup runs at all
    pub enabled: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600), // 1 hour
            enabled: true,
        }
    }
}

impl From<&CacheConfig> for CleanupConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            interval: config.cleanup_interval(),
            enabled: true,
        }
    }
}

/// Handle for controlling the background cleanup
pub struct CleanupHandle {
    /// Channel for receiving cleanup messages
    pub receiver: mpsc::Receiver<CleanupMessage>,
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl CleanupHandle {
    /// Spawns the periodic cleanup task for `cache`
    ///
    /// The first pass runs one full interval after spawning. Must be called
    /// from within a tokio runtime.
    pub fn spawn(cache: TieredCache, config: CleanupConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval);
                // Skip the first tick (immediate)
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            // A full channel just means nobody is listening closely
                            let _ = msg_tx.try_send(CleanupMessage::Started);
                            let report = cache.run_cleanup().await;
                            let _ = msg_tx.try_send(CleanupMessage::Completed(report));
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
            });
        }

        Self {
            receiver: msg_rx,
            shutdown_tx,
        }
    }

    /// Stops the background cleanup task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Checks for pending cleanup messages without blocking
///
/// # Returns
/// * `Some(CleanupMessage)` if a message was available
/// * `None` if no messages are pending
pub fn try_recv(handle: &mut CleanupHandle) -> Option<CleanupMessage> {
    handle.receiver.try_recv().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cleanup_config_default() {
        let config = CleanupConfig::default();
        assert_eq!(config.interval, Duration::from_secs(3600));
        assert!(config.enabled);
    }

    #[test]
    fn test_cleanup_config_follows_cache_config() {
        let cache_config = CacheConfig::from_toml("cleanup_interval_secs = 90").unwrap();

        let config = CleanupConfig::from(&cache_config);

        assert_eq!(config.interval, Duration::from_secs(90));
        assert!(config.enabled);
        assert_eq!(
            CleanupConfig::from(&CacheConfig::default()).interval,
            CleanupConfig::default().interval
        );
    }

    #[tokio::test]
    async fn test_cleanup_handle_spawn_disabled() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = TieredCache::with_dir(temp_dir.path().to_path_buf()).unwrap();
        let config = CleanupConfig {
            enabled: false,
            ..Default::default()
        };

        let mut handle = CleanupHandle::spawn(cache, config);

        // With cleanup disabled, there should be no messages
        assert!(try_recv(&mut handle).is_none());
    }

    #[tokio::test]
    async fn test_cleanup_runs_periodically() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = TieredCache::with_dir(temp_dir.path().to_path_buf()).unwrap();
        let config = CleanupConfig {
            interval: Duration::from_millis(20),
            enabled: true,
        };

        let mut handle = CleanupHandle::spawn(cache.clone(), config);
        let first = tokio::time::timeout(Duration::from_secs(5), handle.receiver.recv()).await;
        let second = tokio::time::timeout(Duration::from_secs(5), handle.receiver.recv()).await;

        assert_eq!(first.unwrap(), Some(CleanupMessage::Started));
        assert!(matches!(second.unwrap(), Some(CleanupMessage::Completed(_))));
        assert!(cache.statistics().await.last_cleanup.is_some());
        handle.shutdown().await;
    }
}
