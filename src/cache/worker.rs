//! Per-tier worker threads
//!
//! Every tier store is moved onto its own OS thread and driven through a
//! request channel, so a slow archive write never holds up a memory read and
//! no store is ever touched from two places at once.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{CacheEntry, CacheError, SweepOutcome, TierKind, TierStore, TierSummary, VersionGate};

/// Depth of each tier's request queue
const QUEUE_DEPTH: usize = 64;

enum Request {
    Put {
        entry: CacheEntry,
        reply: oneshot::Sender<Result<Option<Vec<CacheEntry>>, CacheError>>,
    },
    Get {
        key: String,
        now: DateTime<Utc>,
        reply: oneshot::Sender<Option<CacheEntry>>,
    },
    Delete {
        key: String,
        /// Only delete an entry older than this version
        below: Option<u64>,
        reply: oneshot::Sender<Result<bool, CacheError>>,
    },
    Clear {
        reply: oneshot::Sender<Result<(), CacheError>>,
    },
    Sweep {
        now: DateTime<Utc>,
        reply: oneshot::Sender<Result<SweepOutcome, CacheError>>,
    },
    OlderThan {
        cutoff: DateTime<Utc>,
        reply: oneshot::Sender<Result<Vec<CacheEntry>, CacheError>>,
    },
    Summary {
        reply: oneshot::Sender<TierSummary>,
    },
}

/// Cloneable handle to a running tier worker
///
/// The worker thread exits once every handle has been dropped.
#[derive(Debug, Clone)]
pub struct TierHandle {
    kind: TierKind,
    sender: mpsc::Sender<Request>,
}

impl TierHandle {
    /// Moves `store` onto a dedicated thread and returns a handle to it
    ///
    /// Writes are checked against `gate` on the worker thread, in queue order.
    pub fn spawn<S: TierStore + 'static>(store: S, gate: Arc<VersionGate>) -> std::io::Result<Self> {
        let kind = store.kind();
        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);
        std::thread::Builder::new()
            .name(format!("quotecache-{}", kind))
            .spawn(move || run(store, gate, receiver))?;
        Ok(Self { kind, sender })
    }

    /// Tier served by this handle
    pub fn kind(&self) -> TierKind {
        self.kind
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> Request,
    ) -> Result<R, CacheError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| CacheError::TierUnavailable(self.kind))?;
        response
            .await
            .map_err(|_| CacheError::TierUnavailable(self.kind))
    }

    /// Writes `entry` unless a newer version of its key has been issued
    ///
    /// Returns `None` when the write was refused, otherwise the entries evicted
    /// to make room.
    pub async fn put(&self, entry: CacheEntry) -> Result<Option<Vec<CacheEntry>>, CacheError> {
        self.request(|reply| Request::Put { entry, reply }).await?
    }

    pub async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, CacheError> {
        let key = key.to_string();
        self.request(|reply| Request::Get { key, now, reply }).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let key = key.to_string();
        self.request(|reply| Request::Delete { key, below: None, reply }).await?
    }

    /// Deletes `key` only if the stored entry is older than `version`
    pub async fn delete_older_than(&self, key: &str, version: u64) -> Result<bool, CacheError> {
        let key = key.to_string();
        self.request(|reply| Request::Delete {
            key,
            below: Some(version),
            reply,
        })
        .await?
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.request(|reply| Request::Clear { reply }).await?
    }

    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepOutcome, CacheError> {
        self.request(|reply| Request::Sweep { now, reply }).await?
    }

    pub async fn entries_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<CacheEntry>, CacheError> {
        self.request(|reply| Request::OlderThan { cutoff, reply }).await?
    }

    pub async fn summary(&self) -> Result<TierSummary, CacheError> {
        self.request(|reply| Request::Summary { reply }).await
    }
}

fn run<S: TierStore>(mut store: S, gate: Arc<VersionGate>, mut receiver: mpsc::Receiver<Request>) {
    let kind = store.kind();
    debug!(tier = %kind, "Tier worker started");

    while let Some(request) = receiver.blocking_recv() {
        // A dropped reply only means the caller stopped waiting
        match request {
            Request::Put { entry, reply } => {
                let result = if gate.admits(&entry.key, entry.version) {
                    store.put(entry).map(Some)
                } else {
                    debug!(tier = %kind, key = %entry.key, version = entry.version, "Refused superseded write");
                    Ok(None)
                };
                let _ = reply.send(result);
            }
            Request::Get { key, now, reply } => {
                let _ = reply.send(store.get(&key, now));
            }
            Request::Delete { key, below, reply } => {
                let result = match below {
                    Some(version) if store.version(&key).is_some_and(|current| current >= version) => {
                        Ok(false)
                    }
                    _ => store.delete(&key),
                };
                let _ = reply.send(result);
            }
            Request::Clear { reply } => {
                let _ = reply.send(store.clear());
            }
            Request::Sweep { now, reply } => {
                let _ = reply.send(store.sweep_expired(now));
            }
            Request::OlderThan { cutoff, reply } => {
                let _ = reply.send(store.entries_older_than(cutoff));
            }
            Request::Summary { reply } => {
                let _ = reply.send(store.summary());
            }
        }
    }

    debug!(tier = %kind, "Tier worker stopped");
}
