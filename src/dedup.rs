//! Stable-key dedup store.
//!
//! Records which tool-call occurrences were already handled, so re-renders of
//! the same transcript never re-execute a command. Keys are stable across
//! page rebuilds: call-id keys when the source supplied an identifier,
//! content hashes of the raw matched text otherwise.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use chatlink_protocols::Command;

/// Handled marks older than this are purged lazily on every write.
pub const RETENTION: chrono::Duration = chrono::Duration::days(7);

/// Deterministic identifier of a tool-call occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    /// Derive the key for an occurrence.
    ///
    /// `(conversation, name, call_id)` when the source supplied a call id,
    /// else a SHA-256 hash of the raw matched text, so identical occurrences
    /// across re-renders always collapse onto the same key.
    pub fn derive(conversation: &str, command: &Command, raw: &str) -> Self {
        match &command.call_id {
            Some(call_id) => Self(format!("{conversation}:{}:{call_id}", command.name)),
            None => {
                let digest = Sha256::digest(raw.as_bytes());
                Self(format!("{digest:x}"))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persistent record of handled keys.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Whether `key` was already handled (and not yet expired).
    async fn is_handled(&self, key: &DedupKey) -> bool;

    /// Mark `key` handled. Idempotent; purges expired entries first.
    async fn mark_handled(&self, key: &DedupKey);
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn purge(entries: &mut HashMap<DedupKey, i64>, now: i64) {
    let cutoff = now - RETENTION.num_milliseconds();
    entries.retain(|_, marked_at| *marked_at > cutoff);
}

/// In-memory dedup store for tests and short-lived embeddings.
pub struct MemoryDedupStore {
    entries: RwLock<HashMap<DedupKey, i64>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) async fn mark_at(&self, key: &DedupKey, now: i64) {
        let mut entries = self.entries.write().await;
        purge(&mut entries, now);
        entries.insert(key.clone(), now);
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryDedupStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn is_handled(&self, key: &DedupKey) -> bool {
        self.entries.read().await.contains_key(key)
    }

    async fn mark_handled(&self, key: &DedupKey) {
        self.mark_at(key, now_ms()).await;
    }
}

/// File-backed dedup store: one JSON object mapping key to handled-at unix ms.
///
/// Storage failures are logged and swallowed; losing a mark only risks a
/// duplicate card, never a crash.
pub struct FileDedupStore {
    path: PathBuf,
    entries: RwLock<HashMap<DedupKey, i64>>,
}

impl FileDedupStore {
    /// Open (or create) a store at `path`, loading any existing records.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "dedup store unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        debug!(path = %path.display(), entries = entries.len(), "opened dedup store");
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    async fn persist(&self, entries: &HashMap<DedupKey, i64>) {
        match serde_json::to_vec(entries) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(&self.path, bytes).await {
                    warn!(path = %self.path.display(), error = %e, "failed to persist dedup store");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize dedup store"),
        }
    }

    pub(crate) async fn mark_at(&self, key: &DedupKey, now: i64) {
        let mut entries = self.entries.write().await;
        purge(&mut entries, now);
        entries.insert(key.clone(), now);
        self.persist(&entries).await;
    }
}

#[async_trait]
impl DedupStore for FileDedupStore {
    async fn is_handled(&self, key: &DedupKey) -> bool {
        self.entries.read().await.contains_key(key)
    }

    async fn mark_handled(&self, key: &DedupKey) {
        self.mark_at(key, now_ms()).await;
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
