//! Bridge settings and the storage capability that owns them.
//!
//! Settings are persisted by an external storage collaborator; the core only
//! reads typed snapshots and reacts to change notifications (enable starts the
//! push channel, disable stops it).

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Persisted bridge settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Whether the push channel should be connected.
    pub enabled: bool,

    /// Backend base URL, e.g. `http://127.0.0.1:8787`.
    pub base_url: Option<String>,

    /// Bearer credential for every backend call.
    pub token: Option<String>,

    /// Whether tool results are auto-submitted after insertion.
    pub auto_send: bool,

    /// Minimum random auto-send delay, seconds.
    pub delay_min_s: u64,

    /// Maximum random auto-send delay, seconds.
    pub delay_max_s: u64,

    /// Whether recognized commands are executed without user confirmation.
    pub auto_execute: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: None,
            token: None,
            auto_send: true,
            delay_min_s: 1,
            delay_max_s: 4,
            auto_execute: false,
        }
    }
}

impl Settings {
    /// Base URL with any trailing slash removed, if configured.
    pub fn base(&self) -> Option<String> {
        self.base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
    }

    /// The `(sse_url, token)` pair the channel should use, when the bridge is
    /// enabled and fully configured.
    pub fn channel_endpoint(&self) -> Option<(String, String)> {
        if !self.enabled {
            return None;
        }
        let base = self.base()?;
        let token = self.token.clone().filter(|t| !t.is_empty())?;
        Some((format!("{base}/v1/sse"), token))
    }
}

/// Storage capability for [`Settings`].
pub trait SettingsStore: Send + Sync {
    /// Current snapshot.
    fn get(&self) -> Settings;

    /// Change notifications. The receiver always reports the latest snapshot.
    fn watch(&self) -> watch::Receiver<Settings>;

    /// Replace the stored settings and notify watchers.
    fn set(&self, settings: Settings);
}

/// In-memory settings store for tests and embedding.
pub struct MemorySettings {
    tx: watch::Sender<Settings>,
}

impl MemorySettings {
    /// Create a store holding the given initial settings.
    pub fn new(initial: Settings) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Mutate the stored settings in place and notify watchers.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        self.tx.send_modify(f);
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self) -> Settings {
        self.tx.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    fn set(&self, settings: Settings) {
        self.tx.send_replace(settings);
    }
}
