//! Change-driven command recognition.
//!
//! Subscribes to region mutation notifications, coalesces them through a
//! [`BatchTrigger`], and scans each changed region's rendered text for
//! command blocks. Each recognized command passes two gates: a session-local
//! set so a block is surfaced at most once per scanner lifetime, and the
//! persistent dedup store which decides whether it still gets executed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chatlink_protocols::dom::clean_text;
use chatlink_protocols::{ChangeObservation, Command, RegionId};

use crate::batch::{BatchConfig, BatchTrigger};
use crate::dedup::{DedupKey, DedupStore};
use crate::extract::extract;
use crate::queue::{QueueHandle, QueueTask};
use crate::settings::Settings;

/// A command block surfaced by the scanner.
#[derive(Debug, Clone)]
pub struct RecognizedCommand {
    /// Stable identity of this occurrence.
    pub key: DedupKey,

    /// The parsed command.
    pub command: Command,

    /// Region the block was found in.
    pub region: RegionId,

    /// Whether the persistent store had already seen this key. Such commands
    /// are surfaced for display but never executed.
    pub already_handled: bool,
}

/// Watches a conversation surface and recognizes command blocks as they
/// finish rendering.
pub struct ChangeScanner {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
}

struct Inner {
    observation: Arc<dyn ChangeObservation>,
    store: Arc<dyn DedupStore>,
    queue: QueueHandle,
    settings: watch::Receiver<Settings>,
    recognized: broadcast::Sender<RecognizedCommand>,
    seen: Mutex<HashSet<DedupKey>>,
}

impl ChangeScanner {
    /// Spawn the scanner. Existing regions are scanned once at startup so
    /// commands rendered before attach are not missed.
    pub fn spawn(
        observation: Arc<dyn ChangeObservation>,
        store: Arc<dyn DedupStore>,
        queue: QueueHandle,
        settings: watch::Receiver<Settings>,
        config: BatchConfig,
    ) -> Self {
        let (recognized, _) = broadcast::channel(64);
        let inner = Arc::new(Inner {
            observation,
            store,
            queue,
            settings,
            recognized,
            seen: Mutex::new(HashSet::new()),
        });
        let cancel = CancellationToken::new();
        let pump = tokio::spawn(pump(inner.clone(), cancel.clone(), config));
        Self {
            inner,
            cancel,
            pump,
        }
    }

    /// Recognition events, in scan order.
    pub fn subscribe(&self) -> broadcast::Receiver<RecognizedCommand> {
        self.inner.recognized.subscribe()
    }

    /// Forget a session-gated key so the next scan of its region surfaces the
    /// command again. The persistent store is untouched.
    pub fn ignore(&self, key: &DedupKey) {
        self.inner.seen.lock().unwrap().remove(key);
    }

    /// Stop watching and wait for any pending scan to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.pump.await;
    }
}

async fn pump(inner: Arc<Inner>, cancel: CancellationToken, config: BatchConfig) {
    let mut watcher = inner.observation.subscribe();
    let scan_target = inner.clone();
    let trigger = BatchTrigger::new(config, move |regions| {
        let inner = scan_target.clone();
        async move { inner.scan(regions).await }
    });

    // Catch up on whatever rendered before we attached.
    for region in inner.observation.regions().await {
        trigger.notify(region);
    }
    info!("change scanner attached");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = watcher.recv() => match received {
                Ok(region) => trigger.notify(region),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "mutation notifications lagged, rescanning");
                    for region in inner.observation.regions().await {
                        trigger.notify(region);
                    }
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    trigger.shutdown().await;
}

impl Inner {
    async fn scan(&self, regions: Vec<RegionId>) {
        let conversation = self.observation.conversation_id();
        for region in regions {
            let Some(node) = self.observation.snapshot(region).await else {
                continue;
            };
            let text = clean_text(&node);
            for occurrence in extract(&text) {
                let Some(command) = occurrence.command else {
                    warn!(%region, "ignoring unparsable command block");
                    continue;
                };
                let key = DedupKey::derive(&conversation, &command, occurrence.raw);
                if !self.seen.lock().unwrap().insert(key.clone()) {
                    continue;
                }

                let already_handled = self.store.is_handled(&key).await;
                debug!(name = %command.name, %region, already_handled, "recognized command");
                let _ = self.recognized.send(RecognizedCommand {
                    key: key.clone(),
                    command: command.clone(),
                    region,
                    already_handled,
                });

                if already_handled || !self.settings.borrow().auto_execute {
                    continue;
                }
                self.store.mark_handled(&key).await;
                self.queue.enqueue(QueueTask::Execute {
                    command,
                    key: Some(key),
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "scanner_tests.rs"]
mod tests;
