//! Dual-timer batched trigger.
//!
//! Coalesces bursts of notifications into one flush: every added key resets a
//! short debounce timer, while an independent max-wait timer started at the
//! first key of a batch bounds total latency. Whichever fires first flushes
//! the accumulated keys, so output latency never exceeds the max-wait bound
//! even under continuous notification (a reply streaming token by token).

use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

/// Timing of a [`BatchTrigger`].
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    /// Quiet period after the last notification before a flush.
    pub debounce: Duration,

    /// Upper bound on latency from the first notification of a batch.
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(800),
            max_wait: Duration::from_millis(3000),
        }
    }
}

/// Accumulates keys and flushes them in coalesced batches.
///
/// Each distinct key appears at most once per flush. The flush callback runs
/// on the trigger's own task, after a yield, so a flush never re-enters the
/// notifier; notifications arriving during a flush open the next batch.
pub struct BatchTrigger<K> {
    tx: mpsc::UnboundedSender<K>,
    task: JoinHandle<()>,
}

impl<K> BatchTrigger<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Spawn a trigger that invokes `on_flush` with each batch of keys.
    pub fn new<F, Fut>(config: BatchConfig, on_flush: F) -> Self
    where
        F: FnMut(Vec<K>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(config, rx, on_flush));
        Self { tx, task }
    }

    /// Record that `key` changed and schedule it for the next flush.
    ///
    /// Never blocks. After shutdown this is a no-op.
    pub fn notify(&self, key: K) {
        let _ = self.tx.send(key);
    }

    /// Stop accepting keys and wait for a final flush of anything pending.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}

async fn run<K, F, Fut>(config: BatchConfig, mut rx: mpsc::UnboundedReceiver<K>, mut on_flush: F)
where
    K: Eq + Hash + Clone,
    F: FnMut(Vec<K>) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut pending: HashSet<K> = HashSet::new();
    let mut order: Vec<K> = Vec::new();
    let mut debounce_at: Option<Instant> = None;
    let mut max_at: Option<Instant> = None;

    loop {
        let debounce_deadline = debounce_at.unwrap_or_else(far_future);
        let max_deadline = max_at.unwrap_or_else(far_future);

        tokio::select! {
            received = rx.recv() => match received {
                Some(key) => {
                    if pending.insert(key.clone()) {
                        order.push(key);
                    }
                    debounce_at = Some(Instant::now() + config.debounce);
                    if max_at.is_none() {
                        max_at = Some(Instant::now() + config.max_wait);
                    }
                }
                None => {
                    if !order.is_empty() {
                        flush(&mut pending, &mut order, &mut on_flush).await;
                    }
                    return;
                }
            },
            _ = time::sleep_until(debounce_deadline), if debounce_at.is_some() => {
                debounce_at = None;
                max_at = None;
                flush(&mut pending, &mut order, &mut on_flush).await;
            }
            _ = time::sleep_until(max_deadline), if max_at.is_some() => {
                debounce_at = None;
                max_at = None;
                flush(&mut pending, &mut order, &mut on_flush).await;
            }
        }
    }
}

async fn flush<K, F, Fut>(pending: &mut HashSet<K>, order: &mut Vec<K>, on_flush: &mut F)
where
    K: Eq + Hash,
    F: FnMut(Vec<K>) -> Fut,
    Fut: Future<Output = ()>,
{
    pending.clear();
    let batch = std::mem::take(order);
    debug!(keys = batch.len(), "flushing batch");
    // Defer to the next tick so a flush observes post-mutation state.
    tokio::task::yield_now().await;
    on_flush(batch).await;
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365)
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
