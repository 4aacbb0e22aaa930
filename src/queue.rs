//! Single-lane execution queue.
//!
//! Every interaction with the shared chat input surface - tool execution,
//! result insertion, auto-send, proxied fill-and-wait - goes through this
//! queue. Tasks run strictly FIFO, one at a time, each to full completion;
//! enqueueing never blocks. Failures are converted into text written to the
//! surface and never crash the queue or block subsequent tasks.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

use chatlink_protocols::{BridgeError, Command, FillMode, ProxyRequest, Surface};

use crate::api::ApiClient;
use crate::correlator::ReplyCorrelator;
use crate::dedup::{DedupKey, DedupStore};
use crate::settings::Settings;

/// Marker written back when a successful execution carries neither output
/// nor error text.
pub const EMPTY_RESPONSE: &str = "[chatlink] empty response";

/// Queue timing.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Settle delay between clicking the stop control and writing the result.
    pub stop_settle: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stop_settle: Duration::from_millis(600),
        }
    }
}

/// One unit of serialized surface work.
#[derive(Debug)]
pub enum QueueTask {
    /// Execute a recognized command against the backend and write the result
    /// back. The key, when present, is marked handled (idempotent).
    Execute {
        command: Command,
        key: Option<DedupKey>,
    },

    /// Write text into the surface, optionally auto-sending it.
    Fill { text: String, auto_send: bool },

    /// Proxied exchange: submit the prompt, wait for the reply, deliver it
    /// to the backend.
    Proxy(ProxyRequest),
}

/// Strict FIFO task runner over the shared surface.
pub struct ExecutionQueue {
    tx: mpsc::UnboundedSender<QueueTask>,
    task: JoinHandle<()>,
}

/// Cloneable enqueue-only handle to an [`ExecutionQueue`].
///
/// [`ExecutionQueue::shutdown`] completes only after every handle has been
/// dropped, so producers (scanner, channel pump) are torn down first.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<QueueTask>,
}

impl QueueHandle {
    /// Queue a task for eventual serialized execution. Never blocks.
    pub fn enqueue(&self, task: QueueTask) {
        if self.tx.send(task).is_err() {
            warn!("execution queue is shut down, dropping task");
        }
    }
}

#[cfg(test)]
impl QueueHandle {
    /// A handle wired to a bare receiver, for asserting on enqueued tasks.
    pub(crate) fn bare() -> (Self, mpsc::UnboundedReceiver<QueueTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ExecutionQueue {
    /// Spawn the queue worker.
    pub fn spawn(
        api: Arc<ApiClient>,
        surface: Arc<dyn Surface>,
        store: Arc<dyn DedupStore>,
        correlator: Arc<ReplyCorrelator>,
        settings: watch::Receiver<Settings>,
        config: QueueConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            api,
            surface,
            store,
            correlator,
            settings,
            config,
        };
        let task = tokio::spawn(worker.run(rx));
        Self { tx, task }
    }

    /// Queue a task for eventual serialized execution. Never blocks.
    pub fn enqueue(&self, task: QueueTask) {
        if self.tx.send(task).is_err() {
            warn!("execution queue is shut down, dropping task");
        }
    }

    /// Cloneable enqueue-only handle for producers.
    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stop accepting tasks and wait for the queue to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}

struct Worker {
    api: Arc<ApiClient>,
    surface: Arc<dyn Surface>,
    store: Arc<dyn DedupStore>,
    correlator: Arc<ReplyCorrelator>,
    settings: watch::Receiver<Settings>,
    config: QueueConfig,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<QueueTask>) {
        info!("execution queue started");
        while let Some(task) = rx.recv().await {
            match task {
                QueueTask::Execute { command, key } => self.execute(command, key).await,
                QueueTask::Fill { text, auto_send } => self.write_back(&text, auto_send).await,
                QueueTask::Proxy(request) => self.proxy(request).await,
            }
        }
        info!("execution queue drained");
    }

    async fn execute(&self, command: Command, key: Option<DedupKey>) {
        debug!(name = %command.name, call_id = ?command.call_id, "executing command");
        if let Some(key) = &key {
            self.store.mark_handled(key).await;
        }

        let (text, auto_send) = match self.api.exec(&command).await {
            Ok(response) => {
                let text = response
                    .output
                    .filter(|s| !s.is_empty())
                    .or(response.error.filter(|s| !s.is_empty()))
                    .unwrap_or_else(|| EMPTY_RESPONSE.to_string());
                if response.stop_stream {
                    self.surface.click_stop().await;
                    time::sleep(self.config.stop_settle).await;
                }
                (text, true)
            }
            Err(BridgeError::Auth) => (
                "Authentication failed. Re-enter the access token in the bridge settings."
                    .to_string(),
                false,
            ),
            Err(BridgeError::Configuration(_)) => (
                "Configure the backend address in the bridge settings first.".to_string(),
                false,
            ),
            Err(e) => (format!("[chatlink error] {e}"), false),
        };

        self.write_back(&text, auto_send).await;
    }

    /// Write result text into the surface and optionally auto-send it after
    /// the configured randomized delay.
    async fn write_back(&self, text: &str, auto_send: bool) {
        if let Err(e) = self.surface.fill(text, FillMode::Append).await {
            error!(error = %e, "failed to write result into the surface");
            return;
        }
        if !auto_send {
            return;
        }
        let settings = self.settings.borrow().clone();
        if !settings.auto_send {
            return;
        }
        time::sleep(auto_send_delay(&settings)).await;
        if let Err(e) = self.surface.trigger_send().await {
            error!(error = %e, "failed to trigger send");
        }
    }

    async fn proxy(&self, request: ProxyRequest) {
        match self
            .correlator
            .correlate(&request.request_id, &request.prompt)
            .await
        {
            Ok(reply) => {
                if let Err(e) = self.api.post_reply(&request.request_id, &reply).await {
                    warn!(request_id = %request.request_id, error = %e, "failed to deliver proxy reply");
                }
            }
            Err(e) => {
                warn!(request_id = %request.request_id, error = %e, "proxied exchange failed");
                // The caller must never be left unanswered.
                let _ = self
                    .api
                    .post_reply(&request.request_id, &format!("[proxy error] {e}"))
                    .await;
            }
        }
    }
}

/// Uniform random delay within the configured auto-send window.
fn auto_send_delay(settings: &Settings) -> Duration {
    let min_ms = settings.delay_min_s * 1000;
    let max_ms = (settings.delay_max_s * 1000).max(min_ms);
    Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
