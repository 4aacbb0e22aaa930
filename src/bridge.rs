//! Top-level wiring.
//!
//! [`Bridge`] assembles the push channel, scanner, execution queue and API
//! client over a pair of platform capabilities, and keeps the channel's
//! lifecycle in sync with the settings: whenever the settings yield a complete
//! endpoint the channel is (re)started against it, and whenever they stop
//! yielding one the channel is torn down.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chatlink_protocols::{BridgeError, ChangeObservation, ChannelEvent, Surface};

use crate::api::ApiClient;
use crate::batch::BatchConfig;
use crate::channel::{ChannelConfig, ConnectionState, PushChannel};
use crate::correlator::{CorrelatorConfig, ReplyCorrelator};
use crate::dedup::DedupStore;
use crate::queue::{ExecutionQueue, QueueConfig, QueueTask};
use crate::scanner::{ChangeScanner, RecognizedCommand};
use crate::settings::Settings;

/// Timing knobs for every component, each defaulting to production values.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeConfig {
    pub channel: ChannelConfig,
    pub batch: BatchConfig,
    pub correlator: CorrelatorConfig,
    pub queue: QueueConfig,
}

/// A running bridge between one chat surface and the automation backend.
pub struct Bridge {
    api: Arc<ApiClient>,
    channel: Arc<PushChannel>,
    queue: ExecutionQueue,
    scanner: ChangeScanner,
    cancel: CancellationToken,
    settings_task: JoinHandle<()>,
    event_task: JoinHandle<()>,
}

impl Bridge {
    /// Wire up and start every component. The channel connects only once the
    /// settings yield a complete endpoint.
    pub fn start(
        surface: Arc<dyn Surface>,
        observation: Arc<dyn ChangeObservation>,
        store: Arc<dyn DedupStore>,
        settings: watch::Receiver<Settings>,
        config: BridgeConfig,
    ) -> Self {
        let api = Arc::new(ApiClient::new(settings.clone()));
        let correlator = Arc::new(ReplyCorrelator::new(
            surface.clone(),
            observation.clone(),
            config.correlator,
        ));
        let queue = ExecutionQueue::spawn(
            api.clone(),
            surface,
            store.clone(),
            correlator,
            settings.clone(),
            config.queue,
        );
        let scanner = ChangeScanner::spawn(
            observation,
            store,
            queue.handle(),
            settings.clone(),
            config.batch,
        );
        let channel = Arc::new(PushChannel::new(config.channel));

        let cancel = CancellationToken::new();
        let settings_task = tokio::spawn(follow_settings(
            channel.clone(),
            settings,
            cancel.clone(),
        ));
        let event_task = tokio::spawn(pump_events(
            channel.subscribe(),
            queue.handle(),
            cancel.clone(),
        ));

        Self {
            api,
            channel,
            queue,
            scanner,
            cancel,
            settings_task,
            event_task,
        }
    }

    /// The backend API client, for skills and file listings.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Current push-channel connection state.
    pub async fn channel_state(&self) -> ConnectionState {
        self.channel.state().await
    }

    /// Channel status and proxy-request events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.channel.subscribe()
    }

    /// Command recognition events from the scanner.
    pub fn subscribe_recognized(&self) -> broadcast::Receiver<RecognizedCommand> {
        self.scanner.subscribe()
    }

    /// Queue a recognized command for execution out of band of auto-execute,
    /// e.g. after manual confirmation.
    pub fn run_command(&self, recognized: &RecognizedCommand) {
        self.queue.enqueue(QueueTask::Execute {
            command: recognized.command.clone(),
            key: Some(recognized.key.clone()),
        });
    }

    /// Fetch the backend's conversation-seeding prompt and insert it into the
    /// surface through the queue.
    pub async fn send_init_prompt(&self) -> Result<(), BridgeError> {
        let prompt = self.api.init_prompt().await?;
        self.queue.enqueue(QueueTask::Fill {
            text: prompt,
            auto_send: true,
        });
        Ok(())
    }

    /// Tear everything down in dependency order and drain the queue.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.settings_task.await;
        self.channel.stop().await;
        let _ = self.event_task.await;
        self.scanner.shutdown().await;
        self.queue.shutdown().await;
        info!("bridge shut down");
    }
}

/// Keep the channel matched to the endpoint the settings currently describe.
async fn follow_settings(
    channel: Arc<PushChannel>,
    mut settings: watch::Receiver<Settings>,
    cancel: CancellationToken,
) {
    let mut active: Option<(String, String)> = None;
    loop {
        let wanted = settings.borrow_and_update().channel_endpoint();
        if wanted != active {
            match &wanted {
                Some((url, token)) => {
                    info!(%url, "push channel endpoint configured");
                    channel.start(url.clone(), token.clone()).await;
                }
                None => {
                    info!("push channel endpoint removed");
                    channel.stop().await;
                }
            }
            active = wanted;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = settings.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

/// Forward proxied requests from the channel into the execution queue.
async fn pump_events(
    mut events: broadcast::Receiver<ChannelEvent>,
    queue: crate::queue::QueueHandle,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(ChannelEvent::ProxyRequest(request)) => {
                    info!(request_id = %request.request_id, "proxied request received");
                    queue.enqueue(QueueTask::Proxy(request));
                }
                Ok(ChannelEvent::Status { connected }) => {
                    debug!(connected, "push channel status changed");
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "channel events lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
