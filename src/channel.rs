//! Push-channel manager.
//!
//! Owns one logical subscription to the backend's SSE endpoint and fans
//! parsed events out to every consumer. The subscription survives an
//! unreliable network by reconnecting with exponential backoff; consumers
//! only ever observe ordered events and connected/disconnected status
//! changes, never transport errors.

use std::sync::Mutex;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chatlink_protocols::{ChannelEvent, ProxyRequest};

/// SSE event name the manager acts on.
const PROXY_EVENT: &str = "proxy_request";

/// Reconnect timing.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// First reconnect delay; doubles per consecutive failure.
    pub backoff_base: Duration,

    /// Upper bound on the reconnect delay. Attempts are unbounded in count.
    pub backoff_cap: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(3000),
            backoff_cap: Duration::from_millis(60_000),
        }
    }
}

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Introspectable state of the one logical subscription.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub url: String,
    pub credential: String,
    pub status: ChannelStatus,
    pub retry_count: u32,
}

impl ConnectionState {
    fn idle() -> Self {
        Self {
            url: String::new(),
            credential: String::new(),
            status: ChannelStatus::Disconnected,
            retry_count: 0,
        }
    }
}

struct Active {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Resilient SSE client with multi-consumer fan-out.
///
/// At most one underlying subscription exists at any time; [`start`] always
/// supersedes (aborts) the previous one, and [`stop`] tears down and
/// suppresses reconnection.
///
/// [`start`]: PushChannel::start
/// [`stop`]: PushChannel::stop
pub struct PushChannel {
    client: reqwest::Client,
    config: ChannelConfig,
    events: broadcast::Sender<ChannelEvent>,
    state: std::sync::Arc<RwLock<ConnectionState>>,
    active: Mutex<Option<Active>>,
}

impl PushChannel {
    pub fn new(config: ChannelConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            client: reqwest::Client::new(),
            config,
            events,
            state: std::sync::Arc::new(RwLock::new(ConnectionState::idle())),
            active: Mutex::new(None),
        }
    }

    /// Subscribe to status changes and domain events, in server order.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Current connection state snapshot.
    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// Open the subscription. Idempotent: any existing subscription, in-flight
    /// attempt, or pending retry timer is cancelled first.
    pub async fn start(&self, url: impl Into<String>, credential: impl Into<String>) {
        let url = url.into();
        let credential = credential.into();
        self.cancel_active();

        {
            let mut state = self.state.write().await;
            *state = ConnectionState {
                url: url.clone(),
                credential: credential.clone(),
                status: ChannelStatus::Connecting,
                retry_count: 0,
            };
        }

        info!(%url, "starting push channel");
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            self.client.clone(),
            self.config,
            url,
            credential,
            self.events.clone(),
            self.state.clone(),
            cancel.clone(),
        ));
        *self.active.lock().expect("channel lock") = Some(Active { cancel, task });
    }

    /// Tear down the subscription and suppress reconnection.
    pub async fn stop(&self) {
        self.cancel_active();
        let mut state = self.state.write().await;
        *state = ConnectionState::idle();
        drop(state);
        info!("push channel stopped");
        let _ = self.events.send(ChannelEvent::Status { connected: false });
    }

    fn cancel_active(&self) {
        if let Some(active) = self.active.lock().expect("channel lock").take() {
            active.cancel.cancel();
            active.task.abort();
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.cancel_active();
    }
}

async fn run(
    client: reqwest::Client,
    config: ChannelConfig,
    url: String,
    credential: String,
    events: broadcast::Sender<ChannelEvent>,
    state: std::sync::Arc<RwLock<ConnectionState>>,
    cancel: CancellationToken,
) {
    let mut retry: u32 = 0;
    loop {
        {
            let mut state = state.write().await;
            state.status = ChannelStatus::Connecting;
            state.retry_count = retry;
        }

        let attempt = client.get(&url).bearer_auth(&credential).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return,
            response = attempt => response,
        };

        match response {
            Ok(response) if response.status().is_success() => {
                retry = 0;
                {
                    let mut state = state.write().await;
                    state.status = ChannelStatus::Connected;
                    state.retry_count = 0;
                }
                let _ = events.send(ChannelEvent::Status { connected: true });
                info!(%url, "push channel connected");

                if read_stream(response, &events, &cancel).await {
                    return; // local cancellation, not a failure
                }
                warn!(%url, "push channel stream ended");
            }
            Ok(response) => {
                warn!(%url, status = response.status().as_u16(), "push channel rejected");
            }
            Err(e) => {
                if cancel.is_cancelled() {
                    return;
                }
                warn!(%url, error = %e, "push channel connect failed");
            }
        }

        state.write().await.status = ChannelStatus::Disconnected;
        let _ = events.send(ChannelEvent::Status { connected: false });

        let delay = backoff_delay(&config, retry);
        retry = retry.saturating_add(1);
        debug!(?delay, retry, "scheduling reconnect");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = time::sleep(delay) => {}
        }
    }
}

/// Read the event stream until it ends. Returns `true` on local cancellation.
async fn read_stream(
    response: reqwest::Response,
    events: &broadcast::Sender<ChannelEvent>,
    cancel: &CancellationToken,
) -> bool {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return true,
            chunk = stream.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                // Records are blank-line terminated.
                while let Some(split) = buffer.find("\n\n") {
                    let record: String = buffer.drain(..split + 2).collect();
                    if let Some(event) = parse_record(record.trim_end()) {
                        let _ = events.send(event);
                    }
                }
            }
            Some(Err(e)) => {
                if cancel.is_cancelled() {
                    return true;
                }
                warn!(error = %e, "push channel read failed");
                return false;
            }
            None => return false,
        }
    }
}

/// Parse one blank-line-terminated record of `event:`/`data:` lines.
///
/// Only the recognized domain event is acted on; malformed payloads are
/// logged and dropped, never fatal.
pub(crate) fn parse_record(raw: &str) -> Option<ChannelEvent> {
    let mut event_type = "";
    let mut data = "";
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event_type = rest.trim();
        } else if let Some(rest) = line.strip_prefix("data:") {
            data = rest.trim();
        }
    }
    if event_type != PROXY_EVENT || data.is_empty() {
        return None;
    }
    match serde_json::from_str::<ProxyRequest>(data) {
        Ok(request) => Some(ChannelEvent::ProxyRequest(request)),
        Err(e) => {
            warn!(error = %e, "dropping malformed proxy_request payload");
            None
        }
    }
}

/// `min(base * 2^retry, cap)`.
pub(crate) fn backoff_delay(config: &ChannelConfig, retry: u32) -> Duration {
    let base = config.backoff_base.as_millis() as u64;
    let cap = config.backoff_cap.as_millis() as u64;
    let factor = 1u64 << retry.min(20);
    Duration::from_millis(base.saturating_mul(factor).min(cap))
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
