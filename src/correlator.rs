//! Request/reply correlator.
//!
//! Drives the chat surface on behalf of a remote caller: submit the prompt,
//! then decide from mutation patterns alone when the reply has finished
//! streaming. A change counts only if a new reply region appeared or the
//! previously-last region's text differs from the pre-submit snapshot; either
//! restarts a short stabilization timer, and quiet for its full length means
//! the reply is complete.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use chatlink_protocols::dom::reply_text;
use chatlink_protocols::{BridgeError, ChangeObservation, FillMode, RegionId, Surface};

/// Correlator timing.
#[derive(Debug, Clone, Copy)]
pub struct CorrelatorConfig {
    /// Pause between filling the prompt and triggering send.
    pub submit_settle: Duration,

    /// Quiet period after the last relevant change before the reply is
    /// considered complete.
    pub stabilize: Duration,

    /// Overall deadline; exceeding it fails the call instead of resolving.
    pub deadline: Duration,

    /// Fixed wait used when the platform offers no mutation observation.
    pub fallback_wait: Duration,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            submit_settle: Duration::from_millis(300),
            stabilize: Duration::from_millis(800),
            deadline: Duration::from_secs(180),
            fallback_wait: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ReplyProbe {
    count: usize,
    last: Option<(RegionId, String)>,
}

/// Submits prompts for proxied requests and captures the stabilized reply.
pub struct ReplyCorrelator {
    surface: Arc<dyn Surface>,
    observation: Arc<dyn ChangeObservation>,
    config: CorrelatorConfig,
}

impl ReplyCorrelator {
    pub fn new(
        surface: Arc<dyn Surface>,
        observation: Arc<dyn ChangeObservation>,
        config: CorrelatorConfig,
    ) -> Self {
        Self {
            surface,
            observation,
            config,
        }
    }

    /// Submit `prompt` and wait for the reply to stabilize.
    ///
    /// Must be serialized with all other surface interaction; the execution
    /// queue guarantees exactly one correlation is outstanding at a time.
    pub async fn correlate(&self, request_id: &str, prompt: &str) -> Result<String, BridgeError> {
        debug!(request_id, "submitting proxied prompt");
        let before = self.probe().await;

        self.surface.fill(prompt, FillMode::Replace).await?;
        time::sleep(self.config.submit_settle).await;
        self.surface.trigger_send().await?;

        if !self.observation.supports_watching() {
            time::sleep(self.config.fallback_wait).await;
            let after = self.probe().await;
            return Ok(after.last.map(|(_, text)| text).unwrap_or_default());
        }

        // Subscribe before the reply can start streaming; dropped on return.
        let mut watcher = self.observation.subscribe();
        let deadline = Instant::now() + self.config.deadline;
        let mut quiet_at: Option<Instant> = None;
        let mut watcher_open = true;

        loop {
            let quiet_deadline = quiet_at.unwrap_or_else(|| deadline + Duration::from_secs(1));
            tokio::select! {
                _ = time::sleep_until(deadline) => {
                    warn!(request_id, "reply never stabilized before the deadline");
                    return Err(BridgeError::Timeout);
                }
                _ = time::sleep_until(quiet_deadline), if quiet_at.is_some() => {
                    break;
                }
                received = watcher.recv(), if watcher_open => {
                    match received {
                        Ok(_) | Err(RecvError::Lagged(_)) => {
                            let now = self.probe().await;
                            if is_reply_progress(&before, &now) {
                                quiet_at = Some(Instant::now() + self.config.stabilize);
                            }
                        }
                        Err(RecvError::Closed) => watcher_open = false,
                    }
                }
            }
        }
        drop(watcher);

        let after = self.probe().await;
        let text = after.last.map(|(_, text)| text).unwrap_or_default();
        debug!(request_id, chars = text.len(), "reply stabilized");
        Ok(text)
    }

    async fn probe(&self) -> ReplyProbe {
        let regions = self.surface.reply_regions().await;
        let count = regions.len();
        let last = match regions.last() {
            Some(&region) => {
                let text = match self.surface.reply_node(region).await {
                    Some(node) => reply_text(&node),
                    None => String::new(),
                };
                Some((region, text))
            }
            None => None,
        };
        ReplyProbe { count, last }
    }
}

/// Did this mutation represent reply progress?
///
/// Either a new reply region appeared, or the previously-last region is still
/// the last one but its text moved on from the pre-submit snapshot. An edit
/// to an earlier region after a later one appended is deliberately ignored.
fn is_reply_progress(before: &ReplyProbe, now: &ReplyProbe) -> bool {
    if now.count > before.count {
        return true;
    }
    match (&before.last, &now.last) {
        (Some((before_region, before_text)), Some((now_region, now_text))) => {
            now_region == before_region && now_text != before_text
        }
        _ => false,
    }
}

#[cfg(test)]
#[path = "correlator_tests.rs"]
mod tests;
