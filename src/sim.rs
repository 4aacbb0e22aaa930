//! In-memory page for tests and embedding.
//!
//! [`SimPage`] implements both capability traits over a scriptable model of a
//! chat page: reply regions holding [`Node`] trees, an input draft, a send
//! control, and region-level change notifications.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use chatlink_protocols::{BridgeError, ChangeObservation, FillMode, Node, RegionId, Surface};

struct PageState {
    regions: Vec<(RegionId, Node)>,
    next_region: u64,
    input: String,
    sent: Vec<String>,
    stop_clicks: usize,
    has_stop: bool,
    watching: bool,
    conversation: String,
}

/// A scriptable in-memory chat page.
pub struct SimPage {
    state: Mutex<PageState>,
    changes: broadcast::Sender<RegionId>,
}

impl SimPage {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(PageState {
                regions: Vec::new(),
                next_region: 0,
                input: String::new(),
                sent: Vec::new(),
                stop_clicks: 0,
                has_stop: true,
                watching: true,
                conversation: "sim-conversation".to_string(),
            }),
            changes,
        }
    }

    /// Use a specific conversation identifier.
    pub fn with_conversation(self, id: impl Into<String>) -> Self {
        self.state.lock().unwrap().conversation = id.into();
        self
    }

    /// Model a site without mutation observation support.
    pub fn without_watching(self) -> Self {
        self.state.lock().unwrap().watching = false;
        self
    }

    /// Model a site without a stop-generation control.
    pub fn without_stop_control(self) -> Self {
        self.state.lock().unwrap().has_stop = false;
        self
    }

    /// Append a new reply region and notify watchers.
    pub fn push_region(&self, node: Node) -> RegionId {
        let region = {
            let mut state = self.state.lock().unwrap();
            let region = RegionId(state.next_region);
            state.next_region += 1;
            state.regions.push((region, node));
            region
        };
        let _ = self.changes.send(region);
        region
    }

    /// Replace a region's content in place and notify watchers.
    pub fn update_region(&self, region: RegionId, node: Node) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.regions.iter_mut().find(|(id, _)| *id == region) {
            entry.1 = node;
        }
        drop(state);
        let _ = self.changes.send(region);
    }

    /// Emit a mutation notification without changing any content.
    pub fn touch(&self, region: RegionId) {
        let _ = self.changes.send(region);
    }

    /// The current input draft.
    pub fn input_text(&self) -> String {
        self.state.lock().unwrap().input.clone()
    }

    /// Every draft that was submitted, in order.
    pub fn sent_prompts(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }

    /// How often the stop control was clicked.
    pub fn stop_clicks(&self) -> usize {
        self.state.lock().unwrap().stop_clicks
    }

    /// Number of live mutation watchers.
    pub fn watcher_count(&self) -> usize {
        self.changes.receiver_count()
    }
}

impl Default for SimPage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Surface for SimPage {
    async fn fill(&self, text: &str, mode: FillMode) -> Result<(), BridgeError> {
        let mut state = self.state.lock().unwrap();
        match mode {
            FillMode::Replace => state.input = text.to_string(),
            FillMode::Append => {
                if state.input.is_empty() {
                    state.input = text.to_string();
                } else {
                    state.input = format!("{}\n{}", state.input, text);
                }
            }
        }
        Ok(())
    }

    async fn trigger_send(&self) -> Result<(), BridgeError> {
        let mut state = self.state.lock().unwrap();
        let draft = std::mem::take(&mut state.input);
        state.sent.push(draft);
        Ok(())
    }

    async fn click_stop(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.has_stop {
            return false;
        }
        state.stop_clicks += 1;
        true
    }

    async fn reply_regions(&self) -> Vec<RegionId> {
        self.state
            .lock()
            .unwrap()
            .regions
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }

    async fn reply_node(&self, region: RegionId) -> Option<Node> {
        self.state
            .lock()
            .unwrap()
            .regions
            .iter()
            .find(|(id, _)| *id == region)
            .map(|(_, node)| node.clone())
    }
}

#[async_trait]
impl ChangeObservation for SimPage {
    fn subscribe(&self) -> broadcast::Receiver<RegionId> {
        self.changes.subscribe()
    }

    fn supports_watching(&self) -> bool {
        self.state.lock().unwrap().watching
    }

    async fn regions(&self) -> Vec<RegionId> {
        Surface::reply_regions(self).await
    }

    async fn snapshot(&self, region: RegionId) -> Option<Node> {
        Surface::reply_node(self, region).await
    }

    fn conversation_id(&self) -> String {
        self.state.lock().unwrap().conversation.clone()
    }
}
