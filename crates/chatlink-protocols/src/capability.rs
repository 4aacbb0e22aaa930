//! Capability traits consumed by the bridge core.
//!
//! These are the only seams to the host platform: a [`Surface`] for everything
//! that touches the chat input and send control, and a [`ChangeObservation`]
//! for region-level content change notifications. Substituting them per target
//! site is the host's job; the core stays platform-free.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::dom::Node;
use crate::error::BridgeError;

/// Opaque identity of a logical content container (a "region") on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u64);

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "region-{}", self.0)
    }
}

/// How text is written into the input editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Append below any existing draft (tool results).
    Append,
    /// Replace the whole draft (proxied prompts).
    Replace,
}

/// The chat page's input/output area and send control.
///
/// A single shared resource: every interaction must be serialized through the
/// execution queue, never called concurrently from two tasks.
#[async_trait]
pub trait Surface: Send + Sync {
    /// Write text into the input editor.
    async fn fill(&self, text: &str, mode: FillMode) -> Result<(), BridgeError>;

    /// Trigger the surface's send action for the current draft.
    async fn trigger_send(&self) -> Result<(), BridgeError>;

    /// Click the stop-generation control. Returns `false` when the current
    /// site has no such control.
    async fn click_stop(&self) -> bool;

    /// Reply-bearing regions in document order.
    async fn reply_regions(&self) -> Vec<RegionId>;

    /// Snapshot of one reply region's content tree, if it still exists.
    async fn reply_node(&self, region: RegionId) -> Option<Node>;
}

/// Region-level content change notifications.
#[async_trait]
pub trait ChangeObservation: Send + Sync {
    /// Subscribe to change notifications. A notification names the region
    /// whose content changed (including a region that just appeared).
    fn subscribe(&self) -> broadcast::Receiver<RegionId>;

    /// Whether the platform delivers mutation notifications at all. When
    /// `false`, the reply correlator falls back to a fixed delay.
    fn supports_watching(&self) -> bool {
        true
    }

    /// All currently rendered regions, for the startup rescan.
    async fn regions(&self) -> Vec<RegionId>;

    /// Snapshot of one region's current content tree.
    async fn snapshot(&self, region: RegionId) -> Option<Node>;

    /// Stable identifier of the current conversation, used in dedup keys.
    fn conversation_id(&self) -> String;
}
