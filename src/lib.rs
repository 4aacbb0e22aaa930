//! # chatlink
//!
//! Bridges a human-facing AI chat page with an external automation backend.
//! The crate watches rendered chat text for delimited tool-call blocks,
//! executes them against the backend, and writes results back into the
//! conversation; independently it lets the backend drive the chat page as a
//! proxied inference channel over a persistent SSE subscription.
//!
//! ## Components
//!
//! - [`channel::PushChannel`] - resilient SSE client with backoff reconnect
//!   and broadcast fan-out
//! - [`batch::BatchTrigger`] - debounce + max-wait coalescer for mutation bursts
//! - [`extract`] - pure dialect-tolerant tool-call extraction
//! - [`dedup`] - persistent TTL-expiring handled-key store
//! - [`queue::ExecutionQueue`] - strict FIFO single-lane task runner
//! - [`correlator::ReplyCorrelator`] - drives the page for proxied requests and
//!   detects reply completion from mutation patterns
//! - [`bridge::Bridge`] - supervisor wiring everything to the settings store
//!
//! Platform access goes exclusively through the capability traits in
//! [`chatlink_protocols`]; [`sim::SimPage`] provides an in-memory page for
//! tests and embedding.

pub mod api;
pub mod batch;
pub mod bridge;
pub mod channel;
pub mod correlator;
pub mod dedup;
pub mod extract;
pub mod queue;
pub mod scanner;
pub mod settings;
pub mod sim;

pub use chatlink_protocols::{
    BridgeError, ChangeObservation, ChannelEvent, Command, ExecResponse, FillMode, Node,
    ProxyRequest, RegionId, SkillInfo, Surface,
};

pub use api::ApiClient;
pub use batch::{BatchConfig, BatchTrigger};
pub use bridge::{Bridge, BridgeConfig};
pub use channel::{ChannelConfig, ChannelStatus, ConnectionState, PushChannel};
pub use correlator::{CorrelatorConfig, ReplyCorrelator};
pub use dedup::{DedupKey, DedupStore, FileDedupStore, MemoryDedupStore};
pub use queue::{ExecutionQueue, QueueConfig, QueueHandle, QueueTask};
pub use scanner::{ChangeScanner, RecognizedCommand};
pub use settings::{MemorySettings, Settings, SettingsStore};
pub use sim::SimPage;
