//! # chatlink Protocols
//!
//! Domain types, error taxonomy, and capability traits for the chatlink bridge.
//! Contains the wire shapes shared with the backend, the platform-neutral content
//! tree, and the interfaces the core consumes - no platform code.
//!
//! ## Capability traits
//!
//! - [`Surface`] - the chat page's input/output area and send control
//! - [`ChangeObservation`] - region-level content change notifications

pub mod capability;
pub mod command;
pub mod dom;
pub mod error;

pub use capability::{ChangeObservation, FillMode, RegionId, Surface};
pub use command::{ChannelEvent, Command, ExecResponse, ProxyRequest, SkillInfo};
pub use dom::Node;
pub use error::BridgeError;
