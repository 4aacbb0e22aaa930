//! Wire types shared with the automation backend.

use serde::{Deserialize, Serialize};

/// One recognized instruction extracted from rendered chat text.
///
/// Immutable once parsed; consumed exactly once by the execution queue.
/// Serializes to the backend's `/exec` body shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command name, e.g. `"search"`.
    pub name: String,

    /// Parameter mapping. Insertion order is irrelevant.
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,

    /// Caller-supplied call identifier, present only when the source carried one.
    #[serde(rename = "callId", default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl Command {
    /// Create a command with no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: serde_json::Map::new(),
            call_id: None,
        }
    }

    /// Add a string argument.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }

    /// Set the call identifier.
    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }
}

/// Response body of the backend's `/exec` endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecResponse {
    /// Successful output, if any.
    pub output: Option<String>,

    /// Error text reported by the executed command.
    pub error: Option<String>,

    /// When set, the surface's stop control should be clicked before the
    /// result is written back.
    #[serde(rename = "stopStream", default)]
    pub stop_stream: bool,
}

/// A proxied inference request delivered over the push channel.
///
/// Processed to completion (success or error) strictly in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    /// Correlation id assigned by the backend.
    pub request_id: String,

    /// Prompt to submit to the chat surface.
    pub prompt: String,
}

/// Event fanned out by the push-channel manager to all consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Connection status changed.
    Status {
        /// Whether the subscription is currently live.
        connected: bool,
    },

    /// The backend asked for a proxied exchange.
    ProxyRequest(ProxyRequest),
}

/// One entry of the backend's skills listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
