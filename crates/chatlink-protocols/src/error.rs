//! Bridge error taxonomy.

use thiserror::Error;

/// Errors surfaced by the bridge core.
///
/// Channel-level failures never reach consumers as errors - they manifest only
/// as disconnected status events plus silent retry. Everything else is caught
/// at the queue boundary and converted into text written to the surface.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Network or stream failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend rejected the credential (HTTP 401).
    #[error("authentication failed: re-enter the access token")]
    Auth,

    /// Non-2xx response other than 401.
    #[error("HTTP {0}")]
    Http(u16),

    /// Malformed command block or malformed server payload.
    #[error("parse error: {0}")]
    Parse(String),

    /// Reply stabilization exceeded the waiting deadline.
    #[error("timed out waiting for the reply")]
    Timeout,

    /// No base URL configured; no network attempt was made.
    #[error("not configured: {0}")]
    Configuration(String),

    /// The surface capability failed (editor or send control unavailable).
    #[error("surface error: {0}")]
    Surface(String),
}

impl BridgeError {
    /// True for failures that stem from the credential, not the request.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth)
    }
}
