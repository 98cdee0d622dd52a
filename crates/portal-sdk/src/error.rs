use std::path::PathBuf;

use crate::transport::TransportError;

/// Unified error type for the portal-sdk crate.
///
/// Protocol-level problems (malformed or misaddressed messages, navigation
/// outside an allow-list) are not represented here: they are dropped or
/// answered in-band. This type covers the failures a caller has to handle.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// The host never acknowledged `app:ready` before the deadline.
    #[error("initialization of app '{app_id}' timed out after {timeout_ms}ms")]
    InitTimeout { app_id: String, timeout_ms: u64 },

    /// The agent was destroyed while an operation was pending.
    #[error("agent terminated")]
    Terminated,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid entry point for app '{app_id}': {reason}")]
    InvalidEntryPoint { app_id: String, reason: String },

    #[error("config not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using [`PortalError`].
pub type PortalResult<T> = Result<T, PortalError>;
