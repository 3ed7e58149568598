//! Error types for routing, sessions and transports.

use thiserror::Error;

/// Engine-level errors.
///
/// These describe failures of the engine itself (building a table, talking
/// to a session store, binding a transport). Failures raised by user
/// callbacks while serving a request are [`Fault`](crate::Fault)s instead.
#[derive(Debug, Error)]
pub enum WebError {
    /// Invalid path pattern.
    #[error("invalid path pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Session identifier unknown to the store.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Body could not be encoded or decoded.
    #[error("body codec error ({content_type}): {reason}")]
    Codec {
        content_type: String,
        reason: String,
    },

    /// Settings rejected by validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Transport adapter failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WebError {
    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, WebError>;
