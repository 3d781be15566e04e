//! Error types for the courier live-update channel
//!
//! Errors never cross the `connect`/`send`/`disconnect` boundary of
//! [`crate::channel::LiveChannel`]; they are turned into `Error` events with
//! [`ChannelError::to_event_message`], which strips credentials first.

use crate::channel::ConnectionState;
use crate::transport::TransportError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for channel operations
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to build channel URL: {0}")]
    InvalidUrl(String),

    #[error("Credential lookup failed: {message}")]
    Credentials { message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("Channel is not connected (state: {state:?})")]
    NotConnected { state: ConnectionState },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChannelError {
    /// Create credential lookup error
    pub fn credentials<S: Into<String>>(message: S) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }

    /// Text carried by an `Error` event
    pub fn to_event_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

static SECRET_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(password|token|key|secret)([=:]\s*)[^\s&]+").ok());

/// Redact credentials that may appear in URLs or transport error text and
/// cap the message at 500 bytes.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = match SECRET_PATTERN.as_ref() {
        Some(pattern) => pattern.replace_all(message, "${1}${2}***").to_string(),
        None => message.to_string(),
    };

    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;
