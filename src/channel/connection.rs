//! Pure connection state management for the live channel
//!
//! This module contains pure functions for connection state, the reconnect
//! policy, close-code classification and channel URL construction.

use crate::error::ChannelError;
use crate::transport::CloseInfo;
use std::time::Duration;
use url::Url;

/// Normal closure: the only code that suppresses reconnection
pub const CLOSE_NORMAL: u16 = 1000;
/// Close frame without a status code
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection lost without a close frame, or never established
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Connection state of a live channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// `connect` has never been called
    Idle,
    /// First handshake in progress
    Connecting,
    /// Socket open, frames flowing
    Connected,
    /// Closed with reason; may be followed by `Reconnecting`
    Disconnected(String),
    /// Waiting for or performing reconnect attempt N
    Reconnecting(u32),
    /// Retry ceiling reached, nothing more will happen without a new `connect`
    PermanentlyDisconnected(String),
}

/// Fixed-delay reconnection policy
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Attempts allowed after an abnormal close before giving up
    pub max_attempts: u32,
    /// Delay before every attempt, in milliseconds
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 3000,
        }
    }
}

impl ReconnectConfig {
    /// Wait before each reconnection attempt
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Whether the close was requested by one side on purpose
pub fn is_intentional_close(code: u16) -> bool {
    code == CLOSE_NORMAL
}

/// Close info for a peer close frame; a frame without status maps to 1005
pub fn close_info_from_frame(close: Option<CloseInfo>) -> CloseInfo {
    close.unwrap_or_else(|| CloseInfo {
        code: CLOSE_NO_STATUS,
        reason: "Closed without status".to_string(),
    })
}

/// Close info for a socket that vanished without a close frame
pub fn abnormal_close<S: Into<String>>(reason: S) -> CloseInfo {
    CloseInfo {
        code: CLOSE_ABNORMAL,
        reason: reason.into(),
    }
}

/// Build `{ws_base}{endpoint}` and append `token` when one is available
pub fn build_channel_url(
    ws_base_url: &str,
    endpoint: &str,
    token: Option<&str>,
) -> Result<String, ChannelError> {
    if endpoint.is_empty() {
        return Err(ChannelError::InvalidEndpoint(
            "endpoint path cannot be empty".to_string(),
        ));
    }
    let path = if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{endpoint}")
    };

    let raw = format!("{}{}", ws_base_url.trim_end_matches('/'), path);
    let mut url = Url::parse(&raw).map_err(|e| ChannelError::InvalidUrl(format!("{raw}: {e}")))?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ChannelError::InvalidUrl(format!(
            "{raw}: scheme must be ws or wss"
        )));
    }

    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }

    Ok(url.to_string())
}

/// URL with the `token` query value masked, for logs
pub fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| {
                    let value = if k == "token" { "***".to_string() } else { v.into_owned() };
                    (k.into_owned(), value)
                })
                .collect();
            if pairs.is_empty() {
                return parsed.to_string();
            }
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
            parsed.to_string()
        }
        Err(_) => crate::error::sanitize_error_message(url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.delay_ms, 3000);
        assert_eq!(config.delay(), Duration::from_secs(3));
    }

    #[test]
    fn test_close_classification() {
        assert!(is_intentional_close(CLOSE_NORMAL));
        assert!(!is_intentional_close(CLOSE_NO_STATUS));
        assert!(!is_intentional_close(CLOSE_ABNORMAL));
        assert!(!is_intentional_close(1008));
        assert!(!is_intentional_close(1011));
        assert!(!is_intentional_close(4001));
    }

    #[test]
    fn test_close_frame_without_status() {
        let info = close_info_from_frame(None);
        assert_eq!(info.code, CLOSE_NO_STATUS);

        let info = close_info_from_frame(Some(CloseInfo {
            code: 1000,
            reason: "done".to_string(),
        }));
        assert_eq!(info.code, 1000);
        assert_eq!(info.reason, "done");
    }

    #[test]
    fn test_build_channel_url_without_token() {
        let url = build_channel_url("ws://127.0.0.1:8000", "/ws/notifications/", None).unwrap();
        assert_eq!(url, "ws://127.0.0.1:8000/ws/notifications/");
    }

    #[test]
    fn test_build_channel_url_with_token() {
        let url = build_channel_url(
            "wss://api.example.com",
            "/ws/tracking/SC123/",
            Some("a.b+c/d="),
        )
        .unwrap();
        assert_eq!(
            url,
            "wss://api.example.com/ws/tracking/SC123/?token=a.b%2Bc%2Fd%3D"
        );
    }

    #[test]
    fn test_build_channel_url_adds_leading_slash() {
        let url = build_channel_url("ws://host/", "ws/driver-updates/", None).unwrap();
        assert_eq!(url, "ws://host/ws/driver-updates/");
    }

    #[test]
    fn test_build_channel_url_rejects_bad_input() {
        assert!(matches!(
            build_channel_url("ws://host", "", None),
            Err(ChannelError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            build_channel_url("http://host", "/ws/x/", None),
            Err(ChannelError::InvalidUrl(_))
        ));
        assert!(matches!(
            build_channel_url("not a base", "/ws/x/", None),
            Err(ChannelError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_redact_url() {
        let redacted = redact_url("wss://host/ws/notifications/?token=secret");
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("token="));
        assert_eq!(
            redact_url("ws://host/ws/notifications/"),
            "ws://host/ws/notifications/"
        );
    }

    #[test]
    fn test_connection_state_equality() {
        assert_eq!(ConnectionState::Connected, ConnectionState::Connected);
        assert_eq!(
            ConnectionState::Disconnected("test".to_string()),
            ConnectionState::Disconnected("test".to_string())
        );
        assert_ne!(ConnectionState::Reconnecting(1), ConnectionState::Reconnecting(2));
    }
}
