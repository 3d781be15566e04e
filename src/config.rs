//! Configuration system for the courier live-update channel
//!
//! Settings are read from a TOML file. Every section is optional so that a
//! bare `[server]` table is enough to talk to a local backend.

use crate::channel::health_monitor::HealthMonitor;
use crate::channel::ReconnectConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable that overrides `server.base_url`
pub const API_URL_ENV: &str = "COURIER_API_URL";

/// Locations tried, in order, when no config file is given
pub const CONFIG_SEARCH_PATHS: &[&str] = &["courier-live.toml", "config/courier-live.toml"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LiveConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub auth: AuthSection,
}

/// Backend server location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// REST base URL of the backend; the WebSocket base is derived from it
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upper bound on a single WebSocket handshake in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Fixed-delay reconnect policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    /// Attempts allowed after an abnormal close (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds (default: 3000)
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_delay_ms() -> u64 {
    3000
}

/// Where the bearer token comes from. Both fields are optional; when both
/// are set the environment variable wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AuthSection {
    /// Environment variable holding the token
    pub token_env: Option<String>,
    /// JSON key/value file holding the token (see [`crate::auth::TokenStore`])
    pub token_store: Option<PathBuf>,
}

/// Settings consumed by [`crate::channel::LiveChannel`]
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// `ws://` or `wss://` base without trailing slash
    pub ws_base_url: String,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ws_base_url: "ws://127.0.0.1:8000".to_string(),
            connect_timeout: Duration::from_millis(default_connect_timeout_ms()),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LiveConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: LiveConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Configuration used when no file is found
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = LiveConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.server.base_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        websocket_base_url(&self.server.base_url)?;

        HealthMonitor::validate_connection_config(&self.reconnect_config())
            .map_err(|e| ConfigError::InvalidConfig(format!("reconnect.{e}")))?;
        if self.server.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the runtime settings for a [`crate::channel::LiveChannel`]
    pub fn channel_config(&self) -> Result<ChannelConfig, ConfigError> {
        Ok(ChannelConfig {
            ws_base_url: websocket_base_url(&self.server.base_url)?,
            connect_timeout: Duration::from_millis(self.server.connect_timeout_ms),
            reconnect: self.reconnect_config(),
        })
    }

    fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.reconnect.max_attempts,
            delay_ms: self.reconnect.delay_ms,
        }
    }
}

/// Derive the WebSocket base from the REST base URL.
///
/// `https` maps to `wss`, `http` to `ws`; `ws`/`wss` pass through. Any path
/// on the base is kept and trailing slashes are dropped, because endpoint
/// paths always start with `/`.
pub fn websocket_base_url(base_url: &str) -> Result<String, ConfigError> {
    let mut url =
        Url::parse(base_url).map_err(|_| ConfigError::InvalidBaseUrl(base_url.to_string()))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        _ => return Err(ConfigError::InvalidBaseUrl(base_url.to_string())),
    };
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidBaseUrl(base_url.to_string()));
    }
    url.set_scheme(scheme)
        .map_err(|_| ConfigError::InvalidBaseUrl(base_url.to_string()))?;
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[server]
base_url = "https://api.swiftcourier.example"
connect_timeout_ms = 5000

[reconnect]
max_attempts = 7
delay_ms = 1500

[auth]
token_env = "SWIFTCOURIER_TOKEN"
token_store = "/var/lib/courier/storage.json"
"#;

        let config: LiveConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.base_url, "https://api.swiftcourier.example");
        assert_eq!(config.server.connect_timeout_ms, 5000);
        assert_eq!(config.reconnect.max_attempts, 7);
        assert_eq!(config.reconnect.delay_ms, 1500);
        assert_eq!(config.auth.token_env.as_deref(), Some("SWIFTCOURIER_TOKEN"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: LiveConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.delay_ms, 3000);
        assert_eq!(config.auth, AuthSection::default());
    }

    #[test]
    fn test_channel_config_translation() {
        let config: LiveConfig = toml::from_str(
            r#"
[server]
base_url = "https://api.example.com/"
"#,
        )
        .unwrap();

        let channel = config.channel_config().unwrap();
        assert_eq!(channel.ws_base_url, "wss://api.example.com");
        assert_eq!(channel.connect_timeout, Duration::from_secs(10));
        assert_eq!(channel.reconnect.max_attempts, 5);
        assert_eq!(channel.reconnect.delay_ms, 3000);
    }

    #[test]
    fn test_websocket_base_url_schemes() {
        assert_eq!(
            websocket_base_url("http://127.0.0.1:8000").unwrap(),
            "ws://127.0.0.1:8000"
        );
        assert_eq!(
            websocket_base_url("https://courier.example").unwrap(),
            "wss://courier.example"
        );
        assert_eq!(
            websocket_base_url("wss://courier.example/api/").unwrap(),
            "wss://courier.example/api"
        );
        assert!(matches!(
            websocket_base_url("ftp://courier.example"),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            websocket_base_url("not a url"),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config: LiveConfig = toml::from_str(
            r#"
[reconnect]
max_attempts = 0
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_delay_rejected() {
        let config: LiveConfig = toml::from_str(
            r#"
[reconnect]
delay_ms = 0
"#,
        )
        .unwrap();
        match config.validate() {
            Err(ConfigError::InvalidConfig(message)) => {
                assert_eq!(message, "reconnect.delay_ms must be greater than 0");
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
base_url = "http://localhost:9000"

[reconnect]
delay_ms = 250
"#
        )
        .unwrap();

        let config = LiveConfig::load_from_file(file.path());
        // COURIER_API_URL may be set in the environment running the tests
        if std::env::var(API_URL_ENV).is_err() {
            let config = config.unwrap();
            assert_eq!(config.server.base_url, "http://localhost:9000");
            assert_eq!(config.reconnect.delay_ms, 250);
        }
    }

    #[test]
    fn test_load_missing_file() {
        let result = LiveConfig::load_from_file(Path::new("/nonexistent/courier-live.toml"));
        assert!(matches!(result, Err(ConfigError::FileRead(_))));
    }
}
