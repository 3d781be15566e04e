//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling.
//! `COURIER_API_URL` in the test environment overrides `server.base_url`, so
//! assertions on the base URL are skipped when it is set.

use courier_live::auth::{provider_from_config, CredentialProvider};
use courier_live::config::{ConfigError, LiveConfig, API_URL_ENV};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

fn config_file(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

fn base_url_overridden() -> bool {
    std::env::var(API_URL_ENV).is_ok_and(|url| !url.trim().is_empty())
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = config_file(
        r#"
[server]
base_url = "https://api.swiftcourier.example"
connect_timeout_ms = 4000

[reconnect]
max_attempts = 3
delay_ms = 1000

[auth]
token_env = "SWIFTCOURIER_TOKEN"
"#,
    );

    let config = LiveConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.server.connect_timeout_ms, 4000);
    assert_eq!(config.reconnect.max_attempts, 3);
    assert_eq!(config.reconnect.delay_ms, 1000);
    assert_eq!(config.auth.token_env.as_deref(), Some("SWIFTCOURIER_TOKEN"));
    assert_eq!(config.auth.token_store, None);

    if !base_url_overridden() {
        let channel = config.channel_config().unwrap();
        assert_eq!(channel.ws_base_url, "wss://api.swiftcourier.example");
        assert_eq!(channel.connect_timeout, Duration::from_secs(4));
        assert_eq!(channel.reconnect.max_attempts, 3);
        assert_eq!(channel.reconnect.delay_ms, 1000);
    }
}

#[test]
fn test_config_applies_default_reconnect_policy_when_not_specified() {
    let temp_file = config_file(
        r#"
[server]
base_url = "http://localhost:8000"
"#,
    );

    let config = LiveConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.reconnect.max_attempts, 5);
    assert_eq!(config.reconnect.delay_ms, 3000);
    assert_eq!(config.server.connect_timeout_ms, 10_000);
    assert_eq!(config.auth.token_env, None);
}

#[test]
fn test_empty_file_is_a_valid_configuration() {
    let temp_file = config_file("");

    let config = LiveConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.reconnect.max_attempts, 5);
    if !base_url_overridden() {
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
        assert_eq!(
            config.channel_config().unwrap().ws_base_url,
            "ws://127.0.0.1:8000"
        );
    }
}

#[test]
fn test_config_returns_error_for_invalid_toml_syntax() {
    let temp_file = config_file(
        r#"
[server
base_url = "http://localhost:8000"
"#,
    );

    let result = LiveConfig::load_from_file(temp_file.path());

    match result {
        Err(ConfigError::TomlParse(_)) => {}
        other => panic!("Expected TomlParse error for invalid TOML syntax, got {other:?}"),
    }
}

#[test]
fn test_config_returns_error_for_wrong_field_type() {
    let temp_file = config_file(
        r#"
[reconnect]
max_attempts = "five"
"#,
    );

    let result = LiveConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_returns_error_for_zero_max_attempts() {
    let temp_file = config_file(
        r#"
[reconnect]
max_attempts = 0
"#,
    );

    let result = LiveConfig::load_from_file(temp_file.path());

    match result {
        Err(ConfigError::InvalidConfig(message)) => {
            assert!(message.contains("max_attempts"));
        }
        other => panic!("Expected InvalidConfig error, got {other:?}"),
    }
}

#[test]
fn test_config_returns_error_for_zero_connect_timeout() {
    let temp_file = config_file(
        r#"
[server]
connect_timeout_ms = 0
"#,
    );

    let result = LiveConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_config_returns_error_for_unsupported_base_url_scheme() {
    if base_url_overridden() {
        return;
    }

    let temp_file = config_file(
        r#"
[server]
base_url = "ftp://files.swiftcourier.example"
"#,
    );

    let result = LiveConfig::load_from_file(temp_file.path());

    match result {
        Err(ConfigError::InvalidBaseUrl(url)) => {
            assert_eq!(url, "ftp://files.swiftcourier.example");
        }
        other => panic!("Expected InvalidBaseUrl error, got {other:?}"),
    }
}

#[test]
fn test_config_returns_error_for_missing_file() {
    let result = LiveConfig::load_from_file(Path::new("/nonexistent/path/courier-live.toml"));

    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_config_round_trips_through_toml() {
    let temp_file = config_file(
        r#"
[reconnect]
max_attempts = 9

[auth]
token_store = "/var/lib/courier/storage.json"
"#,
    );
    let config = LiveConfig::load_from_file(temp_file.path()).unwrap();

    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed: LiveConfig = toml::from_str(&rendered).unwrap();

    assert_eq!(reparsed, config);
}

#[tokio::test]
async fn test_token_store_from_config_supplies_token() {
    let mut store = NamedTempFile::new().unwrap();
    write!(store, r#"{{"swiftcourier_token": "stored-token"}}"#).unwrap();

    let temp_file = config_file(&format!(
        "[auth]\ntoken_store = {:?}\n",
        store.path().display().to_string()
    ));
    let config = LiveConfig::load_from_file(temp_file.path()).unwrap();

    let provider = provider_from_config(&config.auth);
    assert_eq!(
        provider.token().await.unwrap().as_deref(),
        Some("stored-token")
    );
}

#[tokio::test]
async fn test_no_auth_section_connects_anonymously() {
    let temp_file = config_file("[server]\nbase_url = \"http://localhost:8000\"\n");
    let config = LiveConfig::load_from_file(temp_file.path()).unwrap();

    let provider = provider_from_config(&config.auth);
    assert_eq!(provider.token().await.unwrap(), None);
}
