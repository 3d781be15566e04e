//! Credential providers for authenticated push channels
//!
//! The channel asks its [`CredentialProvider`] for a bearer token on every
//! connection attempt and appends it as a `token` query parameter. It never
//! refreshes or validates tokens; token lifecycle belongs to whoever writes
//! the token store.

use crate::config::AuthSection;
use crate::error::ChannelError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Keys tried, in order, when reading a [`TokenStore`]
pub const TOKEN_KEYS: &[&str] = &["swiftcourier_token", "token"];

/// Source of the bearer token sent with each connection attempt
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// `Ok(None)` means connect anonymously
    async fn token(&self) -> Result<Option<String>, ChannelError>;
}

/// Anonymous access
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

#[async_trait]
impl CredentialProvider for NoCredentials {
    async fn token(&self) -> Result<Option<String>, ChannelError> {
        Ok(None)
    }
}

/// Fixed token, mainly for tests and one-off tools
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: String,
}

impl StaticCredentials {
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn token(&self) -> Result<Option<String>, ChannelError> {
        Ok(non_empty(&self.token))
    }
}

/// Token read from an environment variable at connect time
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var_name: String,
}

impl EnvCredentials {
    pub fn new<S: Into<String>>(var_name: S) -> Self {
        Self {
            var_name: var_name.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn token(&self) -> Result<Option<String>, ChannelError> {
        Ok(std::env::var(&self.var_name)
            .ok()
            .and_then(|value| non_empty(&value)))
    }
}

/// Persistent key/value token storage
///
/// The file is a flat JSON object, as written by the web and desktop
/// clients' login flow:
///
/// ```json
/// { "swiftcourier_token": "eyJ...", "swiftcourier_refresh_token": "eyJ..." }
/// ```
///
/// A missing file or missing key means anonymous. An unreadable or
/// malformed file is an error; the channel reports it through its `Error`
/// event and still connects, anonymously.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the token, trying [`TOKEN_KEYS`] in order
    pub async fn read_token(&self) -> Result<Option<String>, ChannelError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Token store not found, connecting anonymously");
                return Ok(None);
            }
            Err(e) => {
                return Err(ChannelError::credentials(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )))
            }
        };

        let value: Value = serde_json::from_str(&content).map_err(|e| {
            ChannelError::credentials(format!("malformed token store {}: {e}", self.path.display()))
        })?;

        Ok(TOKEN_KEYS
            .iter()
            .filter_map(|key| value.get(*key).and_then(Value::as_str))
            .find_map(non_empty))
    }
}

#[async_trait]
impl CredentialProvider for TokenStore {
    async fn token(&self) -> Result<Option<String>, ChannelError> {
        self.read_token().await
    }
}

/// Tries each provider in order and returns the first token found
pub struct ChainedCredentials {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl ChainedCredentials {
    pub fn new(providers: Vec<Arc<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl CredentialProvider for ChainedCredentials {
    async fn token(&self) -> Result<Option<String>, ChannelError> {
        for provider in &self.providers {
            if let Some(token) = provider.token().await? {
                return Ok(Some(token));
            }
        }
        Ok(None)
    }
}

/// Build the provider described by the `[auth]` config section
pub fn provider_from_config(auth: &AuthSection) -> Arc<dyn CredentialProvider> {
    let mut providers: Vec<Arc<dyn CredentialProvider>> = Vec::new();
    if let Some(var_name) = &auth.token_env {
        providers.push(Arc::new(EnvCredentials::new(var_name.clone())));
    }
    if let Some(path) = &auth.token_store {
        providers.push(Arc::new(TokenStore::new(path.clone())));
    }

    match providers.len() {
        0 => Arc::new(NoCredentials),
        1 => providers.remove(0),
        _ => Arc::new(ChainedCredentials::new(providers)),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
