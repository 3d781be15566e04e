//! Endpoint paths of the courier push channels

use std::fmt;
use thiserror::Error;

/// Path of a server-side push channel, e.g. `/ws/notifications/`
///
/// The channel treats the path as opaque; these builders only exist so that
/// callers do not hand-format the well-known routes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    /// Per-package tracking stream: `/ws/tracking/{tracking_number}/`
    pub fn tracking(tracking_number: &str) -> Result<Self, EndpointError> {
        validate_tracking_number(tracking_number)?;
        Ok(Self(format!("/ws/tracking/{tracking_number}/")))
    }

    /// Notifications for the authenticated user: `/ws/notifications/`
    pub fn notifications() -> Self {
        Self("/ws/notifications/".to_string())
    }

    /// Route and stop updates for drivers: `/ws/driver-updates/`
    pub fn driver_updates() -> Self {
        Self("/ws/driver-updates/".to_string())
    }

    /// Platform-wide updates for the admin dashboard: `/ws/admin-updates/`
    pub fn admin_updates() -> Self {
        Self("/ws/admin-updates/".to_string())
    }

    /// Arbitrary path; a leading slash is added when missing
    pub fn custom(path: &str) -> Result<Self, EndpointError> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(EndpointError::Empty);
        }
        if trimmed.contains(['?', '#']) || trimmed.chars().any(char::is_whitespace) {
            return Err(EndpointError::InvalidPath(path.to_string()));
        }
        if trimmed.starts_with('/') {
            Ok(Self(trimmed.to_string()))
        } else {
            Ok(Self(format!("/{trimmed}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Tracking numbers are matched by the backend route as `\w+`
pub fn validate_tracking_number(tracking_number: &str) -> Result<(), EndpointError> {
    if tracking_number.is_empty() {
        return Err(EndpointError::EmptyTrackingNumber);
    }

    for ch in tracking_number.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '_' {
            return Err(EndpointError::InvalidTrackingNumberChar(ch));
        }
    }

    Ok(())
}

/// Endpoint construction errors
#[derive(Debug, Error, PartialEq)]
pub enum EndpointError {
    #[error("Tracking number cannot be empty")]
    EmptyTrackingNumber,
    #[error("Tracking number contains invalid character: '{0}'")]
    InvalidTrackingNumberChar(char),
    #[error("Endpoint path cannot be empty")]
    Empty,
    #[error("Endpoint path is not a plain path: {0}")]
    InvalidPath(String),
}
