//! Pure health monitoring and reconnection logic for the live channel
//!
//! This module contains pure functions for reconnection decision making,
//! state transitions and connection health tracking.

use super::connection::{is_intentional_close, ConnectionState, ReconnectConfig};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Pure health monitoring and reconnection decision logic
pub struct HealthMonitor;

impl HealthMonitor {
    /// Decide what happens after a close with `close_code`.
    ///
    /// `current_attempts` counts attempts made since the last successful open.
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        close_code: u16,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        if is_intentional_close(close_code) {
            return ReconnectionDecision::AbortIntentionalClose;
        }

        if current_attempts >= config.max_attempts {
            return ReconnectionDecision::AbortMaxAttemptsExceeded;
        }

        ReconnectionDecision::Proceed {
            attempt: current_attempts + 1,
            delay: config.delay(),
        }
    }

    /// Determine next state after a connection event (pure function)
    pub fn determine_next_state(event: ConnectionEvent) -> ConnectionState {
        match event {
            ConnectionEvent::Opened => ConnectionState::Connected,
            ConnectionEvent::Closed(reason) => ConnectionState::Disconnected(reason),
            ConnectionEvent::ReconnectionStarted(attempt) => ConnectionState::Reconnecting(attempt),
            ConnectionEvent::PermanentFailure(reason) => {
                ConnectionState::PermanentlyDisconnected(reason)
            }
        }
    }

    /// Check if connection state allows sending (pure function)
    pub fn can_send(state: &ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Calculate health metrics for connection (pure function)
    pub fn calculate_health_metrics(
        connect_time: Option<Instant>,
        last_message_time: Option<Instant>,
        reconnect_count: u32,
    ) -> HealthMetrics {
        let now = Instant::now();

        let uptime = connect_time.map(|t| now.duration_since(t));
        let time_since_last_message = last_message_time.map(|t| now.duration_since(t));

        HealthMetrics {
            uptime,
            time_since_last_message,
            reconnect_count,
            is_healthy: Self::determine_health_status(uptime, time_since_last_message),
        }
    }

    /// Connected, and either quiet since connecting or heard from in the last 5 minutes
    fn determine_health_status(
        uptime: Option<Duration>,
        time_since_last_message: Option<Duration>,
    ) -> bool {
        match (uptime, time_since_last_message) {
            (Some(_), None) => true,
            (Some(_), Some(last_msg)) => last_msg < Duration::from_secs(300),
            _ => false,
        }
    }

    /// Log connection state transition (pure logging function)
    pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (ConnectionState::Connecting, ConnectionState::Connected) => {
                info!("Live channel connected");
            }
            (ConnectionState::Reconnecting(attempt), ConnectionState::Connected) => {
                info!(attempt, "Live channel reconnected");
            }
            (ConnectionState::Connected, ConnectionState::Disconnected(reason)) => {
                warn!(reason = %reason, "Live channel connection lost");
            }
            (_, ConnectionState::Reconnecting(attempt)) => {
                info!(attempt, "Scheduling reconnection attempt");
            }
            (_, ConnectionState::PermanentlyDisconnected(reason)) => {
                error!(reason = %reason, "Live channel gave up reconnecting");
            }
            _ => {
                tracing::debug!(target: "live_channel", "Connection state: {:?} -> {:?}", from, to);
            }
        }
    }

    /// Validate reconnect configuration (pure function)
    ///
    /// The error names the offending field without its section prefix.
    pub fn validate_connection_config(config: &ReconnectConfig) -> Result<(), String> {
        if config.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }

        if config.delay_ms == 0 {
            return Err("delay_ms must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    /// Proceed with reconnection attempt
    Proceed { attempt: u32, delay: Duration },
    /// Abort reconnection - client asked to disconnect
    AbortShutdownRequested,
    /// Abort reconnection - the close was a normal closure
    AbortIntentionalClose,
    /// Abort reconnection - max attempts exceeded
    AbortMaxAttemptsExceeded,
}

/// Connection events that trigger state transitions
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Opened,
    Closed(String),
    ReconnectionStarted(u32),
    PermanentFailure(String),
}

/// Health metrics for connection monitoring
#[derive(Debug, Clone, PartialEq)]
pub struct HealthMetrics {
    /// Time since the current socket opened
    pub uptime: Option<Duration>,
    /// Time since last inbound frame
    pub time_since_last_message: Option<Duration>,
    /// Reconnection attempts over the channel's lifetime
    pub reconnect_count: u32,
    /// Overall health status
    pub is_healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::connection::{CLOSE_ABNORMAL, CLOSE_NORMAL};

    #[test]
    fn test_should_attempt_reconnection() {
        let config = ReconnectConfig::default();

        let decision =
            HealthMonitor::should_attempt_reconnection(0, &config, CLOSE_ABNORMAL, false);
        assert_eq!(
            decision,
            ReconnectionDecision::Proceed {
                attempt: 1,
                delay: Duration::from_secs(3)
            }
        );

        // Fixed delay, no backoff
        let decision = HealthMonitor::should_attempt_reconnection(4, &config, 1011, false);
        assert_eq!(
            decision,
            ReconnectionDecision::Proceed {
                attempt: 5,
                delay: Duration::from_secs(3)
            }
        );

        let decision =
            HealthMonitor::should_attempt_reconnection(5, &config, CLOSE_ABNORMAL, false);
        assert_eq!(decision, ReconnectionDecision::AbortMaxAttemptsExceeded);
    }

    #[test]
    fn test_normal_closure_never_reconnects() {
        let config = ReconnectConfig::default();
        for attempts in 0..10 {
            assert_eq!(
                HealthMonitor::should_attempt_reconnection(attempts, &config, CLOSE_NORMAL, false),
                ReconnectionDecision::AbortIntentionalClose
            );
        }
    }

    #[test]
    fn test_shutdown_wins_over_everything() {
        let config = ReconnectConfig::default();
        assert_eq!(
            HealthMonitor::should_attempt_reconnection(0, &config, CLOSE_ABNORMAL, true),
            ReconnectionDecision::AbortShutdownRequested
        );
        assert_eq!(
            HealthMonitor::should_attempt_reconnection(9, &config, CLOSE_NORMAL, true),
            ReconnectionDecision::AbortShutdownRequested
        );
    }

    #[test]
    fn test_determine_next_state() {
        assert_eq!(
            HealthMonitor::determine_next_state(ConnectionEvent::Opened),
            ConnectionState::Connected
        );
        assert_eq!(
            HealthMonitor::determine_next_state(ConnectionEvent::Closed("timeout".to_string())),
            ConnectionState::Disconnected("timeout".to_string())
        );
        assert_eq!(
            HealthMonitor::determine_next_state(ConnectionEvent::ReconnectionStarted(2)),
            ConnectionState::Reconnecting(2)
        );
        assert_eq!(
            HealthMonitor::determine_next_state(ConnectionEvent::PermanentFailure(
                "max attempts".to_string()
            )),
            ConnectionState::PermanentlyDisconnected("max attempts".to_string())
        );
    }

    #[test]
    fn test_can_send() {
        assert!(HealthMonitor::can_send(&ConnectionState::Connected));
        assert!(!HealthMonitor::can_send(&ConnectionState::Idle));
        assert!(!HealthMonitor::can_send(&ConnectionState::Connecting));
        assert!(!HealthMonitor::can_send(&ConnectionState::Disconnected(
            "test".to_string()
        )));
        assert!(!HealthMonitor::can_send(&ConnectionState::Reconnecting(1)));
        assert!(!HealthMonitor::can_send(
            &ConnectionState::PermanentlyDisconnected("test".to_string())
        ));
    }

    #[test]
    fn test_calculate_health_metrics() {
        let now = Instant::now();
        let connect_time = now.checked_sub(Duration::from_secs(3600));
        let last_message_time = now.checked_sub(Duration::from_secs(60));

        let metrics = HealthMonitor::calculate_health_metrics(connect_time, last_message_time, 2);

        assert_eq!(metrics.reconnect_count, 2);
        if connect_time.is_some() && last_message_time.is_some() {
            assert!(metrics.uptime.is_some());
            assert!(metrics.time_since_last_message.is_some());
            assert!(metrics.is_healthy);
        }
    }

    #[test]
    fn test_determine_health_status() {
        let uptime = Some(Duration::from_secs(3600));
        assert!(HealthMonitor::determine_health_status(
            uptime,
            Some(Duration::from_secs(60))
        ));
        assert!(HealthMonitor::determine_health_status(uptime, None));
        assert!(!HealthMonitor::determine_health_status(
            uptime,
            Some(Duration::from_secs(400))
        ));
        assert!(!HealthMonitor::determine_health_status(None, None));
    }

    #[test]
    fn test_validate_connection_config() {
        assert!(HealthMonitor::validate_connection_config(&ReconnectConfig::default()).is_ok());

        let invalid = ReconnectConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(HealthMonitor::validate_connection_config(&invalid).is_err());

        let invalid = ReconnectConfig {
            delay_ms: 0,
            ..Default::default()
        };
        assert!(HealthMonitor::validate_connection_config(&invalid).is_err());
    }
}
