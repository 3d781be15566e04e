//! Inbound and outbound message types
//!
//! Every inbound frame is a JSON object shaped like `{"type": ..., "data": ...}`.
//! The `type` string is mapped onto [`MessageKind`], a closed enumeration;
//! values the client does not know land in [`MessageKind::Unrecognized`]
//! instead of becoming new event names.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Message types pushed by the courier backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Tracking socket accepted; carries `tracking_number` and `authenticated`
    ConnectionEstablished,
    /// Full package snapshot, sent on connect and on `request_update`
    PackageStatus,
    /// Package status or location changed
    PackageUpdate,
    /// A new tracking event was recorded for the package
    TrackingEvent,
    /// The authenticated user created a package
    NewPackage,
    /// Driver route changed
    RouteUpdate,
    /// A stop on a driver route changed
    StopUpdate,
    /// Route assigned to the driver
    NewRoute,
    /// Route withdrawn from the driver
    RouteRemoved,
    /// Generic user notification
    Notification,
    /// Reply to [`OutboundMessage::Ping`]
    Pong,
    /// Server-side error report, e.g. for an unparseable client message
    Error,
    /// Any `type` value not listed above
    Unrecognized(String),
}

impl MessageKind {
    pub fn from_type(message_type: &str) -> Self {
        match message_type {
            "connection_established" => MessageKind::ConnectionEstablished,
            "package_status" => MessageKind::PackageStatus,
            "package_update" => MessageKind::PackageUpdate,
            "tracking_event" => MessageKind::TrackingEvent,
            "new_package" => MessageKind::NewPackage,
            "route_update" => MessageKind::RouteUpdate,
            "stop_update" => MessageKind::StopUpdate,
            "new_route" => MessageKind::NewRoute,
            "route_removed" => MessageKind::RouteRemoved,
            "notification" => MessageKind::Notification,
            "pong" => MessageKind::Pong,
            "error" => MessageKind::Error,
            other => MessageKind::Unrecognized(other.to_string()),
        }
    }

    /// Wire name of this kind
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::ConnectionEstablished => "connection_established",
            MessageKind::PackageStatus => "package_status",
            MessageKind::PackageUpdate => "package_update",
            MessageKind::TrackingEvent => "tracking_event",
            MessageKind::NewPackage => "new_package",
            MessageKind::RouteUpdate => "route_update",
            MessageKind::StopUpdate => "stop_update",
            MessageKind::NewRoute => "new_route",
            MessageKind::RouteRemoved => "route_removed",
            MessageKind::Notification => "notification",
            MessageKind::Pong => "pong",
            MessageKind::Error => "error",
            MessageKind::Unrecognized(other) => other,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, MessageKind::Unrecognized(_))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded inbound payload
///
/// `payload` is the complete JSON value exactly as received; handlers that
/// want the domain fields read `data()` or deserialize with [`Self::data_as`].
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// `None` when the payload is not an object with a string `type` field
    pub kind: Option<MessageKind>,
    pub payload: Value,
}

impl InboundMessage {
    /// Decode a text frame. Any JSON value is accepted; only objects carry a `type`.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text).map_err(DecodeError::Json)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(MessageKind::from_type);

        Self {
            kind,
            payload: value,
        }
    }

    /// The `data` member of the envelope, if any
    pub fn data(&self) -> Option<&Value> {
        self.payload.get("data")
    }

    /// Deserialize the `data` member into a concrete type
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let data = self.data().cloned().unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(DecodeError::Json)
    }

    /// Top-level string field, e.g. `message` on server error reports
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }
}

/// Why an inbound frame was discarded
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed JSON: {0}")]
    Json(#[source] serde_json::Error),
}

/// Client-to-server messages understood by the tracking consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Liveness probe; answered with `pong`
    Ping,
    /// Ask for a fresh `package_status` snapshot
    RequestUpdate,
}

/// Package snapshot carried by `package_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSnapshot {
    pub tracking_number: String,
    pub status: String,
    #[serde(default)]
    pub current_location: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub tracking_events: Vec<TrackingEventRecord>,
    /// Remaining fields, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of a package's tracking history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEventRecord {
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub timestamp: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of `package_update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageUpdate {
    pub tracking_number: String,
    pub status: String,
    #[serde(default)]
    pub current_location: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_typed_envelope() {
        let message =
            InboundMessage::parse(r#"{"type":"package_update","data":{"status":"in_transit"}}"#)
                .unwrap();
        assert_eq!(message.kind, Some(MessageKind::PackageUpdate));
        assert_eq!(message.data(), Some(&json!({"status": "in_transit"})));
    }

    #[test]
    fn test_parse_untyped_payload() {
        let message = InboundMessage::parse(r#"{"data":{"a":1}}"#).unwrap();
        assert_eq!(message.kind, None);
    }

    #[test]
    fn test_non_string_type_is_untyped() {
        let message = InboundMessage::parse(r#"{"type":42}"#).unwrap();
        assert_eq!(message.kind, None);
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let message = InboundMessage::parse(r#"{"type":"fleet_recall"}"#).unwrap();
        assert_eq!(
            message.kind,
            Some(MessageKind::Unrecognized("fleet_recall".to_string()))
        );
        assert!(!message.kind.unwrap().is_recognized());
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert!(matches!(
            InboundMessage::parse("not json at all"),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            InboundMessage::parse("{\"type\": \"package_update\""),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_non_object_json_decodes_without_kind() {
        let message = InboundMessage::parse("[1,2,3]").unwrap();
        assert_eq!(message.kind, None);
        assert_eq!(message.payload, json!([1, 2, 3]));

        let message = InboundMessage::parse("\"package_update\"").unwrap();
        assert_eq!(message.kind, None);
        assert_eq!(message.data(), None);
    }

    #[test]
    fn test_kind_names_are_stable() {
        let kinds = [
            MessageKind::ConnectionEstablished,
            MessageKind::PackageStatus,
            MessageKind::PackageUpdate,
            MessageKind::TrackingEvent,
            MessageKind::NewPackage,
            MessageKind::RouteUpdate,
            MessageKind::StopUpdate,
            MessageKind::NewRoute,
            MessageKind::RouteRemoved,
            MessageKind::Notification,
            MessageKind::Pong,
            MessageKind::Error,
        ];
        for kind in kinds {
            assert_eq!(MessageKind::from_type(kind.as_str()), kind);
            assert!(kind.is_recognized());
        }
    }

    #[test]
    fn test_outbound_serialization() {
        assert_eq!(
            serde_json::to_value(OutboundMessage::Ping).unwrap(),
            json!({"type": "ping"})
        );
        assert_eq!(
            serde_json::to_value(OutboundMessage::RequestUpdate).unwrap(),
            json!({"type": "request_update"})
        );
    }

    #[test]
    fn test_package_status_payload() {
        let message = InboundMessage::parse(
            r#"{
                "type": "package_status",
                "data": {
                    "tracking_number": "SC123456",
                    "status": "in_transit",
                    "current_location": "Depot 4",
                    "latitude": 40.7,
                    "longitude": null,
                    "weight": "2.50",
                    "tracking_events": [
                        {"id": 9, "status": "picked_up", "description": "Collected",
                         "location": "Depot 4", "timestamp": "2024-05-01T10:00:00Z",
                         "created_by": "System"}
                    ]
                }
            }"#,
        )
        .unwrap();

        let snapshot: PackageSnapshot = message.data_as().unwrap();
        assert_eq!(snapshot.tracking_number, "SC123456");
        assert_eq!(snapshot.latitude, Some(40.7));
        assert_eq!(snapshot.longitude, None);
        assert_eq!(snapshot.tracking_events.len(), 1);
        assert_eq!(snapshot.tracking_events[0].status, "picked_up");
        assert_eq!(snapshot.extra.get("weight"), Some(&json!("2.50")));
    }

    #[test]
    fn test_package_update_payload() {
        let message = InboundMessage::parse(
            r#"{"type":"package_update","data":{"tracking_number":"SC1","status":"delivered","sender_id":3}}"#,
        )
        .unwrap();
        let update: PackageUpdate = message.data_as().unwrap();
        assert_eq!(update.status, "delivered");
        assert_eq!(update.extra.get("sender_id"), Some(&json!(3)));
    }

    #[test]
    fn test_server_error_message_field() {
        let message =
            InboundMessage::parse(r#"{"type":"error","message":"Invalid JSON format"}"#).unwrap();
        assert_eq!(message.kind, Some(MessageKind::Error));
        assert_eq!(message.field_str("message"), Some("Invalid JSON format"));
    }
}
