//! courier-live - Rust Implementation
//!
//! A reconnecting publish/subscribe client for the server-push WebSocket
//! endpoints of a courier platform: package tracking, user notifications,
//! driver route updates and admin dashboard updates.
//!
//! # Overview
//!
//! - [`channel::LiveChannel`]: one logical channel at a time, named-event
//!   handlers, fixed-delay reconnection after abnormal closes
//! - [`protocol`]: inbound envelope decoding, outbound messages, endpoint paths
//! - [`transport`]: the [`transport::Connector`] seam and its `tokio-tungstenite` implementation
//! - [`auth`]: credential providers supplying the `token` query parameter
//! - [`config`]: TOML configuration
//!
//! # Quick Start
//!
//! ```rust
//! use courier_live::protocol::{Endpoint, InboundMessage, MessageKind, OutboundMessage};
//!
//! let endpoint = Endpoint::tracking("SC12345678").unwrap();
//! assert_eq!(endpoint.as_str(), "/ws/tracking/SC12345678/");
//!
//! let message = InboundMessage::parse(
//!     r#"{"type": "package_update", "data": {"status": "in_transit"}}"#,
//! )
//! .unwrap();
//! assert_eq!(message.kind, Some(MessageKind::PackageUpdate));
//!
//! let ping = serde_json::to_string(&OutboundMessage::Ping).unwrap();
//! assert_eq!(ping, r#"{"type":"ping"}"#);
//! ```

pub mod auth;
pub mod channel;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use channel::{ChannelEvent, ConnectionState, EventName, LiveChannel};
pub use config::{ChannelConfig, LiveConfig};
pub use error::{ChannelError, ChannelResult};
pub use protocol::{Endpoint, InboundMessage, MessageKind, OutboundMessage};
