//! Reconnecting live-update channel
//!
//! The channel is split into four sub-modules:
//!
//! - [`connection`] - Pure connection state, reconnect policy and URL building
//! - [`message_handler`] - Pure frame routing and the event subscription registry
//! - [`health_monitor`] - Pure reconnection decisions and health metrics
//! - [`client`] - The [`LiveChannel`] handle and its supervisor task
//!
//! # Usage
//!
//! ```rust,no_run
//! use courier_live::auth::TokenStore;
//! use courier_live::channel::{ChannelEvent, LiveChannel};
//! use courier_live::config::ChannelConfig;
//! use courier_live::protocol::{Endpoint, OutboundMessage};
//! use courier_live::transport::WsConnector;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let channel = LiveChannel::new(
//!     ChannelConfig::default(),
//!     Arc::new(WsConnector::new()),
//!     Arc::new(TokenStore::new("/home/courier/.swiftcourier/storage.json")),
//! );
//!
//! channel.subscribe("connected", |_| println!("live"));
//! channel.subscribe("notification", |event| {
//!     if let ChannelEvent::Message(message) = event {
//!         println!("{}", message.payload);
//!     }
//! });
//!
//! channel.connect(Endpoint::notifications());
//! channel.wait_until_connected(std::time::Duration::from_secs(10)).await?;
//! channel.send(&OutboundMessage::Ping);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::LiveChannel;
pub use connection::{ConnectionState, ReconnectConfig, CLOSE_ABNORMAL, CLOSE_NORMAL};
pub use health_monitor::HealthMetrics;
pub use message_handler::{handler, ChannelEvent, EventName, EventRegistry, Handler};
