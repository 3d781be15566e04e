//! Transport layer for live-update channels
//!
//! This module provides the [`Connector`] abstraction the channel uses to open
//! WebSocket sessions, and the `tokio-tungstenite` implementation of it.
//! Tests inject [`crate::testing::MockConnector`] instead.

use futures::{Sink, Stream};
use std::pin::Pin;
use thiserror::Error;

pub mod websocket;

pub use websocket::WsConnector;

/// A single WebSocket frame as seen by the channel
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Close frame, with code and reason when the peer supplied them
    Close(Option<CloseInfo>),
}

impl Frame {
    /// Close frame carrying a code and an empty reason
    pub fn close(code: u16) -> Self {
        Frame::Close(Some(CloseInfo {
            code,
            reason: String::new(),
        }))
    }
}

/// Close code and reason of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// Transport-level failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}

/// Outgoing half of an open session
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Incoming half of an open session. The stream ends when the socket is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Opens WebSocket sessions
///
/// Resolves once the handshake has completed. The returned halves belong to
/// exactly one session; the channel never reuses them across reconnects.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError>;
}
