//! `tokio-tungstenite` backed connector

use super::{CloseInfo, Connector, Frame, FrameSink, FrameStream, TransportError};
use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Connector for `ws://` and `wss://` URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        debug!(target: "live_transport", status = %response.status(), "WebSocket handshake complete");

        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(|e| TransportError::SendFailed(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(frame_to_message(frame))));

        let stream = read.filter_map(|result| {
            future::ready(match result {
                Ok(message) => message_to_frame(message).map(Ok),
                Err(e) => Some(Err(TransportError::ReceiveFailed(e.to_string()))),
            })
        });

        let sink: FrameSink = Box::pin(sink);
        let stream: FrameStream = Box::pin(stream);
        Ok((sink, stream))
    }
}

/// Map a channel frame onto a tungstenite message
pub fn frame_to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
        Frame::Close(Some(info)) => Message::Close(Some(CloseFrame {
            code: CloseCode::from(info.code),
            reason: info.reason.into(),
        })),
        Frame::Close(None) => Message::Close(None),
    }
}

/// Map a tungstenite message onto a channel frame.
///
/// Ping and pong are answered inside tungstenite and never reach the channel.
pub fn message_to_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text(text.as_str().to_string())),
        Message::Binary(data) => Some(Frame::Binary(data.to_vec())),
        Message::Close(Some(close)) => Some(Frame::Close(Some(CloseInfo {
            code: u16::from(close.code),
            reason: close.reason.as_str().to_string(),
        }))),
        Message::Close(None) => Some(Frame::Close(None)),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}
