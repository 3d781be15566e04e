//! Mock implementations for testing
//!
//! Provides a scripted [`MockConnector`] whose accepted connections are handed
//! to the test through a [`MockServer`], and an [`EventRecorder`] that captures
//! channel events in dispatch order.

use crate::channel::{handler, ChannelEvent, EventName, LiveChannel};
use crate::transport::{Connector, Frame, FrameSink, FrameStream, TransportError};
use async_trait::async_trait;
use futures::channel::mpsc as frame_channel;
use futures::{FutureExt, Sink, SinkExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::Instant;

/// What the next connection attempt does
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    /// Handshake succeeds; the connection is handed to the [`MockServer`]
    Accept,
    /// Handshake fails with this message
    Fail(String),
    /// Handshake never completes
    Hang,
    /// Handshake succeeds, but the client's sink never accepts a frame or
    /// finishes closing
    AcceptStalled,
}

/// One recorded connection attempt
#[derive(Debug, Clone)]
pub struct ConnectAttempt {
    pub url: String,
    /// Tokio clock reading, so paused-time tests can check spacing
    pub at: Instant,
}

/// Scripted connector; attempts beyond the script are accepted
pub struct MockConnector {
    script: Mutex<VecDeque<ConnectOutcome>>,
    attempts: Mutex<Vec<ConnectAttempt>>,
    accepted_tx: mpsc::UnboundedSender<MockConnection>,
    accepted_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<MockConnection>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<ConnectOutcome>) -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            script: Mutex::new(script.into()),
            attempts: Mutex::new(Vec::new()),
            accepted_tx,
            accepted_rx: Arc::new(AsyncMutex::new(accepted_rx)),
        }
    }

    /// Append outcomes for later attempts
    pub fn push_outcomes(&self, outcomes: impl IntoIterator<Item = ConnectOutcome>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(outcomes);
    }

    /// Server side of accepted connections
    pub fn server(&self) -> MockServer {
        MockServer {
            accepted_rx: self.accepted_rx.clone(),
        }
    }

    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn attempted_urls(&self) -> Vec<String> {
        self.attempts().into_iter().map(|a| a.url).collect()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn accept(&self, url: &str, stalled: bool) -> (FrameSink, FrameStream) {
        let (to_client, client_inbox) = frame_channel::unbounded::<Result<Frame, TransportError>>();
        let (client_outbox, from_client) = frame_channel::unbounded::<Frame>();

        let sink: FrameSink = if stalled {
            Box::pin(StalledSink)
        } else {
            Box::pin(client_outbox.sink_map_err(|e| TransportError::SendFailed(e.to_string())))
        };
        let stream: FrameStream = Box::pin(client_inbox);

        let connection = MockConnection {
            url: url.to_string(),
            to_client,
            from_client,
        };
        // Nobody listening: the connection is dropped and the client sees the socket end
        let _ = self.accepted_tx.send(connection);

        (sink, stream)
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ConnectAttempt {
                url: url.to_string(),
                at: Instant::now(),
            });

        let outcome = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(ConnectOutcome::Accept);

        match outcome {
            ConnectOutcome::Accept => Ok(self.accept(url, false)),
            ConnectOutcome::AcceptStalled => Ok(self.accept(url, true)),
            ConnectOutcome::Fail(message) => Err(TransportError::ConnectionFailed(message)),
            ConnectOutcome::Hang => futures::future::pending().await,
        }
    }
}

/// Client sink of an [`ConnectOutcome::AcceptStalled`] connection
struct StalledSink;

impl Sink<Frame> for StalledSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn start_send(self: Pin<&mut Self>, _item: Frame) -> Result<(), Self::Error> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }
}

/// Receives the connections a [`MockConnector`] accepted, in order
#[derive(Clone)]
pub struct MockServer {
    accepted_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<MockConnection>>>,
}

impl MockServer {
    pub async fn next_connection(&self) -> Option<MockConnection> {
        self.accepted_rx.lock().await.recv().await
    }
}

/// Server end of one accepted connection
///
/// Dropping it ends the client's stream without a close frame, which the
/// channel reports as an abnormal close (1006).
pub struct MockConnection {
    url: String,
    to_client: frame_channel::UnboundedSender<Result<Frame, TransportError>>,
    from_client: frame_channel::UnboundedReceiver<Frame>,
}

impl MockConnection {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn push_frame(&self, frame: Frame) -> bool {
        self.to_client.unbounded_send(Ok(frame)).is_ok()
    }

    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.push_frame(Frame::Text(text.into()))
    }

    pub fn push_json(&self, value: &Value) -> bool {
        self.push_text(value.to_string())
    }

    /// Send a close frame and hang up
    pub fn close(self, code: u16) {
        let _ = self.push_frame(Frame::close(code));
    }

    /// Fail the client's read side and hang up
    pub fn fail(self, message: impl Into<String>) {
        let _ = self
            .to_client
            .unbounded_send(Err(TransportError::ReceiveFailed(message.into())));
    }

    /// Vanish without a close frame
    pub fn drop_connection(self) {}

    /// Next frame the client sent; `None` once the client closed its sink
    pub async fn next_sent(&mut self) -> Option<Frame> {
        self.from_client.next().await
    }

    /// Frames the client has sent so far, without waiting
    pub fn drain_sent(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(Some(frame)) = self.from_client.next().now_or_never() {
            frames.push(frame);
        }
        frames
    }
}

/// Records channel events in dispatch order
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<(EventName, ChannelEvent)>>>,
}

impl EventRecorder {
    /// Record `names` on `channel`
    pub fn attach(channel: &LiveChannel, names: impl IntoIterator<Item = EventName>) -> Self {
        let recorder = Self::default();
        for name in names {
            let events = recorder.events.clone();
            let recorded_name = name.clone();
            channel.on(
                name,
                handler(move |event| {
                    events
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((recorded_name.clone(), event.clone()));
                }),
            );
        }
        recorder
    }

    /// Record the lifecycle events plus `Message`
    pub fn attach_lifecycle(channel: &LiveChannel) -> Self {
        Self::attach(
            channel,
            [
                EventName::Connected,
                EventName::Disconnected,
                EventName::Error,
                EventName::Message,
                EventName::ReconnectFailed,
            ],
        )
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.records().into_iter().map(|(_, event)| event).collect()
    }

    /// Names events were delivered under, in order
    pub fn names(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .map(|(name, _)| name.as_str().to_string())
            .collect()
    }

    pub fn count(&self, name: &EventName) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(recorded, _)| recorded == name)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Poll until `count` events named `name` arrived; false on timeout
    pub async fn wait_for(&self, name: &EventName, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.count(name) >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn records(&self) -> Vec<(EventName, ChannelEvent)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
