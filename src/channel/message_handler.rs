//! Pure frame routing and event dispatch for the live channel
//!
//! This module decides what an inbound frame means ([`MessageHandler`]) and
//! holds the per-channel subscription registry ([`EventRegistry`]).

use super::connection::close_info_from_frame;
use crate::error::ChannelResult;
use crate::protocol::{InboundMessage, MessageKind};
use crate::transport::{CloseInfo, Frame};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Name under which handlers are registered
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    /// Socket opened
    Connected,
    /// Socket closed, for any reason
    Disconnected,
    /// Connection establishment or transport failure
    Error,
    /// Every decoded inbound payload
    Message,
    /// Retry ceiling reached
    ReconnectFailed,
    /// Payloads whose `type` maps to this kind
    Kind(MessageKind),
}

impl EventName {
    /// Map a string event name. Lifecycle names win over message types of
    /// the same spelling: `"error"` is [`EventName::Error`], and server
    /// `error` payloads are reached through `MessageKind::Error.into()`.
    pub fn parse(name: &str) -> Self {
        match name {
            "connected" => EventName::Connected,
            "disconnected" => EventName::Disconnected,
            "error" => EventName::Error,
            "message" => EventName::Message,
            "reconnect_failed" => EventName::ReconnectFailed,
            other => EventName::Kind(MessageKind::from_type(other)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventName::Connected => "connected",
            EventName::Disconnected => "disconnected",
            EventName::Error => "error",
            EventName::Message => "message",
            EventName::ReconnectFailed => "reconnect_failed",
            EventName::Kind(kind) => kind.as_str(),
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        EventName::parse(name)
    }
}

impl From<MessageKind> for EventName {
    fn from(kind: MessageKind) -> Self {
        EventName::Kind(kind)
    }
}

/// Event delivered to handlers
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected {
        endpoint: String,
    },
    Disconnected {
        code: u16,
        reason: String,
        /// Close code 1000, whichever side sent it
        intentional: bool,
    },
    Error {
        message: String,
    },
    /// Delivered under [`EventName::Message`] and under the payload's kind
    Message(InboundMessage),
    ReconnectFailed {
        attempts: u32,
    },
}

impl ChannelEvent {
    /// Names this event is dispatched under, in dispatch order
    pub fn event_names(&self) -> Vec<EventName> {
        match self {
            ChannelEvent::Connected { .. } => vec![EventName::Connected],
            ChannelEvent::Disconnected { .. } => vec![EventName::Disconnected],
            ChannelEvent::Error { .. } => vec![EventName::Error],
            ChannelEvent::ReconnectFailed { .. } => vec![EventName::ReconnectFailed],
            ChannelEvent::Message(message) => {
                let mut names = vec![EventName::Message];
                if let Some(kind) = &message.kind {
                    names.push(EventName::Kind(kind.clone()));
                }
                names
            }
        }
    }
}

/// Event callback; identity is the `Arc` allocation
pub type Handler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Wrap a closure as a [`Handler`]
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&ChannelEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_handler(a: &Handler, b: &Handler) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Ordered handler lists per event name
///
/// Registering the same handler twice makes it run twice. Dispatch works on a
/// snapshot, so handlers may call `on`/`off` without deadlocking; the change
/// applies from the next dispatch.
#[derive(Default)]
pub struct EventRegistry {
    handlers: Mutex<HashMap<EventName, Vec<Handler>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event: EventName, handler: Handler) {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        handlers.entry(event).or_default().push(handler);
    }

    /// Remove every registration of `handler` under `event`; returns how many
    pub fn off(&self, event: &EventName, handler: &Handler) -> usize {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(event) else {
            return 0;
        };

        let before = list.len();
        list.retain(|registered| !same_handler(registered, handler));
        let removed = before - list.len();
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    pub fn handler_count(&self, event: &EventName) -> usize {
        let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        handlers.get(event).map_or(0, Vec::len)
    }

    /// Invoke handlers for every name of `event`; returns the number invoked
    pub fn emit(&self, event: &ChannelEvent) -> usize {
        let mut invoked = 0;
        for name in event.event_names() {
            let snapshot: Vec<Handler> = {
                let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
                handlers.get(&name).cloned().unwrap_or_default()
            };
            for handler in snapshot {
                handler(event);
                invoked += 1;
            }
        }
        invoked
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&str, usize> = handlers
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        f.debug_struct("EventRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

/// Pure routing decisions for inbound frames
pub struct MessageHandler;

impl MessageHandler {
    /// Route a frame received from the transport (pure function)
    pub fn route_frame(frame: Frame) -> FrameRoute {
        match frame {
            Frame::Text(text) => match InboundMessage::parse(&text) {
                Ok(message) => FrameRoute::Deliver(message),
                Err(e) => FrameRoute::Malformed(e.to_string()),
            },
            Frame::Binary(data) => {
                debug!(target: "live_channel", len = data.len(), "Ignoring binary frame");
                FrameRoute::Ignored("binary frame")
            }
            Frame::Close(close) => FrameRoute::Closed(close_info_from_frame(close)),
        }
    }

    /// Serialize an outbound payload into a text frame (pure function)
    pub fn encode_outbound<T: serde::Serialize + ?Sized>(payload: &T) -> ChannelResult<Frame> {
        Ok(Frame::Text(serde_json::to_string(payload)?))
    }
}

/// Routing decisions for inbound frames
#[derive(Debug, Clone, PartialEq)]
pub enum FrameRoute {
    /// Decoded payload to dispatch
    Deliver(InboundMessage),
    /// Undecodable text; logged and dropped
    Malformed(String),
    /// Peer closed the socket
    Closed(CloseInfo),
    /// Frame carries nothing for handlers
    Ignored(&'static str),
}
