//! Impure I/O operations for the live channel
//!
//! This module owns the supervisor task that opens the socket, pumps frames in
//! both directions, and reconnects after abnormal closes. Decisions are
//! delegated to the pure functions in [`super::connection`],
//! [`super::health_monitor`] and [`super::message_handler`].

use super::connection::{
    abnormal_close, build_channel_url, is_intentional_close, redact_url, ConnectionState,
    CLOSE_NORMAL,
};
use super::health_monitor::{ConnectionEvent, HealthMetrics, HealthMonitor, ReconnectionDecision};
use super::message_handler::{
    handler, ChannelEvent, EventName, EventRegistry, FrameRoute, Handler, MessageHandler,
};
use crate::auth::CredentialProvider;
use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::transport::{CloseInfo, Connector, Frame, FrameSink, FrameStream, TransportError};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Upper bound for the close handshake on disconnect
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

const CLIENT_DISCONNECT_REASON: &str = "Client disconnected";

/// Stop signal observed by a session's supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    Running,
    /// `disconnect()`: close with 1000 and report it
    Disconnect,
    /// Replaced by a newer `connect()` or the channel was dropped: stop silently
    Superseded,
}

/// Health bookkeeping; only the session named in `session` may update it
#[derive(Debug, Default)]
struct ChannelStats {
    session: Option<Uuid>,
    connect_time: Option<Instant>,
    last_message_time: Option<Instant>,
    reconnect_count: u32,
}

struct ActiveSession {
    id: Uuid,
    endpoint: String,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<Shutdown>,
    outbound_tx: mpsc::UnboundedSender<Frame>,
    /// Set by `disconnect()` before the supervisor has observed it
    stopped: bool,
    _handle: JoinHandle<()>,
}

struct ChannelInner {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    registry: Arc<EventRegistry>,
    session: Mutex<Option<ActiveSession>>,
    stats: Arc<Mutex<ChannelStats>>,
}

impl ChannelInner {
    fn session(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        let slot = self.session.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = slot.take() {
            session.shutdown_tx.send_replace(Shutdown::Superseded);
        }
    }
}

/// Reconnecting publish/subscribe client for one server-push endpoint at a time
///
/// Cheap to clone; clones share the session and the handler registry. The
/// session is stopped when the last clone is dropped.
///
/// ```rust,no_run
/// use courier_live::channel::{ChannelEvent, EventName, LiveChannel};
/// use courier_live::config::ChannelConfig;
/// use courier_live::protocol::Endpoint;
///
/// # tokio_test::block_on(async {
/// let channel = LiveChannel::with_websocket(ChannelConfig::default());
/// channel.subscribe("package_update", |event| {
///     if let ChannelEvent::Message(message) = event {
///         println!("{}", message.payload);
///     }
/// });
/// channel.connect(Endpoint::tracking("SC12345678")?);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Clone)]
pub struct LiveChannel {
    inner: Arc<ChannelInner>,
}

impl LiveChannel {
    pub fn new(
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                config,
                connector,
                credentials,
                registry: Arc::new(EventRegistry::new()),
                session: Mutex::new(None),
                stats: Arc::new(Mutex::new(ChannelStats::default())),
            }),
        }
    }

    /// Anonymous channel over `tokio-tungstenite`
    pub fn with_websocket(config: ChannelConfig) -> Self {
        Self::new(
            config,
            Arc::new(crate::transport::WsConnector::new()),
            Arc::new(crate::auth::NoCredentials),
        )
    }

    /// Open `endpoint`, replacing any current session.
    ///
    /// Returns immediately; the outcome arrives as `Connected` or `Error`
    /// events. The previous session is told to stop before this returns and
    /// emits nothing afterwards.
    pub fn connect(&self, endpoint: impl AsRef<str>) {
        let endpoint = endpoint.as_ref().to_string();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "connect() called outside a Tokio runtime");
                self.inner.registry.emit(&ChannelEvent::Error {
                    message: format!("connect() requires a Tokio runtime: {e}"),
                });
                return;
            }
        };

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(Shutdown::Running);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4();

        let mut slot = self.inner.session();
        {
            let mut stats = self
                .inner
                .stats
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            stats.session = Some(session_id);
            stats.connect_time = None;
            stats.last_message_time = None;
        }
        if let Some(previous) = slot.take() {
            info!(
                previous_session = %previous.id,
                previous_endpoint = %previous.endpoint,
                "Superseding live channel session"
            );
            previous.shutdown_tx.send_replace(Shutdown::Superseded);
        }

        let supervisor = Supervisor {
            session_id,
            endpoint: endpoint.clone(),
            config: self.inner.config.clone(),
            connector: self.inner.connector.clone(),
            credentials: self.inner.credentials.clone(),
            registry: self.inner.registry.clone(),
            stats: self.inner.stats.clone(),
            state_tx,
            shutdown_rx,
            outbound_rx,
        };
        let span = crate::session_span!(session_id = %session_id, endpoint = %endpoint);
        let handle = runtime.spawn(supervisor.run().instrument(span));

        *slot = Some(ActiveSession {
            id: session_id,
            endpoint,
            state_rx,
            shutdown_tx,
            outbound_tx,
            stopped: false,
            _handle: handle,
        });
    }

    /// Close with code 1000 and stop reconnecting. Idempotent.
    pub fn disconnect(&self) {
        let mut slot = self.inner.session();
        match slot.as_mut() {
            Some(session) if !session.stopped => {
                session.stopped = true;
                session.shutdown_tx.send_replace(Shutdown::Disconnect);
                info!(session = %session.id, endpoint = %session.endpoint, "Disconnect requested");
            }
            _ => debug!("disconnect() without an active session"),
        }
    }

    /// Send `payload` as a JSON text frame if the socket is open.
    ///
    /// Returns whether the frame was handed to the transport. Payloads sent
    /// while not connected are dropped with a warning, never queued.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        let slot = self.inner.session();
        let Some(session) = slot.as_ref().filter(|session| !session.stopped) else {
            warn!("Dropping outbound message: channel is not connected");
            return false;
        };

        let state = session.state_rx.borrow().clone();
        if !HealthMonitor::can_send(&state) {
            warn!(state = ?state, "Dropping outbound message: channel is not connected");
            return false;
        }

        let frame = match MessageHandler::encode_outbound(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping outbound message: serialization failed");
                return false;
            }
        };

        match session.outbound_tx.send(frame) {
            Ok(()) => true,
            Err(_) => {
                warn!("Dropping outbound message: session has stopped");
                false
            }
        }
    }

    /// Register `handler` for `event`
    pub fn on(&self, event: impl Into<EventName>, handler: Handler) {
        self.inner.registry.on(event.into(), handler);
    }

    /// Register a closure and return its handle for a later [`Self::off`]
    pub fn subscribe<F>(&self, event: impl Into<EventName>, f: F) -> Handler
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        let h = handler(f);
        self.on(event, h.clone());
        h
    }

    /// Remove every registration of `handler` for `event`
    pub fn off(&self, event: impl Into<EventName>, handler: &Handler) {
        let event = event.into();
        let removed = self.inner.registry.off(&event, handler);
        debug!(event = %event, removed, "Handler unregistered");
    }

    pub fn is_connected(&self) -> bool {
        HealthMonitor::can_send(&self.connection_state())
    }

    pub fn connection_state(&self) -> ConnectionState {
        match self.inner.session().as_ref() {
            None => ConnectionState::Idle,
            Some(session) if session.stopped => {
                ConnectionState::Disconnected(CLIENT_DISCONNECT_REASON.to_string())
            }
            Some(session) => session.state_rx.borrow().clone(),
        }
    }

    pub fn is_permanently_disconnected(&self) -> bool {
        matches!(
            self.connection_state(),
            ConnectionState::PermanentlyDisconnected(_)
        )
    }

    /// Endpoint of the current session, if any
    pub fn endpoint(&self) -> Option<String> {
        self.inner
            .session()
            .as_ref()
            .map(|session| session.endpoint.clone())
    }

    pub fn health_metrics(&self) -> HealthMetrics {
        let stats = self
            .inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        HealthMonitor::calculate_health_metrics(
            stats.connect_time,
            stats.last_message_time,
            stats.reconnect_count,
        )
    }

    /// Wait until the current session is connected.
    ///
    /// Fails as soon as the session gives up, is disconnected, or `timeout`
    /// elapses.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<(), ChannelError> {
        let state_rx = {
            let slot = self.inner.session();
            slot.as_ref()
                .filter(|session| !session.stopped)
                .map(|session| session.state_rx.clone())
        };
        let Some(mut state_rx) = state_rx else {
            return Err(ChannelError::NotConnected {
                state: self.connection_state(),
            });
        };

        let settled = tokio::time::timeout(timeout, async {
            state_rx
                .wait_for(|state| {
                    matches!(
                        state,
                        ConnectionState::Connected | ConnectionState::PermanentlyDisconnected(_)
                    )
                })
                .await
                .map(|state| (*state).clone())
        })
        .await;

        match settled {
            Ok(Ok(ConnectionState::Connected)) => Ok(()),
            _ => Err(ChannelError::NotConnected {
                state: self.connection_state(),
            }),
        }
    }
}

impl std::fmt::Debug for LiveChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveChannel")
            .field("endpoint", &self.endpoint())
            .field("state", &self.connection_state())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

/// How one connection attempt ended
enum AttemptOutcome {
    /// Socket closed or never opened; the reconnect policy decides what next
    Closed { close: CloseInfo, opened: bool },
    /// Session is over: shutdown, supersession or a setup error
    Stop,
}

enum Step {
    Shutdown(Shutdown),
    Outbound(Option<Frame>),
    Inbound(Option<Result<Frame, TransportError>>),
}

struct Supervisor {
    session_id: Uuid,
    endpoint: String,
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    registry: Arc<EventRegistry>,
    stats: Arc<Mutex<ChannelStats>>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<Shutdown>,
    outbound_rx: mpsc::UnboundedReceiver<Frame>,
}

impl Supervisor {
    async fn run(mut self) {
        // Attempts since the last successful open
        let mut attempts: u32 = 0;

        loop {
            let (close, opened) = match self.run_attempt().await {
                AttemptOutcome::Closed { close, opened } => (close, opened),
                AttemptOutcome::Stop => break,
            };
            if opened {
                attempts = 0;
            }

            let decision = HealthMonitor::should_attempt_reconnection(
                attempts,
                &self.config.reconnect,
                close.code,
                self.shutdown_signal() != Shutdown::Running,
            );

            match decision {
                ReconnectionDecision::Proceed { attempt, delay } => {
                    attempts = attempt;
                    if let Some(mut stats) = self.stats() {
                        stats.reconnect_count += 1;
                    }
                    self.transition(ConnectionEvent::ReconnectionStarted(attempt));
                    if !self.sleep_unless_shutdown(delay).await {
                        break;
                    }
                }
                ReconnectionDecision::AbortShutdownRequested => break,
                ReconnectionDecision::AbortIntentionalClose => {
                    info!(code = close.code, "Channel closed normally, not reconnecting");
                    break;
                }
                ReconnectionDecision::AbortMaxAttemptsExceeded => {
                    self.transition(ConnectionEvent::PermanentFailure(format!(
                        "Gave up after {attempts} reconnection attempts"
                    )));
                    self.emit(ChannelEvent::ReconnectFailed { attempts });
                    break;
                }
            }
        }

        debug!(target: "live_channel", "Supervisor finished");
    }

    async fn run_attempt(&mut self) -> AttemptOutcome {
        let token = match self.credentials.token().await {
            Ok(token) => token,
            Err(e) => {
                let message = e.to_event_message();
                warn!(error = %message, "Credential lookup failed, connecting anonymously");
                self.emit(ChannelEvent::Error { message });
                None
            }
        };

        let url = match build_channel_url(&self.config.ws_base_url, &self.endpoint, token.as_deref())
        {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e.to_event_message(), "Cannot build channel URL");
                self.emit(ChannelEvent::Error {
                    message: e.to_event_message(),
                });
                self.transition(ConnectionEvent::Closed(e.to_event_message()));
                return AttemptOutcome::Stop;
            }
        };

        info!(url = %redact_url(&url), "Opening live channel");

        let connector = self.connector.clone();
        let timeout = self.config.connect_timeout;
        let handshake = tokio::time::timeout(timeout, connector.connect(&url));

        let result = tokio::select! {
            biased;
            signal = shutdown_requested(&mut self.shutdown_rx) => Err(signal),
            result = handshake => Ok(result),
        };

        let result = match result {
            Ok(result) => result,
            Err(signal) => {
                debug!(target: "live_channel", ?signal, "Handshake abandoned");
                self.transition(ConnectionEvent::Closed(CLIENT_DISCONNECT_REASON.to_string()));
                if signal == Shutdown::Disconnect {
                    self.emit_final(client_disconnected_event());
                }
                return AttemptOutcome::Stop;
            }
        };

        match result {
            Ok(Ok((sink, stream))) => self.run_connected(sink, stream).await,
            Ok(Err(e)) => self.establishment_failed(ChannelError::from(e)),
            Err(_) => self.establishment_failed(ChannelError::HandshakeTimeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    fn establishment_failed(&self, error: ChannelError) -> AttemptOutcome {
        let message = error.to_event_message();
        error!(error = %message, "Live channel connection failed");

        let close = abnormal_close(message.clone());
        self.emit(ChannelEvent::Error { message });
        self.transition(ConnectionEvent::Closed(close.reason.clone()));
        self.emit(ChannelEvent::Disconnected {
            code: close.code,
            reason: close.reason.clone(),
            intentional: false,
        });

        AttemptOutcome::Closed {
            close,
            opened: false,
        }
    }

    async fn run_connected(&mut self, mut sink: FrameSink, mut stream: FrameStream) -> AttemptOutcome {
        // Frames queued for a socket that no longer exists
        let mut stale = 0usize;
        while self.outbound_rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(target: "live_channel", stale, "Discarded outbound frames from previous socket");
        }

        if let Some(mut stats) = self.stats() {
            stats.connect_time = Some(Instant::now());
            stats.last_message_time = None;
        }
        self.transition(ConnectionEvent::Opened);
        self.emit(ChannelEvent::Connected {
            endpoint: self.endpoint.clone(),
        });

        loop {
            let step = tokio::select! {
                biased;
                signal = shutdown_requested(&mut self.shutdown_rx) => Step::Shutdown(signal),
                frame = self.outbound_rx.recv() => Step::Outbound(frame),
                frame = stream.next() => Step::Inbound(frame),
            };

            match step {
                Step::Shutdown(signal) => {
                    self.shut_down(&mut sink, signal).await;
                    return AttemptOutcome::Stop;
                }
                Step::Outbound(Some(frame)) => {
                    debug!(target: "live_channel", ?frame, "Sending frame");
                    if let Err(e) = sink.send(frame).await {
                        warn!(error = %e, "Send failed, treating connection as lost");
                        return self.connection_lost(abnormal_close(e.to_string()));
                    }
                }
                Step::Outbound(None) => {
                    self.shut_down(&mut sink, Shutdown::Superseded).await;
                    return AttemptOutcome::Stop;
                }
                Step::Inbound(Some(Ok(frame))) => match MessageHandler::route_frame(frame) {
                    FrameRoute::Deliver(message) => {
                        if let Some(mut stats) = self.stats() {
                            stats.last_message_time = Some(Instant::now());
                        }
                        debug!(target: "live_channel", kind = ?message.kind, "Frame received");
                        self.emit(ChannelEvent::Message(message));
                    }
                    FrameRoute::Malformed(reason) => {
                        warn!(reason = %reason, "Dropping malformed frame");
                    }
                    FrameRoute::Ignored(what) => {
                        debug!(target: "live_channel", what, "Frame ignored");
                    }
                    FrameRoute::Closed(close) => return self.connection_lost(close),
                },
                Step::Inbound(Some(Err(e))) => {
                    return self.connection_lost(abnormal_close(e.to_string()));
                }
                Step::Inbound(None) => {
                    return self.connection_lost(abnormal_close(
                        "Connection closed without close frame",
                    ));
                }
            }
        }
    }

    fn connection_lost(&self, close: CloseInfo) -> AttemptOutcome {
        if let Some(mut stats) = self.stats() {
            stats.connect_time = None;
        }

        let intentional = is_intentional_close(close.code);
        let reason = if close.reason.is_empty() {
            format!("Closed with code {}", close.code)
        } else {
            close.reason.clone()
        };
        self.transition(ConnectionEvent::Closed(reason));
        self.emit(ChannelEvent::Disconnected {
            code: close.code,
            reason: close.reason.clone(),
            intentional,
        });

        AttemptOutcome::Closed {
            close,
            opened: true,
        }
    }

    async fn shut_down(&self, sink: &mut FrameSink, signal: Shutdown) {
        let close = async {
            sink.send(Frame::close(CLOSE_NORMAL)).await?;
            sink.close().await?;
            Ok::<(), TransportError>(())
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
            Ok(Ok(())) => debug!(target: "live_channel", "Close handshake sent"),
            Ok(Err(e)) => debug!(target: "live_channel", error = %e, "Close failed"),
            Err(_) => debug!(target: "live_channel", "Close timed out"),
        }

        if let Some(mut stats) = self.stats() {
            stats.connect_time = None;
        }
        self.transition(ConnectionEvent::Closed(CLIENT_DISCONNECT_REASON.to_string()));
        if signal == Shutdown::Disconnect {
            self.emit_final(client_disconnected_event());
        }
    }

    async fn sleep_unless_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown_rx) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn transition(&self, event: ConnectionEvent) {
        let next = HealthMonitor::determine_next_state(event);
        let previous = self.state_tx.send_replace(next.clone());
        HealthMonitor::log_state_transition(&previous, &next);
    }

    fn shutdown_signal(&self) -> Shutdown {
        *self.shutdown_rx.borrow()
    }

    /// Dispatch while the session is running
    fn emit(&self, event: ChannelEvent) {
        let signal = self.shutdown_signal();
        if signal != Shutdown::Running {
            debug!(target: "live_channel", ?signal, "Suppressing event from stopping session");
            return;
        }
        self.registry.emit(&event);
    }

    /// Dispatch the closing `Disconnected` of a session stopped by `disconnect()`
    fn emit_final(&self, event: ChannelEvent) {
        if self.shutdown_signal() == Shutdown::Superseded {
            return;
        }
        self.registry.emit(&event);
    }

    /// `None` once a newer session owns the stats
    fn stats(&self) -> Option<MutexGuard<'_, ChannelStats>> {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        (stats.session == Some(self.session_id)).then_some(stats)
    }
}

fn client_disconnected_event() -> ChannelEvent {
    ChannelEvent::Disconnected {
        code: CLOSE_NORMAL,
        reason: CLIENT_DISCONNECT_REASON.to_string(),
        intentional: true,
    }
}

/// Resolves once the session is told to stop; a dropped sender counts as superseded
async fn shutdown_requested(rx: &mut watch::Receiver<Shutdown>) -> Shutdown {
    loop {
        let current = *rx.borrow_and_update();
        if current != Shutdown::Running {
            return current;
        }
        if rx.changed().await.is_err() {
            return Shutdown::Superseded;
        }
    }
}
