//! Session: one authenticated WebSocket connection to the paired device.
//!
//! # How a session runs (for beginners)
//!
//! Authentication happens in the server *before* a session exists, so a new
//! [`Session`] starts life already `Connected`.  [`Session::spawn_pumps`] then
//! splits the WebSocket into its read and write halves and starts one Tokio
//! task for each:
//!
//! - **Read pump**: waits for the next frame, decodes it, and hands it to the
//!   [`MessageSink`] (the router) before reading the next one.  A rolling
//!   read deadline (60 s by default) is pushed forward by every pong and by
//!   every decoded frame.  Missing the deadline, a decode failure, a Close
//!   frame, or any I/O error tears the session down.
//! - **Write pump**: waits on three things at once (`tokio::select!`): the
//!   bounded outbound queue, the keepalive ticker (one ping every 30 s), and
//!   the stop signal.
//!
//! The two pumps share nothing but the outbound queue and a
//! `tokio::sync::watch` channel holding the [`SessionState`].  The watch
//! channel is the stop token: as soon as the state leaves `Connected`, both
//! pumps wake up and exit.
//!
//! ```text
//!  Disconnected ──new()──► Connected ──stop()──► Closing ──► Closed
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use eco_core::protocol::messages::{
    MAX_FRAME_SIZE, PING_INTERVAL_SECS, QUEUE_CAPACITY, READ_TIMEOUT_SECS,
};
use eco_core::{decode_message, Message, MessageType, ProtocolError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::application::ports::{DeviceLink, LinkError, MessageSink};
use crate::domain::DaemonConfig;

/// How long the write pump waits for the peer to accept the Close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors produced by a session.
///
/// `NotConnected` and `QueueFull` are returned to callers of
/// [`Session::send`]; the rest only describe why a session was torn down.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not connected")]
    NotConnected,
    #[error("outbound queue full")]
    QueueFull,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("undecodable frame: {0}")]
    Decode(#[from] ProtocolError),
    #[error("no frame or pong within {0:?}")]
    ReadTimeout(Duration),
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("session stopped")]
    Stopped,
}

impl From<SessionError> for LinkError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::QueueFull => LinkError::QueueFull,
            _ => LinkError::NotConnected,
        }
    }
}

// ── State & config ────────────────────────────────────────────────────────────

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connected,
    Closing,
    Closed,
}

/// Timing and sizing knobs for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub ping_interval: Duration,
    pub read_timeout: Duration,
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(PING_INTERVAL_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            outbound_capacity: QUEUE_CAPACITY,
        }
    }
}

impl From<&DaemonConfig> for SessionConfig {
    fn from(cfg: &DaemonConfig) -> Self {
        Self {
            ping_interval: cfg.ping_interval,
            read_timeout: cfg.read_timeout,
            outbound_capacity: cfg.queue_capacity,
        }
    }
}

/// WebSocket limits applied to every device connection.
pub fn websocket_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(MAX_FRAME_SIZE);
    config.max_frame_size = Some(MAX_FRAME_SIZE);
    config
}

/// Receiving end of a session's outbound queue.
///
/// Handed to [`Session::spawn_pumps`], which gives it to the write pump.
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::Receiver<Message>,
}

impl OutboundQueue {
    /// Waits for the next queued message.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Takes the next queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Handle to one device connection.
///
/// Cheap to share: the server, the session context and both pumps each hold
/// an `Arc<Session>`.
pub struct Session {
    id: Uuid,
    device_id: String,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    outbound: mpsc::Sender<Message>,
}

impl Session {
    /// Creates a connected session for the authenticated `device_id`.
    pub fn new(device_id: impl Into<String>, config: SessionConfig) -> (Arc<Self>, OutboundQueue) {
        let (outbound, rx) = mpsc::channel(config.outbound_capacity);
        let (state, _) = watch::channel(SessionState::Connected);
        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            device_id: device_id.into(),
            config,
            state,
            outbound,
        });
        (session, OutboundQueue { rx })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Queues `device.hello` and starts the read and write pumps.
    ///
    /// Each inbound frame is passed to `sink` in arrival order.
    pub fn spawn_pumps<S>(
        self: &Arc<Self>,
        ws: WebSocketStream<S>,
        queue: OutboundQueue,
        sink: Arc<dyn MessageSink>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if let Err(e) = self.send(Message::bare(MessageType::DeviceHello, self.device_id.clone())) {
            warn!(session = %self.id, "could not queue hello: {e}");
        }

        let (ws_tx, ws_rx) = ws.split();
        let span = tracing::info_span!("session", id = %self.id, device = %self.device_id);

        tokio::spawn(read_pump(Arc::clone(self), ws_rx, sink).instrument(span.clone()));
        tokio::spawn(write_pump(Arc::clone(self), ws_tx, queue).instrument(span));
    }

    /// Queues `msg` for the write pump without waiting.
    ///
    /// Delivery is best effort: a failed send is not retried.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotConnected`] once the session is stopping.
    /// - [`SessionError::QueueFull`] when the outbound queue is saturated.
    pub fn send(&self, msg: Message) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.outbound.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SessionError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SessionError::NotConnected,
        })
    }

    /// Stops the session: `Connected → Closing → Closed`.
    ///
    /// Both pumps observe the change and exit; the write pump closes the
    /// transport on its way out.  Calling `stop` again does nothing.
    pub fn stop(&self) {
        let began = self.state.send_if_modified(|state| {
            if *state == SessionState::Connected {
                *state = SessionState::Closing;
                true
            } else {
                false
            }
        });
        if began {
            self.state.send_replace(SessionState::Closed);
            debug!(session = %self.id, "session stopped");
        }
    }

    /// Resolves once the session has reached [`SessionState::Closed`].
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so this can only end by matching.
        let _ = rx.wait_for(|state| *state == SessionState::Closed).await;
    }

    fn teardown(&self, reason: &SessionError) {
        if self.is_connected() {
            info!(session = %self.id, device = %self.device_id, "session ended: {reason}");
        }
        self.stop();
    }
}

impl DeviceLink for Session {
    fn session_id(&self) -> Uuid {
        self.id
    }

    fn device_id(&self) -> String {
        self.device_id.clone()
    }

    fn is_connected(&self) -> bool {
        Session::is_connected(self)
    }

    fn send(&self, msg: Message) -> Result<(), LinkError> {
        Session::send(self, msg).map_err(LinkError::from)
    }

    fn stop(&self) {
        Session::stop(self);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("device_id", &self.device_id)
            .field("state", &self.state())
            .finish()
    }
}

// ── Pumps ─────────────────────────────────────────────────────────────────────

async fn read_pump<S>(
    session: Arc<Session>,
    mut stream: SplitStream<WebSocketStream<S>>,
    sink: Arc<dyn MessageSink>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let read_timeout = session.config.read_timeout;
    let mut state_rx = session.state.subscribe();
    let mut deadline = Instant::now() + read_timeout;

    let reason = loop {
        if !session.is_connected() {
            break SessionError::Stopped;
        }

        tokio::select! {
            frame = stream.next() => {
                let bytes = match frame {
                    None => break SessionError::PeerClosed,
                    Some(Err(e)) => break SessionError::Transport(e.to_string()),
                    Some(Ok(WsMessage::Close(_))) => break SessionError::PeerClosed,
                    Some(Ok(WsMessage::Pong(_))) => {
                        deadline = Instant::now() + read_timeout;
                        continue;
                    }
                    // tungstenite answers pings itself.
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Frame(_))) => continue,
                    Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
                    Some(Ok(WsMessage::Binary(data))) => data,
                };

                match decode_message(&bytes) {
                    Ok(msg) => {
                        deadline = Instant::now() + read_timeout;
                        debug!(kind = %msg.kind, "frame received");
                        sink.on_message(msg).await;
                    }
                    Err(e) => break SessionError::Decode(e),
                }
            }
            _ = sleep_until(deadline) => break SessionError::ReadTimeout(read_timeout),
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break SessionError::Stopped;
                }
            }
        }
    };

    session.teardown(&reason);
}

async fn write_pump<S>(
    session: Arc<Session>,
    mut ws_tx: SplitSink<WebSocketStream<S>, WsMessage>,
    mut queue: OutboundQueue,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ping_interval = session.config.ping_interval;
    let mut state_rx = session.state.subscribe();
    let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        if !session.is_connected() {
            break SessionError::Stopped;
        }

        tokio::select! {
            biased;

            changed = state_rx.changed() => {
                if changed.is_err() {
                    break SessionError::Stopped;
                }
            }
            next = queue.recv() => {
                let Some(msg) = next else {
                    break SessionError::Stopped;
                };
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("skipping unencodable outbound message: {e}");
                        continue;
                    }
                };
                if let Err(e) = send_frame(&mut ws_tx, &mut state_rx, WsMessage::Text(json)).await {
                    break e;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = send_frame(&mut ws_tx, &mut state_rx, WsMessage::Ping(Vec::new())).await {
                    break e;
                }
                debug!("keepalive ping sent");
            }
        }
    };

    session.teardown(&reason);

    // Best effort: the peer may already be gone or no longer reading.
    match timeout(CLOSE_TIMEOUT, ws_tx.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("closing transport: {e}"),
        Err(_) => debug!("peer did not take the close frame within {CLOSE_TIMEOUT:?}"),
    }
}

/// Writes one frame, giving up as soon as the session leaves `Connected`.
///
/// A peer that stops reading fills the socket buffer and parks the write
/// until the state changes.
async fn send_frame<S>(
    ws_tx: &mut SplitSink<WebSocketStream<S>, WsMessage>,
    state_rx: &mut watch::Receiver<SessionState>,
    frame: WsMessage,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::select! {
        biased;

        _ = state_rx.wait_for(|state| *state != SessionState::Connected) => {
            Err(SessionError::Stopped)
        }
        sent = ws_tx.send(frame) => sent.map_err(|e| SessionError::Transport(e.to_string())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
