//! EventRouter: moves events between the desktop and the paired device.
//!
//! Two independent flows:
//!
//! - **Outbound** (desktop → device): local sources call [`EventRouter::route_event`]
//!   (or one of the typed wrappers).  The event is put on a bounded queue
//!   without waiting; a single dispatch task drains the queue in order and
//!   hands each event to the attached [`DeviceLink`].  No link, or a full
//!   link queue, means the event is logged and dropped.  Nothing is retried.
//! - **Inbound** (device → desktop): the router is the session's
//!   [`MessageSink`].  Each decoded frame is dispatched by tag.  Clipboard
//!   writes and notifications run external tools, so they are queued for a
//!   single effect worker (which keeps their order) and `on_message` returns
//!   at once; call effects go to the call-effect channel.
//!
//! `start`/`stop` only control the outbound dispatch task.  The effect worker
//! lives as long as the router.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use eco_core::{
    CallPayload, ClipboardPayload, DevicePayload, Message, MessageType, NotificationPayload,
    Payload,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::context::SessionContext;
use crate::application::ports::{ClipboardWriter, DeviceLink, MessageSink, Notifier};

/// Capacity of the call-effect channel returned by [`EventRouter::new`].
const EFFECT_CHANNEL_CAPACITY: usize = 32;

/// Capacity of the queue feeding the desktop effect worker.
const LOCAL_EFFECT_CAPACITY: usize = 64;

/// Error type for router operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// The outbound event queue is saturated; the event was dropped.
    #[error("event queue full")]
    QueueFull,
    /// [`EventRouter::start`] was called while the dispatch task is running.
    #[error("router already running")]
    AlreadyRunning,
    /// The dispatch task died and took the event queue with it.
    #[error("event queue closed")]
    Closed,
}

/// A local event waiting to be sent to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub kind: MessageType,
    pub payload: Payload,
}

impl OutboundEvent {
    pub fn new(kind: MessageType, payload: Payload) -> Self {
        Self { kind, payload }
    }
}

/// Call-control effects requested by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEffect {
    /// The device answered the call from `number`.
    Answered { number: String },
    /// The device hung up.
    HungUp,
}

/// A desktop side effect requested by the device.
#[derive(Debug)]
enum LocalEffect {
    SetClipboard {
        device: String,
        text: String,
    },
    Notify {
        device: String,
        title: String,
        body: String,
    },
}

struct Dispatcher {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<mpsc::Receiver<OutboundEvent>>,
}

/// Routes local events to the device and device messages to local effects.
pub struct EventRouter {
    context: Arc<SessionContext>,
    events_tx: mpsc::Sender<OutboundEvent>,
    /// Parked queue receiver; `None` while the dispatch task owns it.
    events_rx: Mutex<Option<mpsc::Receiver<OutboundEvent>>>,
    dispatcher: Mutex<Option<Dispatcher>>,
    effects_tx: mpsc::Sender<CallEffect>,
    local_tx: mpsc::Sender<LocalEffect>,
}

impl EventRouter {
    /// Creates a stopped router with an outbound queue of `capacity` events.
    ///
    /// Returns the router and the receiver for call-control effects.  The
    /// caller owns that receiver; effects are dropped (with a warning) when
    /// it falls behind.
    ///
    /// Spawns the desktop effect worker, so it must be called from within a
    /// Tokio runtime.  The worker exits when the router is dropped.
    pub fn new(
        context: Arc<SessionContext>,
        clipboard: Arc<dyn ClipboardWriter>,
        notifier: Arc<dyn Notifier>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<CallEffect>) {
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let (effects_tx, effects_rx) = mpsc::channel(EFFECT_CHANNEL_CAPACITY);
        let (local_tx, local_rx) = mpsc::channel(LOCAL_EFFECT_CAPACITY);
        tokio::spawn(effect_worker(local_rx, clipboard, notifier));
        let router = Arc::new(Self {
            context,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            dispatcher: Mutex::new(None),
            effects_tx,
            local_tx,
        });
        (router, effects_rx)
    }

    /// The session context this router delivers to.
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Spawns the outbound dispatch task.
    ///
    /// Events queued before `start` are delivered once it runs.  Must be
    /// called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`RouterError::AlreadyRunning`] if the task is already running, or
    /// [`RouterError::Closed`] if a previous task panicked.
    pub fn start(&self) -> Result<(), RouterError> {
        let mut dispatcher = self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
        if dispatcher.is_some() {
            return Err(RouterError::AlreadyRunning);
        }
        let rx = self
            .events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RouterError::Closed)?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let context = Arc::clone(&self.context);
        let handle = tokio::spawn(dispatch_loop(context, rx, stop_rx));
        *dispatcher = Some(Dispatcher { stop_tx, handle });
        info!("event router started");
        Ok(())
    }

    /// Stops the dispatch task and waits for it to exit.
    ///
    /// Undelivered events stay queued and go out after the next [`start`](Self::start).
    /// Calling `stop` on a stopped router does nothing.
    pub async fn stop(&self) {
        let running = {
            let mut slot = self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        let Some(Dispatcher { stop_tx, handle }) = running else {
            return;
        };

        // The task may already have exited; that is fine.
        let _ = stop_tx.send(());
        match handle.await {
            Ok(rx) => {
                *self.events_rx.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
                info!("event router stopped");
            }
            Err(e) => error!("event dispatch task failed: {e}"),
        }
    }

    /// Returns `true` while the dispatch task is running.
    pub fn is_running(&self) -> bool {
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    /// Queues `event` for the device without waiting.
    ///
    /// # Errors
    ///
    /// [`RouterError::QueueFull`] when the queue is saturated.  The caller
    /// should treat the event as dropped.
    pub fn route_event(&self, event: OutboundEvent) -> Result<(), RouterError> {
        self.events_tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(dropped) => {
                warn!(kind = %dropped.kind, "event queue full, dropping event");
                RouterError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => RouterError::Closed,
        })
    }

    /// Queues a `clipboard.changed` event carrying `content`.
    pub fn route_clipboard_change(&self, content: impl Into<String>) -> Result<(), RouterError> {
        self.route_event(OutboundEvent::new(
            MessageType::ClipboardChanged,
            Payload::Clipboard(ClipboardPayload {
                data: content.into(),
            }),
        ))
    }

    /// Queues a `notification.push` event.
    pub fn route_notification(
        &self,
        app: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<(), RouterError> {
        self.route_event(OutboundEvent::new(
            MessageType::NotificationPush,
            Payload::Notification(NotificationPayload {
                app: app.into(),
                title: title.into(),
                body: body.into(),
            }),
        ))
    }

    /// Queues a `call.incoming` event for `number`.
    pub fn route_call_incoming(&self, number: impl Into<String>) -> Result<(), RouterError> {
        self.route_event(OutboundEvent::new(
            MessageType::CallIncoming,
            Payload::Call(CallPayload {
                number: number.into(),
            }),
        ))
    }

    // ── Session reference ─────────────────────────────────────────────────────

    /// Points the router at `link`, replacing any previous link.
    pub fn set_session(&self, link: Arc<dyn DeviceLink>) {
        self.context.attach(link);
    }

    /// Forgets the current link without stopping it.
    pub fn clear_session(&self) {
        self.context.clear();
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    fn emit_effect(&self, effect: CallEffect) {
        if let Err(e) = self.effects_tx.try_send(effect) {
            warn!("dropping call effect: {e}");
        }
    }

    fn queue_local(&self, effect: LocalEffect) {
        if let Err(e) = self.local_tx.try_send(effect) {
            warn!("dropping desktop effect: {e}");
        }
    }

    fn handle_clipboard_set(&self, msg: &Message) {
        match msg.payload_as::<ClipboardPayload>() {
            Ok(ClipboardPayload { data }) => self.queue_local(LocalEffect::SetClipboard {
                device: msg.device_id.clone(),
                text: data,
            }),
            Err(e) => warn!(device = %msg.device_id, "dropping clipboard.set: {e}"),
        }
    }

    fn handle_notification(&self, msg: &Message) {
        match msg.payload_as::<NotificationPayload>() {
            Ok(NotificationPayload { app, title, body }) => {
                debug!(device = %msg.device_id, %app, "queueing notification");
                self.queue_local(LocalEffect::Notify {
                    device: msg.device_id.clone(),
                    title,
                    body,
                });
            }
            Err(e) => warn!(device = %msg.device_id, "dropping notification.push: {e}"),
        }
    }

    fn handle_call_answer(&self, msg: &Message) {
        match msg.payload_as::<CallPayload>() {
            Ok(CallPayload { number }) => {
                info!(device = %msg.device_id, "call answered");
                self.emit_effect(CallEffect::Answered { number });
            }
            Err(e) => warn!(device = %msg.device_id, "dropping call.answer: {e}"),
        }
    }

    fn handle_hello(&self, msg: &Message) {
        match msg.typed_payload() {
            Ok(Payload::Device(DevicePayload { device_name })) => {
                info!(device = %msg.device_id, name = %device_name, "device said hello");
            }
            Ok(_) => info!(device = %msg.device_id, "device said hello"),
            Err(e) => warn!(device = %msg.device_id, "ignoring device.hello: {e}"),
        }
    }
}

#[async_trait]
impl MessageSink for EventRouter {
    async fn on_message(&self, msg: Message) {
        match &msg.kind {
            MessageType::ClipboardSet => self.handle_clipboard_set(&msg),
            MessageType::NotificationPush => self.handle_notification(&msg),
            MessageType::CallAnswer => self.handle_call_answer(&msg),
            MessageType::CallHangup => {
                info!(device = %msg.device_id, "call hung up");
                self.emit_effect(CallEffect::HungUp);
            }
            MessageType::DevicePing => debug!(device = %msg.device_id, "ping"),
            MessageType::DeviceDisconnect => {
                info!(device = %msg.device_id, "device requested disconnect");
                self.context.stop_current();
            }
            MessageType::DeviceHello => self.handle_hello(&msg),
            other => warn!(device = %msg.device_id, kind = %other, "unrecognised message type"),
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("running", &self.is_running())
            .field("context", &self.context)
            .finish()
    }
}

// ── Dispatch task ─────────────────────────────────────────────────────────────

/// Drains the event queue in order until stopped; returns the queue so the
/// router can be restarted.
async fn dispatch_loop(
    context: Arc<SessionContext>,
    mut rx: mpsc::Receiver<OutboundEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) -> mpsc::Receiver<OutboundEvent> {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            event = rx.recv() => match event {
                Some(event) => deliver(&context, event),
                None => break,
            },
        }
    }
    rx
}

/// Applies desktop effects one at a time, in arrival order.
async fn effect_worker(
    mut rx: mpsc::Receiver<LocalEffect>,
    clipboard: Arc<dyn ClipboardWriter>,
    notifier: Arc<dyn Notifier>,
) {
    while let Some(effect) = rx.recv().await {
        match effect {
            LocalEffect::SetClipboard { device, text } => {
                debug!(%device, len = text.len(), "setting clipboard");
                if let Err(e) = clipboard.set_text(&text).await {
                    warn!(%device, "clipboard write failed: {e}");
                }
            }
            LocalEffect::Notify {
                device,
                title,
                body,
            } => {
                if let Err(e) = notifier.send(&title, &body).await {
                    warn!(%device, "notification failed: {e}");
                }
            }
        }
    }
}

fn deliver(context: &SessionContext, event: OutboundEvent) {
    let Some(link) = context.current() else {
        debug!(kind = %event.kind, "no device connected, dropping event");
        return;
    };

    let msg = match Message::new(event.kind, link.device_id(), "", &event.payload) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("dropping unencodable event: {e}");
            return;
        }
    };
    let kind = msg.kind.clone();
    match link.send(msg) {
        Ok(()) => debug!(session = %link.session_id(), kind = %kind, "event queued for device"),
        Err(e) => warn!(session = %link.session_id(), kind = %kind, "dropping event: {e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
