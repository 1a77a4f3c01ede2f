//! Ports: the traits the application layer depends on.
//!
//! Infrastructure provides the real implementations (a WebSocket session,
//! `wl-copy`, `notify-send`); tests provide recording fakes.

use async_trait::async_trait;
use eco_core::Message;
use thiserror::Error;
use uuid::Uuid;

/// Why a message could not be handed to a device link.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The link is closing or closed.
    #[error("device not connected")]
    NotConnected,
    /// The outbound queue is saturated; the message was not enqueued.
    #[error("outbound queue full")]
    QueueFull,
}

/// Failure of a local side effect (clipboard write, notification).
#[derive(Debug, Error)]
pub enum EffectError {
    /// The helper program could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
    /// The helper program ran but reported failure.
    #[error("{program} exited with {status}")]
    Failed { program: &'static str, status: String },
}

/// The live connection to the paired device, as seen by the router.
///
/// Implemented by the WebSocket session.  All methods are non-blocking.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceLink: Send + Sync {
    /// Unique id of this connection instance.
    fn session_id(&self) -> Uuid;

    /// Authenticated device id bound to this link.
    fn device_id(&self) -> String;

    fn is_connected(&self) -> bool;

    /// Enqueues `msg` for transmission without waiting.
    ///
    /// # Errors
    ///
    /// [`LinkError::NotConnected`] once the link is stopping, and
    /// [`LinkError::QueueFull`] when the outbound queue is saturated.
    fn send(&self, msg: Message) -> Result<(), LinkError>;

    /// Tears the link down.  Safe to call more than once.
    fn stop(&self);
}

/// Receives every decoded inbound frame of a session, in arrival order.
///
/// The session's read pump awaits `on_message` before reading the next
/// frame, so implementations must return promptly.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn on_message(&self, msg: Message);
}

/// Writes text into the desktop clipboard.
#[async_trait]
pub trait ClipboardWriter: Send + Sync {
    async fn set_text(&self, content: &str) -> Result<(), EffectError>;
}

/// Shows a desktop notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, title: &str, body: &str) -> Result<(), EffectError>;
}
