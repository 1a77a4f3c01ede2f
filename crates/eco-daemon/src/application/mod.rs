//! Application layer for the daemon.
//!
//! # What is the "application" layer? (for beginners)
//!
//! It holds the rules of the relay without touching sockets or processes:
//!
//! - **`auth`**    – The authentication gate: is this `(device_id, secret)`
//!   the paired phone?
//! - **`context`** – The session context: the single slot that says which
//!   device link (if any) is currently live.  Shared by the server and router.
//! - **`router`**  – The event router: queues local events for the phone and
//!   dispatches the phone's messages to local effects.
//! - **`ports`**   – The traits the layer needs from the outside world
//!   (device link, message sink, clipboard writer, notifier).
//!
//! **Dependency rule**: nothing in here imports `crate::infrastructure`.

pub mod auth;
pub mod context;
pub mod ports;
pub mod router;

pub use auth::{AuthError, Authenticator};
pub use context::{ContextError, SessionContext};
pub use ports::{ClipboardWriter, DeviceLink, EffectError, LinkError, MessageSink, Notifier};
pub use router::{CallEffect, EventRouter, OutboundEvent, RouterError};
