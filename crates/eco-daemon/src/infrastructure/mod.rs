//! Infrastructure layer for the daemon.
//!
//! Contains everything that touches the outside world: the WebSocket
//! listener and sessions, the clipboard and notification tools, and the
//! config file.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `eco_core`, but MUST NOT be imported by the `application` or `domain` layers.

pub mod adapters;
pub mod server;
pub mod session;
pub mod storage;
