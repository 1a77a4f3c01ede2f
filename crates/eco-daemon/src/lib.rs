//! eco-daemon library crate.
//!
//! The desktop half of eco: a WebSocket server that admits exactly one paired
//! phone and relays clipboard, notification and call events in both
//! directions.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Phone (JSON over WebSocket, /ws)
//!         ↕
//! [eco-daemon]
//!   ├── domain/           Pure types: DaemonConfig, Credential
//!   ├── application/      Auth gate, session context, event router, ports
//!   └── infrastructure/
//!         ├── server/     Accept loop + first-frame authentication
//!         ├── session/    Per-connection read/write pumps, keepalive
//!         ├── adapters/   wl-copy / wl-paste / notify-send collaborators
//!         └── storage/    TOML configuration file
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no async).
//! - `application` depends on `domain` and `eco-core` only; everything it needs
//!   from the outside world is expressed as a trait in `application::ports`.
//! - `infrastructure` implements those traits with tokio, tungstenite and
//!   child processes.

/// Domain layer: configuration and credential types (no I/O).
pub mod domain;

/// Application layer: authentication, routing and the session context.
pub mod application;

/// Infrastructure layer: network server, sessions, OS adapters, storage.
pub mod infrastructure;
