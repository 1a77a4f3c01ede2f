//! Daemon runtime configuration and the pairing credential.
//!
//! [`DaemonConfig`] is built once in `main.rs` from the TOML file plus CLI
//! overrides and then shared (via `Arc`) by the server and every session.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use eco_core::protocol::messages::{
    DEFAULT_PORT, PING_INTERVAL_SECS, QUEUE_CAPACITY, READ_TIMEOUT_SECS, WS_PATH,
};

/// The one `(device_id, secret)` pair allowed to open a session.
///
/// Loaded at startup and never changed while the daemon runs.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credential {
    pub device_id: String,
    pub secret: String,
}

impl Credential {
    pub fn new(device_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            secret: secret.into(),
        }
    }

    /// Returns `true` when both halves are set (i.e. `eco init` has been run).
    pub fn is_complete(&self) -> bool {
        !self.device_id.is_empty() && !self.secret.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("device_id", &self.device_id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// All runtime configuration for the daemon.
///
/// # Example
///
/// ```rust
/// use eco_daemon::domain::{Credential, DaemonConfig};
///
/// let cfg = DaemonConfig::new(
///     "127.0.0.1:4949".parse().unwrap(),
///     Credential::new("mobile-ab12cd34", "deadbeef"),
/// );
/// assert_eq!(cfg.queue_capacity, 256);
/// assert_eq!(cfg.connection_url(), "ws://127.0.0.1:4949/ws");
/// ```
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// The only credential the authentication gate accepts.
    pub credential: Credential,

    /// How often the write pump sends a WebSocket ping.
    pub ping_interval: Duration,

    /// Rolling read deadline; refreshed by every pong and every decoded frame.
    /// Also bounds how long the server waits for the authentication frame.
    pub read_timeout: Duration,

    /// Capacity of the session outbound queue and the router event queue.
    pub queue_capacity: usize,
}

impl DaemonConfig {
    /// Builds a config with the protocol's default timings.
    pub fn new(bind_addr: SocketAddr, credential: Credential) -> Self {
        Self {
            bind_addr,
            credential,
            ping_interval: Duration::from_secs(PING_INTERVAL_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            queue_capacity: QUEUE_CAPACITY,
        }
    }

    /// The URL a phone on the same network should connect to.
    pub fn connection_url(&self) -> String {
        format!("ws://{}{}", self.bind_addr, WS_PATH)
    }
}

impl Default for DaemonConfig {
    /// Binds `0.0.0.0:4949` with an empty (unusable) credential.
    fn default() -> Self {
        Self::new(
            SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            Credential::default(),
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
