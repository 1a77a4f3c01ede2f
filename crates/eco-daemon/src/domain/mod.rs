//! Domain layer for eco-daemon.
//!
//! Plain data that every other layer shares: the runtime configuration and the
//! single pairing credential.  Nothing here performs I/O, so these types can
//! be built freely in tests.

pub mod config;

pub use config::{Credential, DaemonConfig};
