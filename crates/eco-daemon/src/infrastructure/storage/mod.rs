//! Storage infrastructure: the on-disk TOML config.
//!
//! The `config` sub-module reads and writes `config.toml`, generates fresh
//! pairing credentials for `eco init`, and converts the stored file into the
//! runtime [`DaemonConfig`](crate::domain::DaemonConfig).

pub mod config;
