//! TOML-based configuration persistence for the daemon.
//!
//! The file lives at `$XDG_CONFIG_HOME/eco/config.toml`, falling back to
//! `~/.config/eco/config.toml`:
//!
//! ```toml
//! [device]
//! device_id = "mobile-3f9a1c2b"
//! shared_secret = "…64 hex characters…"
//!
//! [server]
//! port = 4949
//! bind_address = "0.0.0.0"
//! log_level = "info"
//! ```
//!
//! Every field has a serde default, so a missing file or a partial file
//! still loads.  A config with an empty `device_id` or `shared_secret` is
//! "not initialised": `eco init` has to be run before the daemon will start.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use eco_core::protocol::messages::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Credential, DaemonConfig};

/// Name of the per-user config subdirectory.
const APP_DIR: &str = "eco";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("could not determine config directory (set XDG_CONFIG_HOME or HOME)")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid bind address {0:?}")]
    BindAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub server: ServerSection,
}

/// The paired device's credential.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSection {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub shared_secret: String,
}

/// Listener and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    /// IP address to bind to.  `"0.0.0.0"` listens on all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            log_level: default_log_level(),
        }
    }
}

impl std::fmt::Debug for DeviceSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSection")
            .field("device_id", &self.device_id)
            .field("shared_secret", &mask_secret(&self.shared_secret))
            .finish()
    }
}

impl AppConfig {
    /// Returns `true` once `eco init` has stored a credential.
    pub fn is_initialized(&self) -> bool {
        self.credential().is_complete()
    }

    pub fn credential(&self) -> Credential {
        Credential::new(self.device.device_id.clone(), self.device.shared_secret.clone())
    }

    /// Builds the runtime config, using the stored `[server]` values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BindAddress`] if `bind_address` is not an IP.
    pub fn to_daemon_config(&self) -> Result<DaemonConfig, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::BindAddress(self.server.bind_address.clone()))?;
        Ok(DaemonConfig::new(
            SocketAddr::new(ip, self.server.port),
            self.credential(),
        ))
    }

    /// Renders the config as TOML with the secret masked, for `eco config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_masked_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        shown.device.shared_secret = mask_secret(&self.device.shared_secret);
        Ok(toml::to_string_pretty(&shown)?)
    }
}

/// Keeps the first four characters of a secret and hides the rest.
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}…")
}

// ── Credential generation ─────────────────────────────────────────────────────

/// Generates a fresh device credential.
///
/// The device id is `mobile-` plus 8 hex characters; the secret is 64 hex
/// characters (256 bits) taken from two v4 UUIDs.
pub fn generate_credential() -> Credential {
    let id = Uuid::new_v4().simple().to_string();
    let secret = format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );
    Credential::new(format!("mobile-{}", &id[..8]), secret)
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default path of the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if neither `XDG_CONFIG_HOME`
/// nor `HOME` is set.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating the parent directory if needed.
///
/// On Unix the file is owner-only (0600) before any content is written,
/// whether it is created here or already existed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(io_err(dir))?;
    }

    let content = toml::to_string_pretty(config)?;
    let mut file = open_owner_only(path).map_err(io_err(path))?;
    file.write_all(content.as_bytes()).map_err(io_err(path))?;
    Ok(())
}

/// Opens `path` for writing, truncating it, with owner-only permissions.
fn open_owner_only(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(path)?;

    // `mode` only applies when the file is created.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(file)
}

/// Removes the config file at `path`.
///
/// Returns `false` if there was nothing to delete.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file exists but cannot be removed.
pub fn delete_config(path: &Path) -> Result<bool, ConfigError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError {
    let path = path.to_path_buf();
    move |source| ConfigError::Io { path, source }
}

/// `$XDG_CONFIG_HOME/eco`, or `$HOME/.config/eco`.
fn platform_config_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join(APP_DIR))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("eco-config-test-{tag}-{}", Uuid::new_v4().simple()))
            .join("config.toml")
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_app_config_default_server_section() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.server.port, 4949);
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
        assert_eq!(cfg.server.log_level, "info");
    }

    #[test]
    fn test_default_config_is_not_initialized() {
        assert!(!AppConfig::default().is_initialized());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: AppConfig = toml::from_str("[server]\nport = 5000\n").unwrap();
        assert_eq!(cfg.server.port, 5000);
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
        assert!(cfg.device.device_id.is_empty());
    }

    #[test]
    fn test_empty_toml_loads_as_default() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    // ── Conversion ────────────────────────────────────────────────────────────

    #[test]
    fn test_to_daemon_config_uses_server_section() {
        let mut cfg = AppConfig::default();
        cfg.server.bind_address = "127.0.0.1".to_string();
        cfg.server.port = 6000;
        cfg.device.device_id = "mobile-1".to_string();
        cfg.device.shared_secret = "s".to_string();

        let daemon = cfg.to_daemon_config().unwrap();

        assert_eq!(daemon.bind_addr, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(daemon.credential, Credential::new("mobile-1", "s"));
    }

    #[test]
    fn test_to_daemon_config_rejects_bad_bind_address() {
        let mut cfg = AppConfig::default();
        cfg.server.bind_address = "not-an-ip".to_string();
        assert!(matches!(
            cfg.to_daemon_config(),
            Err(ConfigError::BindAddress(_))
        ));
    }

    #[test]
    fn test_masked_toml_hides_secret() {
        let mut cfg = AppConfig::default();
        cfg.device.shared_secret = "abcdef0123456789".to_string();

        let shown = cfg.to_masked_toml().unwrap();

        assert!(!shown.contains("abcdef0123456789"));
        assert!(shown.contains("abcd…"));
    }

    #[test]
    fn test_device_section_debug_hides_secret() {
        let section = DeviceSection {
            device_id: "mobile-1".to_string(),
            shared_secret: "abcdef0123456789".to_string(),
        };
        assert!(!format!("{section:?}").contains("abcdef0123456789"));
    }

    // ── Credential generation ─────────────────────────────────────────────────

    #[test]
    fn test_generate_credential_shapes() {
        let cred = generate_credential();

        assert!(cred.device_id.starts_with("mobile-"));
        assert_eq!(cred.device_id.len(), "mobile-".len() + 8);
        assert_eq!(cred.secret.len(), 64);
        assert!(cred.secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_credential_is_random() {
        assert_ne!(generate_credential(), generate_credential());
    }

    // ── File round-trip ───────────────────────────────────────────────────────

    #[test]
    fn test_load_missing_file_returns_default() {
        let path = temp_config_path("missing");
        assert_eq!(load_config(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        // Arrange
        let path = temp_config_path("roundtrip");
        let cred = generate_credential();
        let mut cfg = AppConfig::default();
        cfg.device.device_id = cred.device_id.clone();
        cfg.device.shared_secret = cred.secret.clone();
        cfg.server.port = 5050;

        // Act
        save_config(&path, &cfg).unwrap();
        let restored = load_config(&path).unwrap();

        // Assert
        assert_eq!(restored, cfg);
        assert!(restored.is_initialized());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_config_path("perms");
        save_config(&path, &AppConfig::default()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_over_world_readable_file_tightens_permissions() {
        use std::os::unix::fs::PermissionsExt;

        // Arrange: a config left behind with loose permissions
        let path = temp_config_path("loose");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        let mut cfg = AppConfig::default();
        cfg.device.device_id = "mobile-1".to_string();
        cfg.device.shared_secret = "s3cret".to_string();

        // Act
        save_config(&path, &cfg).unwrap();

        // Assert
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(load_config(&path).unwrap(), cfg);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_delete_config_removes_file_once() {
        // Arrange
        let path = temp_config_path("delete");
        save_config(&path, &AppConfig::default()).unwrap();

        // Act / Assert
        assert!(delete_config(&path).unwrap());
        assert!(!delete_config(&path).unwrap());
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_malformed_file_is_parse_error() {
        let path = temp_config_path("malformed");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[server\nport = ").unwrap();

        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
