//! eco: entry point.
//!
//! Pairs this desktop with one phone and relays clipboard, notification and
//! call events between them over a WebSocket.
//!
//! # Usage
//!
//! ```text
//! eco [--config <FILE>] <COMMAND>
//!
//! Commands:
//!   init [--force]                      Generate and store a pairing credential
//!   daemon [--port <PORT>] [--bind <IP>] Run the relay in the foreground
//!   config [show|delete]                Print (secret masked) or delete the config
//!   status                              Initialisation state, device id, config path
//!   devices [--show-secret]             The registered device (secret masked)
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable     | Default                         | Description            |
//! |--------------|---------------------------------|------------------------|
//! | `ECO_CONFIG` | `$XDG_CONFIG_HOME/eco/config.toml` | Config file path    |
//! | `ECO_PORT`   | `[server] port` (4949)          | Listener port          |
//! | `ECO_BIND`   | `[server] bind_address`         | Listener IP            |
//! | `RUST_LOG`   | `[server] log_level` (`info`)   | `tracing` filter       |
//!
//! CLI flags take precedence over environment variables, which take
//! precedence over the config file.

use std::fmt::Write as _;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use eco_daemon::application::{
    CallEffect, ClipboardWriter, EventRouter, Notifier, SessionContext,
};
use eco_daemon::infrastructure::adapters::{
    ClipboardListener, ClipboardMemory, NotifySend, WlClipboard,
};
use eco_daemon::infrastructure::server::Server;
use eco_daemon::infrastructure::storage::config::{
    config_file_path, delete_config, generate_credential, load_config, mask_secret, save_config,
    AppConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// eco: clipboard, notification and call relay between this desktop and your phone.
#[derive(Debug, Parser)]
#[command(name = "eco", version)]
struct Cli {
    /// Path of the config file.
    #[arg(long, global = true, env = "ECO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a device id and shared secret and save them.
    Init {
        /// Overwrite an existing credential.
        #[arg(long)]
        force: bool,
    },
    /// Run the WebSocket server and system listeners until Ctrl+C.
    Daemon(DaemonArgs),
    /// Inspect or delete the stored configuration.
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Show whether eco is initialized and where its config lives.
    Status,
    /// Show the registered device.
    Devices {
        /// Print the shared secret instead of masking it.
        #[arg(long)]
        show_secret: bool,
    },
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum ConfigAction {
    /// Print the configuration with the secret masked (default).
    Show,
    /// Delete the configuration file.
    Delete,
}

#[derive(Debug, Args)]
struct DaemonArgs {
    /// TCP port to listen on.
    #[arg(long, env = "ECO_PORT")]
    port: Option<u16>,

    /// IP address to bind to (`0.0.0.0` for every interface).
    #[arg(long, env = "ECO_BIND")]
    bind: Option<String>,
}

impl DaemonArgs {
    /// Applies the command-line overrides on top of the stored config.
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not an IP address.
    fn apply(&self, app: &mut AppConfig) -> anyhow::Result<()> {
        if let Some(port) = self.port {
            app.server.port = port;
        }
        if let Some(bind) = &self.bind {
            bind.parse::<IpAddr>()
                .with_context(|| format!("invalid bind address: '{bind}'"))?;
            app.server.bind_address = bind.clone();
        }
        Ok(())
    }
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("cannot locate the config file"),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = cli.config_path()?;

    match cli.command {
        Command::Init { force } => run_init(&path, force),
        Command::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => run_config_show(&path),
            ConfigAction::Delete => run_config_delete(&path),
        },
        Command::Status => run_status(&path),
        Command::Devices { show_secret } => run_devices(&path, show_secret),
        Command::Daemon(args) => run_daemon(&path, &args).await,
    }
}

/// Installs the `tracing` subscriber.  `RUST_LOG` wins over `default_level`.
fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn run_init(path: &Path, force: bool) -> anyhow::Result<()> {
    let mut app = load_config(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    if app.is_initialized() && !force {
        bail!("eco is already initialized. Use --force to overwrite.");
    }

    let credential = generate_credential();
    app.device.device_id = credential.device_id.clone();
    app.device.shared_secret = credential.secret.clone();
    save_config(path, &app)
        .with_context(|| format!("failed to save config to {}", path.display()))?;

    println!("✓ eco initialized");
    println!();
    println!("Device ID: {}", credential.device_id);
    println!("Secret:    {}", credential.secret);
    println!();
    println!("Enter these credentials in the eco mobile app to connect.");
    println!("Config saved to: {}", path.display());
    Ok(())
}

fn run_config_show(path: &Path) -> anyhow::Result<()> {
    let app = load_config(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    println!("# {}", path.display());
    print!("{}", app.to_masked_toml()?);
    if !app.is_initialized() {
        println!("\n# not initialized: run `eco init`");
    }
    Ok(())
}

fn run_config_delete(path: &Path) -> anyhow::Result<()> {
    if delete_config(path)? {
        println!("✓ eco configuration deleted. Run `eco init` to set up eco again.");
    } else {
        println!("No configuration found to delete.");
    }
    Ok(())
}

fn run_status(path: &Path) -> anyhow::Result<()> {
    let app = load_config(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    print!("{}", status_report(path, &app));
    Ok(())
}

fn status_report(path: &Path, app: &AppConfig) -> String {
    if !app.is_initialized() {
        return "eco is not initialized. Run `eco init` to set up.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "eco status");
    let _ = writeln!(out, "==========");
    let _ = writeln!(out, "Initialized: yes");
    let _ = writeln!(out, "Device ID:   {}", app.device.device_id);
    let _ = writeln!(out, "Config path: {}", path.display());
    match app.to_daemon_config() {
        Ok(config) => {
            let _ = writeln!(out, "Listen URL:  {}", config.connection_url());
        }
        Err(e) => {
            let _ = writeln!(out, "Listen URL:  invalid ({e})");
        }
    }
    out
}

fn run_devices(path: &Path, show_secret: bool) -> anyhow::Result<()> {
    let app = load_config(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    print!("{}", devices_report(&app, show_secret));
    Ok(())
}

fn devices_report(app: &AppConfig, show_secret: bool) -> String {
    if !app.is_initialized() {
        return "No device registered. Run `eco init` to register a device.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "Registered device");
    let _ = writeln!(out, "=================");
    let _ = writeln!(out, "Device ID: {}", app.device.device_id);
    if show_secret {
        let _ = writeln!(out, "Secret:    {}", app.device.shared_secret);
    } else {
        let _ = writeln!(
            out,
            "Secret:    {} (use --show-secret to reveal)",
            mask_secret(&app.device.shared_secret)
        );
    }
    out
}

async fn run_daemon(path: &Path, args: &DaemonArgs) -> anyhow::Result<()> {
    let mut app = load_config(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    args.apply(&mut app)?;
    init_tracing(&app.server.log_level);

    if !app.is_initialized() {
        bail!("eco is not initialized. Run `eco init` first.");
    }
    let config = app.to_daemon_config()?;
    info!(device = %config.credential.device_id, "eco daemon starting");

    // ── Wiring ────────────────────────────────────────────────────────────────
    let context = Arc::new(SessionContext::new());
    let memory = ClipboardMemory::new();
    let notifier = Arc::new(NotifySend::new());
    let clipboard: Arc<dyn ClipboardWriter> = Arc::new(WlClipboard::new(memory.clone()));
    let (router, mut effects) = EventRouter::new(
        Arc::clone(&context),
        clipboard,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        config.queue_capacity,
    );
    router.start()?;

    tokio::spawn(async move {
        while let Some(effect) = effects.recv().await {
            match effect {
                CallEffect::Answered { number } => info!(%number, "call answered on phone"),
                CallEffect::HungUp => info!("call hung up on phone"),
            }
        }
    });

    let listener = match ClipboardListener::new(Arc::clone(&router), memory).start() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("clipboard sync disabled: {e}");
            None
        }
    };

    if !notifier.is_available().await {
        warn!("notify-send not found; notifications will not be shown");
    }

    let server = Server::bind(config.clone(), Arc::clone(&context), Arc::clone(&router))
        .await
        .with_context(|| format!("failed to start listener on {}", config.bind_addr))?;
    info!("connect your phone to {}", config.connection_url());

    if let Err(e) = notifier.send("eco", "eco daemon started").await {
        debug!("start-up notification failed: {e}");
    }

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    server.run(running).await;

    if let Some(listener) = listener {
        listener.stop();
    }
    server.shutdown();
    router.stop().await;
    info!("eco daemon stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
