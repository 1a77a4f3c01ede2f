//! Wayland clipboard adapters built on `wl-clipboard`.
//!
//! - [`WlClipboard`] writes text with `wl-copy` (the [`ClipboardWriter`] port).
//! - [`ClipboardListener`] runs `wl-paste --watch` and pushes every new
//!   clipboard value into the router as `clipboard.changed`.
//!
//! Both share a [`ClipboardMemory`] holding the last value seen.  Text the
//! phone wrote through `wl-copy` is remembered, so the listener does not echo
//! it straight back to the phone.

use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::ports::{ClipboardWriter, EffectError};
use crate::application::router::EventRouter;

const WL_COPY: &str = "wl-copy";
const WL_PASTE: &str = "wl-paste";

// ── Shared memory ─────────────────────────────────────────────────────────────

/// The last clipboard value either written or observed.
#[derive(Debug, Clone, Default)]
pub struct ClipboardMemory {
    last: Arc<Mutex<Option<String>>>,
}

impl ClipboardMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `content` as the current clipboard value.
    pub fn remember(&self, content: &str) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Some(content.to_string());
    }

    /// Records `content` and returns `true` if it differs from the previous
    /// value.  Empty content is never considered new.
    pub fn observe(&self, content: &str) -> bool {
        if content.is_empty() {
            return false;
        }
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_deref() == Some(content) {
            return false;
        }
        *last = Some(content.to_string());
        true
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Writes the clipboard by piping text into `wl-copy`.
#[derive(Debug, Clone)]
pub struct WlClipboard {
    program: &'static str,
    memory: ClipboardMemory,
}

impl WlClipboard {
    pub fn new(memory: ClipboardMemory) -> Self {
        Self::with_program(WL_COPY, memory)
    }

    /// Uses `program` instead of `wl-copy` (it must read the text on stdin).
    pub fn with_program(program: &'static str, memory: ClipboardMemory) -> Self {
        Self { program, memory }
    }
}

#[async_trait]
impl ClipboardWriter for WlClipboard {
    async fn set_text(&self, content: &str) -> Result<(), EffectError> {
        let program = self.program;
        // Remembered up front: `wl-paste --watch` can fire before `wl-copy` exits.
        self.memory.remember(content);
        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EffectError::Spawn { program, source })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(content.as_bytes())
                .await
                .map_err(|source| EffectError::Spawn { program, source })?;
            // Dropping stdin sends EOF.
        }

        let status = child
            .wait()
            .await
            .map_err(|source| EffectError::Spawn { program, source })?;
        if !status.success() {
            return Err(EffectError::Failed {
                program,
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// Watches the Wayland clipboard and forwards changes to the router.
pub struct ClipboardListener {
    router: Arc<EventRouter>,
    memory: ClipboardMemory,
}

/// Running listener; dropping or stopping it kills `wl-paste --watch`.
#[derive(Debug)]
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl ClipboardListener {
    pub fn new(router: Arc<EventRouter>, memory: ClipboardMemory) -> Self {
        Self { router, memory }
    }

    /// Starts `wl-paste --watch` and the forwarding task.
    ///
    /// # Errors
    ///
    /// Returns [`EffectError::Spawn`] if `wl-paste` cannot be started (for
    /// example when wl-clipboard is not installed).
    pub fn start(self) -> Result<ListenerHandle, EffectError> {
        // `wl-paste --watch CMD` runs CMD on every change; one line per change
        // is all we need as a trigger.
        let mut child = Command::new(WL_PASTE)
            .args(["--watch", "sh", "-c", "printf '!\\n'"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EffectError::Spawn {
                program: WL_PASTE,
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            return Err(EffectError::Failed {
                program: WL_PASTE,
                status: "no stdout".to_string(),
            });
        };

        info!("clipboard listener started");
        let task = tokio::spawn(async move {
            // Keep the child alive for as long as the task runs.
            let _child = child;
            let mut triggers = BufReader::new(stdout).lines();
            loop {
                match triggers.next_line().await {
                    Ok(Some(_)) => self.on_trigger().await,
                    Ok(None) => {
                        warn!("wl-paste --watch exited; clipboard sync stopped");
                        break;
                    }
                    Err(e) => {
                        warn!("reading wl-paste --watch: {e}");
                        break;
                    }
                }
            }
        });
        Ok(ListenerHandle { task })
    }

    async fn on_trigger(&self) {
        let content = match read_clipboard().await {
            Ok(content) => content,
            Err(e) => {
                debug!("clipboard read failed: {e}");
                return;
            }
        };
        if !self.memory.observe(&content) {
            return;
        }
        if let Err(e) = self.router.route_clipboard_change(content) {
            warn!("clipboard change dropped: {e}");
        }
    }
}

/// Reads the current clipboard text with `wl-paste --no-newline`.
async fn read_clipboard() -> Result<String, EffectError> {
    let output = Command::new(WL_PASTE)
        .arg("--no-newline")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|source| EffectError::Spawn {
            program: WL_PASTE,
            source,
        })?;
    if !output.status.success() {
        return Err(EffectError::Failed {
            program: WL_PASTE,
            status: output.status.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
