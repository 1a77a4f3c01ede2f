//! Desktop notifications via freedesktop `notify-send`.

use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::application::ports::{EffectError, Notifier};

const NOTIFY_SEND: &str = "notify-send";

/// Shows notifications by running `notify-send TITLE BODY`.
///
/// When the program is not installed, notifications are skipped and
/// [`Notifier::send`] still returns `Ok`.
#[derive(Debug, Clone)]
pub struct NotifySend {
    program: &'static str,
}

impl Default for NotifySend {
    fn default() -> Self {
        Self::with_program(NOTIFY_SEND)
    }
}

impl NotifySend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: &'static str) -> Self {
        Self { program }
    }

    /// Returns `true` if the program can be started.
    pub async fn is_available(&self) -> bool {
        Command::new(self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok()
    }
}

#[async_trait]
impl Notifier for NotifySend {
    async fn send(&self, title: &str, body: &str) -> Result<(), EffectError> {
        let program = self.program;
        let status = match Command::new(program)
            .arg("--")
            .arg(title)
            .arg(body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => status,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{program} not installed; skipping notification");
                return Ok(());
            }
            Err(source) => return Err(EffectError::Spawn { program, source }),
        };

        if status.success() {
            Ok(())
        } else {
            Err(EffectError::Failed {
                program,
                status: status.to_string(),
            })
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
