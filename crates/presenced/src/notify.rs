//! Notification backends: an external text-to-speech command, or the log.

use presence_core::{NotificationBackend, NotificationError};
use std::process::Stdio;
use tokio::process::Command;

/// Runs `program args... <text>` once per message and waits for it to finish.
///
/// The child is killed if the call is cancelled, so a timed-out utterance
/// stops instead of talking over the next one.
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
}

impl CommandBackend {
    /// Split a command line such as `espeak -s 150` on whitespace.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl NotificationBackend for CommandBackend {
    async fn speak(&self, text: &str) -> Result<(), NotificationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NotificationError::Backend(format!("{}: {e}", self.program)))?;
        let status = child
            .wait()
            .await
            .map_err(|e| NotificationError::Backend(format!("{}: {e}", self.program)))?;
        if status.success() {
            Ok(())
        } else {
            Err(NotificationError::Backend(format!("{} exited with {status}", self.program)))
        }
    }
}

/// Writes notifications to the log when no speech command is configured.
pub struct LogBackend;

impl NotificationBackend for LogBackend {
    async fn speak(&self, text: &str) -> Result<(), NotificationError> {
        tracing::info!(text, "notification");
        Ok(())
    }
}
