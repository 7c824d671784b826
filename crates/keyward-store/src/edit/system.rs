//! Default collaborators backed by the operating system.

use std::path::Path;
use std::process::Command;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use super::{CompletionSignal, Launcher, Notifier, WaitOutcome};
use crate::error::{StoreError, StoreResult};

/// Wait used when a [`FileWatch`] has no timeout (100 hours).
pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(360_000);

/// Opens files with the user's default application: `xdg-open` on Linux
/// and the BSDs, `open` on macOS, `start` on Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    fn command(path: &Path) -> StoreResult<Command> {
        let (program, prefix): (&str, &[&str]) = if cfg!(target_os = "macos") {
            ("open", &[])
        } else if cfg!(windows) {
            ("cmd", &["/C", "start", ""])
        } else {
            ("xdg-open", &[])
        };
        let resolved = which::which(program)
            .map_err(|e| StoreError::Editor(format!("cannot find '{program}': {e}")))?;
        let mut command = Command::new(resolved);
        command.args(prefix).arg(path);
        Ok(command)
    }
}

impl Launcher for SystemLauncher {
    fn open(&self, path: &Path) -> StoreResult<()> {
        let status = Self::command(path)?
            .status()
            .map_err(|e| StoreError::Editor(format!("failed to launch editor: {e}")))?;
        if !status.success() {
            return Err(StoreError::Editor(format!(
                "editor launcher exited with {status} for {}",
                path.display()
            )));
        }
        debug!(path = %path.display(), "opened in default application");
        Ok(())
    }
}

/// Waits until the edited file is written, or the timeout elapses.
///
/// Editors often save by writing a sibling file and renaming it over the
/// original, so the parent directory is watched and both modifications and
/// creations of the file count.
pub struct FileWatch {
    timeout: Option<Duration>,
    fallback: Option<Box<dyn CompletionSignal>>,
}

impl FileWatch {
    /// Watch with an optional timeout ([`DEFAULT_WATCH_TIMEOUT`] if `None`).
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            fallback: None,
        }
    }

    /// Signal to use when the filesystem cannot be watched.
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl CompletionSignal + 'static) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    fn watch(&self, path: &Path) -> notify::Result<WaitOutcome> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(tx)?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(path = %path.display(), "waiting for the file to be saved");

        let timeout = self.timeout.unwrap_or(DEFAULT_WATCH_TIMEOUT);
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if remaining.is_zero() {
                return Ok(WaitOutcome::TimedOut);
            }
            match rx.recv_timeout(remaining) {
                Ok(Ok(event)) if touches(&event, path) => return Ok(WaitOutcome::Modified),
                Ok(Ok(_)) => {},
                Ok(Err(e)) => warn!(error = %e, "filesystem watcher error"),
                Err(mpsc::RecvTimeoutError::Timeout) => return Ok(WaitOutcome::TimedOut),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    debug!("filesystem watcher channel closed");
                    return Ok(WaitOutcome::TimedOut);
                },
            }
        }
    }
}

fn touches(event: &Event, path: &Path) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some() && p.file_name() == path.file_name())
}

impl CompletionSignal for FileWatch {
    fn wait(&self, path: &Path, title: &str) -> StoreResult<WaitOutcome> {
        match self.watch(path) {
            Ok(outcome) => Ok(outcome),
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    warn!(error = %e, "cannot watch file, falling back");
                    fallback.wait(path, title)
                },
                None => Err(StoreError::Editor(format!("cannot watch {}: {e}", path.display()))),
            },
        }
    }
}

impl std::fmt::Debug for FileWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatch")
            .field("timeout", &self.timeout)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

type Confirm = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Asks the user to confirm the end of the edit.
pub struct ManualConfirmation {
    confirm: Confirm,
}

impl ManualConfirmation {
    /// Confirm through `confirm(title)`; `false` cancels the edit.
    #[must_use]
    pub fn new(confirm: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            confirm: Box::new(confirm),
        }
    }

    /// Ask on the terminal whether the edit is finished. Answering no, or a
    /// prompt that cannot be shown, cancels the edit.
    #[must_use]
    pub fn terminal() -> Self {
        Self::new(|title| {
            match dialoguer::Confirm::new()
                .with_prompt(format!("Finished editing {title}? Apply the changes"))
                .default(true)
                .interact()
            {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(error = %e, "confirmation prompt failed");
                    false
                },
            }
        })
    }
}

impl CompletionSignal for ManualConfirmation {
    fn wait(&self, _path: &Path, title: &str) -> StoreResult<WaitOutcome> {
        Ok(if (self.confirm)(title) {
            WaitOutcome::Confirmed
        } else {
            WaitOutcome::Cancelled
        })
    }
}

impl std::fmt::Debug for ManualConfirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ManualConfirmation")
    }
}

/// Sends notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        info!(title, "{message}");
    }
}
