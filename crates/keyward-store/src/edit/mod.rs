//! Interactive editing through an external application.
//!
//! The flow is: write an annotated copy to a temporary file, open it with a
//! [`Launcher`], block on a [`CompletionSignal`] until the user is done,
//! then reload the copy through the normal forgiving load path and persist
//! the result. The persisted document is only touched if the edit is
//! accepted.

mod system;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::PersistentConfig;
use crate::error::StoreResult;

pub use system::{FileWatch, LogNotifier, ManualConfirmation, SystemLauncher};

/// Opens a file in an application.
pub trait Launcher: Send + Sync {
    /// Open `path`. Returning does not imply the user finished editing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Editor`](crate::StoreError::Editor) if the
    /// application cannot be started.
    fn open(&self, path: &Path) -> StoreResult<()>;
}

/// How an edit session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The file was saved.
    Modified,
    /// The user confirmed the edit.
    Confirmed,
    /// The wait timed out without a modification.
    TimedOut,
    /// The user abandoned the edit.
    Cancelled,
}

impl WaitOutcome {
    /// Whether the edited copy should be loaded.
    #[must_use]
    pub fn accepted(self) -> bool {
        matches!(self, Self::Modified | Self::Confirmed)
    }
}

/// Blocks until the user is done editing a file.
pub trait CompletionSignal: Send + Sync {
    /// Wait for the edit of `path` (shown to the user as `title`) to end.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Editor`](crate::StoreError::Editor) if waiting
    /// is impossible.
    fn wait(&self, path: &Path, title: &str) -> StoreResult<WaitOutcome>;
}

/// Fire-and-forget user notifications.
pub trait Notifier: Send + Sync {
    /// Show `message` under `title`.
    fn notify(&self, title: &str, message: &str);
}

/// The collaborators used by [`PersistentConfig::edit`].
pub struct Editor {
    launcher: Box<dyn Launcher>,
    signal: Box<dyn CompletionSignal>,
    notifier: Box<dyn Notifier>,
    scratch_dir: Option<PathBuf>,
}

impl Editor {
    /// Assemble an editor from its collaborators.
    #[must_use]
    pub fn new(
        launcher: impl Launcher + 'static,
        signal: impl CompletionSignal + 'static,
        notifier: impl Notifier + 'static,
    ) -> Self {
        Self {
            launcher: Box::new(launcher),
            signal: Box::new(signal),
            notifier: Box::new(notifier),
            scratch_dir: None,
        }
    }

    /// The platform default application, finishing either when the file is
    /// saved (`wait_on_modified`) or when the user confirms on the terminal.
    #[must_use]
    pub fn system(wait_on_modified: bool) -> Self {
        if wait_on_modified {
            Self::new(
                SystemLauncher,
                FileWatch::new(None).with_fallback(ManualConfirmation::terminal()),
                LogNotifier,
            )
        } else {
            Self::new(SystemLauncher, ManualConfirmation::terminal(), LogNotifier)
        }
    }

    /// Write edit copies to `dir` instead of the system temp directory.
    #[must_use]
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("scratch_dir", &self.scratch_dir)
            .finish_non_exhaustive()
    }
}

impl PersistentConfig {
    /// Edit this configuration in an external application.
    ///
    /// A temporary annotated copy is opened with the editor's launcher. Once
    /// the completion signal accepts the edit, the copy is loaded (invalid
    /// values and foreign keys fall back to defaults) and, for persistent
    /// configurations, saved. A timed out or cancelled edit leaves the
    /// configuration untouched. The temporary copy is always removed.
    ///
    /// # Errors
    ///
    /// Launcher or signal failures, or write errors for the copy and the
    /// final save.
    pub fn edit(&mut self, editor: &Editor) -> StoreResult<WaitOutcome> {
        let copy = self.write_edit_copy(editor.scratch_dir.as_deref())?;
        let title = self
            .name()
            .map_or_else(|| "config".to_owned(), ToString::to_string);

        let result = self.run_edit(editor, &copy, &title);

        if let Err(e) = std::fs::remove_file(&copy) {
            warn!(path = %copy.display(), error = %e, "failed to remove edit copy");
        }
        result
    }

    fn run_edit(&mut self, editor: &Editor, copy: &Path, title: &str) -> StoreResult<WaitOutcome> {
        editor
            .notifier
            .notify(title, &format!("Opening {} for editing", copy.display()));
        editor.launcher.open(copy)?;
        let outcome = editor.signal.wait(copy, title)?;

        if !outcome.accepted() {
            info!(config = title, outcome = ?outcome, "edit not applied");
            return Ok(outcome);
        }

        let report = self.load_from(copy);
        if self.is_persistent() && !report.rewritten {
            self.save()?;
        }
        info!(config = title, outcome = ?outcome, "applied edit");
        Ok(outcome)
    }
}
