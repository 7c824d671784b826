#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Named, persistent configurations on top of [`keyward_core`].
//!
//! A [`PersistentConfig`] is a validated mapping with a name. The name maps
//! to a document under the user configuration directory, every successful
//! mutation saves the document, and loading reconciles whatever is on disk
//! with the current schema.
//!
//! # Usage
//!
//! ```rust
//! use keyward_core::{KeyDef, Schema};
//! use keyward_store::{ConfigOptions, ConfigRegistry, DocumentFormat, PersistentConfig};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let schema = Schema::new()
//!     .key(KeyDef::new("workers", 4).range(1, 64).doc("Worker threads"))
//!     .key(KeyDef::new("log-level", "info").choices(["debug", "info", "warn"]));
//!
//! let options = ConfigOptions::default()
//!     .config_dir(dir.path())
//!     .format(DocumentFormat::Json);
//! let mut config =
//!     PersistentConfig::with_registry("svc:worker", schema, options, ConfigRegistry::new().into())
//!         .unwrap();
//!
//! config.set("workers", 8).unwrap();
//! assert!(dir.path().join("svc/worker.json").exists());
//! ```
//!
//! # Layout
//!
//! Documents live at `<config-dir>[/<namespace>]/<leaf>.<ext>`, where the
//! name is `[namespace:]leaf` and the extension is `yaml` (annotated),
//! `json` or `csv`.
//!
//! # Failure semantics
//!
//! Loading never fails: unreadable or malformed documents are logged and
//! the defaults are used; keys outside the schema and values that no longer
//! validate are dropped and the document is rewritten once. Interactive
//! mutation is strict and returns an error for unknown keys and invalid
//! values.

/// The persistent configuration type.
pub mod config;
/// Editing a configuration in an external application.
pub mod edit;
/// Store error types.
pub mod error;
/// Document formats.
pub mod format;
/// Configuration names.
pub mod name;
/// Construction options.
pub mod options;
/// Document path resolution.
pub mod paths;
/// Merging persisted documents with the schema.
pub mod reconcile;
/// Registry of live configurations.
pub mod registry;

pub use config::{ChangeCallback, ConfigState, LoadReport, PersistentConfig};
pub use edit::{
    CompletionSignal, Editor, FileWatch, Launcher, LogNotifier, ManualConfirmation, Notifier,
    SystemLauncher, WaitOutcome,
};
pub use error::{StoreError, StoreResult};
pub use format::{DocumentFormat, RenderOptions, info_string, render_table};
pub use name::ConfigName;
pub use options::ConfigOptions;
pub use paths::{
    config_path_from_name, config_path_in, remove_persisted, remove_persisted_in, user_config_dir,
};
pub use reconcile::{Reconciliation, RejectedValue, reconcile};
pub use registry::{ActiveConfig, ConfigRegistry};
