//! Construction options for [`PersistentConfig`](crate::PersistentConfig).

use std::path::PathBuf;

use keyward_core::KeyMatching;
use serde::{Deserialize, Serialize};

use crate::format::{DocumentFormat, RenderOptions};

/// How a configuration is persisted and loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOptions {
    /// Save the document after every successful mutation.
    pub persistent: bool,
    /// Load (and reconcile) the document as soon as the schema is complete.
    pub load: bool,
    /// Format of the persisted document.
    pub format: DocumentFormat,
    /// Emit keys sorted instead of in schema order.
    pub sort_keys: bool,
    /// Keys starting with this prefix are grouped under an "advanced"
    /// banner in annotated documents.
    pub advanced_prefix: Option<String>,
    /// Exact or relaxed key matching.
    #[serde(skip)]
    pub key_matching: KeyMatching,
    /// Root directory for documents. Defaults to the user config directory.
    pub config_dir: Option<PathBuf>,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            persistent: true,
            load: true,
            format: DocumentFormat::Annotated,
            sort_keys: false,
            advanced_prefix: None,
            key_matching: KeyMatching::Strict,
            config_dir: None,
        }
    }
}

impl ConfigOptions {
    /// Options for an in-memory configuration: nothing is loaded or saved.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            persistent: false,
            load: false,
            ..Self::default()
        }
    }

    /// Set the persistence flag.
    #[must_use]
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Set the load flag.
    #[must_use]
    pub fn load(mut self, load: bool) -> Self {
        self.load = load;
        self
    }

    /// Set the document format.
    #[must_use]
    pub fn format(mut self, format: DocumentFormat) -> Self {
        self.format = format;
        self
    }

    /// Emit keys sorted.
    #[must_use]
    pub fn sort_keys(mut self, sort_keys: bool) -> Self {
        self.sort_keys = sort_keys;
        self
    }

    /// Group keys with this prefix under an "advanced" banner.
    #[must_use]
    pub fn advanced_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.advanced_prefix = Some(prefix.into());
        self
    }

    /// Set the key matching policy.
    #[must_use]
    pub fn key_matching(mut self, matching: KeyMatching) -> Self {
        self.key_matching = matching;
        self
    }

    /// Store documents under `dir` instead of the user config directory.
    #[must_use]
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    pub(crate) fn render_options(&self) -> RenderOptions {
        RenderOptions {
            sort_keys: self.sort_keys,
            advanced_prefix: self.advanced_prefix.clone(),
            header: None,
        }
    }
}
