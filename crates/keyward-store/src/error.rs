//! Error types for persistent configurations.

use keyward_core::MappingError;
use thiserror::Error;

/// Errors raised by naming, persistence and editing.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The configuration name contains characters outside `[a-zA-Z0-9._:]`
    /// or has an empty leaf.
    #[error("'{name}' is not a valid config name: {reason}")]
    InvalidName {
        /// The rejected name, after separator normalization.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A persistent configuration with this name is already live.
    #[error("a persistent config named '{name}' already exists")]
    NameCollision {
        /// The contested name.
        name: String,
    },

    /// The operation needs a named configuration.
    #[error("operation '{operation}' requires a named config")]
    Unnamed {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// The configuration was disposed and no longer accepts changes.
    #[error("config '{name}' has been disposed")]
    Disposed {
        /// Name of the disposed config (empty when unnamed).
        name: String,
    },

    /// Validation or schema error from the underlying mapping.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Failed to read a document.
    #[error("failed to read config document {path}: {source}")]
    ReadError {
        /// Path to the document.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A document exists but could not be parsed.
    #[error("failed to parse config document {path}: {message}")]
    ParseError {
        /// Path to the document (or a placeholder for in-memory text).
        path: String,
        /// Parser diagnostic.
        message: String,
    },

    /// A value could not be rendered in the target format.
    #[error("failed to serialize key '{key}': {message}")]
    SerializeError {
        /// Key whose value failed to serialize.
        key: String,
        /// Serializer diagnostic.
        message: String,
    },

    /// Failed to write a document.
    #[error("failed to write config document {path}: {source}")]
    WriteError {
        /// Path to the document.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The write reported success but the document is not on disk.
    #[error("config document {path} is missing after write")]
    WriteVerification {
        /// Path to the document.
        path: String,
    },

    /// The file extension does not map to a supported format.
    #[error("unsupported config format '{extension}' (supported: yaml, json, csv)")]
    UnsupportedFormat {
        /// The offending extension.
        extension: String,
    },

    /// No user configuration directory could be determined.
    #[error("could not determine the user config directory")]
    NoConfigDir,

    /// The external editor flow failed.
    #[error("editor error: {0}")]
    Editor(String),

    /// A callback key pattern is not a valid regular expression.
    #[error("invalid callback pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as given.
        pattern: String,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },
}

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;
