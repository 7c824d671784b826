use thiserror::Error;

use crate::constraint::ConstraintKind;

/// Errors raised while defining or mutating a [`ValidatedMapping`](crate::ValidatedMapping).
#[derive(Debug, Error)]
pub enum MappingError {
    /// The key is not part of the schema.
    #[error("unknown key '{key}'{}", suggestion_hint(.suggestions))]
    UnknownKey {
        /// The key that was requested.
        key: String,
        /// Schema keys that look similar, closest first.
        suggestions: Vec<String>,
    },

    /// A registered constraint rejected the value.
    #[error("invalid value for key '{key}' ({kind}): {message}")]
    InvalidValue {
        /// Key being assigned.
        key: String,
        /// The constraint that rejected the value.
        kind: ConstraintKind,
        /// Human-readable explanation of what was expected.
        message: String,
    },

    /// The pre-commit hook refused the change.
    #[error("change to key '{key}' was vetoed: {reason}")]
    Vetoed {
        /// Key being assigned.
        key: String,
        /// Reason given by the hook.
        reason: String,
    },

    /// The key is already part of the schema.
    #[error("key '{key}' is already defined")]
    DuplicateDefinition {
        /// The key that was defined twice.
        key: String,
    },

    /// The schema no longer accepts new keys.
    #[error("schema is closed, cannot define key '{key}'")]
    SchemaClosed {
        /// The key that was rejected.
        key: String,
    },

    /// Constraints or docs refer to keys the schema does not have.
    #[error("invalid schema definition: {message}")]
    Definition {
        /// Description of the inconsistency.
        message: String,
    },
}

impl MappingError {
    /// The key this error refers to, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::UnknownKey { key, .. }
            | Self::InvalidValue { key, .. }
            | Self::Vetoed { key, .. }
            | Self::DuplicateDefinition { key }
            | Self::SchemaClosed { key } => Some(key),
            Self::Definition { .. } => None,
        }
    }
}

fn suggestion_hint(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!("; did you mean {}?", suggestions.join(", "))
    }
}

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;
