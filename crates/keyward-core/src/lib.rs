#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Key-bounded, constraint-checked mappings.
//!
//! A [`ValidatedMapping`] only ever holds keys that are part of its schema
//! (the "default" prototype), and only ever stores values that satisfy every
//! constraint registered for the key.
//!
//! # Usage
//!
//! ```rust
//! use keyward_core::{KeyDef, Schema, ValidatedMapping};
//!
//! let schema = Schema::new()
//!     .key(KeyDef::new("font-size", 10.0).range(8, 24).doc("Font size, in pixels"))
//!     .key(KeyDef::new("font-family", "Monospace").choices(["Roboto", "Monospace"]))
//!     .key(KeyDef::new("port", 9100).range(9000, 65000));
//!
//! let mut mapping = ValidatedMapping::from_schema(schema).unwrap();
//! mapping.set("font-size", 12).unwrap();
//! assert!(mapping.set("port", 80).is_err());
//! assert!(mapping.set("colour", "red").is_err());
//! ```
//!
//! # Value acceptance
//!
//! A candidate value is checked in a fixed order, stopping at the first
//! failure:
//!
//! 1. key membership
//! 2. no-op check (equal to the stored value: nothing else runs)
//! 3. choices
//! 4. predicate
//! 5. type (floats accept any float-like value, strings accept bytes)
//! 6. range
//! 7. pre-commit hook (may substitute or veto)
//! 8. store
//! 9. post-commit hook
//!
//! # Design
//!
//! This crate performs no I/O. Persistence, naming and reconciliation with
//! documents on disk live in `keyward-store`.

/// Constraint descriptors and the per-key constraint registry.
pub mod constraint;
/// Mapping error types.
pub mod error;
/// The validated mapping itself.
pub mod mapping;
/// Schema definitions.
pub mod schema;
/// Near-miss key suggestions.
pub mod suggest;
/// Dynamically typed values.
pub mod value;

pub use constraint::{
    ChoiceProvider, Choices, Constraint, ConstraintKind, ConstraintRegistry, KeyConstraints,
    Predicate, TypeSpec, ValueRange,
};
pub use error::{MappingError, MappingResult};
pub use mapping::{KeyMatching, PostCommitHook, PreCommitHook, SetOutcome, ValidatedMapping};
pub use schema::{KeyDef, Schema};
pub use value::{Value, ValueKind};

/// Ordered key/value map used for schemas, documents and diffs.
pub type ValueMap = indexmap::IndexMap<String, Value>;
