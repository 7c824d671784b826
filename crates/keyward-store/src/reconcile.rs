//! Reconciliation of a persisted document with the current schema.
//!
//! The schema evolves between runs: keys get added, removed or re-typed.
//! A document written by an older schema is merged as follows:
//!
//! 1. no document: the result is a copy of the defaults
//! 2. document keys outside the schema are dropped (retired)
//! 3. surviving values that fail the current constraints are dropped
//!    (rejected) and replaced by their default
//! 4. surviving document values win, defaults fill the rest
//!
//! Anything dropped in steps 2 or 3 means the document has drifted from the
//! schema and should be rewritten.

use keyward_core::{ValidatedMapping, Value, ValueMap};
use tracing::{debug, warn};

/// A document value that failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedValue {
    /// Schema key.
    pub key: String,
    /// The value found in the document.
    pub value: Value,
    /// Why it was rejected.
    pub reason: String,
    /// The default used in its place.
    pub default: Value,
}

/// Outcome of [`reconcile`].
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// The merged values, in schema order.
    pub values: ValueMap,
    /// Whether a document was supplied.
    pub from_document: bool,
    /// Document keys that are not part of the schema.
    pub retired_keys: Vec<String>,
    /// Document keys that matched a schema key only after relaxed
    /// matching, as `(document spelling, schema key)`.
    pub respelled_keys: Vec<(String, String)>,
    /// Document values that failed the current constraints.
    pub rejected: Vec<RejectedValue>,
    /// Schema keys missing from the document, filled with their default.
    pub filled_keys: Vec<String>,
}

impl Reconciliation {
    /// Whether the document differs from the schema in a way that warrants
    /// rewriting it.
    #[must_use]
    pub fn needs_rewrite(&self) -> bool {
        self.from_document
            && (!self.retired_keys.is_empty()
                || !self.rejected.is_empty()
                || !self.respelled_keys.is_empty())
    }
}

/// Merge `document` into the defaults of `mapping`.
///
/// ```rust
/// use keyward_core::{KeyDef, Schema, ValidatedMapping, Value, ValueMap};
/// use keyward_store::reconcile;
///
/// let mapping = ValidatedMapping::from_schema(
///     Schema::new().key(KeyDef::new("a", 1)).key(KeyDef::new("b", 2)),
/// )
/// .unwrap();
/// let document: ValueMap = [("a".to_owned(), Value::Int(5)), ("c".to_owned(), Value::Int(99))]
///     .into_iter()
///     .collect();
///
/// let merged = reconcile(Some(document), &mapping);
/// assert_eq!(merged.values.get("a"), Some(&Value::Int(5)));
/// assert_eq!(merged.values.get("b"), Some(&Value::Int(2)));
/// assert_eq!(merged.retired_keys, ["c"]);
/// assert!(merged.needs_rewrite());
/// ```
#[must_use]
pub fn reconcile(document: Option<ValueMap>, mapping: &ValidatedMapping) -> Reconciliation {
    let defaults = mapping.defaults();
    let Some(document) = document else {
        debug!("no document, using defaults");
        return Reconciliation {
            values: defaults.clone(),
            ..Reconciliation::default()
        };
    };

    let mut report = Reconciliation {
        from_document: true,
        ..Reconciliation::default()
    };
    let mut accepted = ValueMap::new();

    for (key, value) in document {
        let Ok(schema_key) = mapping.resolve_key(&key) else {
            report.retired_keys.push(key);
            continue;
        };
        if schema_key != key {
            report.respelled_keys.push((key.clone(), schema_key.clone()));
        }
        match mapping.check_value(&schema_key, &value) {
            Ok(()) => {
                accepted.insert(schema_key, value);
            },
            Err(e) => {
                let default = defaults.get(&schema_key).cloned().unwrap_or_default();
                report.rejected.push(RejectedValue {
                    key: schema_key,
                    value,
                    reason: e.to_string(),
                    default,
                });
            },
        }
    }

    for (key, default) in defaults {
        match accepted.swap_remove(key) {
            Some(value) => {
                report.values.insert(key.clone(), value);
            },
            None => {
                if !report.rejected.iter().any(|r| &r.key == key) {
                    report.filled_keys.push(key.clone());
                }
                report.values.insert(key.clone(), default.clone());
            },
        }
    }

    if !report.retired_keys.is_empty() {
        warn!(
            keys = ?report.retired_keys,
            "document has keys that are not part of the schema; they will be dropped"
        );
    }
    for rejected in &report.rejected {
        warn!(
            key = %rejected.key,
            value = %rejected.value,
            default = %rejected.default,
            reason = %rejected.reason,
            "document value rejected, using default"
        );
    }
    for (found, key) in &report.respelled_keys {
        debug!(found = %found, key = %key, "document key matched after normalization");
    }

    report
}
