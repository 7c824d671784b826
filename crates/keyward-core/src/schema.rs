//! Schema definitions: the default prototype plus per-key constraints and
//! documentation.

use std::fmt;

use crate::constraint::{Constraint, KeyConstraints, TypeSpec, ValueRange};
use crate::mapping::ValidatedMapping;
use crate::value::{Value, ValueKind};

/// Definition of a single schema key.
///
/// ```rust
/// use keyward_core::{KeyDef, ValueKind};
///
/// let def = KeyDef::new("ratio", 0.5)
///     .range(0, 1)
///     .doc("Mix ratio between the two sources");
/// assert_eq!(def.key(), "ratio");
///
/// let def = KeyDef::new("level", 3).of_kinds([ValueKind::Int, ValueKind::Str]);
/// assert!(def.type_spec().is_some());
/// ```
#[derive(Clone)]
pub struct KeyDef {
    key: String,
    default: Value,
    constraints: KeyConstraints,
    doc: Option<String>,
}

impl KeyDef {
    /// A key with its default value and no constraints.
    #[must_use]
    pub fn new(key: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            default: default.into(),
            constraints: KeyConstraints::default(),
            doc: None,
        }
    }

    /// Restrict the value to a single kind.
    #[must_use]
    pub fn of_kind(mut self, kind: ValueKind) -> Self {
        self.constraints.set(Constraint::of_kind(kind));
        self
    }

    /// Restrict the value to any of `kinds`. An empty list is ignored.
    #[must_use]
    pub fn of_kinds(mut self, kinds: impl IntoIterator<Item = ValueKind>) -> Self {
        if let Some(spec) = TypeSpec::any_of(kinds) {
            self.constraints.set(Constraint::Type(spec));
        }
        self
    }

    /// Restrict the value to a fixed set of choices.
    #[must_use]
    pub fn choices<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.constraints.set(Constraint::choices(values));
        self
    }

    /// Restrict the value to choices produced on first use by `provider`.
    #[must_use]
    pub fn lazy_choices(mut self, provider: impl Fn() -> Vec<Value> + Send + Sync + 'static) -> Self {
        self.constraints.set(Constraint::lazy_choices(provider));
        self
    }

    /// Restrict the value to the inclusive range `low..=high`.
    #[must_use]
    pub fn range(mut self, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.constraints.set(Constraint::range(low, high));
        self
    }

    /// Attach a custom predicate.
    #[must_use]
    pub fn predicate(
        mut self,
        check: impl Fn(&ValidatedMapping, &str, &Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.constraints.set(Constraint::predicate(check));
        self
    }

    /// Attach an arbitrary constraint descriptor.
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.set(constraint);
        self
    }

    /// Attach documentation.
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// The key name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The default value.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// The explicit type constraint, if any.
    #[must_use]
    pub fn type_spec(&self) -> Option<&TypeSpec> {
        self.constraints.type_spec.as_ref()
    }

    /// The explicit range constraint, if any.
    #[must_use]
    pub fn value_range(&self) -> Option<&ValueRange> {
        self.constraints.range.as_ref()
    }

    /// The documentation, if any.
    #[must_use]
    pub fn documentation(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub(crate) fn into_parts(self) -> (String, Value, KeyConstraints, Option<String>) {
        (self.key, self.default, self.constraints, self.doc)
    }
}

impl fmt::Debug for KeyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDef")
            .field("key", &self.key)
            .field("default", &self.default)
            .field("constraints", &self.constraints)
            .field("doc", &self.doc)
            .finish()
    }
}

/// An ordered list of key definitions.
///
/// Duplicate keys are not rejected here; they surface as
/// [`MappingError::DuplicateDefinition`](crate::MappingError::DuplicateDefinition)
/// when the schema is applied to a mapping.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    defs: Vec<KeyDef>,
}

impl Schema {
    /// An empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key definition.
    #[must_use]
    pub fn key(mut self, def: KeyDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Append a key definition in place.
    pub fn push(&mut self, def: KeyDef) {
        self.defs.push(def);
    }

    /// The key definitions, in order.
    #[must_use]
    pub fn defs(&self) -> &[KeyDef] {
        &self.defs
    }

    /// Number of keys defined.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether no key is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl FromIterator<KeyDef> for Schema {
    fn from_iter<I: IntoIterator<Item = KeyDef>>(iter: I) -> Self {
        Self {
            defs: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Schema {
    type Item = KeyDef;
    type IntoIter = std::vec::IntoIter<KeyDef>;

    fn into_iter(self) -> Self::IntoIter {
        self.defs.into_iter()
    }
}
