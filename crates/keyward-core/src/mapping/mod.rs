//! The key-bounded, constraint-checked mapping.
//!
//! [`ValidatedMapping`] enforces the closed-key contract: only keys present
//! in the schema can ever be stored, and a value is stored only if every
//! constraint registered for its key accepts it.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::constraint::{ConstraintKind, ConstraintRegistry, KeyConstraints, Predicate, TypeSpec, ValueRange};
use crate::error::{MappingError, MappingResult};
use crate::schema::{KeyDef, Schema};
use crate::suggest::{normalize_key, similar_keys};
use crate::value::{Value, ValueKind};

/// Hook run before a value is stored: `(mapping, key, old, new)`.
///
/// Returns `Ok(Some(value))` to store a substitute, `Ok(None)` to store the
/// candidate unchanged, or `Err(reason)` to veto the change.
pub type PreCommitHook =
    Arc<dyn Fn(&ValidatedMapping, &str, Option<&Value>, &Value) -> Result<Option<Value>, String> + Send + Sync>;

/// Hook run after a value has been stored: `(key, value)`.
pub type PostCommitHook = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// How keys passed to lookups and mutations are matched against the schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyMatching {
    /// Keys must match exactly.
    #[default]
    Strict,
    /// Keys match when they are equal after lowercasing and folding `-`,
    /// `.` and spaces into `_` (see [`normalize_key`]).
    Relaxed,
}

/// Result of a successful [`ValidatedMapping::set`].
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum SetOutcome {
    /// The value equalled the stored one; nothing ran.
    Unchanged,
    /// The value (possibly substituted by the pre-commit hook) was stored.
    Stored(Value),
}

impl SetOutcome {
    /// Whether the mapping changed.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

/// A mapping restricted to a fixed set of keys with per-key constraints.
#[derive(Clone, Default)]
pub struct ValidatedMapping {
    defaults: IndexMap<String, Value>,
    constraints: ConstraintRegistry,
    docs: IndexMap<String, String>,
    values: IndexMap<String, Value>,
    matching: KeyMatching,
    finalized: bool,
    pre_commit: Option<PreCommitHook>,
    post_commit: Option<PostCommitHook>,
}

impl ValidatedMapping {
    /// An empty mapping with an open schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key matching policy.
    #[must_use]
    pub fn with_matching(mut self, matching: KeyMatching) -> Self {
        self.matching = matching;
        self
    }

    /// Build a finalized mapping from a schema. Every key holds its default.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::DuplicateDefinition`] if the schema defines a
    /// key twice.
    pub fn from_schema(schema: Schema) -> MappingResult<Self> {
        let mut mapping = Self::new();
        mapping.define_schema(schema)?;
        mapping.finalize();
        Ok(mapping)
    }

    /// Build a finalized mapping from a default map, a constraint registry
    /// and a documentation map.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Definition`] if a constraint or doc refers to
    /// a key that has no default.
    pub fn from_parts(
        defaults: IndexMap<String, Value>,
        constraints: ConstraintRegistry,
        docs: IndexMap<String, String>,
    ) -> MappingResult<Self> {
        let mut orphans: Vec<&str> = constraints
            .keys()
            .chain(docs.keys().map(String::as_str))
            .filter(|key| !defaults.contains_key(*key))
            .collect();
        if !orphans.is_empty() {
            orphans.sort_unstable();
            orphans.dedup();
            return Err(MappingError::Definition {
                message: format!(
                    "constraints or docs refer to keys missing from the defaults: {}",
                    orphans.join(", ")
                ),
            });
        }

        let mut mapping = Self {
            defaults,
            constraints,
            docs,
            ..Self::default()
        };
        mapping.finalize();
        Ok(mapping)
    }

    // -----------------------------------------------------------------------
    // Schema definition
    // -----------------------------------------------------------------------

    /// Register a key in the schema along with its constraints and doc.
    ///
    /// Stored values are not revalidated.
    ///
    /// # Errors
    ///
    /// - [`MappingError::SchemaClosed`] once the mapping is finalized.
    /// - [`MappingError::DuplicateDefinition`] if the key already exists.
    pub fn define_key(&mut self, def: KeyDef) -> MappingResult<()> {
        let (key, default, constraints, doc) = def.into_parts();
        if self.finalized {
            return Err(MappingError::SchemaClosed { key });
        }
        if self.defaults.contains_key(&key) {
            return Err(MappingError::DuplicateDefinition { key });
        }
        trace!(key = %key, "defining key");
        self.constraints.merge_key(&key, constraints);
        if let Some(doc) = doc {
            self.docs.insert(key.clone(), doc);
        }
        self.defaults.insert(key, default);
        Ok(())
    }

    /// Register every key of `schema` without finalizing.
    ///
    /// # Errors
    ///
    /// See [`define_key`](Self::define_key).
    pub fn define_schema(&mut self, schema: Schema) -> MappingResult<()> {
        schema.into_iter().try_for_each(|def| self.define_key(def))
    }

    /// Close the schema and give every key without a value its default.
    /// Calling this more than once is harmless.
    pub fn finalize(&mut self) {
        for (key, default) in &self.defaults {
            if !self.values.contains_key(key) {
                self.values.insert(key.clone(), default.clone());
            }
        }
        self.finalized = true;
    }

    /// Whether the schema is closed.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// The key matching policy.
    #[must_use]
    pub fn matching(&self) -> KeyMatching {
        self.matching
    }

    /// Install the pre-commit hook, replacing any previous one.
    pub fn set_pre_commit(
        &mut self,
        hook: impl Fn(&ValidatedMapping, &str, Option<&Value>, &Value) -> Result<Option<Value>, String>
        + Send
        + Sync
        + 'static,
    ) {
        self.pre_commit = Some(Arc::new(hook));
    }

    /// Install the post-commit hook, replacing any previous one.
    pub fn set_post_commit(&mut self, hook: impl Fn(&str, &Value) + Send + Sync + 'static) {
        self.post_commit = Some(Arc::new(hook));
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Map `key` to its schema spelling.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::UnknownKey`], with near-miss suggestions, if
    /// no schema key matches.
    pub fn resolve_key(&self, key: &str) -> MappingResult<String> {
        if self.defaults.contains_key(key) {
            return Ok(key.to_owned());
        }
        if self.matching == KeyMatching::Relaxed {
            let wanted = normalize_key(key);
            if let Some(found) = self.defaults.keys().find(|k| normalize_key(k) == wanted) {
                return Ok(found.clone());
            }
        }
        Err(MappingError::UnknownKey {
            key: key.to_owned(),
            suggestions: similar_keys(key, self.defaults.keys().map(String::as_str)),
        })
    }

    /// Whether `key` resolves to a schema key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.resolve_key(key).is_ok()
    }

    /// The stored value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.values.get(key) {
            return Some(value);
        }
        let resolved = self.resolve_key(key).ok()?;
        self.values.get(&resolved)
    }

    /// The schema default for `key`.
    #[must_use]
    pub fn default_of(&self, key: &str) -> Option<&Value> {
        let resolved = self.resolve_key(key).ok()?;
        self.defaults.get(&resolved)
    }

    /// Schema keys, in definition order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    /// Stored `(key, value)` pairs, in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.defaults
            .keys()
            .filter_map(|key| self.values.get_key_value(key))
            .map(|(key, value)| (key.as_str(), value))
    }

    /// The default prototype.
    #[must_use]
    pub fn defaults(&self) -> &IndexMap<String, Value> {
        &self.defaults
    }

    /// The stored values.
    #[must_use]
    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// The constraint registry.
    #[must_use]
    pub fn constraints(&self) -> &ConstraintRegistry {
        &self.constraints
    }

    /// Number of schema keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    /// Whether the schema has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }

    /// Documentation for `key`.
    #[must_use]
    pub fn doc(&self, key: &str) -> Option<&str> {
        let resolved = self.resolve_key(key).ok()?;
        self.docs.get(&resolved).map(String::as_str)
    }

    /// Admissible values for `key`, materialising lazy choices on first use.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::UnknownKey`] if `key` is not in the schema.
    pub fn choices(&self, key: &str) -> MappingResult<Option<Vec<Value>>> {
        let key = self.resolve_key(key)?;
        Ok(self.key_constraints(&key).and_then(|c| c.choices.as_ref()).map(|slot| slot.resolve(&key)))
    }

    /// The inclusive range for `key`, if one is registered.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::UnknownKey`] if `key` is not in the schema.
    pub fn range(&self, key: &str) -> MappingResult<Option<&ValueRange>> {
        let key = self.resolve_key(key)?;
        Ok(self.key_constraints(&key).and_then(|c| c.range.as_ref()))
    }

    /// The predicate for `key`, if one is registered.
    #[must_use]
    pub fn predicate(&self, key: &str) -> Option<Predicate> {
        let key = self.resolve_key(key).ok()?;
        self.key_constraints(&key).and_then(|c| c.predicate.clone())
    }

    /// The expected type for `key`.
    ///
    /// An explicit type constraint wins; otherwise the kinds of the registered
    /// choices; otherwise the kind of the default. `None` means any kind is
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::UnknownKey`] if `key` is not in the schema.
    pub fn type_spec(&self, key: &str) -> MappingResult<Option<TypeSpec>> {
        let key = self.resolve_key(key)?;
        if let Some(spec) = self.key_constraints(&key).and_then(|c| c.type_spec.clone()) {
            return Ok(Some(spec));
        }
        if let Some(choices) = self.choices(&key)?
            && let Some(spec) = TypeSpec::from_choices(&choices)
        {
            return Ok(Some(spec));
        }
        Ok(self.defaults.get(&key).and_then(TypeSpec::infer))
    }

    /// The expected type for `key` as text, e.g. `"int"` or `"(int, str)"`.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::UnknownKey`] if `key` is not in the schema.
    pub fn type_name(&self, key: &str) -> MappingResult<String> {
        Ok(self
            .type_spec(key)?
            .map_or_else(|| "any".to_owned(), |spec| spec.to_string()))
    }

    fn key_constraints(&self, key: &str) -> Option<&KeyConstraints> {
        self.constraints.get(key)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Check `value` against every constraint registered for `key`, without
    /// mutating anything.
    ///
    /// Constraints are checked in the order choices, predicate, type, range;
    /// the first failure is returned.
    ///
    /// # Errors
    ///
    /// [`MappingError::UnknownKey`] or [`MappingError::InvalidValue`].
    pub fn check_value(&self, key: &str, value: &Value) -> MappingResult<()> {
        let key = self.resolve_key(key)?;
        let invalid = |kind: ConstraintKind, message: String| MappingError::InvalidValue {
            key: key.clone(),
            kind,
            message,
        };

        if let Some(choices) = self.choices(&key)?
            && !choices.contains(value)
        {
            let listed: Vec<String> = choices.iter().map(ToString::to_string).collect();
            return Err(invalid(
                ConstraintKind::Choices,
                format!("should be one of {{{}}}, got {value}", listed.join(", ")),
            ));
        }

        if let Some(check) = self.predicate(&key)
            && let Err(reason) = check(self, &key, value)
        {
            let message = if reason.is_empty() {
                format!("{value} is not valid for key {key}")
            } else {
                reason
            };
            return Err(invalid(ConstraintKind::Predicate, message));
        }

        if let Some(spec) = self.type_spec(&key)?
            && !spec.accepts(value)
        {
            let message = if spec.kinds() == [ValueKind::Float] {
                format!("expected a float-like value, got {}", value.kind())
            } else {
                format!("expected {spec}, got {}", value.kind())
            };
            return Err(invalid(ConstraintKind::Type, message));
        }

        if let Some(range) = self.range(&key)?
            && range.contains(value) == Some(false)
        {
            return Err(invalid(
                ConstraintKind::Range,
                format!("should be within range {range}, got {value}"),
            ));
        }

        Ok(())
    }

    /// Check whether `candidate` could be applied to this mapping.
    ///
    /// Stops at the first unknown key, then at the first invalid value, in
    /// iteration order. No error aggregation is performed.
    ///
    /// # Errors
    ///
    /// The first [`MappingError::UnknownKey`] or
    /// [`MappingError::InvalidValue`] found.
    pub fn check_batch(&self, candidate: &IndexMap<String, Value>) -> MappingResult<()> {
        for key in candidate.keys() {
            self.resolve_key(key)?;
        }
        for (key, value) in candidate {
            self.check_value(key, value)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Assign `value` to `key` through the full acceptance pipeline.
    ///
    /// Assigning the value already stored is a no-op: no constraint is
    /// checked and no hook runs. A value substituted by the pre-commit hook
    /// is checked again before it is stored.
    ///
    /// # Errors
    ///
    /// - [`MappingError::UnknownKey`] for keys outside the schema.
    /// - [`MappingError::InvalidValue`] when a constraint rejects the value.
    /// - [`MappingError::Vetoed`] when the pre-commit hook refuses it.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> MappingResult<SetOutcome> {
        let key = self.resolve_key(key)?;
        let value = value.into();
        if self.values.get(&key).is_some_and(|stored| stored.same(&value)) {
            return Ok(SetOutcome::Unchanged);
        }
        self.check_value(&key, &value)?;

        let value = match self.pre_commit.clone() {
            Some(hook) => match hook(self, &key, self.values.get(&key), &value) {
                Ok(Some(substitute)) => {
                    debug!(key = %key, "pre-commit hook substituted value");
                    self.check_value(&key, &substitute)?;
                    substitute
                },
                Ok(None) => value,
                Err(reason) => return Err(MappingError::Vetoed { key, reason }),
            },
            None => value,
        };

        self.values.insert(key.clone(), value.clone());
        trace!(key = %key, "stored value");

        if let Some(hook) = &self.post_commit {
            hook(&key, &value);
        }
        Ok(SetOutcome::Stored(value))
    }

    /// Apply every pair of `batch`, all or nothing.
    ///
    /// The whole batch is checked with [`check_batch`](Self::check_batch)
    /// first; then each pair goes through [`set`](Self::set). Returns the
    /// keys that changed.
    ///
    /// If a pair fails after earlier pairs were stored (a veto from the
    /// pre-commit hook), the stored values are rolled back. Post-commit
    /// hooks that already ran are not undone.
    ///
    /// # Errors
    ///
    /// The first validation error or veto. Either way nothing was changed.
    pub fn update(&mut self, batch: IndexMap<String, Value>) -> MappingResult<Vec<String>> {
        self.check_batch(&batch)?;
        let snapshot = self.values.clone();
        let applied = self.apply_batch(batch);
        if let Err(e) = &applied {
            debug!(error = %e, "batch failed, restoring previous values");
            self.values = snapshot;
        }
        applied
    }

    fn apply_batch(&mut self, batch: IndexMap<String, Value>) -> MappingResult<Vec<String>> {
        let mut changed = Vec::new();
        for (key, value) in batch {
            if self.set(&key, value)?.is_changed() {
                changed.push(self.resolve_key(&key)?);
            }
        }
        Ok(changed)
    }

    /// Restore previously captured values without running any check or
    /// hook. Keys outside the schema are ignored.
    pub fn restore_values(&mut self, values: IndexMap<String, Value>) {
        for (key, value) in values {
            if self.defaults.contains_key(&key) {
                self.values.insert(key, value);
            }
        }
    }

    /// Restore every key to its default in one bulk operation. Hooks do not
    /// run.
    pub fn reset(&mut self) {
        self.values = self.defaults.clone();
        debug!(keys = self.values.len(), "reset mapping to defaults");
    }

    /// Restore a single key to its default. Hooks do not run.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::UnknownKey`] if `key` is not in the schema.
    pub fn reset_key(&mut self, key: &str) -> MappingResult<SetOutcome> {
        let key = self.resolve_key(key)?;
        let default = self.defaults.get(&key).cloned().unwrap_or_default();
        if self.values.get(&key) == Some(&default) {
            return Ok(SetOutcome::Unchanged);
        }
        self.values.insert(key, default.clone());
        Ok(SetOutcome::Stored(default))
    }

    /// Replace all stored values in bulk, bypassing the acceptance pipeline.
    ///
    /// Meant for values that were already validated (for instance the
    /// output of a document reconciliation). Keys outside the schema are
    /// dropped, keys missing from `values` receive their default, and the
    /// schema is finalized.
    pub fn replace_values(&mut self, mut values: IndexMap<String, Value>) {
        values.retain(|key, _| {
            let known = self.defaults.contains_key(key);
            if !known {
                debug!(key = %key, "dropping value for a key outside the schema");
            }
            known
        });
        self.values = values;
        self.finalize();
    }

    // -----------------------------------------------------------------------
    // Derived mappings
    // -----------------------------------------------------------------------

    /// Keys whose stored value differs from `baseline` (the schema defaults
    /// when `None`).
    #[must_use]
    pub fn diff(&self, baseline: Option<&IndexMap<String, Value>>) -> IndexMap<String, Value> {
        let baseline = baseline.unwrap_or(&self.defaults);
        self.iter()
            .filter(|(key, value)| baseline.get(*key) != Some(*value))
            .map(|(key, value)| (key.to_owned(), value.clone()))
            .collect()
    }

    /// Copy this mapping (schema, constraints, docs, hooks and values) and
    /// apply `overrides` through [`set`](Self::set).
    ///
    /// # Errors
    ///
    /// The first error raised while applying an override.
    pub fn clone_with<I, K, V>(&self, overrides: I) -> MappingResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut out = self.clone();
        for (key, value) in overrides {
            let _ = out.set(key.as_ref(), value)?;
        }
        Ok(out)
    }
}

impl fmt::Debug for ValidatedMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedMapping")
            .field("values", &self.values)
            .field("constraints", &self.constraints)
            .field("matching", &self.matching)
            .field("finalized", &self.finalized)
            .field("has_pre_commit", &self.pre_commit.is_some())
            .field("has_post_commit", &self.post_commit.is_some())
            .finish_non_exhaustive()
    }
}
