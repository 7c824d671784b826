//! Constraint descriptors and the per-key constraint registry.
//!
//! A key may carry up to one constraint of each [`ConstraintKind`]. All of
//! them must pass for a value to be accepted.

use std::fmt;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::debug;

use crate::mapping::ValidatedMapping;
use crate::value::{Value, ValueKind};

/// The kinds of constraint a key can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKind {
    /// Expected value kind(s).
    Type,
    /// Enumerated admissible values.
    Choices,
    /// Inclusive `(low, high)` bound.
    Range,
    /// Custom predicate.
    Predicate,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type => write!(f, "type"),
            Self::Choices => write!(f, "choices"),
            Self::Range => write!(f, "range"),
            Self::Predicate => write!(f, "predicate"),
        }
    }
}

// ---------------------------------------------------------------------------
// Type
// ---------------------------------------------------------------------------

/// One or more acceptable value kinds.
///
/// `Float` accepts anything float-like (see [`Value::as_float`]) and `Str`
/// accepts byte strings too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    kinds: Vec<ValueKind>,
}

impl TypeSpec {
    /// A single expected kind.
    #[must_use]
    pub fn one(kind: ValueKind) -> Self {
        Self { kinds: vec![kind] }
    }

    /// Any of the given kinds. Duplicates are dropped; an empty list yields
    /// `None`.
    #[must_use]
    pub fn any_of(kinds: impl IntoIterator<Item = ValueKind>) -> Option<Self> {
        let mut unique: Vec<ValueKind> = Vec::new();
        for kind in kinds {
            if !unique.contains(&kind) {
                unique.push(kind);
            }
        }
        (!unique.is_empty()).then_some(Self { kinds: unique })
    }

    /// Infer the expected kind from a default value.
    ///
    /// Strings and bytes both normalise to `Str`. A `Null` default places no
    /// restriction on the kind.
    #[must_use]
    pub fn infer(default: &Value) -> Option<Self> {
        match default.kind() {
            ValueKind::Null => None,
            ValueKind::Bytes | ValueKind::Str => Some(Self::one(ValueKind::Str)),
            kind => Some(Self::one(kind)),
        }
    }

    /// Infer the expected kinds from a set of choices.
    #[must_use]
    pub fn from_choices(choices: &[Value]) -> Option<Self> {
        Self::any_of(choices.iter().map(|choice| match choice.kind() {
            ValueKind::Bytes => ValueKind::Str,
            kind => kind,
        }))
    }

    /// The accepted kinds.
    #[must_use]
    pub fn kinds(&self) -> &[ValueKind] {
        &self.kinds
    }

    /// Whether `value` satisfies this spec.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        self.kinds.iter().any(|kind| match kind {
            ValueKind::Float => value.as_float().is_some(),
            ValueKind::Str => matches!(value, Value::Str(_) | Value::Bytes(_)),
            kind => value.kind() == *kind,
        })
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [kind] = self.kinds.as_slice() {
            return write!(f, "{kind}");
        }
        let names: Vec<&str> = self.kinds.iter().map(|k| k.name()).collect();
        write!(f, "({})", names.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Choices
// ---------------------------------------------------------------------------

/// Zero-argument provider of admissible values.
pub type ChoiceProvider = Arc<dyn Fn() -> Vec<Value> + Send + Sync>;

/// Admissible values for a key.
///
/// `Lazy` providers are evaluated on first use and replaced by the
/// resulting `Fixed` set, so a provider runs at most once per key.
#[derive(Clone)]
pub enum Choices {
    /// A finite, deduplicated set of values.
    Fixed(Vec<Value>),
    /// A provider evaluated on first use.
    Lazy(ChoiceProvider),
}

impl Choices {
    /// A fixed set of choices. Duplicates are dropped, order is kept.
    #[must_use]
    pub fn fixed<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Fixed(dedup(values.into_iter().map(Into::into)))
    }

    /// Choices produced lazily by `provider`.
    #[must_use]
    pub fn lazy(provider: impl Fn() -> Vec<Value> + Send + Sync + 'static) -> Self {
        Self::Lazy(Arc::new(provider))
    }

    /// Whether the choices have already been materialised.
    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }
}

impl fmt::Debug for Choices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(values) => f.debug_tuple("Fixed").field(values).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

fn dedup(values: impl Iterator<Item = Value>) -> Vec<Value> {
    let mut unique: Vec<Value> = Vec::new();
    for value in values {
        if !unique.contains(&value) {
            unique.push(value);
        }
    }
    unique
}

/// Interior-mutable holder performing the `Lazy -> Fixed` transition.
///
/// Clones share the state, so copies of a mapping taken before the first
/// lookup still evaluate the provider only once.
#[derive(Clone)]
pub(crate) struct ChoiceSlot {
    state: Arc<Mutex<Choices>>,
}

impl ChoiceSlot {
    pub(crate) fn new(choices: Choices) -> Self {
        Self {
            state: Arc::new(Mutex::new(choices)),
        }
    }

    /// Materialise the choices, evaluating a lazy provider exactly once.
    pub(crate) fn resolve(&self, key: &str) -> Vec<Value> {
        let mut state = self.state.lock().unwrap_or_else(|e| {
            tracing::warn!(key, "choice slot lock poisoned, recovering");
            e.into_inner()
        });
        let evaluated = match &*state {
            Choices::Fixed(values) => return values.clone(),
            Choices::Lazy(provider) => dedup(provider().into_iter()),
        };
        debug!(key, count = evaluated.len(), "evaluated lazy choices");
        *state = Choices::Fixed(evaluated.clone());
        evaluated
    }

    pub(crate) fn snapshot(&self) -> Choices {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for ChoiceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.snapshot().fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Range
// ---------------------------------------------------------------------------

/// Inclusive `low <= value <= high` bound.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    /// Lower bound (inclusive).
    pub low: Value,
    /// Upper bound (inclusive).
    pub high: Value,
}

impl ValueRange {
    /// Create a range from two bounds.
    #[must_use]
    pub fn new(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self {
            low: low.into(),
            high: high.into(),
        }
    }

    /// Whether `value` lies inside the range, or `None` when the value is
    /// not ordered relative to the bounds.
    ///
    /// A number that does not order against numeric bounds (NaN) is out of
    /// range.
    #[must_use]
    pub fn contains(&self, value: &Value) -> Option<bool> {
        match (value.compare(&self.low), value.compare(&self.high)) {
            (Some(low), Some(high)) => Some(low.is_ge() && high.is_le()),
            _ if value.as_float().is_some()
                && self.low.as_float().is_some()
                && self.high.as_float().is_some() =>
            {
                Some(false)
            },
            _ => None,
        }
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.low, self.high)
    }
}

// ---------------------------------------------------------------------------
// Predicate
// ---------------------------------------------------------------------------

/// Custom check `(mapping, key, value)`. Returning `Err` rejects the value;
/// an empty error text is replaced by a generic message.
pub type Predicate = Arc<dyn Fn(&ValidatedMapping, &str, &Value) -> Result<(), String> + Send + Sync>;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A single constraint descriptor.
#[derive(Clone)]
pub enum Constraint {
    /// Expected kind(s).
    Type(TypeSpec),
    /// Admissible values.
    Choices(Choices),
    /// Inclusive bounds.
    Range(ValueRange),
    /// Custom predicate.
    Predicate(Predicate),
}

impl Constraint {
    /// A type constraint accepting a single kind.
    #[must_use]
    pub fn of_kind(kind: ValueKind) -> Self {
        Self::Type(TypeSpec::one(kind))
    }

    /// A fixed choices constraint.
    #[must_use]
    pub fn choices<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Choices(Choices::fixed(values))
    }

    /// A lazily evaluated choices constraint.
    #[must_use]
    pub fn lazy_choices(provider: impl Fn() -> Vec<Value> + Send + Sync + 'static) -> Self {
        Self::Choices(Choices::lazy(provider))
    }

    /// An inclusive range constraint.
    #[must_use]
    pub fn range(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::Range(ValueRange::new(low, high))
    }

    /// A predicate constraint.
    #[must_use]
    pub fn predicate(
        check: impl Fn(&ValidatedMapping, &str, &Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate(Arc::new(check))
    }

    /// Which kind of constraint this is.
    #[must_use]
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Self::Type(_) => ConstraintKind::Type,
            Self::Choices(_) => ConstraintKind::Choices,
            Self::Range(_) => ConstraintKind::Range,
            Self::Predicate(_) => ConstraintKind::Predicate,
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(spec) => f.debug_tuple("Type").field(spec).finish(),
            Self::Choices(choices) => f.debug_tuple("Choices").field(choices).finish(),
            Self::Range(range) => f.debug_tuple("Range").field(range).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Every constraint registered for one key.
#[derive(Clone, Default)]
pub struct KeyConstraints {
    pub(crate) type_spec: Option<TypeSpec>,
    pub(crate) choices: Option<ChoiceSlot>,
    pub(crate) range: Option<ValueRange>,
    pub(crate) predicate: Option<Predicate>,
}

impl KeyConstraints {
    /// Register (or replace) the constraint of the same kind.
    pub fn set(&mut self, constraint: Constraint) {
        match constraint {
            Constraint::Type(spec) => self.type_spec = Some(spec),
            Constraint::Choices(choices) => self.choices = Some(ChoiceSlot::new(choices)),
            Constraint::Range(range) => self.range = Some(range),
            Constraint::Predicate(check) => self.predicate = Some(check),
        }
    }

    /// Whether a constraint of `kind` is registered.
    #[must_use]
    pub fn has(&self, kind: ConstraintKind) -> bool {
        match kind {
            ConstraintKind::Type => self.type_spec.is_some(),
            ConstraintKind::Choices => self.choices.is_some(),
            ConstraintKind::Range => self.range.is_some(),
            ConstraintKind::Predicate => self.predicate.is_some(),
        }
    }

    /// The registered kinds, in checking order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ConstraintKind> {
        [
            ConstraintKind::Choices,
            ConstraintKind::Predicate,
            ConstraintKind::Type,
            ConstraintKind::Range,
        ]
        .into_iter()
        .filter(|kind| self.has(*kind))
        .collect()
    }

    fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }
}

impl fmt::Debug for KeyConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConstraints")
            .field("type_spec", &self.type_spec)
            .field("choices", &self.choices)
            .field("range", &self.range)
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Registry mapping `(key, kind)` to a constraint descriptor.
#[derive(Debug, Clone, Default)]
pub struct ConstraintRegistry {
    entries: IndexMap<String, KeyConstraints>,
}

impl ConstraintRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `constraint` for `key`, replacing any constraint of the same
    /// kind.
    pub fn insert(&mut self, key: impl Into<String>, constraint: Constraint) {
        self.entries.entry(key.into()).or_default().set(constraint);
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, constraint: Constraint) -> Self {
        self.insert(key, constraint);
        self
    }

    /// Constraints registered for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&KeyConstraints> {
        self.entries.get(key)
    }

    /// Whether `key` carries a constraint of `kind`.
    #[must_use]
    pub fn contains(&self, key: &str, kind: ConstraintKind) -> bool {
        self.entries.get(key).is_some_and(|c| c.has(kind))
    }

    /// Keys that carry at least one constraint.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, c)| !c.is_empty())
            .map(|(key, _)| key.as_str())
    }

    /// All `(key, kind)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&str, ConstraintKind)> {
        self.entries
            .iter()
            .flat_map(|(key, c)| c.kinds().into_iter().map(move |kind| (key.as_str(), kind)))
    }

    pub(crate) fn merge_key(&mut self, key: &str, other: KeyConstraints) {
        let slot = self.entries.entry(key.to_owned()).or_default();
        if other.type_spec.is_some() {
            slot.type_spec = other.type_spec;
        }
        if other.choices.is_some() {
            slot.choices = other.choices;
        }
        if other.range.is_some() {
            slot.range = other.range;
        }
        if other.predicate.is_some() {
            slot.predicate = other.predicate;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_float_spec_accepts_float_like_values() {
        let spec = TypeSpec::one(ValueKind::Float);
        assert!(spec.accepts(&Value::Float(0.5)));
        assert!(spec.accepts(&Value::Int(3)));
        assert!(!spec.accepts(&Value::from("0.5")));
        assert!(!spec.accepts(&Value::Bool(true)));
    }

    #[test]
    fn test_str_spec_accepts_bytes() {
        let spec = TypeSpec::infer(&Value::from("blue")).unwrap();
        assert!(spec.accepts(&Value::bytes("red")));
        assert!(!spec.accepts(&Value::Int(1)));
    }

    #[test]
    fn test_int_spec_rejects_floats() {
        let spec = TypeSpec::infer(&Value::Int(10)).unwrap();
        assert!(!spec.accepts(&Value::Float(10.5)));
    }

    #[test]
    fn test_null_default_infers_nothing() {
        assert!(TypeSpec::infer(&Value::Null).is_none());
    }

    #[test]
    fn test_type_spec_display() {
        assert_eq!(TypeSpec::one(ValueKind::Int).to_string(), "int");
        let spec = TypeSpec::any_of([ValueKind::Int, ValueKind::Str, ValueKind::Int]).unwrap();
        assert_eq!(spec.to_string(), "(int, str)");
    }

    #[test]
    fn test_lazy_choices_evaluated_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let slot = ChoiceSlot::new(Choices::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![Value::from("a"), Value::from("b"), Value::from("a")]
        }));

        for _ in 0..5 {
            assert_eq!(slot.resolve("k"), vec![Value::from("a"), Value::from("b")]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.snapshot().is_evaluated());
    }

    #[test]
    fn test_cloned_slot_keeps_evaluated_choices() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let slot = ChoiceSlot::new(Choices::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![Value::Int(1)]
        }));
        slot.resolve("k");
        let copy = slot.clone();
        copy.resolve("k");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_slot_cloned_before_use_shares_evaluation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let slot = ChoiceSlot::new(Choices::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![Value::Int(1)]
        }));
        let copy = slot.clone();
        copy.resolve("k");
        slot.resolve("k");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.snapshot().is_evaluated());
    }

    #[test]
    fn test_range_is_inclusive() {
        let range = ValueRange::new(0, 10);
        assert_eq!(range.contains(&Value::Int(0)), Some(true));
        assert_eq!(range.contains(&Value::Int(10)), Some(true));
        assert_eq!(range.contains(&Value::Float(10.5)), Some(false));
        assert_eq!(range.contains(&Value::Int(-1)), Some(false));
        assert_eq!(range.contains(&Value::from("5")), None);
    }

    #[test]
    fn test_nan_is_outside_numeric_range() {
        let range = ValueRange::new(0.0, 1.0);
        assert_eq!(range.contains(&Value::Float(f64::NAN)), Some(false));
        assert_eq!(range.contains(&Value::Float(f64::INFINITY)), Some(false));
        assert_eq!(range.contains(&Value::Float(0.5)), Some(true));
    }

    #[test]
    fn test_registry_entries_by_kind() {
        let registry = ConstraintRegistry::new()
            .with("a", Constraint::range(0, 10))
            .with("a", Constraint::choices([1, 2, 3]))
            .with("b", Constraint::of_kind(ValueKind::Float));

        assert!(registry.contains("a", ConstraintKind::Range));
        assert!(registry.contains("a", ConstraintKind::Choices));
        assert!(!registry.contains("b", ConstraintKind::Range));

        let entries: Vec<(&str, ConstraintKind)> = registry.entries().collect();
        assert_eq!(
            entries,
            [
                ("a", ConstraintKind::Choices),
                ("a", ConstraintKind::Range),
                ("b", ConstraintKind::Type),
            ]
        );
    }
}
