//! Configuration names.
//!
//! A name has the shape `[namespace:]leaf`. `/` and `.` are accepted as
//! the namespace separator and normalized to `:`; only one of them is
//! rewritten per name, `/` taking precedence. The canonical form is rebuilt
//! from the parts, so names that resolve to the same file are equal.

use std::fmt;
use std::str::FromStr;

use crate::error::{StoreError, StoreResult};

/// Canonical namespace separator.
pub const SEPARATOR: char = ':';

/// A validated, normalized configuration name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigName {
    canonical: String,
    namespace: Option<String>,
    leaf: String,
}

impl ConfigName {
    /// Normalize and validate `raw`.
    ///
    /// ```rust
    /// use keyward_store::ConfigName;
    ///
    /// let name = ConfigName::parse("myproj/window").unwrap();
    /// assert_eq!(name.as_str(), "myproj:window");
    /// assert_eq!(name.namespace(), Some("myproj"));
    /// assert_eq!(name.leaf(), "window");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for empty names, characters
    /// outside `[a-zA-Z0-9._:]` or an empty leaf.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let normalized = normalize(raw);
        let invalid = |reason: &str| StoreError::InvalidName {
            name: normalized.clone(),
            reason: reason.to_owned(),
        };

        if normalized.is_empty() {
            return Err(invalid("name is empty"));
        }
        if let Some(bad) = normalized.chars().find(|c| !is_name_char(*c)) {
            return Err(invalid(&format!(
                "character {bad:?} is not allowed, use letters, digits and any of '.', '_', ':'"
            )));
        }

        let (namespace, leaf) = match normalized.split_once(SEPARATOR) {
            None => (None, normalized.clone()),
            Some((base, rest)) => {
                let leaf = rest.split(SEPARATOR).collect::<Vec<_>>().join(".");
                ((!base.is_empty()).then(|| base.to_owned()), leaf)
            },
        };
        if leaf.is_empty() {
            return Err(invalid("the leaf name after the namespace is empty"));
        }

        let canonical = match &namespace {
            Some(ns) => format!("{ns}{SEPARATOR}{leaf}"),
            None => leaf.clone(),
        };
        Ok(Self {
            canonical,
            namespace,
            leaf,
        })
    }

    /// The canonical form, with `:` as namespace separator.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// The namespace (subdirectory), if any.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The leaf (file stem).
    #[must_use]
    pub fn leaf(&self) -> &str {
        &self.leaf
    }
}

fn normalize(raw: &str) -> String {
    if raw.contains('/') {
        raw.replace('/', ":")
    } else if raw.contains('.') {
        raw.replace('.', ":")
    } else {
        raw.to_owned()
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':')
}

impl fmt::Display for ConfigName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for ConfigName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ConfigName {
    fn as_ref(&self) -> &str {
        &self.canonical
    }
}
