//! Document formats a configuration can be persisted in.
//!
//! | Format      | Extension | Notes                                        |
//! |-------------|-----------|----------------------------------------------|
//! | `Annotated` | `yaml`    | YAML with a comment block per key            |
//! | `Json`      | `json`    | Sorted keys, indented                        |
//! | `Csv`       | `csv`     | `key, value, spec, doc` rows                 |

mod annotated;
mod csv;
mod json;
mod table;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use keyward_core::{ValidatedMapping, ValueMap};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

pub use table::render_table;

/// Width at which doc comments are wrapped in annotated documents.
pub const COMMENT_WIDTH: usize = 72;

/// A supported document format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    /// YAML with per-key documentation comments.
    #[default]
    #[serde(rename = "yaml", alias = "yml")]
    Annotated,
    /// Plain JSON.
    #[serde(rename = "json")]
    Json,
    /// Comma separated rows.
    #[serde(rename = "csv")]
    Csv,
}

/// Options controlling how a document is rendered.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Emit keys in lexicographic order instead of schema order.
    pub sort_keys: bool,
    /// Keys starting with this prefix are grouped after a banner comment.
    pub advanced_prefix: Option<String>,
    /// Comment lines placed at the top of annotated documents.
    pub header: Option<String>,
}

impl DocumentFormat {
    /// The file extension, without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Annotated => "yaml",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    /// Map a file extension to a format.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedFormat`] for anything other than
    /// `yaml`, `yml`, `json` or `csv`.
    pub fn from_extension(extension: &str) -> StoreResult<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Annotated),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            _ => Err(StoreError::UnsupportedFormat {
                extension: extension.to_owned(),
            }),
        }
    }

    /// The format implied by the extension of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedFormat`] if the extension is missing
    /// or unknown.
    pub fn from_path(path: &Path) -> StoreResult<Self> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        Self::from_extension(extension)
    }

    /// Render every key of `mapping` as a document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SerializeError`] if a value cannot be serialized
    /// (for instance a non-finite float in JSON).
    pub fn render(self, mapping: &ValidatedMapping, options: &RenderOptions) -> StoreResult<String> {
        match self {
            Self::Annotated => annotated::render(mapping, options),
            Self::Json => json::render(mapping),
            Self::Csv => csv::render(mapping, options),
        }
    }

    /// Parse document text into a flat key/value map.
    ///
    /// `origin` names the document in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ParseError`] if the text is malformed or is not
    /// a flat mapping.
    pub fn parse(self, text: &str, origin: &str) -> StoreResult<ValueMap> {
        match self {
            Self::Annotated => annotated::parse(text, origin),
            Self::Json => json::parse(text, origin),
            Self::Csv => csv::parse(text, origin),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DocumentFormat {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
    }
}

/// Summary of the constraints on `key`: `choices: {a b} | between lo - hi | type`.
///
/// Returns an empty string for keys outside the schema.
#[must_use]
pub fn info_string(mapping: &ValidatedMapping, key: &str) -> String {
    let mut parts = Vec::new();
    if let Ok(Some(choices)) = mapping.choices(key)
        && !choices.is_empty()
    {
        let listed: Vec<String> = choices.iter().map(ToString::to_string).collect();
        parts.push(format!("choices: {{{}}}", listed.join(" ")));
    }
    if let Ok(Some(range)) = mapping.range(key) {
        parts.push(format!("between {range}"));
    }
    if let Ok(type_name) = mapping.type_name(key) {
        parts.push(type_name);
    }
    parts.join(" | ")
}

/// Greedy word wrap at `width` columns. Words longer than `width` are kept
/// whole on their own line.
#[must_use]
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let needed = line.len().saturating_add(1).saturating_add(word.len());
        if !line.is_empty() && needed > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Keys of `mapping` in output order.
fn ordered_keys<'a>(mapping: &'a ValidatedMapping, sort_keys: bool) -> Vec<&'a str> {
    let mut keys: Vec<&str> = mapping.keys().collect();
    if sort_keys {
        keys.sort_unstable();
    }
    keys
}
