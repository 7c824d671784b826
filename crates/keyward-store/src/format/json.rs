//! Plain JSON documents: sorted keys, indented.

use std::collections::BTreeMap;

use keyward_core::{ValidatedMapping, Value, ValueMap};

use crate::error::{StoreError, StoreResult};

/// JSON has no spelling for NaN or infinities; such values are refused
/// rather than written as `null`.
pub(super) fn render(mapping: &ValidatedMapping) -> StoreResult<String> {
    if let Some((key, value)) = mapping.iter().find(|(_, value)| !value.is_finite()) {
        return Err(StoreError::SerializeError {
            key: key.to_owned(),
            message: format!("{value} cannot be represented in JSON"),
        });
    }
    let sorted: BTreeMap<&str, &Value> = mapping.iter().collect();
    let mut text = serde_json::to_string_pretty(&sorted).map_err(|e| StoreError::SerializeError {
        key: String::from("<document>"),
        message: e.to_string(),
    })?;
    text.push('\n');
    Ok(text)
}

pub(super) fn parse(text: &str, origin: &str) -> StoreResult<ValueMap> {
    let parsed: Value = serde_json::from_str(text).map_err(|e| StoreError::ParseError {
        path: origin.to_owned(),
        message: e.to_string(),
    })?;
    match parsed {
        Value::Map(map) => Ok(map),
        other => Err(StoreError::ParseError {
            path: origin.to_owned(),
            message: format!("expected an object at the top level, found {}", other.kind()),
        }),
    }
}
