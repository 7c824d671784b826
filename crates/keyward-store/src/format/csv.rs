//! Tabular documents: one `key,value,spec,doc` row per key.
//!
//! The value column holds the value in YAML flow form so it can be read
//! back with its kind intact. Fields containing commas, quotes or line
//! breaks are quoted, with embedded quotes doubled.

use keyward_core::{ValidatedMapping, Value, ValueMap};

use super::{RenderOptions, annotated, info_string, ordered_keys};
use crate::error::{StoreError, StoreResult};

const HEADER: [&str; 4] = ["# key", "value", "spec", "doc"];

pub(super) fn render(mapping: &ValidatedMapping, options: &RenderOptions) -> StoreResult<String> {
    let mut out = String::new();
    push_row(&mut out, &HEADER);
    for key in ordered_keys(mapping, options.sort_keys) {
        let value = mapping.get(key).unwrap_or(&Value::Null);
        let rendered = annotated::flow(key, value, false)?;
        let info = info_string(mapping, key);
        let doc = mapping.doc(key).unwrap_or_default();
        push_row(&mut out, &[key, rendered.as_str(), info.as_str(), doc]);
    }
    Ok(out)
}

fn push_row(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push_str("\r\n");
}

pub(super) fn parse(text: &str, origin: &str) -> StoreResult<ValueMap> {
    let malformed = |message: String| StoreError::ParseError {
        path: origin.to_owned(),
        message,
    };

    let mut map = ValueMap::new();
    for (index, record) in records(text).map_err(&malformed)?.into_iter().enumerate() {
        let row = index.saturating_add(1);
        let Some(key) = record.first() else { continue };
        if key.starts_with('#') || (record.len() == 1 && key.is_empty()) {
            continue;
        }
        let raw = record
            .get(1)
            .ok_or_else(|| malformed(format!("row {row} has no value column")))?;
        let value = if raw.trim().is_empty() {
            Value::Null
        } else {
            serde_yaml::from_str(raw).map_err(|e| malformed(format!("row {row}, key '{key}': {e}")))?
        };
        map.insert(key.clone(), value);
    }
    Ok(map)
}

/// Split `text` into records of fields, honouring quoted fields.
fn records(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                },
                '"' => quoted = false,
                c => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => quoted = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {},
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            },
            c => field.push(c),
        }
    }
    if quoted {
        return Err("unterminated quoted field".to_owned());
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
