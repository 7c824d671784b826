//! Annotated YAML documents.
//!
//! Each key is preceded by its wrapped documentation and an info line:
//!
//! ```text
//! # Size of the font, in points
//! # ** default: 10, type: int, range: 8 - 24
//! font-size: 12
//! ```
//!
//! Values are written in flow style so every entry stays on one line.

use std::fmt::Write as _;

use keyward_core::{ValidatedMapping, Value, ValueMap};

use super::{COMMENT_WIDTH, RenderOptions, ordered_keys, wrap};
use crate::error::{StoreError, StoreResult};

pub(super) fn render(mapping: &ValidatedMapping, options: &RenderOptions) -> StoreResult<String> {
    let mut out = String::new();

    if let Some(header) = &options.header {
        for line in header.lines() {
            push_comment(&mut out, line);
        }
        out.push('\n');
    }

    let keys = ordered_keys(mapping, options.sort_keys);
    let (basic, advanced): (Vec<&str>, Vec<&str>) = match options.advanced_prefix.as_deref() {
        Some(prefix) if !prefix.is_empty() => keys.into_iter().partition(|k| !k.starts_with(prefix)),
        _ => (keys, Vec::new()),
    };

    for key in basic {
        render_entry(&mut out, mapping, key)?;
    }
    if !advanced.is_empty() {
        push_comment(&mut out, &"#".repeat(COMMENT_WIDTH.saturating_sub(2)));
        push_comment(&mut out, "Advanced settings");
        push_comment(&mut out, &"#".repeat(COMMENT_WIDTH.saturating_sub(2)));
        out.push('\n');
        for key in advanced {
            render_entry(&mut out, mapping, key)?;
        }
    }
    Ok(out)
}

fn render_entry(out: &mut String, mapping: &ValidatedMapping, key: &str) -> StoreResult<()> {
    if let Some(doc) = mapping.doc(key) {
        for line in wrap(doc, COMMENT_WIDTH) {
            push_comment(out, &line);
        }
    }
    let info = info_line(mapping, key);
    if !info.is_empty() {
        push_comment(out, &format!("** {}", info.replace('\n', "\\n")));
    }

    let value = mapping.get(key).unwrap_or(&Value::Null);
    let rendered_key = scalar(key, &Value::from(key))?;
    let rendered = flow(key, value, false)?;
    let _ = writeln!(out, "{rendered_key}: {rendered}");
    out.push('\n');
    Ok(())
}

fn info_line(mapping: &ValidatedMapping, key: &str) -> String {
    let mut parts = Vec::new();
    if let Some(default) = mapping.default_of(key)
        && !default.is_null()
    {
        parts.push(format!("default: {default}"));
    }
    if let Ok(type_name) = mapping.type_name(key) {
        parts.push(format!("type: {type_name}"));
    }
    if let Ok(Some(choices)) = mapping.choices(key) {
        let listed: Vec<String> = choices.iter().map(ToString::to_string).collect();
        parts.push(format!("choices: {{{}}}", listed.join(", ")));
    }
    if let Ok(Some(range)) = mapping.range(key) {
        parts.push(format!("range: {range}"));
    }
    parts.join(", ")
}

fn push_comment(out: &mut String, line: &str) {
    if line.is_empty() {
        out.push_str("#\n");
    } else {
        let _ = writeln!(out, "# {line}");
    }
}

/// Render `value` on a single line. Strings nested in collections are
/// always double-quoted so flow indicators inside them stay literal.
pub(super) fn flow(key: &str, value: &Value, nested: bool) -> StoreResult<String> {
    match value {
        Value::Str(s) if nested || s.contains('\n') => quoted(key, s),
        Value::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => flow(key, &Value::from(s), nested),
            Err(_) => {
                let octets: Vec<String> = b.iter().map(ToString::to_string).collect();
                Ok(format!("[{}]", octets.join(", ")))
            },
        },
        Value::List(items) => {
            let rendered = items
                .iter()
                .map(|item| flow(key, item, true))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(format!("[{}]", rendered.join(", ")))
        },
        Value::Map(map) => {
            let rendered = map
                .iter()
                .map(|(k, item)| Ok(format!("{}: {}", quoted(key, k)?, flow(key, item, true)?)))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(format!("{{{}}}", rendered.join(", ")))
        },
        scalar_value => scalar(key, scalar_value),
    }
}

fn scalar(key: &str, value: &Value) -> StoreResult<String> {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().to_owned())
        .map_err(|e| StoreError::SerializeError {
            key: key.to_owned(),
            message: e.to_string(),
        })
}

fn quoted(key: &str, s: &str) -> StoreResult<String> {
    serde_json::to_string(s).map_err(|e| StoreError::SerializeError {
        key: key.to_owned(),
        message: e.to_string(),
    })
}

pub(super) fn parse(text: &str, origin: &str) -> StoreResult<ValueMap> {
    let blank = text.lines().map(str::trim).all(|l| l.is_empty() || l.starts_with('#'));
    if blank {
        return Ok(ValueMap::new());
    }
    let parsed: Value = serde_yaml::from_str(text).map_err(|e| StoreError::ParseError {
        path: origin.to_owned(),
        message: e.to_string(),
    })?;
    match parsed {
        Value::Map(map) => Ok(map),
        Value::Null => Ok(ValueMap::new()),
        other => Err(StoreError::ParseError {
            path: origin.to_owned(),
            message: format!("expected a mapping at the top level, found {}", other.kind()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use keyward_core::{KeyDef, Schema};

    use super::*;

    fn mapping() -> ValidatedMapping {
        ValidatedMapping::from_schema(
            Schema::new()
                .key(
                    KeyDef::new("font-size", 10)
                        .range(8, 24)
                        .doc("Size of the font, in points"),
                )
                .key(KeyDef::new("theme", "dark").choices(["dark", "light"]))
                .key(KeyDef::new("tags", vec!["a, b", "c"]))
                .key(KeyDef::new("adv.cache", true))
                .key(KeyDef::new("motd", "line one\nline two")),
        )
        .unwrap()
    }

    #[test]
    fn test_comment_block_layout() {
        let text = render(&mapping(), &RenderOptions::default()).unwrap();
        let expected = "# Size of the font, in points\n\
                        # ** default: 10, type: int, range: 8 - 24\n\
                        font-size: 10\n";
        assert!(text.starts_with(expected), "{text}");
        assert!(text.contains("# ** default: dark, type: str, choices: {dark, light}\ntheme: dark\n"));
    }

    #[test]
    fn test_render_then_parse_preserves_values() {
        let m = mapping();
        let text = render(&m, &RenderOptions::default()).unwrap();
        let parsed = parse(&text, "<test>").unwrap();
        assert_eq!(&parsed, m.values());
    }

    #[test]
    fn test_long_doc_is_wrapped() {
        let doc = "word ".repeat(40);
        let m = ValidatedMapping::from_schema(Schema::new().key(KeyDef::new("k", 1).doc(doc))).unwrap();
        let text = render(&m, &RenderOptions::default()).unwrap();
        assert!(text.lines().all(|l| l.len() <= COMMENT_WIDTH.saturating_add(2)));
        assert!(text.lines().filter(|l| l.starts_with("# word")).count() > 1);
    }

    #[test]
    fn test_advanced_keys_follow_banner() {
        let options = RenderOptions {
            advanced_prefix: Some("adv.".into()),
            ..RenderOptions::default()
        };
        let text = render(&mapping(), &options).unwrap();
        let banner = text.find("# Advanced settings").unwrap();
        let cache = text.find("adv.cache: true").unwrap();
        let motd = text.find("motd:").unwrap();
        assert!(motd < banner && banner < cache);
    }

    #[test]
    fn test_sorted_keys() {
        let options = RenderOptions {
            sort_keys: true,
            ..RenderOptions::default()
        };
        let text = render(&mapping(), &options).unwrap();
        let keys: Vec<&str> = text
            .lines()
            .filter(|l| !l.starts_with('#') && !l.is_empty())
            .filter_map(|l| l.split_once(": ").map(|(k, _)| k))
            .collect();
        assert_eq!(keys, ["adv.cache", "font-size", "motd", "tags", "theme"]);
    }

    #[test]
    fn test_header_is_commented() {
        let options = RenderOptions {
            header: Some("Edit me\n\nThen save".into()),
            ..RenderOptions::default()
        };
        let text = render(&mapping(), &options).unwrap();
        assert!(text.starts_with("# Edit me\n#\n# Then save\n\n"));
    }

    #[test]
    fn test_parse_rejects_non_mapping() {
        assert!(matches!(parse("- a\n- b\n", "x.yaml"), Err(StoreError::ParseError { .. })));
        assert!(matches!(parse("a: [1, 2\n", "x.yaml"), Err(StoreError::ParseError { .. })));
    }

    #[test]
    fn test_parse_comment_only_document_is_empty() {
        assert!(parse("# nothing here\n\n", "x.yaml").unwrap().is_empty());
    }
}
