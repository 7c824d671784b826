//! Plain-text table listing of a configuration.

use std::fmt::Write as _;

use keyward_core::ValidatedMapping;

use super::{info_string, wrap};

/// Width at which docs are wrapped in the info column.
pub const HELP_WIDTH: usize = 58;

/// Render `mapping` as a three column table (key, value, info) under a
/// `Config: <title>` heading. Keys are sorted; docs are wrapped below the
/// info of their key.
#[must_use]
pub fn render_table(title: &str, mapping: &ValidatedMapping) -> String {
    let mut keys: Vec<&str> = mapping.keys().collect();
    keys.sort_unstable();

    let mut rows: Vec<[String; 3]> = Vec::new();
    for key in keys {
        let value = mapping.get(key).map(ToString::to_string).unwrap_or_default();
        rows.push([key.to_owned(), value.replace('\n', "\\n"), info_string(mapping, key)]);
        if let Some(doc) = mapping.doc(key) {
            for line in wrap(doc, HELP_WIDTH) {
                rows.push([String::new(), String::new(), line]);
            }
        }
    }

    let mut widths = [0usize; 3];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let rule = rule.join("  ");

    let mut out = format!("Config: {title}\n");
    if rows.is_empty() {
        return out;
    }
    let _ = writeln!(out, "{rule}");
    for [key, value, info] in &rows {
        let line = format!(
            "{key:<kw$}  {value:<vw$}  {info}",
            kw = widths[0],
            vw = widths[1]
        );
        let _ = writeln!(out, "{}", line.trim_end());
    }
    let _ = writeln!(out, "{rule}");
    out
}
