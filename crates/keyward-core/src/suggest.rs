//! Near-miss key suggestions for unknown-key errors.

/// Maximum number of suggestions returned.
const MAX_SUGGESTIONS: usize = 3;

/// Lowercase `key` and fold the punctuation commonly used as word
/// separators (`-`, `.`, space) into `_`.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Candidates that look like `query`, closest first.
///
/// Candidates whose normalised form equals the normalised query come first;
/// the rest are ranked by Levenshtein distance, keeping only those within a
/// third of the query length (and at least two edits).
#[must_use]
pub fn similar_keys<'a>(query: &str, candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let normalized = normalize_key(query);
    let threshold = (normalized.chars().count() / 3).max(2);

    let mut ranked: Vec<(usize, &str)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let distance = strsim::levenshtein(&normalized, &normalize_key(candidate));
            (distance <= threshold).then_some((distance, candidate))
        })
        .collect();
    ranked.sort_unstable();
    ranked
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, candidate)| candidate.to_owned())
        .collect()
}
