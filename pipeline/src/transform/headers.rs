//! Header normalization.
//!
//! Raw spreadsheet headers carry inline annotations: `Ferritin #ug/L,
//! serum` means column `Ferritin` described as `ug/L, serum`. Spreadsheet
//! authors also prefix required columns with `*` and suffix uncertain
//! ones with `?`; both marks are stripped from the canonical name.
//! Descriptions are kept only for report annotations, never for
//! computation.

use indexmap::IndexMap;

use crate::error::FormatError;

/// Split one raw header into `(name, description)`.
///
/// The split is on the first `#`; both sides are trimmed. Headers
/// without `#` yield an empty description. Fails only when the name is
/// empty after trimming.
pub fn split_header(raw: &str) -> Result<(String, String), FormatError> {
    let raw = raw.trim();
    let (name_part, desc) = match raw.split_once('#') {
        Some((left, right)) => (left, right.trim()),
        None => (raw, ""),
    };

    let name = name_part
        .trim()
        .trim_start_matches('*')
        .trim_end_matches('?')
        .trim()
        .to_string();

    if name.is_empty() {
        return Err(FormatError::EmptyHeaderName(raw.to_string()));
    }

    Ok((name, desc.to_string()))
}

/// Normalize a full header row.
///
/// Returns the canonical column names in order, plus a name → description
/// map for the annotated columns.
pub fn normalize_headers(
    raw: &[String],
) -> Result<(Vec<String>, IndexMap<String, String>), FormatError> {
    let mut names = Vec::with_capacity(raw.len());
    let mut descriptions = IndexMap::new();

    for header in raw {
        let (name, desc) = split_header(header)?;
        if !desc.is_empty() {
            descriptions.insert(name.clone(), desc);
        }
        names.push(name);
    }

    Ok((names, descriptions))
}
