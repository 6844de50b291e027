//! Column sanitizer
//!
//! Turns raw header labels into canonical identifiers. Both ingestion paths
//! and the schema registry use the same normalization, so a file produces
//! the same schema regardless of how it entered the system.

use crate::error::{EngineError, Result};
use acred_common::text::fold_diacritics;
use std::collections::HashMap;

/// Normalize a free-form token: ASCII-fold, lowercase, collapse separators
///
/// Runs of anything that is not an ASCII letter or digit become a single
/// `_`; leading and trailing underscores are removed. May return an empty
/// string.
pub fn normalize_token(raw: &str) -> String {
    let folded = fold_diacritics(raw.trim()).to_lowercase();
    let mut out = String::with_capacity(folded.len());
    let mut pending_separator = false;

    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(c);
        } else {
            pending_separator = true;
        }
    }

    out
}

/// Canonical identifier for the header at zero-based `position`
///
/// Blank labels become `column_<n>` (1-based) and identifiers starting
/// with a digit get a `col_` prefix so they stay valid SQL names.
pub fn sanitize_identifier(raw: &str, position: usize) -> String {
    let token = normalize_token(raw);
    if token.is_empty() {
        return format!("column_{}", position + 1);
    }
    if token.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("col_{}", token);
    }
    token
}

/// Sanitize a whole header row
///
/// Two labels that collapse to the same identifier are a parse error; the
/// columns are never merged silently.
pub fn sanitize_headers<S: AsRef<str>>(headers: &[S]) -> Result<Vec<String>> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut columns = Vec::with_capacity(headers.len());

    for (position, raw) in headers.iter().enumerate() {
        let column = sanitize_identifier(raw.as_ref(), position);
        if let Some(first) = seen.get(&column) {
            return Err(EngineError::parse(format!(
                "Headers '{}' and '{}' both sanitize to '{}'",
                headers[*first].as_ref(),
                raw.as_ref(),
                column
            )));
        }
        seen.insert(column.clone(), position);
        columns.push(column);
    }

    Ok(columns)
}
