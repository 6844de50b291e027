//! Text folding helpers
//!
//! Source files come from spreadsheets typed by hand, so the same name shows
//! up with different accents, casing and spacing. Everything that compares
//! names or builds identifiers goes through these helpers.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strip diacritics: decompose (NFD) and drop combining marks
///
/// Characters without an ASCII decomposition (e.g. `ß`, `ø`) are kept as-is.
pub fn fold_diacritics(value: &str) -> String {
    value.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Trim and collapse internal whitespace runs to a single space
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case- and accent-insensitive matching key for person and discipline names
///
/// Returns `None` for blank input so callers never match on empty keys.
pub fn match_key(value: &str) -> Option<String> {
    let collapsed = collapse_whitespace(value);
    if collapsed.is_empty() {
        return None;
    }
    Some(fold_diacritics(&collapsed).to_uppercase())
}
