//! Canonical form of SELECT option lists.
//!
//! The canonical string is part of an attribute's identity, so two requests
//! that list the same options in a different order or with different spacing
//! must normalize to the same value.

/// Normalize a comma-separated options list.
///
/// Splits on commas, trims every token, drops tokens left empty, sorts the rest
/// by plain byte order (case-sensitive) and joins them back with commas.
pub fn normalize_options(raw: &str) -> String {
    let mut tokens: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    tokens.sort_unstable();
    tokens.join(",")
}

/// Tokens of a stored options string, exactly as stored (no trimming).
pub fn option_entries(options: &str) -> impl Iterator<Item = &str> {
    options.split(',')
}
