// src/core/commons.rs

// Helpers shared by the extractor strategies and the invoker.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    /// Names that may be interpolated bare into an interpreter command.
    static ref FUNCTION_NAME_RE: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("function name pattern is valid");
}

/// Returns true if `name` is safe to place unquoted after the dot-source.
pub fn is_valid_function_name(name: &str) -> bool {
    FUNCTION_NAME_RE.is_match(name)
}

/// Removes duplicates while keeping the first spelling of each name in its
/// original position. Comparison ignores ASCII case, as PowerShell does.
pub fn dedup_first_seen<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.to_ascii_lowercase()))
        .collect()
}
