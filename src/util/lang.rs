//! Small string and path helpers shared across the runtime and compiler.

use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::Str;

/// Check if a name starts with `$` or `_`, the prefixes reserved for
/// runtime-owned properties.
pub fn is_reserved(name: &str) -> bool {
    matches!(name.as_bytes().first(), Some(b'$') | Some(b'_'))
}

/// Convert a hyphen-delimited name to camelCase (`phone-number` → `phoneNumber`).
pub fn camelize(name: &str) -> Str {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    Rc::from(out)
}

/// Convert a camelCase name to hyphen-delimited (`phoneNumber` → `phone-number`).
pub fn hyphenate(name: &str) -> Str {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    Rc::from(out)
}

pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Characters that disqualify a string from being a watchable dotted path.
static PATH_BAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w.$]").unwrap());

/// Split a dotted property path into segments.
///
/// Only plain dotted paths are accepted; anything else returns `None` and the
/// caller is expected to warn and fall back to a no-op getter.
pub fn parse_path(path: &str) -> Option<Vec<Str>> {
    if PATH_BAIL.is_match(path) {
        return None;
    }
    Some(path.split('.').map(Rc::from).collect())
}
