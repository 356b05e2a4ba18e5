//! SQL identifier quoting and validation utilities.

use regex::Regex;
use std::sync::OnceLock;

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
/// Safe against SQL injection for any input string.
///
/// # Examples
///
/// ```
/// use sqltx_core::quote_ident;
///
/// assert_eq!(quote_ident("dogs"), "\"dogs\"");
/// assert_eq!(quote_ident("dog\"name"), "\"dog\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn ident_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

/// Check whether a name is a plain identifier: letters, digits and
/// underscores, not starting with a digit.
///
/// Schema definitions are expected to pass this; user-supplied strings
/// that don't should be quoted with [`quote_ident`] instead of trusted.
#[inline]
pub fn is_valid_ident(name: &str) -> bool {
    ident_pattern().is_match(name)
}

/// Sanitize a SQL identifier by removing non-alphanumeric/underscore
/// characters. Strips rather than erroring; an all-invalid input yields
/// an empty string.
#[inline]
pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}
