//! Escaping helpers for embedding catalog values in statement text.
//!
//! Both functions are total: any input string produces text that cannot
//! leave the identifier or literal context it is placed in.

use std::borrow::Cow;

/// Escapes a table name for use as a warehouse identifier.
///
/// Names matching `[A-Za-z_][A-Za-z0-9_$]*` are returned unchanged. Anything
/// else is wrapped in double quotes with embedded `"` doubled.
///
/// ```rust
/// use floe_sync::sql::escape_identifier;
///
/// assert_eq!(escape_identifier("t1"), "t1");
/// assert_eq!(escape_identifier("my table"), "\"my table\"");
/// assert_eq!(escape_identifier("a\"b"), "\"a\"\"b\"");
/// ```
#[must_use]
pub fn escape_identifier(name: &str) -> Cow<'_, str> {
    if is_plain_identifier(name) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

/// Escapes a value for use inside a single-quoted string literal.
///
/// Backslashes and single quotes are doubled. The surrounding quotes are
/// not added.
///
/// ```rust
/// use floe_sync::sql::escape_literal;
///
/// assert_eq!(escape_literal("metadata/m.json"), "metadata/m.json");
/// assert_eq!(escape_literal("it's"), "it''s");
/// ```
#[must_use]
pub fn escape_literal(value: &str) -> Cow<'_, str> {
    if value.contains(['\\', '\'']) {
        Cow::Owned(value.replace('\\', "\\\\").replace('\'', "''"))
    } else {
        Cow::Borrowed(value)
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
