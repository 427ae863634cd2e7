//! SQL identifier quoting.
//!
//! Table and column names of the document table are configurable, so they
//! are always quoted before being spliced into a statement.

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// # Examples
///
/// ```
/// use docbatch_core::quote_ident;
///
/// assert_eq!(quote_ident("items"), "\"items\"");
/// assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
