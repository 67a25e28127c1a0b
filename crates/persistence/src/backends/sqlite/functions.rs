//! SQL functions registered on every pooled connection.
//!
//! - `unicode_lower(text)` lower-cases with full Unicode case mapping, the
//!   same folding the in-memory evaluator applies. SQLite's builtin `lower()`
//!   only folds ASCII.
//! - `regexp(pattern, text)` backs the `REGEXP` operator with the `regex`
//!   crate. Compiled patterns are cached per statement.
//!
//! Both return NULL for NULL or non-text input, so a missing value fails the
//! predicate the way it does in the evaluator.

use std::sync::Arc;

use regex::Regex;
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Registers `unicode_lower` and `regexp` on `conn`.
pub(crate) fn register(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("unicode_lower", 1, flags, |ctx| {
        Ok(match ctx.get_raw(0) {
            ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).to_lowercase()),
            _ => None,
        })
    })?;

    conn.create_scalar_function("regexp", 2, flags, |ctx| {
        let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
            Ok(Regex::new(vr.as_str()?)?)
        })?;
        Ok(match ctx.get_raw(1) {
            ValueRef::Text(bytes) => Some(pattern.is_match(&String::from_utf8_lossy(bytes))),
            _ => None,
        })
    })?;

    Ok(())
}
