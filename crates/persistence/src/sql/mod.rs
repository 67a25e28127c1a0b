//! Relational query construction shared by the SQL backends.
//!
//! - [`fragment`] - bound parameters, placeholders and dialect differences
//! - [`schema`] - the introspected column set and field name resolution
//! - [`translator`] - filter/sort/pagination to parameterized statements

pub mod fragment;
pub mod schema;
pub mod translator;

pub use fragment::{Dialect, SqlFragment, SqlParam, Statement, quote_ident};
pub use schema::{
    Column, TableSchema, postgres_field_type, sqlite_field_type, validate_identifier,
};
pub use translator::{ListPlan, Translator};
