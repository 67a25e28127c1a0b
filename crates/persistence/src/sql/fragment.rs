//! SQL fragments with bound parameters.

use std::fmt;

use chrono::{DateTime, Utc};

use super::schema::Column;
use crate::types::{FieldType, FieldValue};

/// SQL dialect differences the translator needs to know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `?N` placeholders, `instr`/`substr`, user-defined `regexp` and `unicode_lower`.
    Sqlite,
    /// `$N` placeholders, `strpos`/`starts_with`/`right`, `~` and `~*`.
    Postgres,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Sqlite => write!(f, "sqlite"),
            Dialect::Postgres => write!(f, "postgres"),
        }
    }
}

/// Quotes an identifier. Identifiers reaching this function have already been
/// matched against the introspected column set.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Dialect {
    /// Returns the placeholder for the `n`th (one-based) parameter.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{}", n),
            Dialect::Postgres => format!("${}", n),
        }
    }

    fn pg_cast_type(field_type: FieldType) -> &'static str {
        match field_type {
            FieldType::String => "TEXT",
            FieldType::Number => "DOUBLE PRECISION",
            FieldType::Bool => "BOOLEAN",
            FieldType::Timestamp => "TIMESTAMPTZ",
        }
    }

    /// Returns the expression used to read or compare a column, cast to the
    /// type its parameters are bound with.
    pub fn operand(&self, column: &Column) -> String {
        let ident = quote_ident(column.name());
        match self {
            Dialect::Sqlite => ident,
            Dialect::Postgres => {
                let target = Self::pg_cast_type(column.field_type());
                if column.data_type().eq_ignore_ascii_case(pg_canonical_name(target)) {
                    ident
                } else {
                    format!("CAST({} AS {})", ident, target)
                }
            }
        }
    }

    /// Returns the expression assigned to a column on write.
    pub fn assign(&self, column: &Column, placeholder: &str) -> String {
        match self {
            Dialect::Sqlite => placeholder.to_string(),
            Dialect::Postgres => {
                let bound = format!(
                    "CAST({} AS {})",
                    placeholder,
                    Self::pg_cast_type(column.field_type())
                );
                match pg_writable_type(column.data_type()) {
                    Some(data_type) => format!("CAST({} AS {})", bound, data_type),
                    None => bound,
                }
            }
        }
    }

    /// Lower-cases a text expression the same way the evaluator does.
    pub fn lower(&self, expr: &str) -> String {
        match self {
            Dialect::Sqlite => format!("unicode_lower({})", expr),
            Dialect::Postgres => format!("LOWER({})", expr),
        }
    }

    /// `expr` contains the bound text.
    pub fn contains(&self, expr: &str, ph: &str) -> String {
        match self {
            Dialect::Sqlite => format!("instr({}, {}) > 0", expr, ph),
            Dialect::Postgres => format!("strpos({}, {}) > 0", expr, ph),
        }
    }

    /// `expr` starts with the bound text.
    pub fn starts_with(&self, expr: &str, ph: &str) -> String {
        match self {
            Dialect::Sqlite => format!("substr({}, 1, length({})) = {}", expr, ph, ph),
            Dialect::Postgres => format!("starts_with({}, {})", expr, ph),
        }
    }

    /// `expr` ends with the bound text.
    pub fn ends_with(&self, expr: &str, ph: &str) -> String {
        match self {
            Dialect::Sqlite => format!(
                "(length({ph}) = 0 OR substr({expr}, -length({ph})) = {ph})",
                expr = expr,
                ph = ph
            ),
            Dialect::Postgres => format!(
                "right({expr}, char_length(CAST({ph} AS TEXT))) = {ph}",
                expr = expr,
                ph = ph
            ),
        }
    }

    /// `expr` matches the bound pattern. The SQLite `regexp` function
    /// receives the `(?i)` flag inside the pattern.
    pub fn regex(&self, expr: &str, ph: &str, case_sensitive: bool) -> String {
        match self {
            Dialect::Sqlite => format!("{} REGEXP {}", expr, ph),
            Dialect::Postgres if case_sensitive => format!("{} ~ {}", expr, ph),
            Dialect::Postgres => format!("{} ~* {}", expr, ph),
        }
    }

    /// Column used in `ORDER BY`, with byte-order collation for text.
    pub fn sort_expr(&self, column: &Column) -> String {
        let operand = self.operand(column);
        match (self, column.field_type()) {
            (Dialect::Postgres, FieldType::String) => format!("{} COLLATE \"C\"", operand),
            _ => operand,
        }
    }
}

fn pg_canonical_name(cast: &str) -> &'static str {
    match cast {
        "TEXT" => "text",
        "DOUBLE PRECISION" => "double precision",
        "BOOLEAN" => "boolean",
        _ => "timestamp with time zone",
    }
}

fn pg_writable_type(data_type: &str) -> Option<&'static str> {
    const TYPES: [&str; 14] = [
        "text",
        "character varying",
        "character",
        "uuid",
        "smallint",
        "integer",
        "bigint",
        "numeric",
        "real",
        "double precision",
        "boolean",
        "timestamp with time zone",
        "timestamp without time zone",
        "date",
    ];
    let lower = data_type.to_ascii_lowercase();
    TYPES.iter().find(|t| **t == lower).copied()
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String parameter.
    Text(String),
    /// Integer parameter.
    Integer(i64),
    /// Float parameter.
    Float(f64),
    /// Boolean parameter.
    Bool(bool),
    /// Timestamp parameter.
    Timestamp(DateTime<Utc>),
    /// Typed null.
    Null(FieldType),
}

impl SqlParam {
    /// Creates a string parameter.
    pub fn text(s: impl Into<String>) -> Self {
        SqlParam::Text(s.into())
    }

    /// Converts a field value for a column of `field_type`.
    pub fn from_value(value: &FieldValue, field_type: FieldType) -> Self {
        match value {
            FieldValue::Null => SqlParam::Null(field_type),
            FieldValue::Bool(b) => SqlParam::Bool(*b),
            FieldValue::Number(n) => SqlParam::Float(*n),
            FieldValue::Timestamp(ts) => SqlParam::Timestamp(*ts),
            FieldValue::String(s) => match field_type {
                FieldType::Timestamp => match crate::types::parse_timestamp(s) {
                    Some(ts) => SqlParam::Timestamp(ts),
                    None => SqlParam::Text(s.clone()),
                },
                _ => SqlParam::Text(s.clone()),
            },
        }
    }
}

/// A fragment of SQL with bound parameters.
#[derive(Debug, Clone)]
pub struct SqlFragment {
    dialect: Dialect,
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values.
    pub params: Vec<SqlParam>,
}

impl SqlFragment {
    /// Creates an empty fragment.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Returns the dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Adds a parameter and returns its placeholder.
    pub fn add_param(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        self.dialect.placeholder(self.params.len())
    }

    /// Appends SQL text.
    pub fn push_str(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Finishes the fragment as a statement.
    pub fn into_statement(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// A complete SQL statement ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}
