//! Introspected table schema.
//!
//! [`TableSchema::resolve`] is the only path by which a caller-supplied field
//! name becomes an identifier in generated SQL.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::error::{QueryError, SchemaError, ValidationError};
use crate::types::{
    ACTIVE_FIELD, BUILTIN_FIELDS, DATE_CREATED_FIELD, DATE_MODIFIED_FIELD, FieldType, FieldValue,
    ID_FIELD, Record, normalize_field_name,
};

/// Checks that a table name is a plain SQL identifier.
pub fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidConfiguration {
            message: format!("'{}' is not a valid table name", name),
        })
    }
}

/// Maps a SQLite declared column type to a field type using the affinity
/// rules (plus `BOOL` and date/time names).
pub fn sqlite_field_type(declared: &str) -> FieldType {
    let upper = declared.to_ascii_uppercase();
    if upper.contains("BOOL") {
        FieldType::Bool
    } else if upper.contains("TIMESTAMP") || upper.contains("DATE") || upper.contains("TIME") {
        FieldType::Timestamp
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        FieldType::String
    } else if upper.contains("INT")
        || upper.contains("REAL")
        || upper.contains("FLOA")
        || upper.contains("DOUB")
        || upper.contains("NUM")
        || upper.contains("DEC")
    {
        FieldType::Number
    } else {
        FieldType::String
    }
}

/// Maps a Postgres `information_schema.columns.data_type` to a field type.
pub fn postgres_field_type(data_type: &str) -> FieldType {
    match data_type.to_ascii_lowercase().as_str() {
        "smallint" | "integer" | "bigint" | "numeric" | "real" | "double precision" => {
            FieldType::Number
        }
        "boolean" => FieldType::Bool,
        "timestamp with time zone" | "timestamp without time zone" | "date" => {
            FieldType::Timestamp
        }
        _ => FieldType::String,
    }
}

/// One column of a managed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    data_type: String,
    field_type: FieldType,
}

impl Column {
    /// Creates a column description.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            field_type,
        }
    }

    /// Returns the column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type name reported by the catalog.
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Returns the field type.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }
}

/// The column set of a table as reported by the schema catalog.
#[derive(Debug, Clone)]
pub struct TableSchema {
    table: String,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl TableSchema {
    /// Builds a schema, checking that the builtin columns are present.
    ///
    /// Builtin columns get their fixed field types whatever the catalog type
    /// name says.
    pub fn new(table: impl Into<String>, columns: Vec<Column>) -> Result<Self, SchemaError> {
        let table = table.into();
        if columns.is_empty() {
            return Err(SchemaError::TableNotFound { table });
        }

        let columns: Vec<Column> = columns
            .into_iter()
            .map(|mut c| {
                c.field_type = match c.name.as_str() {
                    ID_FIELD => FieldType::String,
                    ACTIVE_FIELD => FieldType::Bool,
                    DATE_CREATED_FIELD | DATE_MODIFIED_FIELD => FieldType::Timestamp,
                    _ => c.field_type,
                };
                c
            })
            .collect();

        let index: HashMap<String, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();

        for required in BUILTIN_FIELDS {
            if !index.contains_key(required) {
                return Err(SchemaError::MissingRequiredColumn {
                    table,
                    column: required.to_string(),
                });
            }
        }

        Ok(Self {
            table,
            columns,
            index,
        })
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns all columns in catalog order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns a column by exact name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|i| &self.columns[*i])
    }

    /// Returns true if `name` is a column.
    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Maps a caller-supplied field name to a column.
    pub fn resolve(&self, field: &str) -> Result<&Column, ValidationError> {
        let name = normalize_field_name(field)?;
        self.column(&name).ok_or_else(|| ValidationError::UnknownField {
            entity: self.table.clone(),
            field: field.to_string(),
        })
    }

    /// Builds a record from decoded column values.
    pub fn record_from_row(
        &self,
        values: impl IntoIterator<Item = (String, FieldValue)>,
    ) -> Result<Record, QueryError> {
        let mut id = None;
        let mut active = None;
        let mut created = None;
        let mut modified = None;
        let mut fields = BTreeMap::new();

        for (name, value) in values {
            match name.as_str() {
                ID_FIELD => id = value.as_text().map(|s| s.into_owned()),
                ACTIVE_FIELD => active = value.as_bool(),
                DATE_CREATED_FIELD => created = value.as_timestamp(),
                DATE_MODIFIED_FIELD => modified = value.as_timestamp(),
                _ if value.is_null() => {}
                _ => {
                    fields.insert(name, value);
                }
            }
        }

        let invalid = |column: &str| {
            QueryError::execution(format!(
                "row in '{}' has no valid '{}' value",
                self.table, column
            ))
        };
        let id = id.ok_or_else(|| invalid(ID_FIELD))?;
        let active = active.ok_or_else(|| invalid(ACTIVE_FIELD))?;
        let created: DateTime<Utc> = created.ok_or_else(|| invalid(DATE_CREATED_FIELD))?;
        let modified: DateTime<Utc> = modified.ok_or_else(|| invalid(DATE_MODIFIED_FIELD))?;

        Ok(Record::from_storage(id, active, created, modified, fields))
    }
}
