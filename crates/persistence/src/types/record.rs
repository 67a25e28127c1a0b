//! Record types.
//!
//! A [`Record`] is a flat map of named scalar values plus the four columns
//! every managed table carries: `id`, `active`, `date_created` and
//! `date_modified`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Identifier column.
pub const ID_FIELD: &str = "id";
/// Soft-delete flag column.
pub const ACTIVE_FIELD: &str = "active";
/// Creation timestamp column.
pub const DATE_CREATED_FIELD: &str = "date_created";
/// Modification timestamp column.
pub const DATE_MODIFIED_FIELD: &str = "date_modified";

/// The columns every managed table must have.
pub const BUILTIN_FIELDS: [&str; 4] = [ID_FIELD, ACTIVE_FIELD, DATE_CREATED_FIELD, DATE_MODIFIED_FIELD];

/// Maps a caller-supplied field name onto its snake_case column name.
///
/// Names that are already lower-case are kept verbatim; mixed-case names are
/// converted (`dateCreated` becomes `date_created`). The result must be a
/// plain identifier (`[a-z_][a-z0-9_]*`), which keeps it safe to quote into
/// generated SQL once it has also been matched against the schema.
pub fn normalize_field_name(field: &str) -> Result<String, ValidationError> {
    let name = if field.chars().any(|c| c.is_ascii_uppercase()) {
        field.to_case(Case::Snake)
    } else {
        field.to_string()
    };

    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_lowercase() || first == '_')
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(name)
    } else {
        Err(ValidationError::InvalidFieldName {
            field: field.to_string(),
        })
    }
}

/// Renders a timestamp in the fixed-width UTC form used for storage and
/// comparison (`2024-01-31T08:15:00.000000Z`).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Parses an RFC3339 timestamp and normalizes it to UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Current time truncated to microseconds, the precision every backend keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A scalar field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Absent / SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// Text value.
    String(String),
    /// Point in time.
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Returns true for [`FieldValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the timestamp, parsing RFC3339 strings.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            FieldValue::String(s) => parse_timestamp(s),
            _ => None,
        }
    }

    /// Returns the textual form used by string and list operators.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Null => None,
            FieldValue::String(s) => Some(Cow::Borrowed(s)),
            FieldValue::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            FieldValue::Number(n) => Some(Cow::Owned(n.to_string())),
            FieldValue::Timestamp(ts) => Some(Cow::Owned(format_timestamp(ts))),
        }
    }

    /// Converts the value for storage in a field of `field_type`.
    ///
    /// Nulls fit every type; RFC3339 strings become timestamps; timestamps
    /// are truncated to microseconds. Returns `None` on a type mismatch.
    pub fn coerce(&self, field_type: FieldType) -> Option<FieldValue> {
        match (self, field_type) {
            (FieldValue::Null, _) => Some(FieldValue::Null),
            (FieldValue::String(_), FieldType::String)
            | (FieldValue::Number(_), FieldType::Number)
            | (FieldValue::Bool(_), FieldType::Bool) => Some(self.clone()),
            (FieldValue::Timestamp(ts), FieldType::Timestamp) => {
                Some(FieldValue::Timestamp(ts.trunc_subsecs(6)))
            }
            (FieldValue::String(s), FieldType::Timestamp) => {
                parse_timestamp(s).map(|ts| FieldValue::Timestamp(ts.trunc_subsecs(6)))
            }
            _ => None,
        }
    }

    /// Converts a JSON scalar into a field value.
    pub fn from_json(field: &str, value: &Value) -> Result<Self, ValidationError> {
        match value {
            Value::Null => Ok(FieldValue::Null),
            Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(FieldValue::Number).ok_or_else(|| {
                ValidationError::InvalidValue {
                    field: field.to_string(),
                    message: format!("number {} is not representable", n),
                }
            }),
            Value::String(s) => Ok(FieldValue::String(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(ValidationError::InvalidValue {
                field: field.to_string(),
                message: "only scalar values can be stored".to_string(),
            }),
        }
    }

    /// Converts the value into JSON.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Timestamp(ts) => Value::String(format_timestamp(ts)),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => write!(f, "{}", text),
            None => write!(f, "null"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Number(f64::from(n))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// The declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Text.
    String,
    /// Floating point number.
    Number,
    /// Boolean.
    Bool,
    /// UTC timestamp.
    Timestamp,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Bool => "bool",
            FieldType::Timestamp => "timestamp",
        };
        write!(f, "{}", name)
    }
}

/// The allow-listed field set of an entity.
///
/// The builtin columns are always part of the shape.
///
/// # Examples
///
/// ```
/// use mercator_persistence::types::{FieldType, RecordShape};
///
/// let shape = RecordShape::new("client")
///     .with_field("name", FieldType::String)
///     .with_field("credit_limit", FieldType::Number);
///
/// assert_eq!(shape.resolve("creditLimit").unwrap(), "credit_limit");
/// assert!(shape.resolve("password").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordShape {
    entity: String,
    fields: BTreeMap<String, FieldType>,
}

impl RecordShape {
    /// Creates a shape holding only the builtin columns.
    pub fn new(entity: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(ID_FIELD.to_string(), FieldType::String);
        fields.insert(ACTIVE_FIELD.to_string(), FieldType::Bool);
        fields.insert(DATE_CREATED_FIELD.to_string(), FieldType::Timestamp);
        fields.insert(DATE_MODIFIED_FIELD.to_string(), FieldType::Timestamp);
        Self {
            entity: entity.into(),
            fields,
        }
    }

    /// Adds a field. Invalid names are ignored with a warning.
    pub fn with_field(mut self, name: &str, field_type: FieldType) -> Self {
        match normalize_field_name(name) {
            Ok(column) => {
                self.fields.insert(column, field_type);
            }
            Err(e) => tracing::warn!("ignoring field in shape of {}: {}", self.entity, e),
        }
        self
    }

    /// Infers a shape from the fields present in `records`.
    pub fn infer<'a>(entity: impl Into<String>, records: impl IntoIterator<Item = &'a Record>) -> Self {
        let mut shape = Self::new(entity);
        for record in records {
            for (name, value) in record.fields() {
                let inferred = match value {
                    FieldValue::Bool(_) => FieldType::Bool,
                    FieldValue::Number(_) => FieldType::Number,
                    FieldValue::Timestamp(_) => FieldType::Timestamp,
                    FieldValue::String(_) | FieldValue::Null => FieldType::String,
                };
                shape.fields.entry(name.clone()).or_insert(inferred);
            }
        }
        shape
    }

    /// Returns the entity name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns the declared fields.
    pub fn fields(&self) -> &BTreeMap<String, FieldType> {
        &self.fields
    }

    /// Returns the type of a normalized field name.
    pub fn field_type(&self, column: &str) -> Option<FieldType> {
        self.fields.get(column).copied()
    }

    /// Maps a caller-supplied field name to an allow-listed field.
    pub fn resolve(&self, field: &str) -> Result<String, ValidationError> {
        let column = normalize_field_name(field)?;
        if self.fields.contains_key(&column) {
            Ok(column)
        } else {
            Err(ValidationError::UnknownField {
                entity: self.entity.clone(),
                field: field.to_string(),
            })
        }
    }
}

/// A persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: String,
    active: bool,
    date_created: DateTime<Utc>,
    date_modified: DateTime<Utc>,
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Creates an active record with both timestamps set to `created`.
    /// Null fields are left out.
    pub fn new(
        id: impl Into<String>,
        mut fields: BTreeMap<String, FieldValue>,
        created: DateTime<Utc>,
    ) -> Self {
        fields.retain(|_, v| !v.is_null());
        Self {
            id: id.into(),
            active: true,
            date_created: created,
            date_modified: created,
            fields,
        }
    }

    /// Creates a record from data loaded out of a backend.
    pub fn from_storage(
        id: impl Into<String>,
        active: bool,
        date_created: DateTime<Utc>,
        date_modified: DateTime<Utc>,
        fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Self {
            id: id.into(),
            active,
            date_created,
            date_modified,
            fields,
        }
    }

    /// Returns the record identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns false once the record has been soft-deleted.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the creation timestamp.
    pub fn date_created(&self) -> DateTime<Utc> {
        self.date_created
    }

    /// Returns the modification timestamp.
    pub fn date_modified(&self) -> DateTime<Utc> {
        self.date_modified
    }

    /// Returns the non-builtin fields.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Looks up a field by column name, including the builtin columns.
    pub fn get(&self, column: &str) -> Option<Cow<'_, FieldValue>> {
        match column {
            ID_FIELD => Some(Cow::Owned(FieldValue::String(self.id.clone()))),
            ACTIVE_FIELD => Some(Cow::Owned(FieldValue::Bool(self.active))),
            DATE_CREATED_FIELD => Some(Cow::Owned(FieldValue::Timestamp(self.date_created))),
            DATE_MODIFIED_FIELD => Some(Cow::Owned(FieldValue::Timestamp(self.date_modified))),
            other => self.fields.get(other).map(Cow::Borrowed),
        }
    }

    /// Applies an update: merges fields (a null clears the field), sets the
    /// active flag, and refreshes the modification timestamp. The creation
    /// timestamp is preserved.
    pub fn apply(&mut self, input: &RecordInput, modified: DateTime<Utc>) {
        for (name, value) in &input.fields {
            if value.is_null() {
                self.fields.remove(name);
            } else {
                self.fields.insert(name.clone(), value.clone());
            }
        }
        self.active = input.active();
        self.date_modified = modified;
    }

    /// Marks the record inactive.
    pub fn deactivate(&mut self, modified: DateTime<Utc>) {
        self.active = false;
        self.date_modified = modified;
    }

    /// Renders the record as a flat JSON object.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        obj.insert(ACTIVE_FIELD.to_string(), Value::Bool(self.active));
        obj.insert(
            DATE_CREATED_FIELD.to_string(),
            Value::String(format_timestamp(&self.date_created)),
        );
        obj.insert(
            DATE_MODIFIED_FIELD.to_string(),
            Value::String(format_timestamp(&self.date_modified)),
        );
        for (name, value) in &self.fields {
            obj.insert(name.clone(), value.to_json());
        }
        Value::Object(obj)
    }
}

/// Caller-supplied data for Create and Update.
///
/// Timestamps are never accepted from callers. `active` is ignored on Create
/// and defaults to `true` on Update, so an Update of a soft-deleted record
/// reactivates it unless the caller explicitly writes `false`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordInput {
    id: Option<String>,
    active: Option<bool>,
    fields: BTreeMap<String, FieldValue>,
}

impl RecordInput {
    /// Creates an empty input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit identifier (Create only).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the active flag written by Update.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Sets a field value. The name is normalized to its column form; names
    /// that cannot be normalized are kept verbatim and rejected later.
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        let column = normalize_field_name(name).unwrap_or_else(|_| name.to_string());
        self.fields.insert(column, value.into());
        self
    }

    /// Builds an input from a flat JSON object.
    ///
    /// `id` and `active` are taken from their keys; creation and modification
    /// timestamps are dropped.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let obj = value.as_object().ok_or_else(|| ValidationError::Malformed {
            message: "record data must be a JSON object".to_string(),
        })?;

        let mut input = Self::new();
        for (key, value) in obj {
            let column = normalize_field_name(key)?;
            match column.as_str() {
                ID_FIELD => match value {
                    Value::String(id) if !id.is_empty() => input.id = Some(id.clone()),
                    Value::Null => {}
                    Value::String(_) => {}
                    _ => {
                        return Err(ValidationError::InvalidValue {
                            field: key.clone(),
                            message: "id must be a string".to_string(),
                        });
                    }
                },
                ACTIVE_FIELD => match value {
                    Value::Bool(active) => input.active = Some(*active),
                    Value::Null => {}
                    _ => {
                        return Err(ValidationError::InvalidValue {
                            field: key.clone(),
                            message: "active must be a boolean".to_string(),
                        });
                    }
                },
                DATE_CREATED_FIELD | DATE_MODIFIED_FIELD => {}
                _ => {
                    input
                        .fields
                        .insert(column, FieldValue::from_json(key, value)?);
                }
            }
        }
        Ok(input)
    }

    /// Returns the caller-supplied identifier, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the active flag to write on Update.
    pub fn active(&self) -> bool {
        self.active.unwrap_or(true)
    }

    /// Returns the field values.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Checks that every field name is a valid column name.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for name in self.fields.keys() {
            normalize_field_name(name)?;
            if BUILTIN_FIELDS.contains(&name.as_str()) {
                return Err(ValidationError::InvalidValue {
                    field: name.clone(),
                    message: "builtin columns are assigned by the repository".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Builds the record written by Create.
    pub fn into_record(self, id: String, created: DateTime<Utc>) -> Record {
        Record::new(id, self.fields, created)
    }
}
