//! Sort fields, directions and null placement.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Returns the SQL keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            other => Err(ValidationError::UnknownOperator {
                filter_kind: "sort direction".to_string(),
                operator: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placement of null values.
///
/// `Default` treats null as greater than any value, so nulls sort last in
/// ascending order and first in descending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NullOrder {
    #[default]
    Default,
    NullsFirst,
    NullsLast,
}

impl NullOrder {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            NullOrder::Default => "DEFAULT",
            NullOrder::NullsFirst => "NULLS_FIRST",
            NullOrder::NullsLast => "NULLS_LAST",
        }
    }
}

impl FromStr for NullOrder {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEFAULT" => Ok(NullOrder::Default),
            "NULLS_FIRST" => Ok(NullOrder::NullsFirst),
            "NULLS_LAST" => Ok(NullOrder::NullsLast),
            other => Err(ValidationError::UnknownOperator {
                filter_kind: "null order".to_string(),
                operator: other.to_string(),
            }),
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SortFieldWire", into = "SortFieldWire")]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
    pub null_order: NullOrder,
}

impl SortField {
    /// Ascending sort with default null placement.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
            null_order: NullOrder::Default,
        }
    }

    /// Descending sort with default null placement.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
            null_order: NullOrder::Default,
        }
    }

    /// Sets the null placement.
    pub fn with_null_order(mut self, null_order: NullOrder) -> Self {
        self.null_order = null_order;
        self
    }

    /// Returns true if nulls are placed before every non-null value.
    pub fn nulls_first(&self) -> bool {
        match self.null_order {
            NullOrder::NullsFirst => true,
            NullOrder::NullsLast => false,
            NullOrder::Default => self.direction == SortDirection::Desc,
        }
    }
}

/// Ordered list of sort keys; the first is primary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRequest {
    pub fields: Vec<SortField>,
}

impl SortRequest {
    /// Creates a request from sort keys.
    pub fn new(fields: Vec<SortField>) -> Self {
        Self { fields }
    }

    /// Appends a sort key.
    pub fn then(mut self, field: SortField) -> Self {
        self.fields.push(field);
        self
    }

    /// A present sort request must name at least one field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.fields.is_empty() {
            return Err(ValidationError::EmptySort);
        }
        Ok(())
    }
}

/// JSON shape of a [`SortField`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortFieldWire {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_order: Option<String>,
}

impl TryFrom<SortFieldWire> for SortField {
    type Error = ValidationError;

    fn try_from(wire: SortFieldWire) -> Result<Self, Self::Error> {
        let direction = match wire.direction.as_deref() {
            Some(d) if !d.is_empty() => d.parse()?,
            _ => SortDirection::Asc,
        };
        let null_order = match wire.null_order.as_deref() {
            Some(n) if !n.is_empty() => n.parse()?,
            _ => NullOrder::Default,
        };
        Ok(SortField {
            field: wire.field,
            direction,
            null_order,
        })
    }
}

impl From<SortField> for SortFieldWire {
    fn from(sort: SortField) -> Self {
        SortFieldWire {
            field: sort.field,
            direction: Some(sort.direction.as_str().to_string()),
            null_order: Some(sort.null_order.as_str().to_string()),
        }
    }
}
