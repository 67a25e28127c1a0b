//! Typed filter model.
//!
//! A [`TypedFilter`] is one criterion on one field. Its payload is the closed
//! [`FilterKind`] enum, so "which kind is set" is answered by the type system
//! once the wire form has been decoded.
//!
//! The wire form (see [`TypedFilterWire`]) carries one optional object per
//! kind, e.g.
//!
//! ```json
//! { "field": "name",
//!   "stringFilter": { "value": "oe", "operator": "CONTAINS", "caseSensitive": false } }
//! ```
//!
//! Decoding rejects a filter with zero or several populated kinds and any
//! operator string it does not recognize.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::record::{format_timestamp, parse_timestamp};
use crate::error::ValidationError;

macro_rules! wire_operator {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Returns the wire name of the operator.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ValidationError::UnknownOperator {
                        filter_kind: $kind.to_string(),
                        operator: other.to_string(),
                    }),
                }
            }
        }
    };
}

wire_operator! {
    /// Operators of a [`StringFilter`].
    StringOperator, "string" {
        /// Whole-value equality.
        Equals => "EQUALS",
        /// Whole-value inequality.
        NotEquals => "NOT_EQUALS",
        /// Substring match.
        Contains => "CONTAINS",
        /// Prefix match.
        StartsWith => "STARTS_WITH",
        /// Suffix match.
        EndsWith => "ENDS_WITH",
        /// Regular expression match (`regex` crate syntax).
        Regex => "REGEX",
    }
}

wire_operator! {
    /// Operators of a [`NumberFilter`].
    NumberOperator, "number" {
        Equals => "EQUALS",
        NotEquals => "NOT_EQUALS",
        Gt => "GT",
        Gte => "GTE",
        Lt => "LT",
        Lte => "LTE",
    }
}

wire_operator! {
    /// Operators of a [`ListFilter`].
    ListOperator, "list" {
        In => "IN",
        NotIn => "NOT_IN",
    }
}

wire_operator! {
    /// Operators of a [`DateFilter`].
    DateOperator, "date" {
        Equals => "EQUALS",
        Before => "BEFORE",
        After => "AFTER",
        /// Inclusive on both ends.
        Between => "BETWEEN",
    }
}

/// String comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct StringFilter {
    pub value: String,
    pub operator: StringOperator,
    pub case_sensitive: bool,
}

/// Numeric comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberFilter {
    pub value: f64,
    pub operator: NumberOperator,
}

/// Boolean equality.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanFilter {
    pub value: bool,
}

/// Set membership over the textual form of the value.
///
/// An empty `values` list produces no condition at all: every record passes.
#[derive(Debug, Clone, PartialEq)]
pub struct ListFilter {
    pub values: Vec<String>,
    pub operator: ListOperator,
}

/// Numeric range with independently inclusive bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    pub min: f64,
    pub max: f64,
    pub include_min: bool,
    pub include_max: bool,
}

/// Timestamp comparison.
///
/// `BETWEEN` without a `range_end` produces no condition.
#[derive(Debug, Clone, PartialEq)]
pub struct DateFilter {
    pub value: DateTime<Utc>,
    pub operator: DateOperator,
    pub range_end: Option<DateTime<Utc>>,
}

impl DateFilter {
    /// The operand at the microsecond precision timestamps are stored with.
    pub fn start(&self) -> DateTime<Utc> {
        self.value.trunc_subsecs(6)
    }

    /// The `BETWEEN` upper bound, truncated like [`start`](Self::start).
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.range_end.map(|end| end.trunc_subsecs(6))
    }
}

/// The payload of a [`TypedFilter`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    String(StringFilter),
    Number(NumberFilter),
    Boolean(BooleanFilter),
    List(ListFilter),
    Range(RangeFilter),
    Date(DateFilter),
}

impl FilterKind {
    /// Returns the kind name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::String(_) => "string",
            FilterKind::Number(_) => "number",
            FilterKind::Boolean(_) => "boolean",
            FilterKind::List(_) => "list",
            FilterKind::Range(_) => "range",
            FilterKind::Date(_) => "date",
        }
    }
}

/// A single criterion on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TypedFilterWire", into = "TypedFilterWire")]
pub struct TypedFilter {
    pub field: String,
    pub kind: FilterKind,
}

impl TypedFilter {
    /// Creates a filter from its parts.
    pub fn new(field: impl Into<String>, kind: FilterKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    /// String filter.
    pub fn string(
        field: impl Into<String>,
        operator: StringOperator,
        value: impl Into<String>,
        case_sensitive: bool,
    ) -> Self {
        Self::new(
            field,
            FilterKind::String(StringFilter {
                value: value.into(),
                operator,
                case_sensitive,
            }),
        )
    }

    /// Number filter.
    pub fn number(field: impl Into<String>, operator: NumberOperator, value: f64) -> Self {
        Self::new(field, FilterKind::Number(NumberFilter { value, operator }))
    }

    /// Boolean filter.
    pub fn boolean(field: impl Into<String>, value: bool) -> Self {
        Self::new(field, FilterKind::Boolean(BooleanFilter { value }))
    }

    /// List filter.
    pub fn list<I, S>(field: impl Into<String>, operator: ListOperator, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            field,
            FilterKind::List(ListFilter {
                values: values.into_iter().map(Into::into).collect(),
                operator,
            }),
        )
    }

    /// Range filter.
    pub fn range(
        field: impl Into<String>,
        min: f64,
        max: f64,
        include_min: bool,
        include_max: bool,
    ) -> Self {
        Self::new(
            field,
            FilterKind::Range(RangeFilter {
                min,
                max,
                include_min,
                include_max,
            }),
        )
    }

    /// Date filter.
    pub fn date(
        field: impl Into<String>,
        operator: DateOperator,
        value: DateTime<Utc>,
        range_end: Option<DateTime<Utc>>,
    ) -> Self {
        Self::new(
            field,
            FilterKind::Date(DateFilter {
                value,
                operator,
                range_end,
            }),
        )
    }

    /// Returns true if this filter contributes no condition.
    pub fn is_noop(&self) -> bool {
        match &self.kind {
            FilterKind::List(list) => list.values.is_empty(),
            FilterKind::Date(date) => {
                date.operator == DateOperator::Between && date.range_end.is_none()
            }
            _ => false,
        }
    }

    /// Checks the filter values. Field names are checked separately against
    /// the target's field set.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |message: String| ValidationError::InvalidValue {
            field: self.field.clone(),
            message,
        };

        match &self.kind {
            FilterKind::String(f) if f.operator == StringOperator::Regex => {
                compile_pattern(&f.value, f.case_sensitive).map_err(invalid)?;
            }
            FilterKind::Number(f) if !f.value.is_finite() => {
                return Err(invalid("number must be finite".to_string()));
            }
            FilterKind::Range(f) if !f.min.is_finite() || !f.max.is_finite() => {
                return Err(invalid("range bounds must be finite".to_string()));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Compiles a REGEX filter pattern. Case-insensitive matching applies the
/// `(?i)` flag instead of lower-casing the pattern.
pub fn compile_pattern(pattern: &str, case_sensitive: bool) -> Result<regex::Regex, String> {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| e.to_string())
}

/// AND-combined list of filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    #[serde(default)]
    pub filters: Vec<TypedFilter>,
}

impl FilterRequest {
    /// Creates an empty request (matches every record).
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter.
    pub fn with_filter(mut self, filter: TypedFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Returns true if there are no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Iterates the filters in clause order.
    pub fn iter(&self) -> std::slice::Iter<'_, TypedFilter> {
        self.filters.iter()
    }

    /// Validates every filter's values.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.filters.iter().try_for_each(TypedFilter::validate)
    }
}

impl FromIterator<TypedFilter> for FilterRequest {
    fn from_iter<T: IntoIterator<Item = TypedFilter>>(iter: T) -> Self {
        Self {
            filters: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Wire form
// ============================================================================

/// JSON shape of a [`TypedFilter`] before kind resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedFilterWire {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_filter: Option<StringFilterWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_filter: Option<NumberFilterWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean_filter: Option<BooleanFilterWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_filter: Option<ListFilterWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_filter: Option<RangeFilterWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_filter: Option<DateFilterWire>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringFilterWire {
    pub value: String,
    pub operator: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberFilterWire {
    pub value: f64,
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanFilterWire {
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListFilterWire {
    #[serde(default)]
    pub values: Vec<String>,
    pub operator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeFilterWire {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub include_min: bool,
    #[serde(default)]
    pub include_max: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateFilterWire {
    pub value: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_end: Option<String>,
}

fn parse_date(field: &str, value: &str) -> Result<DateTime<Utc>, ValidationError> {
    parse_timestamp(value).ok_or_else(|| ValidationError::InvalidValue {
        field: field.to_string(),
        message: format!("'{}' is not an RFC3339 timestamp", value),
    })
}

impl TryFrom<TypedFilterWire> for TypedFilter {
    type Error = ValidationError;

    fn try_from(wire: TypedFilterWire) -> Result<Self, Self::Error> {
        let populated = [
            wire.string_filter.is_some(),
            wire.number_filter.is_some(),
            wire.boolean_filter.is_some(),
            wire.list_filter.is_some(),
            wire.range_filter.is_some(),
            wire.date_filter.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if populated != 1 {
            return Err(ValidationError::FilterKind {
                field: wire.field,
                populated,
            });
        }

        let field = wire.field;
        let kind = match (
            wire.string_filter,
            wire.number_filter,
            wire.boolean_filter,
            wire.list_filter,
            wire.range_filter,
            wire.date_filter,
        ) {
            (Some(f), ..) => FilterKind::String(StringFilter {
                value: f.value,
                operator: f.operator.parse()?,
                case_sensitive: f.case_sensitive,
            }),
            (_, Some(f), ..) => FilterKind::Number(NumberFilter {
                value: f.value,
                operator: f.operator.parse()?,
            }),
            (_, _, Some(f), ..) => FilterKind::Boolean(BooleanFilter { value: f.value }),
            (_, _, _, Some(f), ..) => FilterKind::List(ListFilter {
                values: f.values,
                operator: f.operator.parse()?,
            }),
            (_, _, _, _, Some(f), _) => FilterKind::Range(RangeFilter {
                min: f.min,
                max: f.max,
                include_min: f.include_min,
                include_max: f.include_max,
            }),
            (_, _, _, _, _, Some(f)) => {
                let operator: DateOperator = f.operator.parse()?;
                let value = parse_date(&field, &f.value)?;
                let range_end = match f.range_end.as_deref().map(str::trim) {
                    Some(end) if !end.is_empty() => Some(parse_date(&field, end)?),
                    _ => None,
                };
                FilterKind::Date(DateFilter {
                    value,
                    operator,
                    range_end,
                })
            }
            (None, None, None, None, None, None) => {
                return Err(ValidationError::FilterKind {
                    field,
                    populated: 0,
                });
            }
        };

        Ok(TypedFilter { field, kind })
    }
}

impl From<TypedFilter> for TypedFilterWire {
    fn from(filter: TypedFilter) -> Self {
        let mut wire = TypedFilterWire {
            field: filter.field,
            ..Default::default()
        };
        match filter.kind {
            FilterKind::String(f) => {
                wire.string_filter = Some(StringFilterWire {
                    value: f.value,
                    operator: f.operator.as_str().to_string(),
                    case_sensitive: f.case_sensitive,
                })
            }
            FilterKind::Number(f) => {
                wire.number_filter = Some(NumberFilterWire {
                    value: f.value,
                    operator: f.operator.as_str().to_string(),
                })
            }
            FilterKind::Boolean(f) => {
                wire.boolean_filter = Some(BooleanFilterWire { value: f.value })
            }
            FilterKind::List(f) => {
                wire.list_filter = Some(ListFilterWire {
                    values: f.values,
                    operator: f.operator.as_str().to_string(),
                })
            }
            FilterKind::Range(f) => {
                wire.range_filter = Some(RangeFilterWire {
                    min: f.min,
                    max: f.max,
                    include_min: f.include_min,
                    include_max: f.include_max,
                })
            }
            FilterKind::Date(f) => {
                wire.date_filter = Some(DateFilterWire {
                    value: format_timestamp(&f.value),
                    operator: f.operator.as_str().to_string(),
                    range_end: f.range_end.as_ref().map(format_timestamp),
                })
            }
        }
        wire
    }
}
