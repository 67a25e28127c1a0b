//! Operator semantics.
//!
//! Backend-independent meaning of every filter operator over a single value.
//! The relational translator emits SQL with the same truth table; the
//! in-memory evaluator calls [`matches`] directly.
//!
//! A missing or null value never satisfies an operator (including the
//! negated ones), matching SQL three-valued logic. Filters that contribute no
//! condition (empty list, `BETWEEN` without an end) pass every value.

use std::cmp::Ordering;

use regex::Regex;

use crate::error::ValidationError;
use crate::types::{
    DateOperator, FieldType, FieldValue, FilterKind, ListOperator, NumberOperator, RangeFilter,
    StringFilter, StringOperator, TypedFilter, compile_pattern,
};

/// Returns the field type a filter kind applies to.
pub fn required_type(kind: &FilterKind) -> FieldType {
    match kind {
        FilterKind::String(_) | FilterKind::List(_) => FieldType::String,
        FilterKind::Number(_) | FilterKind::Range(_) => FieldType::Number,
        FilterKind::Boolean(_) => FieldType::Bool,
        FilterKind::Date(_) => FieldType::Timestamp,
    }
}

/// Rejects a filter whose kind does not apply to the field's type.
pub fn check_kind(filter: &TypedFilter, field_type: FieldType) -> Result<(), ValidationError> {
    let required = required_type(&filter.kind);
    if required == field_type {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: filter.field.clone(),
            message: format!(
                "{} filter cannot be applied to a {:?} field",
                filter.kind.name(),
                field_type
            ),
        })
    }
}

/// Lower-cases text for case-insensitive comparison.
pub fn fold_case(s: &str) -> String {
    s.to_lowercase()
}

/// A filter prepared for repeated evaluation.
#[derive(Debug)]
pub struct CompiledFilter<'a> {
    filter: &'a TypedFilter,
    regex: Option<Regex>,
    folded: Option<String>,
}

impl<'a> CompiledFilter<'a> {
    /// Prepares a filter, compiling its regex once.
    pub fn new(filter: &'a TypedFilter) -> Result<Self, ValidationError> {
        let mut regex = None;
        let mut folded = None;
        if let FilterKind::String(f) = &filter.kind {
            if f.operator == StringOperator::Regex {
                regex = Some(compile_pattern(&f.value, f.case_sensitive).map_err(|message| {
                    ValidationError::InvalidValue {
                        field: filter.field.clone(),
                        message,
                    }
                })?);
            } else if !f.case_sensitive {
                folded = Some(fold_case(&f.value));
            }
        }
        Ok(Self {
            filter,
            regex,
            folded,
        })
    }

    /// Evaluates the filter against a value.
    pub fn matches(&self, value: Option<&FieldValue>) -> bool {
        if self.filter.is_noop() {
            return true;
        }
        let value = match value {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };

        match &self.filter.kind {
            FilterKind::String(f) => match value.as_str() {
                Some(s) => self.match_string(f, s),
                None => false,
            },
            FilterKind::Number(f) => match value.as_f64() {
                Some(v) => match_number(f.operator, v, f.value),
                None => false,
            },
            FilterKind::Boolean(f) => value.as_bool() == Some(f.value),
            FilterKind::List(f) => match value.as_text() {
                Some(text) => {
                    let found = f.values.iter().any(|candidate| *candidate == *text);
                    match f.operator {
                        ListOperator::In => found,
                        ListOperator::NotIn => !found,
                    }
                }
                None => false,
            },
            FilterKind::Range(f) => match value.as_f64() {
                Some(v) => match_range(f, v),
                None => false,
            },
            FilterKind::Date(f) => match value.as_timestamp() {
                Some(ts) => match f.operator {
                    DateOperator::Equals => ts == f.start(),
                    DateOperator::Before => ts < f.start(),
                    DateOperator::After => ts > f.start(),
                    DateOperator::Between => match f.end() {
                        Some(end) => ts >= f.start() && ts <= end,
                        None => true,
                    },
                },
                None => false,
            },
        }
    }

    fn match_string(&self, f: &StringFilter, stored: &str) -> bool {
        if let Some(regex) = &self.regex {
            return regex.is_match(stored);
        }

        let (stored, comparand) = match &self.folded {
            Some(folded) => (fold_case(stored), folded.as_str()),
            None => (stored.to_string(), f.value.as_str()),
        };

        match f.operator {
            StringOperator::Equals => stored == comparand,
            StringOperator::NotEquals => stored != comparand,
            StringOperator::Contains => stored.contains(comparand),
            StringOperator::StartsWith => stored.starts_with(comparand),
            StringOperator::EndsWith => stored.ends_with(comparand),
            StringOperator::Regex => false,
        }
    }
}

/// Numeric comparison.
pub fn match_number(operator: NumberOperator, value: f64, operand: f64) -> bool {
    match operator {
        NumberOperator::Equals => value == operand,
        NumberOperator::NotEquals => value != operand,
        NumberOperator::Gt => value > operand,
        NumberOperator::Gte => value >= operand,
        NumberOperator::Lt => value < operand,
        NumberOperator::Lte => value <= operand,
    }
}

/// `(v > min OR (includeMin AND v == min)) AND (v < max OR (includeMax AND v == max))`
pub fn match_range(range: &RangeFilter, v: f64) -> bool {
    let lower = v > range.min || (range.include_min && v == range.min);
    let upper = v < range.max || (range.include_max && v == range.max);
    lower && upper
}

fn type_rank(value: &FieldValue) -> u8 {
    match value {
        FieldValue::Null => 0,
        FieldValue::Bool(_) => 1,
        FieldValue::Number(_) => 2,
        FieldValue::Timestamp(_) => 3,
        FieldValue::String(_) => 4,
    }
}

/// Orders two non-null values the way the relational backends do: numbers
/// numerically, text by byte order, timestamps chronologically.
pub fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Number(x), FieldValue::Number(y)) => x.total_cmp(y),
        (FieldValue::String(x), FieldValue::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (FieldValue::Bool(x), FieldValue::Bool(y)) => x.cmp(y),
        (FieldValue::Timestamp(x), FieldValue::Timestamp(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_timestamp;

    fn eval(filter: &TypedFilter, value: impl Into<FieldValue>) -> bool {
        CompiledFilter::new(filter)
            .unwrap()
            .matches(Some(&value.into()))
    }

    #[test]
    fn test_string_case_insensitive_contains() {
        let filter = TypedFilter::string("name", StringOperator::Contains, "OE", false);
        assert!(eval(&filter, "John Doe"));
        assert!(eval(&filter, "Jane Roe"));
        assert!(!eval(&filter, "Bob Smith"));
    }

    #[test]
    fn test_string_case_sensitive() {
        let filter = TypedFilter::string("name", StringOperator::StartsWith, "jo", true);
        assert!(!eval(&filter, "John"));
        let filter = TypedFilter::string("name", StringOperator::EndsWith, "hn", true);
        assert!(eval(&filter, "John"));
        let filter = TypedFilter::string("name", StringOperator::NotEquals, "John", true);
        assert!(eval(&filter, "john"));
    }

    #[test]
    fn test_regex_case_insensitive_uses_flag() {
        let filter = TypedFilter::string("code", StringOperator::Regex, "^AB[0-9]+$", false);
        assert!(eval(&filter, "ab123"));
        let filter = TypedFilter::string("code", StringOperator::Regex, "^AB[0-9]+$", true);
        assert!(!eval(&filter, "ab123"));
    }

    #[test]
    fn test_range_boundaries() {
        let filter = TypedFilter::range("amount", 10.0, 20.0, true, false);
        let passed: Vec<f64> = [10.0, 15.0, 20.0, 25.0]
            .into_iter()
            .filter(|v| eval(&filter, *v))
            .collect();
        assert_eq!(passed, vec![10.0, 15.0]);
    }

    #[test]
    fn test_null_never_matches() {
        let filter = TypedFilter::string("name", StringOperator::NotEquals, "x", true);
        let compiled = CompiledFilter::new(&filter).unwrap();
        assert!(!compiled.matches(None));
        assert!(!compiled.matches(Some(&FieldValue::Null)));

        let filter = TypedFilter::list("status", ListOperator::NotIn, ["closed"]);
        assert!(!CompiledFilter::new(&filter).unwrap().matches(None));
    }

    #[test]
    fn test_noop_filters_pass_everything() {
        let filter = TypedFilter::list("status", ListOperator::In, Vec::<String>::new());
        let compiled = CompiledFilter::new(&filter).unwrap();
        assert!(compiled.matches(Some(&FieldValue::from("anything"))));
        assert!(compiled.matches(None));

        let start = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        let filter = TypedFilter::date("due", DateOperator::Between, start, None);
        assert!(CompiledFilter::new(&filter).unwrap().matches(None));
    }

    #[test]
    fn test_date_between_inclusive() {
        let start = parse_timestamp("2024-01-01T00:00:00Z").unwrap();
        let end = parse_timestamp("2024-01-31T00:00:00Z").unwrap();
        let filter = TypedFilter::date("due", DateOperator::Between, start, Some(end));
        assert!(eval(&filter, start));
        assert!(eval(&filter, end));
        assert!(!eval(&filter, parse_timestamp("2024-02-01T00:00:00Z").unwrap()));
    }

    #[test]
    fn test_date_operand_compares_at_stored_precision() {
        let stored = parse_timestamp("2024-01-01T00:00:00.000001Z").unwrap();
        let operand = stored + chrono::Duration::nanoseconds(500);

        let filter = TypedFilter::date("due", DateOperator::Equals, operand, None);
        assert!(eval(&filter, stored));
        let filter = TypedFilter::date("due", DateOperator::Before, operand, None);
        assert!(!eval(&filter, stored));
        let filter = TypedFilter::date("due", DateOperator::Between, stored, Some(operand));
        assert!(eval(&filter, stored));
    }

    #[test]
    fn test_list_membership() {
        let filter = TypedFilter::list("status", ListOperator::In, ["open", "pending"]);
        assert!(eval(&filter, "open"));
        assert!(!eval(&filter, "closed"));
        let filter = TypedFilter::list("status", ListOperator::NotIn, ["open"]);
        assert!(eval(&filter, "closed"));
    }

    #[test]
    fn test_check_kind() {
        let filter = TypedFilter::number("name", NumberOperator::Gt, 1.0);
        assert!(check_kind(&filter, FieldType::String).is_err());
        assert!(check_kind(&filter, FieldType::Number).is_ok());
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(
            compare_values(&FieldValue::from("B"), &FieldValue::from("a")),
            Ordering::Less
        );
        assert_eq!(
            compare_values(&FieldValue::from(2.0), &FieldValue::from(10.0)),
            Ordering::Less
        );
    }
}
