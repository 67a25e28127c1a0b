//! List query envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::filter::{FilterRequest, TypedFilter, TypedFilterWire};
use super::pagination::{PaginationRequest, PaginationRequestWire, PaginationResponse};
use super::record::Record;
use super::search::{SearchMatch, SearchRequest};
use super::sort::{SortField, SortFieldWire, SortRequest};
use crate::error::ValidationError;

/// Filters, sort, search and pagination for one List call.
///
/// # Examples
///
/// ```
/// use mercator_persistence::types::{
///     ListQuery, PaginationRequest, SortField, StringOperator, TypedFilter,
/// };
///
/// let query = ListQuery::new()
///     .with_filter(TypedFilter::string("name", StringOperator::Contains, "oe", false))
///     .with_sort(SortField::desc("priority"))
///     .with_pagination(PaginationRequest::page(1, 5));
///
/// assert!(query.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub filter: FilterRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortRequest>,
    #[serde(default)]
    pub pagination: PaginationRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchRequest>,
}

impl ListQuery {
    /// Creates a query matching every active record, first page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter.
    pub fn with_filter(mut self, filter: TypedFilter) -> Self {
        self.filter.filters.push(filter);
        self
    }

    /// Adds a sort key after any existing ones.
    pub fn with_sort(mut self, field: SortField) -> Self {
        self.sort.get_or_insert_with(SortRequest::default).fields.push(field);
        self
    }

    /// Sets the pagination.
    pub fn with_pagination(mut self, pagination: PaginationRequest) -> Self {
        self.pagination = pagination;
        self
    }

    /// Sets the search.
    pub fn with_search(mut self, search: SearchRequest) -> Self {
        self.search = Some(search);
        self
    }

    /// Returns the search request if it filters anything.
    pub fn active_search(&self) -> Option<&SearchRequest> {
        self.search.as_ref().filter(|s| s.is_active())
    }

    /// Returns the sort keys (empty when no sort was requested).
    pub fn sort_fields(&self) -> &[SortField] {
        self.sort.as_ref().map_or(&[][..], |s| s.fields.as_slice())
    }

    /// Validates values and ranges. Field names are resolved separately by
    /// the executing backend against its field set.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.filter.validate()?;
        if let Some(sort) = &self.sort {
            sort.validate()?;
        }
        self.pagination.validate()?;
        if let Some(search) = &self.search {
            search.validate()?;
        }
        Ok(())
    }

    /// Decodes a query from its JSON envelope:
    ///
    /// ```json
    /// { "filter": { "filters": [...] },
    ///   "sort": { "fields": [...] },
    ///   "pagination": { "limit": 5, "offset": { "page": 1 } },
    ///   "search": { "query": "acme", "searchFields": ["name"], "maxResults": 0 } }
    /// ```
    ///
    /// Every decoding failure is a [`ValidationError`].
    pub fn from_json(value: Value) -> Result<Self, ValidationError> {
        let wire: ListQueryWire =
            serde_json::from_value(value).map_err(|e| ValidationError::Malformed {
                message: e.to_string(),
            })?;
        wire.try_into()
    }

    /// Decodes a query from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_str(s).map_err(|e| ValidationError::Malformed {
            message: e.to_string(),
        })?;
        Self::from_json(value)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FilterRequestWire {
    #[serde(default)]
    filters: Vec<TypedFilterWire>,
}

#[derive(Debug, Default, Deserialize)]
struct SortRequestWire {
    #[serde(default)]
    fields: Vec<SortFieldWire>,
}

#[derive(Debug, Default, Deserialize)]
struct ListQueryWire {
    #[serde(default)]
    filter: FilterRequestWire,
    #[serde(default)]
    sort: Option<SortRequestWire>,
    #[serde(default)]
    pagination: Option<PaginationRequestWire>,
    #[serde(default)]
    search: Option<SearchRequest>,
}

impl TryFrom<ListQueryWire> for ListQuery {
    type Error = ValidationError;

    fn try_from(wire: ListQueryWire) -> Result<Self, Self::Error> {
        let filters = wire
            .filter
            .filters
            .into_iter()
            .map(TypedFilter::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let sort = wire
            .sort
            .map(|s| {
                s.fields
                    .into_iter()
                    .map(SortField::try_from)
                    .collect::<Result<Vec<_>, _>>()
                    .map(SortRequest::new)
            })
            .transpose()?;

        let pagination = wire
            .pagination
            .map(PaginationRequest::try_from)
            .transpose()?
            .unwrap_or_default();

        Ok(ListQuery {
            filter: FilterRequest { filters },
            sort,
            pagination,
            search: wire.search,
        })
    }
}

/// One page of a List call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    pub records: Vec<Record>,
    pub pagination: PaginationResponse,
    /// Match details parallel to `records`; empty when no search ran.
    #[serde(default)]
    pub matches: Vec<SearchMatch>,
}

impl ListResult {
    /// Returns the record identifiers in page order.
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(Record::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::filter::FilterKind;
    use serde_json::json;

    #[test]
    fn test_from_json_full_envelope() {
        let query = ListQuery::from_json(json!({
            "filter": {"filters": [
                {"field": "name", "stringFilter": {"value": "oe", "operator": "CONTAINS"}},
                {"field": "status", "listFilter": {"values": [], "operator": "IN"}}
            ]},
            "sort": {"fields": [{"field": "priority", "direction": "DESC"}]},
            "pagination": {"limit": 5, "offset": {"page": 2}},
            "search": {"query": "acme", "searchFields": ["name"], "maxResults": 10}
        }))
        .unwrap();

        assert_eq!(query.filter.filters.len(), 2);
        assert!(matches!(query.filter.filters[0].kind, FilterKind::String(_)));
        assert_eq!(query.sort_fields(), &[SortField::desc("priority")]);
        assert_eq!(query.pagination, PaginationRequest::page(2, 5));
        assert_eq!(query.active_search().unwrap().max_results, 10);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_from_json_keeps_validation_errors() {
        let err = ListQuery::from_json(json!({
            "filter": {"filters": [{"field": "name"}]}
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::FilterKind { populated: 0, .. }));

        let err = ListQuery::from_json(json!({
            "filter": {"filters": [{"field": "n", "listFilter": {"values": [], "operator": "ANY"}}]}
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownOperator { .. }));
    }

    #[test]
    fn test_from_json_malformed() {
        let err = ListQuery::from_json(json!({"pagination": {"limit": "five"}})).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { .. }));
        assert!(ListQuery::from_json_str("{").is_err());
    }

    #[test]
    fn test_validate_rejects_empty_sort() {
        let query = ListQuery::from_json(json!({"sort": {"fields": []}})).unwrap();
        assert_eq!(query.validate(), Err(ValidationError::EmptySort));
    }

    #[test]
    fn test_validate_rejects_out_of_range_limit() {
        let query = ListQuery::new().with_pagination(PaginationRequest::page(1, 500));
        assert!(matches!(
            query.validate(),
            Err(ValidationError::InvalidPagination { .. })
        ));
    }
}
