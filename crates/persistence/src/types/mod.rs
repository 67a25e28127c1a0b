//! Core types for the persistence layer.
//!
//! This module provides the data shapes every backend shares:
//!
//! - [`Record`], [`FieldValue`], [`RecordShape`], [`RecordInput`] - stored data
//! - [`TypedFilter`], [`FilterKind`], [`FilterRequest`] - filter model
//! - [`SortField`], [`SortRequest`] - multi-field sort
//! - [`PaginationRequest`], [`PageCursor`], [`PaginationResponse`] - paging
//! - [`SearchRequest`], [`SearchMatch`] - substring search
//! - [`ListQuery`], [`ListResult`] - the List envelope
//!
//! # Examples
//!
//! ## Decoding a query from JSON
//!
//! ```
//! use mercator_persistence::types::ListQuery;
//! use serde_json::json;
//!
//! let query = ListQuery::from_json(json!({
//!     "filter": {"filters": [
//!         {"field": "amount", "rangeFilter": {"min": 10, "max": 20, "includeMin": true}}
//!     ]},
//!     "pagination": {"limit": 5, "offset": {"page": 1}}
//! }))
//! .unwrap();
//!
//! assert!(query.validate().is_ok());
//! ```
//!
//! ## Cursor pagination
//!
//! ```
//! use mercator_persistence::types::{PageCursor, PaginationRequest};
//!
//! let token = PageCursor::new(10).encode();
//! let request = PaginationRequest::cursor(token, 5);
//! assert_eq!(request.offset().unwrap(), 10);
//! ```

mod filter;
mod pagination;
mod query;
mod record;
mod search;
mod sort;

pub use filter::{
    BooleanFilter, BooleanFilterWire, DateFilter, DateFilterWire, DateOperator, FilterKind,
    FilterRequest, ListFilter, ListFilterWire, ListOperator, NumberFilter, NumberFilterWire,
    NumberOperator, RangeFilter, RangeFilterWire, StringFilter, StringFilterWire, StringOperator,
    TypedFilter, TypedFilterWire, compile_pattern,
};

pub use pagination::{
    CursorWire, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, OffsetWire, PageCursor, PaginationMode,
    PaginationRequest, PaginationRequestWire, PaginationResponse,
};

pub use query::{ListQuery, ListResult};

pub use record::{
    ACTIVE_FIELD, BUILTIN_FIELDS, DATE_CREATED_FIELD, DATE_MODIFIED_FIELD, FieldType, FieldValue,
    ID_FIELD, Record, RecordInput, RecordShape, format_timestamp, normalize_field_name, now,
    parse_timestamp,
};

pub use search::{HighlightSpan, MAX_SEARCH_RESULTS, SearchMatch, SearchRequest};

pub use sort::{NullOrder, SortDirection, SortField, SortFieldWire, SortRequest};
