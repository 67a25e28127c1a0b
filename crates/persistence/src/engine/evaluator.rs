//! In-memory evaluator.
//!
//! Applies a [`ListQuery`] to records that are already materialized. The
//! pipeline mirrors the statements the relational translator emits:
//!
//! 1. keep active records only
//! 2. AND every filter
//! 3. keep search matches
//! 4. stable sort by the requested keys, then `date_created`, then `id`
//! 5. cap at `max_results`
//! 6. slice the page
//!
//! Evaluation is a pure function of its inputs.

use std::cmp::Ordering;

use super::operators::{CompiledFilter, check_kind, compare_values};
use super::pagination::{PageWindow, calculate};
use super::search::Searcher;
use crate::error::ValidationError;
use crate::types::{
    FieldType, ListQuery, ListResult, Record, RecordShape, SortDirection, SortField,
};

/// A sort key resolved to a column.
#[derive(Debug, Clone)]
struct SortKey {
    column: String,
    direction: SortDirection,
    nulls_first: bool,
}

impl SortKey {
    fn resolve(shape: &RecordShape, sort: &SortField) -> Result<Self, ValidationError> {
        Ok(Self {
            column: shape.resolve(&sort.field)?,
            direction: sort.direction,
            nulls_first: sort.nulls_first(),
        })
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let left = a.get(&self.column).filter(|v| !v.is_null());
        let right = b.get(&self.column).filter(|v| !v.is_null());
        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => {
                if self.nulls_first {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (Some(_), None) => {
                if self.nulls_first {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (Some(x), Some(y)) => {
                let ord = compare_values(&x, &y);
                match self.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
        }
    }
}

/// Compares two records by the canonical base order.
pub fn base_order(a: &Record, b: &Record) -> Ordering {
    a.date_created()
        .cmp(&b.date_created())
        .then_with(|| a.id().cmp(b.id()))
}

/// A validated query bound to a record shape.
#[derive(Debug)]
pub struct Evaluator<'q> {
    query: &'q ListQuery,
    filters: Vec<(String, CompiledFilter<'q>)>,
    sort: Vec<SortKey>,
    searcher: Option<Searcher>,
    window: PageWindow,
}

impl<'q> Evaluator<'q> {
    /// Validates the query and resolves every field against `shape`.
    pub fn new(query: &'q ListQuery, shape: &RecordShape) -> Result<Self, ValidationError> {
        query.validate()?;

        let mut filters = Vec::with_capacity(query.filter.filters.len());
        for filter in query.filter.iter() {
            let column = shape.resolve(&filter.field)?;
            if let Some(field_type) = shape.field_type(&column) {
                check_kind(filter, field_type)?;
            }
            filters.push((column, CompiledFilter::new(filter)?));
        }

        let sort = query
            .sort_fields()
            .iter()
            .map(|s| SortKey::resolve(shape, s))
            .collect::<Result<Vec<_>, _>>()?;

        let searcher = match query.active_search() {
            Some(search) => {
                let mut columns = Vec::with_capacity(search.search_fields.len());
                for field in &search.search_fields {
                    let column = shape.resolve(field)?;
                    if shape.field_type(&column) != Some(FieldType::String) {
                        return Err(ValidationError::InvalidSearch {
                            message: format!("'{}' is not a text field", field),
                        });
                    }
                    columns.push(column);
                }
                Some(Searcher::new(search, columns)?)
            }
            None => None,
        };

        Ok(Self {
            query,
            filters,
            sort,
            searcher,
            window: PageWindow::resolve(&query.pagination)?,
        })
    }

    /// Returns true if the record passes the active baseline and every filter.
    pub fn matches(&self, record: &Record) -> bool {
        record.is_active()
            && self
                .filters
                .iter()
                .all(|(column, filter)| filter.matches(record.get(column).as_deref()))
            && self.searcher.as_ref().is_none_or(|s| s.is_match(record))
    }

    /// Compares two records by the requested keys then the base order.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        self.sort
            .iter()
            .map(|key| key.compare(a, b))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or_else(|| base_order(a, b))
    }

    /// Runs the full pipeline over `records`.
    pub fn run<I>(&self, records: I) -> ListResult
    where
        I: IntoIterator<Item = Record>,
    {
        let mut matched: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();
        matched.sort_by(|a, b| self.compare(a, b));

        if let Some(cap) = self.query.active_search().and_then(|s| s.cap()) {
            matched.truncate(usize::try_from(cap).unwrap_or(usize::MAX));
        }

        let total = matched.len() as u64;
        let (start, end) = self.window.bounds(total);
        let page: Vec<Record> = matched.drain(start..end).collect();

        let matches = match &self.searcher {
            Some(searcher) => page.iter().map(|r| searcher.score(r)).collect(),
            None => Vec::new(),
        };

        ListResult {
            pagination: calculate(&self.query.pagination, self.window, total),
            records: page,
            matches,
        }
    }

    /// Counts matching records, ignoring pagination. The search cap applies,
    /// so the count equals the `total_items` a List call would report.
    pub fn count<'r, I>(&self, records: I) -> u64
    where
        I: IntoIterator<Item = &'r Record>,
    {
        let n = records.into_iter().filter(|r| self.matches(r)).count() as u64;
        match self.query.active_search().and_then(|s| s.cap()) {
            Some(cap) => n.min(cap),
            None => n,
        }
    }
}

/// Evaluates `query` over `records`.
///
/// Records with equal sort keys come back in base order (`date_created`,
/// then `id`), not in the order `records` yields them.
pub fn evaluate<I>(
    query: &ListQuery,
    shape: &RecordShape,
    records: I,
) -> Result<ListResult, ValidationError>
where
    I: IntoIterator<Item = Record>,
{
    Ok(Evaluator::new(query, shape)?.run(records))
}
