//! Substring search and scoring.
//!
//! Matching is a case-insensitive substring test over the search fields. The
//! score is deterministic: the number of occurrences across all fields plus
//! `0.5` for every field whose value starts with the query.

use regex::{Regex, RegexBuilder};

use super::operators::fold_case;
use crate::error::ValidationError;
use crate::types::{HighlightSpan, Record, SearchMatch, SearchRequest};

const PREFIX_BONUS: f64 = 0.5;

/// A search request prepared against resolved column names.
#[derive(Debug, Clone)]
pub struct Searcher {
    needle: String,
    pattern: Regex,
    columns: Vec<String>,
}

impl Searcher {
    /// Prepares a search over already-resolved `columns`.
    pub fn new(request: &SearchRequest, columns: Vec<String>) -> Result<Self, ValidationError> {
        let pattern = RegexBuilder::new(&regex::escape(&request.query))
            .case_insensitive(true)
            .build()
            .map_err(|e| ValidationError::InvalidSearch {
                message: e.to_string(),
            })?;
        Ok(Self {
            needle: fold_case(&request.query),
            pattern,
            columns,
        })
    }

    /// Returns the lower-cased query.
    pub fn needle(&self) -> &str {
        &self.needle
    }

    /// Returns the searched columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns true if any search field contains the query.
    pub fn is_match(&self, record: &Record) -> bool {
        self.columns.iter().any(|column| {
            record
                .get(column)
                .and_then(|v| v.as_str().map(|s| fold_case(s).contains(&self.needle)))
                .unwrap_or(false)
        })
    }

    /// Scores a record and collects highlight spans, ordered by field then
    /// offset.
    pub fn score(&self, record: &Record) -> SearchMatch {
        let mut score = 0.0;
        let mut highlights = Vec::new();

        for column in &self.columns {
            let Some(value) = record.get(column) else {
                continue;
            };
            let Some(text) = value.as_str() else {
                continue;
            };

            for m in self.pattern.find_iter(text) {
                score += 1.0;
                highlights.push(HighlightSpan {
                    field: column.clone(),
                    start: m.start(),
                    end: m.end(),
                });
            }
            if fold_case(text).starts_with(&self.needle) {
                score += PREFIX_BONUS;
            }
        }

        SearchMatch {
            id: record.id().to_string(),
            score,
            highlights,
        }
    }
}
