//! Search request and match types.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Largest accepted `max_results`.
pub const MAX_SEARCH_RESULTS: u32 = 1000;

/// Case-insensitive substring search over a set of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Text to look for. An empty query disables search.
    #[serde(default)]
    pub query: String,

    /// Fields searched; a record matches if any of them contains the query.
    #[serde(default)]
    pub search_fields: Vec<String>,

    /// Cap on the number of matches. Zero means no cap.
    #[serde(default)]
    pub max_results: u32,
}

impl SearchRequest {
    /// Creates a search over `fields`.
    pub fn new<I, S>(query: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            query: query.into(),
            search_fields: fields.into_iter().map(Into::into).collect(),
            max_results: 0,
        }
    }

    /// Sets the result cap.
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Returns true if the request filters anything.
    pub fn is_active(&self) -> bool {
        !self.query.is_empty()
    }

    /// Returns the cap, if any.
    pub fn cap(&self) -> Option<u64> {
        (self.max_results > 0).then_some(u64::from(self.max_results))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_results > MAX_SEARCH_RESULTS {
            return Err(ValidationError::InvalidSearch {
                message: format!(
                    "maxResults must be between 0 and {}, got {}",
                    MAX_SEARCH_RESULTS, self.max_results
                ),
            });
        }
        if self.is_active() && self.search_fields.is_empty() {
            return Err(ValidationError::InvalidSearch {
                message: "searchFields must name at least one field".to_string(),
            });
        }
        Ok(())
    }
}

/// A matched region inside one field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSpan {
    pub field: String,
    /// Byte offset of the first matched byte.
    pub start: usize,
    /// Byte offset one past the last matched byte.
    pub end: usize,
}

/// Match details for one record, parallel to the returned records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub id: String,
    pub score: f64,
    pub highlights: Vec<HighlightSpan>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_validation() {
        assert!(SearchRequest::new("acme", ["name"]).validate().is_ok());
        assert!(
            SearchRequest::new("acme", ["name"])
                .with_max_results(1001)
                .validate()
                .is_err()
        );
        assert!(
            SearchRequest::new("acme", Vec::<String>::new())
                .validate()
                .is_err()
        );
        assert!(SearchRequest::default().validate().is_ok());
    }

    #[test]
    fn test_cap() {
        assert_eq!(SearchRequest::new("a", ["name"]).cap(), None);
        assert_eq!(
            SearchRequest::new("a", ["name"]).with_max_results(3).cap(),
            Some(3)
        );
    }
}
