//! Assertion helpers for list results and errors.

use mercator_persistence::error::{ErrorKind, QueryError, StorageError};
use mercator_persistence::types::ListResult;

use super::fixtures::client_id;

/// Asserts that the page holds exactly the fixtures numbered `expected`,
/// in that order.
pub fn assert_page(result: &ListResult, expected: &[u32]) {
    let expected: Vec<String> = expected.iter().map(|n| client_id(*n)).collect();
    let actual: Vec<&str> = result.ids();
    assert_eq!(
        actual, expected,
        "page mismatch: expected {:?}, got {:?}",
        expected, actual
    );
}

/// Asserts that the page holds the fixtures numbered `expected` in any order.
pub fn assert_page_unordered(result: &ListResult, expected: &[u32]) {
    let mut expected: Vec<String> = expected.iter().map(|n| client_id(*n)).collect();
    let mut actual: Vec<String> = result.ids().into_iter().map(String::from).collect();
    expected.sort();
    actual.sort();
    assert_eq!(actual, expected);
}

/// Asserts the error category.
pub fn assert_error_kind<T: std::fmt::Debug>(result: Result<T, StorageError>, kind: ErrorKind) {
    match result {
        Ok(value) => panic!("expected {} error, got Ok({:?})", kind, value),
        Err(err) => assert_eq!(
            err.kind(),
            kind,
            "expected {} error, got {:?}",
            kind,
            err
        ),
    }
}

/// Asserts that the call was cancelled.
pub fn assert_cancelled<T: std::fmt::Debug>(result: Result<T, StorageError>) {
    match result {
        Err(StorageError::Query(QueryError::Cancelled)) => {}
        other => panic!("expected cancellation, got {:?}", other),
    }
}

/// Asserts that the call ran past its deadline.
pub fn assert_deadline_exceeded<T: std::fmt::Debug>(result: Result<T, StorageError>) {
    match result {
        Err(StorageError::Query(QueryError::DeadlineExceeded)) => {}
        other => panic!("expected deadline exceeded, got {:?}", other),
    }
}
