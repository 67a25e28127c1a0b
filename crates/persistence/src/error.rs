//! Error types for the persistence layer.
//!
//! Errors are layered the same way callers need to react to them: validation
//! problems are detected before any I/O, schema errors come from catalog
//! introspection, query errors from statement execution (including
//! cancellation), and resource errors describe the state of a single record.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// The primary error type for all storage operations.
///
/// Every variant wraps a more specific error so callers can match on the
/// category with [`StorageError::kind`] without losing the detail.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Malformed or unknown filter, sort, search or pagination input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Schema catalog introspection failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Statement execution failed or was aborted.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Record state errors (not found, duplicate identifier).
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Connection pool and serialization errors.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Coarse error category, stable across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Schema,
    Query,
    NotFound,
    Conflict,
    Backend,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Schema => "schema",
            ErrorKind::Query => "query",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Backend => "backend",
        };
        write!(f, "{}", name)
    }
}

impl StorageError {
    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Validation(_) => ErrorKind::Validation,
            StorageError::Schema(_) => ErrorKind::Schema,
            StorageError::Query(_) => ErrorKind::Query,
            StorageError::Resource(ResourceError::NotFound { .. }) => ErrorKind::NotFound,
            StorageError::Resource(ResourceError::AlreadyExists { .. }) => ErrorKind::Conflict,
            StorageError::Backend(_) => ErrorKind::Backend,
        }
    }

    /// Returns true if the error is a missing record on an identifier-targeted call.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns true if the operation may succeed when retried by the caller.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Query(_) => true,
            StorageError::Backend(BackendError::ConnectionFailed { .. })
            | StorageError::Backend(BackendError::PoolExhausted { .. })
            | StorageError::Backend(BackendError::Unavailable { .. }) => true,
            _ => false,
        }
    }

    pub(crate) fn not_found(entity: &str, id: &str) -> Self {
        StorageError::Resource(ResourceError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }
}

/// Errors detected while validating a request, always before any I/O.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The field is not part of the entity's allow-listed field set.
    #[error("unknown field '{field}' for {entity}")]
    UnknownField { entity: String, field: String },

    /// The field name cannot be used as an identifier.
    #[error("invalid field name '{field}'")]
    InvalidFieldName { field: String },

    /// The operator is not recognized for the filter kind.
    #[error("unknown {filter_kind} operator '{operator}'")]
    UnknownOperator {
        filter_kind: String,
        operator: String,
    },

    /// A typed filter carried no kind, or more than one.
    #[error("filter on '{field}' must populate exactly one kind, found {populated}")]
    FilterKind { field: String, populated: usize },

    /// The filter value cannot be interpreted.
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// A sort request was present but empty.
    #[error("sort request must contain at least one field")]
    EmptySort,

    /// Pagination parameters outside the accepted range.
    #[error("invalid pagination: {message}")]
    InvalidPagination { message: String },

    /// Cursor token could not be decoded.
    #[error("invalid pagination cursor: {cursor}")]
    InvalidCursor { cursor: String },

    /// Search parameters outside the accepted range.
    #[error("invalid search request: {message}")]
    InvalidSearch { message: String },

    /// Repository configuration is unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Request body could not be decoded.
    #[error("malformed request: {message}")]
    Malformed { message: String },
}

/// Errors raised while reading the schema catalog.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The catalog query itself failed.
    #[error("failed to introspect table '{table}': {message}")]
    IntrospectionFailed {
        table: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The table does not exist or has no columns.
    #[error("table '{table}' not found in schema catalog")]
    TableNotFound { table: String },

    /// A column every managed table must carry is absent.
    #[error("table '{table}' is missing required column '{column}'")]
    MissingRequiredColumn { table: String, column: String },
}

/// Errors raised while executing statements.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The statement failed in the database.
    #[error("query execution failed: {message}")]
    Execution {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The call context was cancelled while the statement was running.
    #[error("query cancelled")]
    Cancelled,

    /// The call context deadline elapsed while the statement was running.
    #[error("query deadline exceeded")]
    DeadlineExceeded,
}

impl QueryError {
    pub(crate) fn execution(message: impl Into<String>) -> Self {
        QueryError::Execution {
            message: message.into(),
            source: None,
        }
    }
}

/// Errors related to a single record.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// No active record with the identifier exists.
    #[error("record not found: {entity}/{id}")]
    NotFound { entity: String, id: String },

    /// A record with the identifier already exists.
    #[error("record already exists: {entity}/{id}")]
    AlreadyExists { entity: String, id: String },
}

/// Errors originating from the database backend outside statement execution.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// No constructor registered for the configured backend.
    #[error("backend '{backend_name}' is not registered")]
    NotRegistered { backend_name: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.code == rusqlite::ErrorCode::OperationInterrupted =>
            {
                StorageError::Query(QueryError::Cancelled)
            }
            other => StorageError::Query(QueryError::Execution {
                message: other.to_string(),
                source: Some(Box::new(other)),
            }),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for StorageError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.code() == Some(&tokio_postgres::error::SqlState::QUERY_CANCELED) {
            return StorageError::Query(QueryError::Cancelled);
        }
        StorageError::Query(QueryError::Execution {
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for StorageError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        StorageError::Backend(BackendError::ConnectionFailed {
            backend_name: "postgres".to_string(),
            message: err.to_string(),
        })
    }
}
