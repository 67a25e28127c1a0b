//! Backend abstraction for database drivers.
//!
//! This module defines the [`Backend`] trait implemented by the relational
//! drivers. It covers what the storage layer needs from a driver beyond
//! statement execution: pooled connections, a health check, and the schema
//! catalog.

use std::fmt::{self, Debug};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::error::{BackendError, StorageResult, ValidationError};
use crate::sql::{Dialect, TableSchema};

/// Identifies the type of storage backend.
///
/// Used as the key of the [`StorageFactory`](crate::factory::StorageFactory)
/// constructor map and in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local tables evaluated by the in-memory evaluator.
    Memory,
    /// SQLite database (file-based or in-memory).
    Sqlite,
    /// PostgreSQL database.
    Postgres,
}

impl BackendKind {
    /// Returns the configuration name of the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Postgres => "postgres",
        }
    }

    /// Returns true for backends that translate queries into SQL.
    pub fn is_relational(&self) -> bool {
        !matches!(self, BackendKind::Memory)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "sqlite" => Ok(BackendKind::Sqlite),
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            other => Err(ValidationError::InvalidConfiguration {
                message: format!("unknown backend '{}'", other),
            }),
        }
    }
}

/// A relational database driver.
///
/// Implementations own a connection pool. Connections are acquired per call
/// and never held across unrelated calls.
///
/// # Example
///
/// ```ignore
/// use mercator_persistence::core::Backend;
///
/// let schema = backend.introspect(&ctx, "clients").await?;
/// assert!(schema.has_column("display_name"));
/// ```
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// The type of raw connection used by this backend.
    type Connection: Send;

    /// Returns the kind of backend.
    fn kind(&self) -> BackendKind;

    /// Returns a human-readable name for this backend.
    fn name(&self) -> &'static str;

    /// Returns the SQL dialect the translator emits for this backend.
    fn dialect(&self) -> Dialect;

    /// Acquires a connection from the pool.
    async fn acquire(&self) -> Result<Self::Connection, BackendError>;

    /// Checks if the backend is healthy and accepting connections.
    async fn health_check(&self) -> Result<(), BackendError>;

    /// Reads the column set of `table` from the schema catalog.
    ///
    /// # Errors
    ///
    /// * `SchemaError::TableNotFound` - the catalog reports no columns
    /// * `SchemaError::MissingRequiredColumn` - a builtin column is absent
    /// * `SchemaError::IntrospectionFailed` - the catalog query failed
    async fn introspect(&self, ctx: &CallContext, table: &str) -> StorageResult<TableSchema>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Sqlite.to_string(), "sqlite");
        assert_eq!(BackendKind::Postgres.to_string(), "postgres");
        assert_eq!(BackendKind::Memory.to_string(), "memory");
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("SQLite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!(
            "postgresql".parse::<BackendKind>().unwrap(),
            BackendKind::Postgres
        );
        assert!("cassandra".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_backend_kind_serde() {
        let kind: BackendKind = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(kind, BackendKind::Memory);
        assert!(!kind.is_relational());
        assert_eq!(serde_json::to_string(&BackendKind::Sqlite).unwrap(), "\"sqlite\"");
    }
}
