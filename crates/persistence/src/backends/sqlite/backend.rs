//! SQLite backend implementation.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;

use crate::context::CallContext;
use crate::core::{Backend, BackendKind};
use crate::error::{BackendError, StorageError, StorageResult};
use crate::sql::{Dialect, TableSchema};

use super::{functions, schema};

/// SQLite backend for record storage.
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection.
    #[serde(
        with = "crate::factory::humantime_serde",
        default = "default_connection_timeout"
    )]
    pub connection_timeout: Duration,

    /// SQLite busy timeout.
    #[serde(
        with = "crate::factory::humantime_serde",
        default = "default_busy_timeout"
    )]
    pub busy_timeout: Duration,

    /// Enable WAL mode for better concurrency.
    #[serde(default = "default_true")]
    pub enable_wal: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout: default_connection_timeout(),
            busy_timeout: default_busy_timeout(),
            enable_wal: true,
        }
    }
}

fn configure(conn: &mut Connection, busy_timeout: Duration, wal: bool) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    if wal {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
    }
    functions::register(conn)
}

pub(crate) fn join_error(err: JoinError) -> StorageError {
    StorageError::Backend(BackendError::Internal {
        backend_name: "sqlite".to_string(),
        message: format!("blocking task failed: {}", err),
        source: Some(Box::new(err)),
    })
}

impl SqliteBackend {
    /// Creates a new in-memory SQLite backend.
    ///
    /// An in-memory database lives as long as its connection, so the pool
    /// holds exactly one connection that is never recycled.
    pub fn in_memory() -> StorageResult<Self> {
        Self::with_config(":memory:", SqliteBackendConfig::default())
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Creates a backend with custom configuration.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
    ) -> StorageResult<Self> {
        let is_memory = path.as_ref().to_string_lossy() == ":memory:";

        let busy_timeout = config.busy_timeout;
        let wal = config.enable_wal && !is_memory;
        let manager = if is_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(path.as_ref())
        }
        .with_init(move |conn| configure(conn, busy_timeout, wal));

        let max_size = if is_memory { 1 } else { config.max_connections.max(1) };
        let mut builder = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(config.min_connections.min(max_size)))
            .connection_timeout(config.connection_timeout);
        if is_memory {
            builder = builder.idle_timeout(None).max_lifetime(None);
        }

        let pool = builder.build(manager).map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
            })
        })?;

        tracing::info!(
            path = %path.as_ref().display(),
            max_connections = max_size,
            "sqlite backend ready"
        );

        Ok(Self {
            pool,
            config,
            is_memory,
        })
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// Executes a batch of SQL statements, such as table definitions.
    pub async fn execute_batch(&self, ctx: &CallContext, sql: &str) -> StorageResult<()> {
        let sql = sql.to_string();
        self.with_connection(ctx, move |conn| Ok(conn.execute_batch(&sql)?))
            .await
    }

    /// Runs `work` on a pooled connection on the blocking thread pool.
    ///
    /// If `ctx` is cancelled or its deadline passes first, the statement in
    /// progress is interrupted and the matching `QueryError` is returned. The
    /// interrupt is only delivered while `work` still owns the connection.
    pub(crate) async fn with_connection<T, F>(&self, ctx: &CallContext, work: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        ctx.check()?;
        let pool = self.pool.clone();
        let mut conn = ctx
            .run(async move {
                tokio::task::spawn_blocking(move || pool.get())
                    .await
                    .map_err(join_error)?
                    .map_err(StorageError::from)
            })
            .await?;

        let interrupt = conn.get_interrupt_handle();
        let finished = Arc::new(Mutex::new(false));
        let done = Arc::clone(&finished);

        let task = tokio::task::spawn_blocking(move || {
            let result = work(&mut conn);
            *done.lock() = true;
            drop(conn);
            result
        });

        ctx.run_with_abort(
            async move { task.await.map_err(join_error)? },
            move || {
                let guard = finished.lock();
                if !*guard {
                    interrupt.interrupt();
                }
            },
        )
        .await
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    type Connection = PooledConnection<SqliteConnectionManager>;

    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn acquire(&self) -> Result<Self::Connection, BackendError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || pool.get())
            .await
            .map_err(|e| BackendError::Internal {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
                source: Some(Box::new(e)),
            })?
            .map_err(|e| BackendError::ConnectionFailed {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
            })
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let conn = self.acquire().await?;
        tokio::task::spawn_blocking(move || conn.query_row("SELECT 1", [], |_| Ok(())))
            .await
            .map_err(|e| BackendError::Internal {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
                source: Some(Box::new(e)),
            })?
            .map_err(|e| BackendError::Unavailable {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
            })
    }

    async fn introspect(&self, ctx: &CallContext, table: &str) -> StorageResult<TableSchema> {
        let table = table.to_string();
        self.with_connection(ctx, move |conn| schema::load(conn, &table))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::types::FieldType;

    #[test]
    fn test_config_defaults() {
        let config = SqliteBackendConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
        assert!(config.enable_wal);
    }

    #[tokio::test]
    async fn test_introspect_table() {
        let backend = SqliteBackend::in_memory().unwrap();
        let ctx = CallContext::background();
        backend
            .execute_batch(
                &ctx,
                "CREATE TABLE clients (
                    id TEXT PRIMARY KEY,
                    active BOOLEAN NOT NULL,
                    date_created TEXT NOT NULL,
                    date_modified TEXT NOT NULL,
                    display_name TEXT,
                    credit_limit REAL
                )",
            )
            .await
            .unwrap();

        let schema = backend.introspect(&ctx, "clients").await.unwrap();
        assert_eq!(schema.columns().len(), 6);
        assert_eq!(
            schema.resolve("creditLimit").unwrap().field_type(),
            FieldType::Number
        );
        assert_eq!(
            schema.resolve("date_created").unwrap().field_type(),
            FieldType::Timestamp
        );
    }

    #[tokio::test]
    async fn test_introspect_missing_table() {
        let backend = SqliteBackend::in_memory().unwrap();
        let err = backend
            .introspect(&CallContext::background(), "nowhere")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Schema(SchemaError::TableNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_health_check() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert!(Backend::health_check(&backend).await.is_ok());
    }
}
