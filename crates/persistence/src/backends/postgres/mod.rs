//! PostgreSQL backend implementation.
//!
//! Relational storage over `tokio-postgres` with `deadpool-postgres`
//! pooling. Columns are discovered through `information_schema.columns` in
//! the configured schema on every call.
//!
//! # Example
//!
//! ```no_run
//! use mercator_persistence::backends::postgres::{PostgresBackend, PostgresConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = PostgresBackend::new(PostgresConfig {
//!     host: "db.internal".to_string(),
//!     password: Some("secret".to_string()),
//!     ..Default::default()
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Behavior
//!
//! - Text comparisons and sorts use the `"C"` collation, so ordering is by
//!   code point as in the in-memory evaluator.
//! - List runs its count and page statements in one read-only
//!   `REPEATABLE READ` transaction.
//! - When a call is cancelled or its deadline passes, a cancel request is
//!   sent for the running statement and the session is discarded instead of
//!   returned to the pool.

mod backend;
mod schema;
mod storage;

pub use backend::{PostgresBackend, PostgresConfig, PostgresSslMode};
