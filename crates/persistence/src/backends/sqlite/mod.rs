//! SQLite backend implementation.
//!
//! Relational storage over `rusqlite` with an `r2d2` connection pool. Any
//! table carrying the builtin columns can be managed; the column set is read
//! from the catalog on every call.
//!
//! # Example
//!
//! ```no_run
//! use mercator_persistence::backends::sqlite::SqliteBackend;
//! use mercator_persistence::context::CallContext;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::open("./data/mercator.db")?;
//! backend
//!     .execute_batch(
//!         &CallContext::background(),
//!         "CREATE TABLE IF NOT EXISTS clients (
//!             id TEXT PRIMARY KEY,
//!             active BOOLEAN NOT NULL DEFAULT 1,
//!             date_created TEXT NOT NULL,
//!             date_modified TEXT NOT NULL,
//!             display_name TEXT
//!         )",
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Storage format
//!
//! | Field type | Column value |
//! |------------|--------------|
//! | string | TEXT |
//! | number | REAL or INTEGER |
//! | bool | INTEGER 0/1 |
//! | timestamp | TEXT, fixed-width UTC (`2024-01-31T08:15:00.000000Z`) |
//!
//! Fixed-width timestamps compare lexically in chronological order, so date
//! filters and sorts need no conversion.
//!
//! Connections register two SQL functions, `unicode_lower` and `regexp`,
//! so case folding and regular expressions behave exactly as in the
//! in-memory evaluator.

mod backend;
mod functions;
mod schema;
mod storage;

pub use backend::{SqliteBackend, SqliteBackendConfig};
