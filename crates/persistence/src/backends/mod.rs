//! Storage backend implementations.
//!
//! Every backend implements [`RecordStorage`](crate::core::RecordStorage) and
//! produces the same results for the same query. The relational backends
//! are gated behind feature flags.
//!
//! # Available Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | always | Process-local maps, evaluated with [`Evaluator`](crate::engine::Evaluator) |
//! | SQLite | `sqlite` | Embedded database, file or in-memory |
//! | PostgreSQL | `postgres` | Pooled server connections |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! use mercator_persistence::backends::sqlite::SqliteBackend;
//!
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//! let backend = SqliteBackend::open("./data/mercator.db")?;
//! # Ok(())
//! # }
//! ```

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;
