//! Mercator Persistence Layer
//!
//! This crate provides typed list queries over flat records: filters, multi-key
//! sort, free-text search and pagination, with the same results from every
//! storage backend.
//!
//! # Features
//!
//! - **Typed filters**: string, number, boolean, list, range and date filters,
//!   validated before any I/O
//! - **Stable ordering**: multi-key sort with explicit null placement and a
//!   fixed tie-break on creation time and id
//! - **Search**: multi-field text search with highlight spans and a result cap
//! - **Pagination**: page/limit or opaque cursor tokens
//! - **Soft delete**: records are deactivated, never shown again by read or
//!   list, and can be purged explicitly
//! - **Cancellation**: every call carries a [`CallContext`] with a deadline
//!   and a cancellation token; running statements are interrupted
//!
//! # Backend Features
//!
//! ```toml
//! [dependencies]
//! mercator-persistence = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! - memory (always available) - process-local maps
//! - `sqlite` (default) - SQLite with in-memory and file modes
//! - `postgres` - PostgreSQL through a connection pool
//!
//! # Architecture
//!
//! - [`types`] - records, filters, sort, search and pagination requests
//! - [`context`] - per-call tenant, deadline and cancellation
//! - [`engine`] - the in-memory evaluator and the shared paging and search helpers
//! - [`sql`] - schema introspection results and the SQL translator
//! - [`core`] - storage traits
//! - [`backends`] - memory, SQLite and PostgreSQL implementations
//! - [`repository`] - the per-entity facade
//! - [`factory`] - backend selection from configuration
//! - [`error`] - error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use mercator_persistence::backends::memory::MemoryBackend;
//! use mercator_persistence::types::{
//!     ListQuery, PaginationRequest, RecordInput, SortField, StringOperator, TypedFilter,
//! };
//! use mercator_persistence::{CallContext, Repository, RepositoryConfig};
//!
//! # async fn example() -> mercator_persistence::StorageResult<()> {
//! let repo = Repository::new(
//!     RepositoryConfig::new("client", "clients")?,
//!     Arc::new(MemoryBackend::new()),
//! );
//! let ctx = CallContext::background();
//!
//! repo.create(&ctx, RecordInput::new().with_field("name", "Joe's Diner")).await?;
//! repo.create(&ctx, RecordInput::new().with_field("name", "Acme")).await?;
//!
//! let query = ListQuery::new()
//!     .with_filter(TypedFilter::string("name", StringOperator::Contains, "oe", false))
//!     .with_sort(SortField::asc("name"))
//!     .with_pagination(PaginationRequest::page(1, 10));
//! let page = repo.list(&ctx, &query).await?;
//! assert_eq!(page.records.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod context;
pub mod core;
pub mod engine;
pub mod error;
pub mod factory;
pub mod repository;
pub mod sql;
pub mod types;

// Re-export commonly used types at crate root
pub use context::{CallContext, TenantId};
pub use error::{ErrorKind, StorageError, StorageResult};
pub use repository::{Repository, RepositoryConfig};
pub use types::{ListQuery, ListResult, Record, RecordInput};

// Re-export core traits
pub use core::{Backend, BackendKind, IdGenerator, RecordStorage};

pub use factory::{StorageConfig, StorageFactory};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
