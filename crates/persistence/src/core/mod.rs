//! Core storage traits and abstractions.
//!
//! - [`RecordStorage`] - record CRUD and list operations, one impl per backend
//! - [`Backend`] - relational driver abstraction (pool, health, catalog)
//! - [`IdGenerator`] - identifier generation owned by the repository facade
//!
//! # Example: Implementing a Storage Backend
//!
//! ```ignore
//! use async_trait::async_trait;
//! use mercator_persistence::core::{BackendKind, RecordStorage};
//!
//! struct MyBackend {
//!     // ... backend-specific fields
//! }
//!
//! #[async_trait]
//! impl RecordStorage for MyBackend {
//!     fn backend_name(&self) -> &'static str {
//!         "my-backend"
//!     }
//!
//!     fn kind(&self) -> BackendKind {
//!         BackendKind::Memory
//!     }
//!
//!     // ... remaining operations
//! }
//! ```

pub mod backend;
pub mod ids;
pub mod storage;

pub use backend::{Backend, BackendKind};
pub use ids::{IdGenerator, UuidGenerator};
pub use storage::RecordStorage;
