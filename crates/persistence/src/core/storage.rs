//! Core storage trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::backend::BackendKind;
use crate::context::CallContext;
use crate::error::StorageResult;
use crate::repository::RepositoryConfig;
use crate::types::{ListQuery, ListResult, Record, RecordInput};

/// Record storage operations for one backend.
///
/// This is the port the [`Repository`](crate::repository::Repository) facade
/// drives. Implementations execute what they are asked to: identifiers and
/// timestamps arrive already assigned, and "not found" outcomes are reported
/// as `None`/`false` so the facade can attach the entity name.
///
/// Every read path applies the soft-delete baseline (`active = true`).
/// [`update`](Self::update) and [`hard_delete`](Self::hard_delete) target the
/// row whatever its active flag.
///
/// # Example
///
/// ```ignore
/// use mercator_persistence::core::RecordStorage;
///
/// async fn show<S: RecordStorage>(storage: &S, ctx: &CallContext, config: &RepositoryConfig) {
///     if let Some(record) = storage.fetch(ctx, config, "c-1").await? {
///         println!("{}", record.to_json());
///     }
/// }
/// ```
#[async_trait]
pub trait RecordStorage: Send + Sync {
    /// Returns a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Returns the kind of backend.
    fn kind(&self) -> BackendKind;

    /// Stores a new record.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Call context (cancellation, deadline, tracing identity)
    /// * `config` - Entity and table the record belongs to
    /// * `record` - The record with identifier and timestamps assigned
    ///
    /// # Returns
    ///
    /// The record as stored. Fields the table has no column for are dropped.
    ///
    /// # Errors
    ///
    /// * `ResourceError::AlreadyExists` - a row with the identifier exists,
    ///   active or not
    /// * `ValidationError::InvalidValue` - a value does not fit its column
    async fn insert(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        record: Record,
    ) -> StorageResult<Record>;

    /// Reads an active record by identifier.
    async fn fetch(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
    ) -> StorageResult<Option<Record>>;

    /// Applies `input` to the record with the identifier, active or not.
    ///
    /// Writes the active flag from `input` and sets the modification
    /// timestamp to `modified`. Returns `None` when no row has the identifier.
    async fn update(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
        input: &RecordInput,
        modified: DateTime<Utc>,
    ) -> StorageResult<Option<Record>>;

    /// Marks an active record inactive. Returns false when no active row has
    /// the identifier.
    async fn soft_delete(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
        modified: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Physically removes a record. Returns false when no row has the
    /// identifier.
    async fn hard_delete(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
    ) -> StorageResult<bool>;

    /// Runs a filtered, sorted, searched and paginated query.
    ///
    /// # Errors
    ///
    /// * `ValidationError` - detected before any statement runs
    /// * `SchemaError` - introspection of the table failed
    /// * `QueryError` - a statement failed, or the context was cancelled or
    ///   timed out while it ran
    async fn list(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        query: &ListQuery,
    ) -> StorageResult<ListResult>;

    /// Counts the records a [`list`](Self::list) call would report as
    /// `total_items`. Pagination is validated but ignored.
    async fn count(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        query: &ListQuery,
    ) -> StorageResult<u64>;

    /// Returns true if an active record has the identifier.
    async fn exists(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
    ) -> StorageResult<bool>;

    /// Checks that the backend can serve requests.
    async fn health_check(&self) -> StorageResult<()>;
}
