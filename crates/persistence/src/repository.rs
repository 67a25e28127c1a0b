//! Record repository facade.
//!
//! [`Repository`] is the single seam callers use per entity type. It
//! validates every request before any I/O, assigns identifiers and
//! timestamps, and turns "no row" outcomes from the backend into
//! [`ResourceError::NotFound`](crate::error::ResourceError::NotFound).
//!
//! ```ignore
//! use std::sync::Arc;
//! use mercator_persistence::backends::memory::MemoryBackend;
//! use mercator_persistence::repository::{Repository, RepositoryConfig};
//!
//! let config = RepositoryConfig::new("client", "clients")?;
//! let repo = Repository::new(config, Arc::new(MemoryBackend::new()));
//!
//! let created = repo.create(&ctx, RecordInput::new().with_field("name", "Acme")).await?;
//! let page = repo.list(&ctx, &ListQuery::new()).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::context::CallContext;
use crate::core::{BackendKind, IdGenerator, RecordStorage, UuidGenerator};
use crate::error::{StorageError, StorageResult, ValidationError};
use crate::sql::validate_identifier;
use crate::types::{ID_FIELD, ListQuery, ListResult, Record, RecordInput, RecordShape, now};

/// Immutable configuration of one repository: the entity name used in
/// errors and spans, the backing table, and optionally the declared field
/// set.
///
/// Relational backends read the field set from the schema catalog and ignore
/// the declared shape; the memory backend uses it to type and allow-list
/// fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    entity: String,
    table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shape: Option<RecordShape>,
}

impl RepositoryConfig {
    /// Creates a configuration, checking that `table` is a plain identifier.
    pub fn new(entity: impl Into<String>, table: impl Into<String>) -> Result<Self, ValidationError> {
        let entity = entity.into();
        let table = table.into();
        if entity.trim().is_empty() {
            return Err(ValidationError::InvalidConfiguration {
                message: "entity name must not be empty".to_string(),
            });
        }
        validate_identifier(&table)?;
        Ok(Self {
            entity,
            table,
            shape: None,
        })
    }

    /// Declares the field set.
    pub fn with_shape(mut self, shape: RecordShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Returns the entity name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns the table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the declared field set, if any.
    pub fn shape(&self) -> Option<&RecordShape> {
        self.shape.as_ref()
    }
}

/// Per-entity facade over a [`RecordStorage`] backend.
#[derive(Clone)]
pub struct Repository {
    config: RepositoryConfig,
    storage: Arc<dyn RecordStorage>,
    ids: Arc<dyn IdGenerator>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("config", &self.config)
            .field("backend", &self.storage.backend_name())
            .field("ids", &self.ids)
            .finish()
    }
}

fn require_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: ID_FIELD.to_string(),
            message: "identifier must not be empty".to_string(),
        });
    }
    Ok(())
}

impl Repository {
    /// Creates a repository that assigns UUID v4 identifiers.
    pub fn new(config: RepositoryConfig, storage: Arc<dyn RecordStorage>) -> Self {
        Self {
            config,
            storage,
            ids: Arc::new(UuidGenerator),
        }
    }

    /// Replaces the identifier generator.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Returns the kind of the backing storage.
    pub fn backend_kind(&self) -> BackendKind {
        self.storage.kind()
    }

    /// Creates a record.
    ///
    /// The identifier is taken from `input` or generated. `active` and both
    /// timestamps are always assigned here, whatever the input carries.
    ///
    /// # Errors
    ///
    /// * `ValidationError` - invalid field names or values
    /// * `ResourceError::AlreadyExists` - the identifier is taken
    #[instrument(
        skip(self, ctx, input),
        fields(
            entity = %self.config.entity,
            tenant = %ctx.tenant_id(),
            correlation_id = ctx.correlation_id().unwrap_or("")
        )
    )]
    pub async fn create(&self, ctx: &CallContext, input: RecordInput) -> StorageResult<Record> {
        input.validate()?;
        let id = match input.id() {
            Some(id) => id.to_string(),
            None => self.ids.generate(),
        };
        let record = input.into_record(id, now());
        debug!(id = %record.id(), "creating record");
        self.storage.insert(ctx, &self.config, record).await
    }

    /// Reads an active record.
    ///
    /// # Errors
    ///
    /// * `ResourceError::NotFound` - no active record has the identifier
    #[instrument(
        skip(self, ctx),
        fields(
            entity = %self.config.entity,
            id = %id,
            tenant = %ctx.tenant_id(),
            correlation_id = ctx.correlation_id().unwrap_or("")
        )
    )]
    pub async fn read(&self, ctx: &CallContext, id: &str) -> StorageResult<Record> {
        require_id(id)?;
        self.storage
            .fetch(ctx, &self.config, id)
            .await?
            .ok_or_else(|| StorageError::not_found(&self.config.entity, id))
    }

    /// Updates a record, active or not.
    ///
    /// The active flag is written from `input` (default `true`), so updating
    /// a soft-deleted record reactivates it. Only the modification timestamp
    /// is refreshed.
    ///
    /// # Errors
    ///
    /// * `ResourceError::NotFound` - no row has the identifier
    #[instrument(
        skip(self, ctx, input),
        fields(
            entity = %self.config.entity,
            id = %id,
            tenant = %ctx.tenant_id(),
            correlation_id = ctx.correlation_id().unwrap_or("")
        )
    )]
    pub async fn update(
        &self,
        ctx: &CallContext,
        id: &str,
        input: RecordInput,
    ) -> StorageResult<Record> {
        require_id(id)?;
        input.validate()?;
        self.storage
            .update(ctx, &self.config, id, &input, now())
            .await?
            .ok_or_else(|| StorageError::not_found(&self.config.entity, id))
    }

    /// Soft-deletes a record.
    ///
    /// # Errors
    ///
    /// * `ResourceError::NotFound` - no active record has the identifier
    #[instrument(
        skip(self, ctx),
        fields(
            entity = %self.config.entity,
            id = %id,
            tenant = %ctx.tenant_id(),
            correlation_id = ctx.correlation_id().unwrap_or("")
        )
    )]
    pub async fn delete(&self, ctx: &CallContext, id: &str) -> StorageResult<()> {
        require_id(id)?;
        if self
            .storage
            .soft_delete(ctx, &self.config, id, now())
            .await?
        {
            Ok(())
        } else {
            Err(StorageError::not_found(&self.config.entity, id))
        }
    }

    /// Physically removes a record, active or not.
    ///
    /// # Errors
    ///
    /// * `ResourceError::NotFound` - no row has the identifier
    #[instrument(
        skip(self, ctx),
        fields(
            entity = %self.config.entity,
            id = %id,
            tenant = %ctx.tenant_id(),
            correlation_id = ctx.correlation_id().unwrap_or("")
        )
    )]
    pub async fn hard_delete(&self, ctx: &CallContext, id: &str) -> StorageResult<()> {
        require_id(id)?;
        if self.storage.hard_delete(ctx, &self.config, id).await? {
            Ok(())
        } else {
            Err(StorageError::not_found(&self.config.entity, id))
        }
    }

    /// Lists active records.
    #[instrument(
        skip(self, ctx, query),
        fields(
            entity = %self.config.entity,
            tenant = %ctx.tenant_id(),
            correlation_id = ctx.correlation_id().unwrap_or("")
        )
    )]
    pub async fn list(&self, ctx: &CallContext, query: &ListQuery) -> StorageResult<ListResult> {
        query.validate()?;
        let result = self.storage.list(ctx, &self.config, query).await?;
        debug!(
            returned = result.records.len(),
            total = result.pagination.total_items,
            "listed records"
        );
        Ok(result)
    }

    /// Counts active records matching the query's filters and search.
    #[instrument(
        skip(self, ctx, query),
        fields(
            entity = %self.config.entity,
            tenant = %ctx.tenant_id(),
            correlation_id = ctx.correlation_id().unwrap_or("")
        )
    )]
    pub async fn count(&self, ctx: &CallContext, query: &ListQuery) -> StorageResult<u64> {
        query.validate()?;
        self.storage.count(ctx, &self.config, query).await
    }

    /// Returns true if an active record has the identifier.
    pub async fn exists(&self, ctx: &CallContext, id: &str) -> StorageResult<bool> {
        require_id(id)?;
        self.storage.exists(ctx, &self.config, id).await
    }

    /// Checks the backing storage.
    pub async fn health_check(&self) -> StorageResult<()> {
        self.storage.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryBackend;
    use crate::error::{ErrorKind, ResourceError};
    use crate::types::FieldType;

    #[derive(Debug, Default)]
    struct FixedIds;

    impl IdGenerator for FixedIds {
        fn generate(&self) -> String {
            "fixed-1".to_string()
        }
    }

    fn repository() -> Repository {
        let config = RepositoryConfig::new("task", "tasks")
            .unwrap()
            .with_shape(RecordShape::new("task").with_field("name", FieldType::String));
        Repository::new(config, Arc::new(MemoryBackend::new()))
    }

    #[test]
    fn test_config_rejects_bad_table_names() {
        assert!(RepositoryConfig::new("task", "tasks").is_ok());
        assert!(RepositoryConfig::new("task", "tasks; DROP TABLE users").is_err());
        assert!(RepositoryConfig::new("", "tasks").is_err());
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_timestamps() {
        let repo = repository().with_id_generator(Arc::new(FixedIds));
        let ctx = CallContext::background();

        let record = repo
            .create(&ctx, RecordInput::new().with_field("name", "Write docs"))
            .await
            .unwrap();
        assert_eq!(record.id(), "fixed-1");
        assert!(record.is_active());
        assert_eq!(record.date_created(), record.date_modified());
    }

    #[tokio::test]
    async fn test_create_ignores_inactive_input() {
        let repo = repository();
        let ctx = CallContext::background();
        let record = repo
            .create(&ctx, RecordInput::new().with_active(false).with_field("name", "x"))
            .await
            .unwrap();
        assert!(record.is_active());
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let repo = repository();
        let ctx = CallContext::background();
        let input = RecordInput::new().with_id("t-1").with_field("name", "a");
        repo.create(&ctx, input.clone()).await.unwrap();
        let err = repo.create(&ctx, input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_not_found_carries_entity() {
        let repo = repository();
        let ctx = CallContext::background();
        let err = repo.read(&ctx, "missing").await.unwrap_err();
        match err {
            StorageError::Resource(ResourceError::NotFound { entity, id }) => {
                assert_eq!(entity, "task");
                assert_eq!(id, "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(repo.delete(&ctx, "missing").await.unwrap_err().is_not_found());
        assert!(
            repo.update(&ctx, "missing", RecordInput::new())
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_empty_id_is_a_validation_error() {
        let repo = repository();
        let ctx = CallContext::background();
        let err = repo.read(&ctx, "").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
