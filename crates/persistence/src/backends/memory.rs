//! In-memory backend.
//!
//! Tables are maps of records behind a `parking_lot` lock. List and count
//! calls snapshot the table under the read lock and run the
//! [`Evaluator`](crate::engine::Evaluator) on the snapshot, so the lock is
//! never held while a query is evaluated.
//!
//! The field set of a table comes from the repository's declared
//! [`RecordShape`] when there is one; declared fields are typed and
//! allow-listed the same way a relational catalog would. Without a declared
//! shape the field set is inferred from the stored records.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::core::{BackendKind, RecordStorage};
use crate::engine::Evaluator;
use crate::error::{ResourceError, StorageError, StorageResult, ValidationError};
use crate::repository::RepositoryConfig;
use crate::types::{FieldValue, ListQuery, ListResult, Record, RecordInput, RecordShape};

type Table = HashMap<String, Record>;

/// Process-local record storage.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows in `table`, active or not.
    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, HashMap::len)
    }

    /// Returns true if `table` holds no rows.
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    fn snapshot(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn shape(config: &RepositoryConfig, records: &[Record]) -> RecordShape {
        match config.shape() {
            Some(shape) => shape.clone(),
            None => RecordShape::infer(config.entity(), records),
        }
    }
}

/// Coerces values to their declared types and drops undeclared fields.
fn conform(
    shape: Option<&RecordShape>,
    fields: impl IntoIterator<Item = (String, FieldValue)>,
    entity: &str,
) -> Result<Vec<(String, FieldValue)>, ValidationError> {
    let mut kept = Vec::new();
    for (name, value) in fields {
        let Some(shape) = shape else {
            kept.push((name, value));
            continue;
        };
        match shape.field_type(&name) {
            Some(field_type) => {
                let value = value.coerce(field_type).ok_or_else(|| {
                    ValidationError::InvalidValue {
                        field: name.clone(),
                        message: format!("expected a {} value", field_type),
                    }
                })?;
                kept.push((name, value));
            }
            None => warn!(entity = %entity, field = %name, "discarding field with no column"),
        }
    }
    Ok(kept)
}

#[async_trait]
impl RecordStorage for MemoryBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn insert(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        record: Record,
    ) -> StorageResult<Record> {
        ctx.check()?;
        let fields = conform(
            config.shape(),
            record.fields().clone(),
            config.entity(),
        )?;
        let stored = Record::from_storage(
            record.id(),
            record.is_active(),
            record.date_created(),
            record.date_modified(),
            fields.into_iter().collect(),
        );

        let mut tables = self.tables.write();
        let table = tables.entry(config.table().to_string()).or_default();
        if table.contains_key(stored.id()) {
            return Err(StorageError::Resource(ResourceError::AlreadyExists {
                entity: config.entity().to_string(),
                id: stored.id().to_string(),
            }));
        }
        table.insert(stored.id().to_string(), stored.clone());
        debug!(table = %config.table(), id = %stored.id(), "inserted record");
        Ok(stored)
    }

    async fn fetch(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
    ) -> StorageResult<Option<Record>> {
        ctx.check()?;
        Ok(self
            .tables
            .read()
            .get(config.table())
            .and_then(|rows| rows.get(id))
            .filter(|r| r.is_active())
            .cloned())
    }

    async fn update(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
        input: &RecordInput,
        modified: DateTime<Utc>,
    ) -> StorageResult<Option<Record>> {
        ctx.check()?;
        let fields = conform(config.shape(), input.fields().clone(), config.entity())?;
        let conformed = fields.into_iter().fold(
            RecordInput::new().with_active(input.active()),
            |acc, (name, value)| acc.with_field(&name, value),
        );

        let mut tables = self.tables.write();
        let Some(record) = tables
            .get_mut(config.table())
            .and_then(|rows| rows.get_mut(id))
        else {
            return Ok(None);
        };
        record.apply(&conformed, modified);
        Ok(Some(record.clone()))
    }

    async fn soft_delete(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
        modified: DateTime<Utc>,
    ) -> StorageResult<bool> {
        ctx.check()?;
        let mut tables = self.tables.write();
        match tables
            .get_mut(config.table())
            .and_then(|rows| rows.get_mut(id))
        {
            Some(record) if record.is_active() => {
                record.deactivate(modified);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn hard_delete(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
    ) -> StorageResult<bool> {
        ctx.check()?;
        Ok(self
            .tables
            .write()
            .get_mut(config.table())
            .and_then(|rows| rows.remove(id))
            .is_some())
    }

    async fn list(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        query: &ListQuery,
    ) -> StorageResult<ListResult> {
        ctx.check()?;
        let records = self.snapshot(config.table());
        let shape = Self::shape(config, &records);
        let evaluator = Evaluator::new(query, &shape)?;
        Ok(evaluator.run(records))
    }

    async fn count(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        query: &ListQuery,
    ) -> StorageResult<u64> {
        ctx.check()?;
        let records = self.snapshot(config.table());
        let shape = Self::shape(config, &records);
        let evaluator = Evaluator::new(query, &shape)?;
        Ok(evaluator.count(&records))
    }

    async fn exists(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
    ) -> StorageResult<bool> {
        ctx.check()?;
        Ok(self
            .tables
            .read()
            .get(config.table())
            .and_then(|rows| rows.get(id))
            .is_some_and(Record::is_active))
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::types::{FieldType, StringOperator, TypedFilter, parse_timestamp};

    fn config() -> RepositoryConfig {
        RepositoryConfig::new("task", "tasks").unwrap().with_shape(
            RecordShape::new("task")
                .with_field("name", FieldType::String)
                .with_field("due", FieldType::Timestamp),
        )
    }

    fn record(id: &str, name: &str) -> Record {
        let input = RecordInput::new().with_field("name", name);
        input.into_record(
            id.to_string(),
            parse_timestamp("2024-01-01T00:00:00Z").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_insert_conforms_fields() {
        let backend = MemoryBackend::new();
        let ctx = CallContext::background();
        let input = RecordInput::new()
            .with_field("name", "a")
            .with_field("due", "2024-05-01T12:00:00+02:00")
            .with_field("colour", "red");
        let stored = backend
            .insert(
                &ctx,
                &config(),
                input.into_record("t-1".to_string(), parse_timestamp("2024-01-01T00:00:00Z").unwrap()),
            )
            .await
            .unwrap();

        assert!(stored.fields().get("colour").is_none());
        assert_eq!(
            stored.get("due").and_then(|v| v.as_timestamp()),
            parse_timestamp("2024-05-01T10:00:00Z")
        );
    }

    #[tokio::test]
    async fn test_soft_deleted_rows_are_hidden() {
        let backend = MemoryBackend::new();
        let ctx = CallContext::background();
        let config = config();
        backend.insert(&ctx, &config, record("t-1", "a")).await.unwrap();
        backend.insert(&ctx, &config, record("t-2", "b")).await.unwrap();

        let now = parse_timestamp("2024-02-01T00:00:00Z").unwrap();
        assert!(backend.soft_delete(&ctx, &config, "t-1", now).await.unwrap());
        assert!(!backend.soft_delete(&ctx, &config, "t-1", now).await.unwrap());

        assert!(backend.fetch(&ctx, &config, "t-1").await.unwrap().is_none());
        assert!(!backend.exists(&ctx, &config, "t-1").await.unwrap());
        let result = backend.list(&ctx, &config, &ListQuery::new()).await.unwrap();
        assert_eq!(result.ids(), vec!["t-2"]);
        assert_eq!(backend.len("tasks"), 2);
    }

    #[tokio::test]
    async fn test_hard_delete_removes_row() {
        let backend = MemoryBackend::new();
        let ctx = CallContext::background();
        let config = config();
        backend.insert(&ctx, &config, record("t-1", "a")).await.unwrap();
        assert!(backend.hard_delete(&ctx, &config, "t-1").await.unwrap());
        assert!(!backend.hard_delete(&ctx, &config, "t-1").await.unwrap());
        assert!(backend.is_empty("tasks"));
    }

    #[tokio::test]
    async fn test_count_matches_filter() {
        let backend = MemoryBackend::new();
        let ctx = CallContext::background();
        let config = config();
        for (id, name) in [("1", "John Doe"), ("2", "Jane Roe"), ("3", "Bob Smith")] {
            backend.insert(&ctx, &config, record(id, name)).await.unwrap();
        }
        let query = ListQuery::new().with_filter(TypedFilter::string(
            "name",
            StringOperator::Contains,
            "oe",
            false,
        ));
        assert_eq!(backend.count(&ctx, &config, &query).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_fast() {
        let backend = MemoryBackend::new();
        let ctx = CallContext::background();
        ctx.cancel();
        let err = backend
            .list(&ctx, &config(), &ListQuery::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Query(QueryError::Cancelled)));
    }
}
