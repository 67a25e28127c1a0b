//! RecordStorage implementation for PostgreSQL.
//!
//! Statements come from the shared [`Translator`] with the Postgres dialect.
//! Every column is read back through a cast to the type its field type
//! decodes from, so decoding never depends on the catalog type name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Object;
use postgres_types::ToSql;
use tokio_postgres::error::SqlState;
use tokio_postgres::{GenericClient, IsolationLevel, Row};
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::core::{BackendKind, RecordStorage};
use crate::error::{QueryError, ResourceError, StorageError, StorageResult};
use crate::repository::RepositoryConfig;
use crate::sql::{Dialect, SqlParam, Statement, TableSchema, Translator};
use crate::types::{FieldType, FieldValue, ListQuery, ListResult, Record, RecordInput};

use super::PostgresBackend;
use super::backend::{canceller, release};
use super::schema;

type BoxedParam = Box<dyn ToSql + Sync + Send>;

fn bind(params: &[SqlParam]) -> Vec<BoxedParam> {
    params
        .iter()
        .map(|param| -> BoxedParam {
            match param {
                SqlParam::Text(s) => Box::new(s.clone()),
                SqlParam::Integer(i) => Box::new(*i),
                SqlParam::Float(f) => Box::new(*f),
                SqlParam::Bool(b) => Box::new(*b),
                SqlParam::Timestamp(ts) => Box::new(*ts),
                SqlParam::Null(FieldType::String) => Box::new(None::<String>),
                SqlParam::Null(FieldType::Number) => Box::new(None::<f64>),
                SqlParam::Null(FieldType::Bool) => Box::new(None::<bool>),
                SqlParam::Null(FieldType::Timestamp) => Box::new(None::<DateTime<Utc>>),
            }
        })
        .collect()
}

fn refs(bound: &[BoxedParam]) -> Vec<&(dyn ToSql + Sync)> {
    bound
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

fn decode_value(row: &Row, idx: usize, field_type: FieldType) -> StorageResult<FieldValue> {
    let value = match field_type {
        FieldType::String => row
            .try_get::<_, Option<String>>(idx)?
            .map(FieldValue::String),
        FieldType::Number => row.try_get::<_, Option<f64>>(idx)?.map(FieldValue::Number),
        FieldType::Bool => row.try_get::<_, Option<bool>>(idx)?.map(FieldValue::Bool),
        FieldType::Timestamp => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(FieldValue::Timestamp),
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

async fn query_records<C>(
    client: &C,
    schema: &TableSchema,
    stmt: &Statement,
) -> StorageResult<Vec<Record>>
where
    C: GenericClient + Sync,
{
    debug!(sql = %stmt.sql, params = stmt.params.len(), "postgres query");
    let bound = bind(&stmt.params);
    let rows = client.query(stmt.sql.as_str(), &refs(&bound)).await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut values = Vec::with_capacity(schema.columns().len());
        for (i, column) in schema.columns().iter().enumerate() {
            values.push((
                column.name().to_string(),
                decode_value(row, i, column.field_type())?,
            ));
        }
        records.push(schema.record_from_row(values)?);
    }
    Ok(records)
}

async fn query_count<C>(client: &C, stmt: &Statement) -> StorageResult<u64>
where
    C: GenericClient + Sync,
{
    debug!(sql = %stmt.sql, params = stmt.params.len(), "postgres count");
    let bound = bind(&stmt.params);
    let row = client.query_one(stmt.sql.as_str(), &refs(&bound)).await?;
    let count: i64 = row.try_get(0)?;
    Ok(u64::try_from(count).unwrap_or(0))
}

async fn execute<C>(client: &C, stmt: &Statement) -> StorageResult<u64>
where
    C: GenericClient + Sync,
{
    debug!(sql = %stmt.sql, params = stmt.params.len(), "postgres execute");
    let bound = bind(&stmt.params);
    Ok(client.execute(stmt.sql.as_str(), &refs(&bound)).await?)
}

fn warn_dropped(entity: &str, dropped: &[String]) {
    if !dropped.is_empty() {
        warn!(entity = %entity, fields = ?dropped, "discarding fields with no column");
    }
}

fn already_exists(config: &RepositoryConfig, id: &str) -> StorageError {
    StorageError::Resource(ResourceError::AlreadyExists {
        entity: config.entity().to_string(),
        id: id.to_string(),
    })
}

async fn insert_record(
    client: &mut Object,
    search_path: &str,
    config: &RepositoryConfig,
    record: &Record,
) -> StorageResult<Record> {
    let tx = client.transaction().await?;
    let schema = schema::load(&*tx, search_path, config.table()).await?;
    let translator = Translator::new(Dialect::Postgres, &schema);

    let lookup = translator.select_by_id(record.id(), false)?;
    if !query_records(&*tx, &schema, &lookup).await?.is_empty() {
        return Err(already_exists(config, record.id()));
    }

    let (stmt, dropped) = translator.insert(record)?;
    warn_dropped(config.entity(), &dropped);
    debug!(sql = %stmt.sql, params = stmt.params.len(), "postgres insert");
    let bound = bind(&stmt.params);
    tx.execute(stmt.sql.as_str(), &refs(&bound))
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                already_exists(config, record.id())
            } else {
                StorageError::from(e)
            }
        })?;

    let stored = query_records(&*tx, &schema, &lookup)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            QueryError::execution(format!(
                "inserted row {} could not be read back",
                record.id()
            ))
        })?;
    tx.commit().await?;
    Ok(stored)
}

async fn update_record(
    client: &mut Object,
    search_path: &str,
    config: &RepositoryConfig,
    id: &str,
    input: &RecordInput,
    modified: DateTime<Utc>,
) -> StorageResult<Option<Record>> {
    let tx = client.transaction().await?;
    let schema = schema::load(&*tx, search_path, config.table()).await?;
    let translator = Translator::new(Dialect::Postgres, &schema);

    let (stmt, dropped) = translator.update(id, input, modified)?;
    warn_dropped(config.entity(), &dropped);
    if execute(&*tx, &stmt).await? == 0 {
        return Ok(None);
    }

    let lookup = translator.select_by_id(id, false)?;
    let stored = query_records(&*tx, &schema, &lookup)
        .await?
        .into_iter()
        .next();
    tx.commit().await?;
    Ok(stored)
}

async fn list_records(
    client: &mut Object,
    search_path: &str,
    table: &str,
    query: &ListQuery,
    ctx: &CallContext,
) -> StorageResult<ListResult> {
    let tx = client
        .build_transaction()
        .isolation_level(IsolationLevel::RepeatableRead)
        .read_only(true)
        .start()
        .await?;
    let schema = schema::load(&*tx, search_path, table).await?;
    let plan = Translator::new(Dialect::Postgres, &schema).compile_list(query)?;

    let total = plan.total(query_count(&*tx, &plan.count).await?);
    ctx.check()?;
    let records = match plan.data(total) {
        Some(stmt) => query_records(&*tx, &schema, &stmt).await?,
        None => Vec::new(),
    };
    tx.commit().await?;
    Ok(plan.finish(total, records))
}

impl PostgresBackend {
    fn search_path(&self) -> &str {
        &self.config().schema
    }
}

#[async_trait]
impl RecordStorage for PostgresBackend {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn insert(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        record: Record,
    ) -> StorageResult<Record> {
        let mut client = self.client(ctx).await?;
        let abort = canceller(&client);
        let result = ctx
            .run_with_abort(
                insert_record(&mut client, self.search_path(), config, &record),
                abort,
            )
            .await;
        release(client, &result);
        result
    }

    async fn fetch(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
    ) -> StorageResult<Option<Record>> {
        let client = self.client(ctx).await?;
        let abort = canceller(&client);
        let result = ctx
            .run_with_abort(
                async {
                    let schema = schema::load(&**client, self.search_path(), config.table()).await?;
                    let stmt = Translator::new(Dialect::Postgres, &schema).select_by_id(id, true)?;
                    Ok::<_, StorageError>(
                        query_records(&**client, &schema, &stmt)
                            .await?
                            .into_iter()
                            .next(),
                    )
                },
                abort,
            )
            .await;
        release(client, &result);
        result
    }

    async fn update(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
        input: &RecordInput,
        modified: DateTime<Utc>,
    ) -> StorageResult<Option<Record>> {
        let mut client = self.client(ctx).await?;
        let abort = canceller(&client);
        let result = ctx
            .run_with_abort(
                update_record(&mut client, self.search_path(), config, id, input, modified),
                abort,
            )
            .await;
        release(client, &result);
        result
    }

    async fn soft_delete(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
        modified: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let client = self.client(ctx).await?;
        let abort = canceller(&client);
        let result = ctx
            .run_with_abort(
                async {
                    let schema = schema::load(&**client, self.search_path(), config.table()).await?;
                    let stmt = Translator::new(Dialect::Postgres, &schema).soft_delete(id, modified)?;
                    Ok::<_, StorageError>(execute(&**client, &stmt).await? > 0)
                },
                abort,
            )
            .await;
        release(client, &result);
        result
    }

    async fn hard_delete(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
    ) -> StorageResult<bool> {
        let client = self.client(ctx).await?;
        let abort = canceller(&client);
        let result = ctx
            .run_with_abort(
                async {
                    let schema = schema::load(&**client, self.search_path(), config.table()).await?;
                    let stmt = Translator::new(Dialect::Postgres, &schema).hard_delete(id)?;
                    Ok::<_, StorageError>(execute(&**client, &stmt).await? > 0)
                },
                abort,
            )
            .await;
        release(client, &result);
        result
    }

    async fn list(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        query: &ListQuery,
    ) -> StorageResult<ListResult> {
        let mut client = self.client(ctx).await?;
        let abort = canceller(&client);
        let result = ctx
            .run_with_abort(
                list_records(&mut client, self.search_path(), config.table(), query, ctx),
                abort,
            )
            .await;
        release(client, &result);
        result
    }

    async fn count(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        query: &ListQuery,
    ) -> StorageResult<u64> {
        let client = self.client(ctx).await?;
        let abort = canceller(&client);
        let result = ctx
            .run_with_abort(
                async {
                    let schema = schema::load(&**client, self.search_path(), config.table()).await?;
                    let plan = Translator::new(Dialect::Postgres, &schema).compile_list(query)?;
                    Ok::<_, StorageError>(plan.total(query_count(&**client, &plan.count).await?))
                },
                abort,
            )
            .await;
        release(client, &result);
        result
    }

    async fn exists(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
    ) -> StorageResult<bool> {
        let client = self.client(ctx).await?;
        let abort = canceller(&client);
        let result = ctx
            .run_with_abort(
                async {
                    let schema = schema::load(&**client, self.search_path(), config.table()).await?;
                    let stmt = Translator::new(Dialect::Postgres, &schema).exists(id)?;
                    Ok::<_, StorageError>(query_count(&**client, &stmt).await? > 0)
                },
                abort,
            )
            .await;
        release(client, &result);
        result
    }

    async fn health_check(&self) -> StorageResult<()> {
        crate::core::Backend::health_check(self)
            .await
            .map_err(StorageError::from)
    }
}
