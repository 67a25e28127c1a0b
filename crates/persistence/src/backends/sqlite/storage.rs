//! RecordStorage implementation for SQLite.
//!
//! Every call introspects the table, compiles statements with the shared
//! [`Translator`], and runs them on one pooled connection. List and count
//! run inside a deferred read transaction so both statements see the same
//! snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, ErrorCode, ToSql, TransactionBehavior, params_from_iter};
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::core::{BackendKind, RecordStorage};
use crate::error::{QueryError, ResourceError, StorageError, StorageResult};
use crate::repository::RepositoryConfig;
use crate::sql::{Dialect, SqlParam, Statement, TableSchema, Translator};
use crate::types::{
    FieldType, FieldValue, ListQuery, ListResult, Record, RecordInput, format_timestamp,
    parse_timestamp,
};

use super::SqliteBackend;
use super::schema;

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlParam::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlParam::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlParam::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlParam::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            SqlParam::Timestamp(ts) => ToSqlOutput::Owned(Value::Text(format_timestamp(ts))),
            SqlParam::Null(_) => ToSqlOutput::Owned(Value::Null),
        })
    }
}

/// Decodes a stored value as a field of `field_type`.
fn decode_value(value: ValueRef<'_>, field_type: FieldType) -> FieldValue {
    match (value, field_type) {
        (ValueRef::Null, _) => FieldValue::Null,
        (ValueRef::Integer(i), FieldType::Bool) => FieldValue::Bool(i != 0),
        (ValueRef::Integer(i), FieldType::String) => FieldValue::String(i.to_string()),
        (ValueRef::Integer(i), _) => FieldValue::Number(i as f64),
        (ValueRef::Real(f), FieldType::String) => FieldValue::String(f.to_string()),
        (ValueRef::Real(f), _) => FieldValue::Number(f),
        (ValueRef::Text(bytes), field_type) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            match field_type {
                FieldType::Timestamp => match parse_timestamp(&text) {
                    Some(ts) => FieldValue::Timestamp(ts),
                    None => FieldValue::String(text),
                },
                FieldType::Number => match text.parse::<f64>() {
                    Ok(n) => FieldValue::Number(n),
                    Err(_) => FieldValue::String(text),
                },
                FieldType::Bool => match text.as_str() {
                    "1" | "true" => FieldValue::Bool(true),
                    "0" | "false" => FieldValue::Bool(false),
                    _ => FieldValue::String(text),
                },
                FieldType::String => FieldValue::String(text),
            }
        }
        (ValueRef::Blob(bytes), _) => FieldValue::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn query_records(
    conn: &Connection,
    schema: &TableSchema,
    stmt: &Statement,
) -> StorageResult<Vec<Record>> {
    debug!(sql = %stmt.sql, params = stmt.params.len(), "sqlite query");
    let mut prepared = conn.prepare(&stmt.sql)?;
    let mut rows = prepared.query(params_from_iter(stmt.params.iter()))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(schema.columns().len());
        for (i, column) in schema.columns().iter().enumerate() {
            values.push((
                column.name().to_string(),
                decode_value(row.get_ref(i)?, column.field_type()),
            ));
        }
        records.push(schema.record_from_row(values)?);
    }
    Ok(records)
}

fn query_count(conn: &Connection, stmt: &Statement) -> StorageResult<u64> {
    debug!(sql = %stmt.sql, params = stmt.params.len(), "sqlite count");
    let count: i64 = conn.query_row(&stmt.sql, params_from_iter(stmt.params.iter()), |row| {
        row.get(0)
    })?;
    Ok(u64::try_from(count).unwrap_or(0))
}

fn execute(conn: &Connection, stmt: &Statement) -> StorageResult<usize> {
    debug!(sql = %stmt.sql, params = stmt.params.len(), "sqlite execute");
    Ok(conn.execute(&stmt.sql, params_from_iter(stmt.params.iter()))?)
}

fn warn_dropped(entity: &str, dropped: &[String]) {
    if !dropped.is_empty() {
        warn!(entity = %entity, fields = ?dropped, "discarding fields with no column");
    }
}

#[async_trait]
impl RecordStorage for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn insert(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        record: Record,
    ) -> StorageResult<Record> {
        let config = config.clone();
        self.with_connection(ctx, move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let schema = schema::load(&tx, config.table())?;
            let translator = Translator::new(Dialect::Sqlite, &schema);

            let lookup = translator.select_by_id(record.id(), false)?;
            if !query_records(&tx, &schema, &lookup)?.is_empty() {
                return Err(StorageError::Resource(ResourceError::AlreadyExists {
                    entity: config.entity().to_string(),
                    id: record.id().to_string(),
                }));
            }

            let (stmt, dropped) = translator.insert(&record)?;
            warn_dropped(config.entity(), &dropped);
            debug!(sql = %stmt.sql, params = stmt.params.len(), "sqlite insert");
            tx.execute(&stmt.sql, params_from_iter(stmt.params.iter()))
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(ref failure, _)
                        if failure.code == ErrorCode::ConstraintViolation =>
                    {
                        StorageError::Resource(ResourceError::AlreadyExists {
                            entity: config.entity().to_string(),
                            id: record.id().to_string(),
                        })
                    }
                    other => StorageError::from(other),
                })?;

            let stored = query_records(&tx, &schema, &lookup)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    QueryError::execution(format!(
                        "inserted row {} could not be read back",
                        record.id()
                    ))
                })?;
            tx.commit()?;
            Ok(stored)
        })
        .await
    }

    async fn fetch(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
    ) -> StorageResult<Option<Record>> {
        let table = config.table().to_string();
        let id = id.to_string();
        self.with_connection(ctx, move |conn| {
            let schema = schema::load(conn, &table)?;
            let stmt = Translator::new(Dialect::Sqlite, &schema).select_by_id(&id, true)?;
            Ok(query_records(conn, &schema, &stmt)?.into_iter().next())
        })
        .await
    }

    async fn update(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
        input: &RecordInput,
        modified: DateTime<Utc>,
    ) -> StorageResult<Option<Record>> {
        let config = config.clone();
        let id = id.to_string();
        let input = input.clone();
        self.with_connection(ctx, move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let schema = schema::load(&tx, config.table())?;
            let translator = Translator::new(Dialect::Sqlite, &schema);

            let (stmt, dropped) = translator.update(&id, &input, modified)?;
            warn_dropped(config.entity(), &dropped);
            if execute(&tx, &stmt)? == 0 {
                return Ok(None);
            }

            let lookup = translator.select_by_id(&id, false)?;
            let stored = query_records(&tx, &schema, &lookup)?.into_iter().next();
            tx.commit()?;
            Ok(stored)
        })
        .await
    }

    async fn soft_delete(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
        modified: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let table = config.table().to_string();
        let id = id.to_string();
        self.with_connection(ctx, move |conn| {
            let schema = schema::load(conn, &table)?;
            let stmt = Translator::new(Dialect::Sqlite, &schema).soft_delete(&id, modified)?;
            Ok(execute(conn, &stmt)? > 0)
        })
        .await
    }

    async fn hard_delete(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
    ) -> StorageResult<bool> {
        let table = config.table().to_string();
        let id = id.to_string();
        self.with_connection(ctx, move |conn| {
            let schema = schema::load(conn, &table)?;
            let stmt = Translator::new(Dialect::Sqlite, &schema).hard_delete(&id)?;
            Ok(execute(conn, &stmt)? > 0)
        })
        .await
    }

    async fn list(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        query: &ListQuery,
    ) -> StorageResult<ListResult> {
        let table = config.table().to_string();
        let query = query.clone();
        let call = ctx.clone();
        self.with_connection(ctx, move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let schema = schema::load(&tx, &table)?;
            let plan = Translator::new(Dialect::Sqlite, &schema).compile_list(&query)?;

            let total = plan.total(query_count(&tx, &plan.count)?);
            call.check()?;
            let records = match plan.data(total) {
                Some(stmt) => query_records(&tx, &schema, &stmt)?,
                None => Vec::new(),
            };
            tx.commit()?;
            Ok(plan.finish(total, records))
        })
        .await
    }

    async fn count(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        query: &ListQuery,
    ) -> StorageResult<u64> {
        let table = config.table().to_string();
        let query = query.clone();
        self.with_connection(ctx, move |conn| {
            let schema = schema::load(conn, &table)?;
            let plan = Translator::new(Dialect::Sqlite, &schema).compile_list(&query)?;
            Ok(plan.total(query_count(conn, &plan.count)?))
        })
        .await
    }

    async fn exists(
        &self,
        ctx: &CallContext,
        config: &RepositoryConfig,
        id: &str,
    ) -> StorageResult<bool> {
        let table = config.table().to_string();
        let id = id.to_string();
        self.with_connection(ctx, move |conn| {
            let schema = schema::load(conn, &table)?;
            let stmt = Translator::new(Dialect::Sqlite, &schema).exists(&id)?;
            Ok(query_count(conn, &stmt)? > 0)
        })
        .await
    }

    async fn health_check(&self) -> StorageResult<()> {
        crate::core::Backend::health_check(self)
            .await
            .map_err(StorageError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_value() {
        assert_eq!(
            decode_value(ValueRef::Integer(1), FieldType::Bool),
            FieldValue::Bool(true)
        );
        assert_eq!(
            decode_value(ValueRef::Integer(3), FieldType::Number),
            FieldValue::Number(3.0)
        );
        assert_eq!(
            decode_value(ValueRef::Null, FieldType::String),
            FieldValue::Null
        );
        assert!(matches!(
            decode_value(
                ValueRef::Text(b"2024-01-01T00:00:00.000000Z"),
                FieldType::Timestamp
            ),
            FieldValue::Timestamp(_)
        ));
    }

    #[test]
    fn test_bool_and_timestamp_params() {
        let ts = parse_timestamp("2024-01-31T08:15:00Z").unwrap();
        assert_eq!(
            SqlParam::Bool(true).to_sql().unwrap(),
            ToSqlOutput::Owned(Value::Integer(1))
        );
        assert_eq!(
            SqlParam::Timestamp(ts).to_sql().unwrap(),
            ToSqlOutput::Owned(Value::Text("2024-01-31T08:15:00.000000Z".to_string()))
        );
    }
}
