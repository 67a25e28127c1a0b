//! PostgreSQL catalog introspection.

use tokio_postgres::GenericClient;

use crate::error::{QueryError, SchemaError, StorageError, StorageResult};
use crate::sql::{Column, TableSchema, postgres_field_type};

const COLUMNS_SQL: &str = "SELECT column_name::text, data_type::text \
     FROM information_schema.columns \
     WHERE table_schema::text = $1 AND table_name::text = $2 \
     ORDER BY ordinal_position";

/// Reads the column set of `schema.table` from `information_schema`.
pub(crate) async fn load<C>(client: &C, schema: &str, table: &str) -> StorageResult<TableSchema>
where
    C: GenericClient + Sync,
{
    let rows = client
        .query(COLUMNS_SQL, &[&schema, &table])
        .await
        .map_err(|e| match StorageError::from(e) {
            StorageError::Query(QueryError::Execution { message, source }) => {
                StorageError::Schema(SchemaError::IntrospectionFailed {
                    table: table.to_string(),
                    message,
                    source,
                })
            }
            other => other,
        })?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get(0)?;
        let data_type: String = row.try_get(1)?;
        let field_type = postgres_field_type(&data_type);
        columns.push(Column::new(name, data_type, field_type));
    }

    Ok(TableSchema::new(table, columns)?)
}
