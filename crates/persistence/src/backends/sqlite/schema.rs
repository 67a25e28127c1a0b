//! SQLite catalog introspection.

use rusqlite::Connection;

use crate::error::{QueryError, SchemaError, StorageError, StorageResult};
use crate::sql::{Column, TableSchema, sqlite_field_type};

/// Reads the column set of `table` from `pragma_table_info`.
///
/// Runs on every call; schema changes are picked up without a restart.
pub(crate) fn load(conn: &Connection, table: &str) -> StorageResult<TableSchema> {
    let failed = |err: rusqlite::Error| match StorageError::from(err) {
        StorageError::Query(QueryError::Execution { message, source }) => {
            StorageError::Schema(SchemaError::IntrospectionFailed {
                table: table.to_string(),
                message,
                source,
            })
        }
        other => other,
    };

    let mut stmt = conn
        .prepare_cached("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
        .map_err(failed)?;
    let columns = stmt
        .query_map([table], |row| {
            let name: String = row.get(0)?;
            let declared: String = row.get(1)?;
            let field_type = sqlite_field_type(&declared);
            Ok(Column::new(name, declared, field_type))
        })
        .map_err(failed)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(failed)?;

    Ok(TableSchema::new(table, columns)?)
}
