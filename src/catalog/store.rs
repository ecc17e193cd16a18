use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use serde_json::{Number, Value};

use super::{CatalogTools, ColumnInfo, QueryRows, StatementPolicy, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    db_path: PathBuf,
    policy: StatementPolicy,
}

impl SqliteCatalog {
    pub fn new(db_path: impl Into<PathBuf>, policy: StatementPolicy) -> Self {
        Self {
            db_path: db_path.into(),
            policy,
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> StoreResult<Connection> {
        // A read-write open would silently create an empty database file.
        if !self.db_path.is_file() {
            return Err(StoreError::Unavailable(format!(
                "database file {} does not exist",
                self.db_path.display()
            )));
        }

        Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| {
            StoreError::Unavailable(format!(
                "failed to open {}: {err}",
                self.db_path.display()
            ))
        })
    }
}

impl CatalogTools for SqliteCatalog {
    fn list_tables(&self) -> StoreResult<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .map_err(map_sqlite_error)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(map_sqlite_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_error)?;
        Ok(names)
    }

    fn describe_table(&self, table_name: &str) -> StoreResult<Vec<ColumnInfo>> {
        let conn = self.connect()?;
        // The name comes from list_tables via the model and is interpolated as-is.
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table_name});"))
            .map_err(map_sqlite_error)?;
        // table_info rows: cid, name, type, notnull, dflt_value, pk
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    column_type: row.get(2)?,
                })
            })
            .map_err(map_sqlite_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_error)?;
        Ok(columns)
    }

    fn execute_query(&self, sql: &str) -> StoreResult<QueryRows> {
        self.policy.check(sql)?;

        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql).map_err(|err| match err {
            rusqlite::Error::MultipleStatement => StoreError::StatementNotAllowed(
                "multiple SQL statements are not allowed".to_string(),
            ),
            err => map_sqlite_error(err),
        })?;
        self.policy.check_prepared(stmt.readonly())?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let column_count = columns.len();

        let rows = stmt
            .query_map([], |row| {
                (0..column_count)
                    .map(|idx| row.get_ref(idx).map(json_value))
                    .collect::<Result<Vec<_>, _>>()
            })
            .map_err(map_sqlite_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_error)?;

        Ok(QueryRows { columns, rows })
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(Number::from(i)),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => Value::String("<BLOB>".to_string()),
    }
}

fn map_sqlite_error(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::SystemIoFailure) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Query(err.to_string()),
    }
}
