mod policy;
mod store;

use serde_json::Value;
use thiserror::Error;

pub use policy::StatementPolicy;
pub use store::SqliteCatalog;

pub const DEFAULT_DATABASE_FILE: &str = "paket_pulsa_ioh.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("catalog store unavailable: {0}")]
    Unavailable(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("statement not allowed: {0}")]
    StatementNotAllowed(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read-only access to the package catalog, as exposed to the model.
///
/// Implementations open a fresh connection per call and never share
/// transaction state between calls.
pub trait CatalogTools {
    fn list_tables(&self) -> StoreResult<Vec<String>>;
    /// Columns of `table_name` in definition order. An unknown table yields
    /// an empty list rather than an error.
    fn describe_table(&self, table_name: &str) -> StoreResult<Vec<ColumnInfo>>;
    fn execute_query(&self, sql: &str) -> StoreResult<QueryRows>;
}
