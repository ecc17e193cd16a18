use std::str::FromStr;

use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use super::{StoreError, StoreResult};

/// Which statements `execute_query` lets through to SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementPolicy {
    /// Exactly one query statement (`SELECT`, `WITH ... SELECT`, `VALUES`).
    #[default]
    SelectOnly,
    /// Hand the text to SQLite untouched.
    Passthrough,
}

impl FromStr for StatementPolicy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "select_only" => Ok(Self::SelectOnly),
            "passthrough" => Ok(Self::Passthrough),
            _ => Err(format!(
                "unknown sql policy '{value}', expected select_only or passthrough"
            )),
        }
    }
}

impl StatementPolicy {
    /// Syntactic gate applied before SQLite sees the text. Statements the
    /// parser cannot read are left for `check_prepared` to judge.
    pub fn check(self, sql: &str) -> StoreResult<()> {
        match self {
            Self::Passthrough => Ok(()),
            Self::SelectOnly => check_select_only(sql),
        }
    }

    /// Gate on the statement SQLite compiled; `readonly` is
    /// `sqlite3_stmt_readonly` for it.
    pub fn check_prepared(self, readonly: bool) -> StoreResult<()> {
        match self {
            Self::SelectOnly if !readonly => Err(StoreError::StatementNotAllowed(
                "only read-only queries are allowed".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

fn check_select_only(sql: &str) -> StoreResult<()> {
    // sqlparser lags behind SQLite's grammar (`LIMIT a, b`, `GLOB`, ...).
    let Ok(statements) = Parser::parse_sql(&SQLiteDialect {}, sql) else {
        return Ok(());
    };

    match statements.as_slice() {
        [] => Err(StoreError::Query("empty SQL statement".to_string())),
        [Statement::Query(_)] => Ok(()),
        [other] => Err(StoreError::StatementNotAllowed(format!(
            "only SELECT queries are allowed, got: {}",
            statement_keyword(other)
        ))),
        _ => Err(StoreError::StatementNotAllowed(
            "multiple SQL statements are not allowed".to_string(),
        )),
    }
}

fn statement_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("<empty>")
        .to_ascii_uppercase()
}
