use serde_json::{Map, Value, json};

use crate::catalog::{CatalogTools, StoreError};
use crate::llm::provider::{AssistantPart, FunctionDeclaration};

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallSpec {
    pub id: Option<String>,
    pub name: String,
    pub args_json: Value,
}

pub fn tool_declarations() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration {
            name: "list_tables".to_string(),
            description: "Retrieve the names of all tables in the database.".to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        FunctionDeclaration {
            name: "describe_table".to_string(),
            description: "Look up the table schema. Returns a list of columns, where each entry is a (column name, column type) pair.".to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {
                    "table_name": {"type": "string", "description": "Table name from list_tables"}
                },
                "required": ["table_name"]
            }),
        },
        FunctionDeclaration {
            name: "execute_query".to_string(),
            description: "Execute an SQL SELECT statement, returning the result columns and rows.".to_string(),
            parameters_json_schema: json!({
                "type": "object",
                "properties": {
                    "sql": {"type": "string", "description": "A single SQLite SELECT statement"}
                },
                "required": ["sql"]
            }),
        },
    ]
}

/// Resolves calls one after another, in the order the model emitted them.
pub fn dispatch_calls<C: CatalogTools>(catalog: &C, calls: &[FunctionCallSpec]) -> Vec<AssistantPart> {
    calls
        .iter()
        .map(|call| AssistantPart::FunctionResponse {
            id: call.id.clone(),
            name: call.name.clone(),
            response_json: dispatch_one(catalog, call),
        })
        .collect()
}

fn dispatch_one<C: CatalogTools>(catalog: &C, call: &FunctionCallSpec) -> Value {
    match call.name.as_str() {
        "list_tables" => dispatch_list_tables(catalog, call),
        "describe_table" => match string_arg(call, "table_name") {
            Ok(table_name) => match catalog.describe_table(table_name) {
                Ok(columns) => ok(json!({
                    "columns": columns
                        .into_iter()
                        .map(|col| json!([col.name, col.column_type]))
                        .collect::<Vec<_>>()
                })),
                Err(err) => store_error(err),
            },
            Err(envelope) => envelope,
        },
        "execute_query" => match string_arg(call, "sql") {
            Ok(sql) => match catalog.execute_query(sql) {
                Ok(result) => ok(json!({
                    "columns": result.columns,
                    "rows": result.rows,
                })),
                Err(err) => store_error(err),
            },
            Err(envelope) => envelope,
        },
        _ => error(
            "unknown_function",
            format!("unknown function: {}", call.name),
            json!({}),
        ),
    }
}

fn dispatch_list_tables<C: CatalogTools>(catalog: &C, call: &FunctionCallSpec) -> Value {
    if !(call.args_json.is_null() || call.args_json.as_object().is_some_and(Map::is_empty)) {
        return error(
            "invalid_args",
            "list_tables does not accept arguments",
            json!({ "args": call.args_json }),
        );
    }

    match catalog.list_tables() {
        Ok(tables) => ok(json!({ "tables": tables })),
        Err(err) => store_error(err),
    }
}

fn string_arg<'a>(call: &'a FunctionCallSpec, key: &str) -> Result<&'a str, Value> {
    call.args_json
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            error(
                "invalid_args",
                format!("{} requires a string argument '{key}'", call.name),
                json!({ "args": call.args_json }),
            )
        })
}

fn ok(result: Value) -> Value {
    json!({ "ok": true, "result": result })
}

fn store_error(err: StoreError) -> Value {
    let code = match &err {
        StoreError::Unavailable(_) => "store_unavailable",
        StoreError::Query(_) => "query_error",
        StoreError::StatementNotAllowed(_) => "statement_not_allowed",
    };
    error(code, err.to_string(), json!({}))
}

fn error(code: &str, message: impl Into<String>, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message.into(),
            "details": details,
        }
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{FunctionCallSpec, dispatch_calls, tool_declarations};
    use crate::catalog::{CatalogTools, ColumnInfo, QueryRows, StoreError, StoreResult};
    use crate::llm::provider::AssistantPart;

    struct StaticCatalog;

    impl CatalogTools for StaticCatalog {
        fn list_tables(&self) -> StoreResult<Vec<String>> {
            Ok(vec!["paket_ioh".to_string()])
        }

        fn describe_table(&self, table_name: &str) -> StoreResult<Vec<ColumnInfo>> {
            if table_name != "paket_ioh" {
                return Ok(vec![]);
            }
            Ok(vec![
                ColumnInfo {
                    name: "nama_paket".to_string(),
                    column_type: "TEXT".to_string(),
                },
                ColumnInfo {
                    name: "harga".to_string(),
                    column_type: "INTEGER".to_string(),
                },
            ])
        }

        fn execute_query(&self, sql: &str) -> StoreResult<QueryRows> {
            if sql.starts_with("SELECT") {
                Ok(QueryRows {
                    columns: vec!["nama_paket".to_string(), "harga".to_string()],
                    rows: vec![vec![json!("Freedom Internet 5GB"), json!(25000)]],
                })
            } else {
                Err(StoreError::Query("near \"SELEC\": syntax error".to_string()))
            }
        }
    }

    struct OfflineCatalog;

    impl CatalogTools for OfflineCatalog {
        fn list_tables(&self) -> StoreResult<Vec<String>> {
            Err(StoreError::Unavailable("database file missing".to_string()))
        }

        fn describe_table(&self, _table_name: &str) -> StoreResult<Vec<ColumnInfo>> {
            Err(StoreError::Unavailable("database file missing".to_string()))
        }

        fn execute_query(&self, _sql: &str) -> StoreResult<QueryRows> {
            Err(StoreError::Unavailable("database file missing".to_string()))
        }
    }

    fn call(name: &str, args_json: Value) -> FunctionCallSpec {
        FunctionCallSpec {
            id: Some(format!("id-{name}")),
            name: name.to_string(),
            args_json,
        }
    }

    fn single_response<C: CatalogTools>(catalog: &C, call: FunctionCallSpec) -> Value {
        let mut parts = dispatch_calls(catalog, &[call]);
        match parts.pop() {
            Some(AssistantPart::FunctionResponse { response_json, .. }) => response_json,
            other => panic!("expected function response, got {other:?}"),
        }
    }

    #[test]
    fn declarations_cover_the_three_tools() {
        let names = tool_declarations()
            .into_iter()
            .map(|decl| decl.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["list_tables", "describe_table", "execute_query"]);
    }

    #[test]
    fn list_tables_returns_ok_envelope() {
        let response = single_response(&StaticCatalog, call("list_tables", json!({})));
        assert_eq!(response, json!({"ok": true, "result": {"tables": ["paket_ioh"]}}));
    }

    #[test]
    fn list_tables_rejects_arguments() {
        let response = single_response(&StaticCatalog, call("list_tables", json!({"x": 1})));
        assert_eq!(response["ok"], json!(false));
        assert_eq!(response["error"]["code"], json!("invalid_args"));
    }

    #[test]
    fn describe_table_returns_column_pairs() {
        let response = single_response(
            &StaticCatalog,
            call("describe_table", json!({"table_name": "paket_ioh"})),
        );
        assert_eq!(
            response["result"]["columns"],
            json!([["nama_paket", "TEXT"], ["harga", "INTEGER"]])
        );
    }

    #[test]
    fn describe_table_requires_table_name() {
        let response = single_response(&StaticCatalog, call("describe_table", json!({})));
        assert_eq!(response["error"]["code"], json!("invalid_args"));
    }

    #[test]
    fn execute_query_returns_columns_and_rows() {
        let response = single_response(
            &StaticCatalog,
            call(
                "execute_query",
                json!({"sql": "SELECT nama_paket, harga FROM paket_ioh LIMIT 1"}),
            ),
        );
        assert_eq!(
            response,
            json!({
                "ok": true,
                "result": {
                    "columns": ["nama_paket", "harga"],
                    "rows": [["Freedom Internet 5GB", 25000]]
                }
            })
        );
    }

    #[test]
    fn query_errors_become_recoverable_envelopes() {
        let response = single_response(
            &StaticCatalog,
            call("execute_query", json!({"sql": "SELEC 1"})),
        );
        assert_eq!(response["ok"], json!(false));
        assert_eq!(response["error"]["code"], json!("query_error"));
        assert!(
            response["error"]["message"]
                .as_str()
                .expect("message")
                .contains("syntax error")
        );
    }

    #[test]
    fn unavailable_store_maps_to_store_unavailable_code() {
        for request in [
            call("list_tables", json!({})),
            call("describe_table", json!({"table_name": "paket_ioh"})),
            call("execute_query", json!({"sql": "SELECT 1"})),
        ] {
            let response = single_response(&OfflineCatalog, request);
            assert_eq!(response["error"]["code"], json!("store_unavailable"));
        }
    }

    #[test]
    fn unknown_function_is_reported() {
        let response = single_response(&StaticCatalog, call("drop_everything", json!({})));
        assert_eq!(response["error"]["code"], json!("unknown_function"));
    }

    #[test]
    fn responses_keep_call_order_and_ids() {
        let parts = dispatch_calls(
            &StaticCatalog,
            &[
                call("list_tables", json!({})),
                call("describe_table", json!({"table_name": "paket_ioh"})),
            ],
        );
        let names = parts
            .iter()
            .map(|part| match part {
                AssistantPart::FunctionResponse { id, name, .. } => (id.clone(), name.clone()),
                other => panic!("unexpected part {other:?}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                (Some("id-list_tables".to_string()), "list_tables".to_string()),
                (
                    Some("id-describe_table".to_string()),
                    "describe_table".to_string()
                ),
            ]
        );
    }
}
