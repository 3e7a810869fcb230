//! Progressive discovery over JSON-RPC: schemas, then tables, then
//! relationships, then a query built from what was discovered.

use pglens_core::PglensConfig;
use pglens_mcp::{JsonRpcRequest, McpServer, ToolHandlers};
use pglens_runtime::ResultColumn;
use pglens_runtime::testing::{FakeCatalog, FakeQueryAdapter};
use serde_json::{Map, Value, json};
use std::sync::Arc;

fn server(queries: Arc<FakeQueryAdapter>) -> McpServer {
    let config = PglensConfig::default();
    let tools = ToolHandlers::new(Arc::new(FakeCatalog::shop()), queries, &config);
    McpServer::new(config.mcp, tools)
}

async fn call(server: &McpServer, id: i64, name: &str, arguments: Value) -> Value {
    let request = JsonRpcRequest::new(id, "tools/call", Some(json!({"name": name, "arguments": arguments})));
    let response = server.handle_request(request).await.expect("calls with an id get a response");
    let result = response.result.expect("tool calls never fail at the protocol level");
    assert_eq!(result["isError"], false, "{name} failed: {result}");
    serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_discover_then_query() {
    let row: Map<String, Value> = serde_json::from_value(json!({"email": "a@example.com", "quantity": 2})).unwrap();
    let queries = Arc::new(FakeQueryAdapter::with_rows(
        vec![ResultColumn::new("email", "text"), ResultColumn::new("quantity", "int4")],
        vec![row],
    ));
    let server = server(queries.clone());

    let schemas = call(&server, 1, "list_schemas", json!({})).await;
    let schema = schemas["schemas"][0]["name"].as_str().unwrap().to_string();
    assert_eq!(schema, "public");

    let tables = call(&server, 2, "list_tables", json!({"schema_name": schema, "include_views": false})).await;
    assert_eq!(tables["total_count"], 4);

    let keys = call(&server, 3, "get_foreign_keys", json!({"table_name": "order_items"})).await;
    assert_eq!(keys["outgoing_count"], 2);

    let paths = call(
        &server,
        4,
        "find_join_path",
        json!({"from_table": "order_items", "to_table": "users"}),
    )
    .await;
    assert_eq!(paths["paths_found"], 1);
    let join = paths["paths"][0]["sql_example"].as_str().unwrap().to_string();

    let result = call(&server, 5, "execute_query", json!({"sql": join, "limit": 10})).await;
    assert_eq!(result["row_count"], 1);
    assert_eq!(result["has_more"], false);
    assert_eq!(result["rows"][0]["email"], "a@example.com");

    let executed = queries.requests();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].sql.contains(&join));
    assert!(executed[0].sql.ends_with("LIMIT 11"));
}

#[tokio::test]
async fn test_repeated_calls_are_identical() {
    let server = server(Arc::new(FakeQueryAdapter::default()));
    for (name, arguments) in [
        ("list_schemas", json!({})),
        ("describe_table", json!({"table_name": "orders"})),
        ("get_foreign_keys", json!({"table_name": "orders"})),
        ("find_join_path", json!({"from_table": "users", "to_table": "products"})),
    ] {
        let first = call(&server, 1, name, arguments.clone()).await;
        let second = call(&server, 2, name, arguments).await;
        assert_eq!(first, second, "{name}");
    }
}
