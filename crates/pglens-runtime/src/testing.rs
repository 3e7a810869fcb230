//! In-memory collaborators for tests.
//!
//! Enabled inside this crate's tests and, for downstream crates, through the
//! `testing` feature.

use crate::adapter::{QueryAdapter, QueryRequest, RawResult, ResultColumn};
use crate::catalog::CatalogAdapter;
use crate::error::{CatalogError, ExecutionError};
use async_trait::async_trait;
use pglens_core::{
    ColumnInfo, ConstraintInfo, ForeignKeyEdge, IndexInfo, SchemaInfo, TableInfo, TableKind, TableRef,
};
use serde_json::{Map, Value};
use std::sync::{Mutex, PoisonError};

/// Serves a fixed result set, honouring a trailing `LIMIT n`, and records
/// every request.
#[derive(Debug, Default)]
pub struct FakeQueryAdapter {
    columns: Vec<ResultColumn>,
    rows: Vec<Map<String, Value>>,
    plan: Vec<Value>,
    error: Option<ExecutionError>,
    requests: Mutex<Vec<QueryRequest>>,
}

impl FakeQueryAdapter {
    pub fn with_rows(columns: Vec<ResultColumn>, rows: Vec<Map<String, Value>>) -> Self {
        Self {
            columns,
            rows,
            ..Default::default()
        }
    }

    /// Every call fails with `error`.
    pub fn failing(error: ExecutionError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// One `QUERY PLAN` cell per entry, returned for `EXPLAIN` statements.
    pub fn with_plan(mut self, cells: Vec<Value>) -> Self {
        self.plan = cells;
        self
    }

    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl QueryAdapter for FakeQueryAdapter {
    async fn run(&self, request: QueryRequest) -> Result<RawResult, ExecutionError> {
        let sql = request.sql.clone();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        if sql.starts_with("EXPLAIN") {
            let rows = self
                .plan
                .iter()
                .map(|cell| {
                    let mut row = Map::new();
                    row.insert("QUERY PLAN".to_string(), cell.clone());
                    row
                })
                .collect();
            return Ok(RawResult {
                columns: vec![ResultColumn::new("QUERY PLAN", "text")],
                rows,
            });
        }

        let limit = sql
            .rsplit_once(" LIMIT ")
            .and_then(|(_, n)| n.trim().parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        Ok(RawResult {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(limit).cloned().collect(),
        })
    }
}

#[derive(Debug, Clone)]
struct FakeTable {
    info: TableInfo,
    columns: Vec<ColumnInfo>,
    primary_key: Vec<String>,
}

impl FakeTable {
    fn table_ref(&self) -> TableRef {
        TableRef::new(&self.info.schema_name, &self.info.name)
    }
}

/// Catalog held in memory, built up with chained calls.
#[derive(Debug, Clone, Default)]
pub struct FakeCatalog {
    schemas: Vec<String>,
    tables: Vec<FakeTable>,
    foreign_keys: Vec<ForeignKeyEdge>,
    unavailable: bool,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, name: &str) -> Self {
        self.schemas.push(name.to_string());
        self
    }

    /// Add a table. `columns` are `(name, type)` pairs.
    pub fn table(self, schema: &str, name: &str, columns: &[(&str, &str)], primary_key: &[&str]) -> Self {
        self.relation(TableKind::Table, schema, name, columns, primary_key)
    }

    pub fn view(self, schema: &str, name: &str, columns: &[(&str, &str)]) -> Self {
        self.relation(TableKind::View, schema, name, columns, &[])
    }

    pub fn row_estimate(mut self, schema: &str, name: &str, rows: i64) -> Self {
        if let Some(table) = self
            .tables
            .iter_mut()
            .find(|t| t.info.schema_name == schema && t.info.name == name)
        {
            table.info.estimated_row_count = rows;
        }
        self
    }

    pub fn foreign_key(mut self, edge: ForeignKeyEdge) -> Self {
        self.foreign_keys.push(edge);
        self
    }

    /// Every call fails as if the database were unreachable.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// `users`, `orders`, `order_items` and `products` in `public`, with
    /// `orders -> users` and `order_items -> orders, products`.
    pub fn shop() -> Self {
        let fk = |name: &str, from: &str, from_col: &str, to: &str| {
            ForeignKeyEdge::new(
                name,
                TableRef::new("public", from),
                vec![from_col.to_string()],
                TableRef::new("public", to),
                vec!["id".to_string()],
            )
            .unwrap_or_else(|e| panic!("fixture foreign key {name}: {e}"))
        };

        FakeCatalog::new()
            .schema("public")
            .schema("pg_catalog")
            .schema("information_schema")
            .table("public", "users", &[("id", "int4"), ("email", "text"), ("created_at", "timestamptz")], &["id"])
            .table(
                "public",
                "orders",
                &[("id", "int4"), ("user_id", "int4"), ("status", "text"), ("total", "numeric")],
                &["id"],
            )
            .table(
                "public",
                "order_items",
                &[("id", "int4"), ("order_id", "int4"), ("product_id", "int4"), ("quantity", "int4")],
                &["id"],
            )
            .table("public", "products", &[("id", "int4"), ("name", "text")], &["id"])
            .view("public", "order_totals", &[("order_id", "int4"), ("total", "numeric")])
            .row_estimate("public", "orders", 120_000)
            .foreign_key(fk("orders_user_id_fkey", "orders", "user_id", "users"))
            .foreign_key(fk("order_items_order_id_fkey", "order_items", "order_id", "orders"))
            .foreign_key(fk("order_items_product_id_fkey", "order_items", "product_id", "products"))
    }

    fn relation(
        mut self,
        kind: TableKind,
        schema: &str,
        name: &str,
        columns: &[(&str, &str)],
        primary_key: &[&str],
    ) -> Self {
        let columns: Vec<ColumnInfo> = columns
            .iter()
            .map(|(column, data_type)| {
                let mut info = ColumnInfo::new(*column, *data_type);
                info.is_nullable = !primary_key.contains(column);
                info
            })
            .collect();
        self.tables.push(FakeTable {
            info: TableInfo {
                name: name.to_string(),
                schema_name: schema.to_string(),
                kind,
                description: None,
                estimated_row_count: 0,
                size_bytes: (kind == TableKind::Table).then_some(8192),
                size_pretty: (kind == TableKind::Table).then(|| "8192 bytes".to_string()),
                has_primary_key: !primary_key.is_empty(),
                column_count: columns.len() as i64,
            },
            columns,
            primary_key: primary_key.iter().map(|k| k.to_string()).collect(),
        });
        self
    }

    fn check(&self) -> Result<(), CatalogError> {
        if self.unavailable {
            return Err(ExecutionError::Connection("connection refused".to_string()).into());
        }
        Ok(())
    }

    fn find(&self, table: &TableRef) -> Option<&FakeTable> {
        self.tables.iter().find(|t| t.table_ref() == *table)
    }
}

fn is_system_schema(name: &str) -> bool {
    name.starts_with("pg_") || name == "information_schema"
}

/// SQL `LIKE` with `%` and `_`, no escapes.
fn like(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|i| like(rest, &text[i..])),
        Some(('_', rest)) => !text.is_empty() && like(rest, &text[1..]),
        Some((c, rest)) => text.first() == Some(c) && like(rest, &text[1..]),
    }
}

#[async_trait]
impl CatalogAdapter for FakeCatalog {
    async fn ping(&self) -> Result<(), CatalogError> {
        self.check()
    }

    async fn list_schemas(&self, include_system: bool) -> Result<Vec<SchemaInfo>, CatalogError> {
        self.check()?;
        let mut schemas: Vec<SchemaInfo> = self
            .schemas
            .iter()
            .filter(|name| include_system || !is_system_schema(name))
            .map(|name| SchemaInfo {
                name: name.clone(),
                owner: "postgres".to_string(),
                description: None,
                table_count: self
                    .tables
                    .iter()
                    .filter(|t| t.info.schema_name == *name && t.info.kind == TableKind::Table)
                    .count() as i64,
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(schemas)
    }

    async fn list_tables(
        &self,
        schema: &str,
        include_views: bool,
        name_pattern: Option<&str>,
    ) -> Result<Vec<TableInfo>, CatalogError> {
        self.check()?;
        let pattern: Option<Vec<char>> = name_pattern.map(|p| p.chars().collect());
        let mut tables: Vec<TableInfo> = self
            .tables
            .iter()
            .filter(|t| t.info.schema_name == schema)
            .filter(|t| include_views || t.info.kind == TableKind::Table)
            .filter(|t| match &pattern {
                Some(p) => like(p, &t.info.name.chars().collect::<Vec<_>>()),
                None => true,
            })
            .map(|t| t.info.clone())
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    async fn table_info(&self, table: &TableRef) -> Result<Option<TableInfo>, CatalogError> {
        self.check()?;
        Ok(self.find(table).map(|t| t.info.clone()))
    }

    async fn columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>, CatalogError> {
        self.check()?;
        Ok(self.find(table).map(|t| t.columns.clone()).unwrap_or_default())
    }

    async fn indexes(&self, table: &TableRef) -> Result<Vec<IndexInfo>, CatalogError> {
        self.check()?;
        Ok(self
            .find(table)
            .filter(|t| !t.primary_key.is_empty())
            .map(|t| {
                vec![IndexInfo {
                    name: format!("{}_pkey", t.info.name),
                    columns: t.primary_key.clone(),
                    is_unique: true,
                    is_primary: true,
                    index_type: "btree".to_string(),
                }]
            })
            .unwrap_or_default())
    }

    async fn constraints(&self, table: &TableRef) -> Result<Vec<ConstraintInfo>, CatalogError> {
        self.check()?;
        let Some(found) = self.find(table) else {
            return Ok(Vec::new());
        };
        let mut constraints = Vec::new();
        for edge in self.foreign_keys.iter().filter(|e| e.source() == table) {
            constraints.push(ConstraintInfo {
                name: edge.constraint_name().to_string(),
                kind: "FOREIGN KEY".to_string(),
                columns: edge.source_columns().to_vec(),
                definition: format!(
                    "FOREIGN KEY ({}) REFERENCES {}({})",
                    edge.source_columns().join(", "),
                    edge.target().name,
                    edge.target_columns().join(", ")
                ),
                referenced_table: Some(edge.target().name.clone()),
            });
        }
        if !found.primary_key.is_empty() {
            constraints.push(ConstraintInfo {
                name: format!("{}_pkey", found.info.name),
                kind: "PRIMARY KEY".to_string(),
                columns: found.primary_key.clone(),
                definition: format!("PRIMARY KEY ({})", found.primary_key.join(", ")),
                referenced_table: None,
            });
        }
        Ok(constraints)
    }

    async fn primary_key(&self, table: &TableRef) -> Result<Vec<String>, CatalogError> {
        self.check()?;
        Ok(self.find(table).map(|t| t.primary_key.clone()).unwrap_or_default())
    }

    async fn outgoing_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyEdge>, CatalogError> {
        self.check()?;
        Ok(self.foreign_keys.iter().filter(|e| e.source() == table).cloned().collect())
    }

    async fn incoming_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyEdge>, CatalogError> {
        self.check()?;
        Ok(self.foreign_keys.iter().filter(|e| e.target() == table).cloned().collect())
    }

    async fn foreign_keys_in(&self, schemas: &[String]) -> Result<Vec<ForeignKeyEdge>, CatalogError> {
        self.check()?;
        Ok(self
            .foreign_keys
            .iter()
            .filter(|e| schemas.contains(&e.source().schema) || schemas.contains(&e.target().schema))
            .cloned()
            .collect())
    }

    async fn schema_names(&self) -> Result<Vec<String>, CatalogError> {
        self.check()?;
        Ok(self.schemas.clone())
    }

    async fn table_names(&self, schema: &str) -> Result<Vec<String>, CatalogError> {
        self.check()?;
        Ok(self
            .tables
            .iter()
            .filter(|t| t.info.schema_name == schema)
            .map(|t| t.info.name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, text: &str) -> bool {
        like(&pattern.chars().collect::<Vec<_>>(), &text.chars().collect::<Vec<_>>())
    }

    #[test]
    fn test_like() {
        assert!(matches("order%", "order_items"));
        assert!(matches("%item%", "order_items"));
        assert!(matches("user_", "users"));
        assert!(!matches("user_", "user"));
        assert!(!matches("prod%", "orders"));
    }

    #[tokio::test]
    async fn test_shop_catalog() {
        let catalog = FakeCatalog::shop();
        let schemas = catalog.list_schemas(false).await.unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].table_count, 4);
        assert_eq!(catalog.list_schemas(true).await.unwrap().len(), 3);

        let tables = catalog.list_tables("public", false, Some("order%")).await.unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["order_items", "orders"]);

        let orders = TableRef::new("public", "orders");
        assert_eq!(catalog.outgoing_foreign_keys(&orders).await.unwrap().len(), 1);
        assert_eq!(catalog.incoming_foreign_keys(&orders).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_catalog_fails_with_connection_error() {
        let catalog = FakeCatalog::shop().unavailable();
        let err = catalog.ping().await.unwrap_err();
        assert_eq!(err.code(), pglens_core::ErrorCode::ConnectionError);
    }
}
