//! Runs against a live server when `PGLENS_TEST_DATABASE_URL` is set;
//! otherwise every test returns early.

use pglens_adapter_pg::{PostgresAdapter, PostgresAdapterOptions};
use pglens_core::{ErrorCode, TableKind, TableRef};
use pglens_runtime::{CatalogAdapter, ExecutionError, QueryAdapter, QueryRequest};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

const FIXTURE: &[&str] = &[
    "create table users (id serial primary key, email text not null unique)",
    "create table orders (id serial primary key, user_id int not null references users(id) on delete cascade, total numeric(10, 2))",
    "create table order_items (order_id int, line int, sku text, primary key (order_id, line), foreign key (order_id) references orders(id))",
    "create view big_orders as select * from orders where total > 100",
    "insert into users (email) values ('a@example.com'), ('b@example.com')",
    "insert into orders (user_id, total) values (1, 10.50), (1, 250.00), (2, 99.99)",
];

struct Fixture {
    admin: sqlx::PgPool,
    schema: String,
    adapter: PostgresAdapter,
}

impl Fixture {
    async fn new() -> Option<Self> {
        let url = std::env::var("PGLENS_TEST_DATABASE_URL").ok()?;
        let schema = format!("pglens_it_{}", uuid::Uuid::new_v4().simple());
        let admin = PgPoolOptions::new()
            .max_connections(2)
            // Fixture DDL runs unqualified inside the scratch schema.
            .after_connect({
                let schema = schema.clone();
                move |conn, _| {
                    let schema = schema.clone();
                    Box::pin(async move {
                        sqlx::Executor::execute(&mut *conn, format!("set search_path to {schema}").as_str()).await?;
                        Ok(())
                    })
                }
            })
            .connect(&url)
            .await
            .expect("connect admin pool");

        sqlx::query(&format!("create schema {schema}"))
            .execute(&admin)
            .await
            .expect("create schema");
        for statement in FIXTURE {
            sqlx::query(statement).execute(&admin).await.expect("fixture statement");
        }

        let pool = PgPoolOptions::new().max_connections(2).connect(&url).await.expect("connect");
        let adapter = PostgresAdapter::from_pool(pool, PostgresAdapterOptions::default());
        Some(Self { admin, schema, adapter })
    }

    fn table(&self, name: &str) -> TableRef {
        TableRef::new(&self.schema, name)
    }

    async fn drop(self) {
        sqlx::query(&format!("drop schema {} cascade", self.schema))
            .execute(&self.admin)
            .await
            .expect("drop schema");
    }
}

fn request(sql: &str, params: Vec<serde_json::Value>) -> QueryRequest {
    QueryRequest {
        sql: sql.to_string(),
        params,
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_catalog_round_trip() {
    let Some(fx) = Fixture::new().await else { return };

    fx.adapter.ping().await.expect("ping");

    let tables = fx.adapter.list_tables(&fx.schema, true, None).await.expect("list tables");
    let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["big_orders", "order_items", "orders", "users"]);
    assert_eq!(tables[0].kind, TableKind::View);
    assert!(tables[0].size_pretty.is_none());

    let only_tables = fx.adapter.list_tables(&fx.schema, false, Some("order%")).await.expect("filtered");
    assert_eq!(only_tables.len(), 2);

    let pk = fx.adapter.primary_key(&fx.table("order_items")).await.expect("pk");
    assert_eq!(pk, vec!["order_id", "line"]);

    let columns = fx.adapter.columns(&fx.table("orders")).await.expect("columns");
    let total = columns.iter().find(|c| c.name == "total").expect("total column");
    assert_eq!(total.data_type, "numeric");
    assert_eq!(total.numeric_precision, Some(10));
    assert_eq!(total.numeric_scale, Some(2));

    let outgoing = fx.adapter.outgoing_foreign_keys(&fx.table("orders")).await.expect("outgoing");
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].target(), &fx.table("users"));
    assert_eq!(outgoing[0].on_delete().as_str(), "CASCADE");

    let edges = fx.adapter.foreign_keys_in(&[fx.schema.clone()]).await.expect("edges");
    assert_eq!(edges.len(), 2);

    assert!(fx.adapter.table_info(&fx.table("missing")).await.expect("lookup").is_none());

    fx.drop().await;
}

#[tokio::test]
async fn test_query_types_and_params() {
    let Some(fx) = Fixture::new().await else { return };

    let sql = format!(
        "select id, total, user_id from {}.orders where user_id = $1 and total > $2 order by id",
        fx.schema
    );
    let result = fx.adapter.run(request(&sql, vec![json!(1), json!("100")])).await.expect("run");
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["total"], json!("250.00"));
    assert_eq!(result.columns[1].data_type, "numeric");

    let empty = fx.adapter.run(request(&sql, vec![json!(42), json!(0)])).await.expect("empty");
    assert!(empty.rows.is_empty());
    assert_eq!(empty.columns.len(), 3);

    let err = fx.adapter.run(request(&sql, vec![json!("one"), json!(0)])).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ParameterError);

    fx.drop().await;
}

#[tokio::test]
async fn test_writes_are_rejected_and_timeouts_reported() {
    let Some(fx) = Fixture::new().await else { return };

    let insert = format!("insert into {}.users (email) values ('c@example.com')", fx.schema);
    let err = fx.adapter.run(request(&insert, vec![])).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::WriteOperationDenied);

    let slow = QueryRequest {
        timeout: Duration::from_millis(100),
        ..request("select pg_sleep(2)", vec![])
    };
    let err = fx.adapter.run(slow).await.unwrap_err();
    assert_eq!(err, ExecutionError::Timeout { timeout_ms: 100 });

    // The pool is still usable afterwards.
    let ok = fx.adapter.run(request("select 1 as one", vec![])).await.expect("after timeout");
    assert_eq!(ok.rows[0]["one"], json!(1));

    fx.drop().await;
}

#[tokio::test]
async fn test_types_without_binary_decoders_come_back_as_text() {
    let Some(fx) = Fixture::new().await else { return };

    let result = fx
        .adapter
        .run(request(
            "select '1 day 02:00'::interval i, '10.0.0.1'::inet ip, array[1.5, 2.5]::numeric[] n, \
             array['2024-01-01'::date] d, 12.34::money m, 7::int4 plain",
            vec![],
        ))
        .await
        .expect("run");

    let types: Vec<_> = result.columns.iter().map(|c| c.data_type.as_str()).collect();
    assert_eq!(types, vec!["interval", "inet", "numeric[]", "date[]", "money", "int4"]);

    let row = &result.rows[0];
    assert_eq!(row["i"], json!("1 day 02:00:00"));
    assert_eq!(row["ip"], json!("10.0.0.1"));
    assert_eq!(row["n"], json!(["1.5", "2.5"]));
    assert_eq!(row["d"], json!(["2024-01-01"]));
    assert!(row["m"].as_str().expect("money as text").contains("12.34"));
    assert_eq!(row["plain"], json!(7));

    fx.drop().await;
}

#[tokio::test]
async fn test_repeated_column_names_keep_every_value() {
    let Some(fx) = Fixture::new().await else { return };

    let result = fx
        .adapter
        .run(request("select * from (select 1 as id, 2 as id, 3.50::numeric(4, 2) as id) q", vec![]))
        .await
        .expect("run");
    let names: Vec<_> = result.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "id_2", "id_3"]);
    assert_eq!(
        serde_json::Value::Object(result.rows[0].clone()),
        json!({"id": 1, "id_2": 2, "id_3": "3.50"})
    );

    let join = format!(
        "select * from {s}.orders o join {s}.users u on u.id = o.user_id order by o.id",
        s = fx.schema
    );
    let result = fx.adapter.run(request(&join, vec![])).await.expect("join");
    assert_eq!(result.columns.len(), 5);
    assert_eq!(result.rows[0]["id"], json!(1));
    assert_eq!(result.rows[0]["id_2"], json!(1));
    assert_eq!(result.rows[0]["email"], json!("a@example.com"));

    fx.drop().await;
}

#[tokio::test]
async fn test_rejected_values_are_not_echoed() {
    let Some(fx) = Fixture::new().await else { return };

    let err = fx
        .adapter
        .run(request("select ($1::text)::int as x", vec![json!("hunter2-secret")]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidSql);
    assert!(!err.to_string().contains("hunter2-secret"), "{err}");
    assert!(err.to_string().contains("22P02"), "{err}");

    fx.drop().await;
}

#[tokio::test]
async fn test_advisory_locks_do_not_outlive_the_call() {
    let Some(fx) = Fixture::new().await else { return };
    let url = std::env::var("PGLENS_TEST_DATABASE_URL").expect("checked by fixture");

    // One connection, so the second call lands on the session of the first.
    let pool = PgPoolOptions::new().max_connections(1).connect(&url).await.expect("connect");
    let adapter = PostgresAdapter::from_pool(pool, PostgresAdapterOptions::default());

    adapter.run(request("select pg_advisory_lock(42)", vec![])).await.expect("lock");
    let held = adapter
        .run(request(
            "select count(*) as held from pg_locks where locktype = 'advisory' and pid = pg_backend_pid()",
            vec![],
        ))
        .await
        .expect("count");
    assert_eq!(held.rows[0]["held"], json!(0));

    fx.drop().await;
}
