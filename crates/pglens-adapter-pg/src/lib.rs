//! Postgres implementation of the pglens adapters.
//!
//! Every statement, catalog lookups included, runs inside a transaction that
//! is marked `READ ONLY`, carries a `SET LOCAL statement_timeout` and is
//! rolled back when done. Session-level advisory locks survive a rollback,
//! so they are released before the connection goes back to the pool. A
//! statement that outlives its deadline on the client side takes its
//! connection down with it rather than returning it to the pool mid-query.

use anyhow::Context;
use async_trait::async_trait;
use pglens_core::{DatabaseConfig, QueryConfig};
use pglens_runtime::{ExecutionError, QueryAdapter, QueryRequest, RawResult, ResultColumn, disambiguate_columns};
use sqlx::postgres::{PgConnection, PgPoolOptions, PgTransaction};
use sqlx::{Column, Connection, Either, Executor, PgPool, Statement};
use std::time::{Duration, Instant};

pub mod catalog;
pub mod decode;
pub mod params;

pub use params::{PgParam, bind_params};

#[derive(Debug, Clone, Copy)]
pub struct PostgresAdapterOptions {
    /// Extra client-side allowance past the server's statement timeout
    /// before the connection is abandoned.
    pub timeout_grace: Duration,
    /// Statement timeout for catalog queries.
    pub catalog_timeout: Duration,
}

impl Default for PostgresAdapterOptions {
    fn default() -> Self {
        Self {
            timeout_grace: Duration::from_secs(2),
            catalog_timeout: Duration::from_secs(30),
        }
    }
}

impl PostgresAdapterOptions {
    pub fn from_query_config(config: &QueryConfig) -> Self {
        Self {
            timeout_grace: Duration::from_millis(config.timeout_grace_ms),
            catalog_timeout: Duration::from_millis(config.statement_timeout_ms),
        }
    }
}

#[derive(Clone)]
pub struct PostgresAdapter {
    pool: PgPool,
    options: PostgresAdapterOptions,
}

impl PostgresAdapter {
    /// Open a pool sized from `config.pool`. Fails if no connection can be
    /// established.
    pub async fn connect(config: &DatabaseConfig, options: PostgresAdapterOptions) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(config.pool.min_connections)
            .max_connections(config.pool.max_connections)
            .acquire_timeout(Duration::from_secs(u64::from(config.pool.acquire_timeout_seconds)))
            .idle_timeout(Duration::from_secs(u64::from(config.pool.idle_timeout_seconds)))
            .connect(&config.connection_string())
            .await
            .with_context(|| format!("failed to connect to {}", config.display_target()))?;

        tracing::info!(
            database = %config.display_target(),
            max_connections = config.pool.max_connections,
            "database pool ready"
        );
        Ok(Self::from_pool(pool, options))
    }

    pub fn from_pool(pool: PgPool, options: PostgresAdapterOptions) -> Self {
        Self { pool, options }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn options(&self) -> PostgresAdapterOptions {
        self.options
    }
}

#[async_trait]
impl QueryAdapter for PostgresAdapter {
    async fn run(&self, request: QueryRequest) -> Result<RawResult, ExecutionError> {
        let timeout_ms = millis(request.timeout);
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error(e, timeout_ms))?;

        let deadline = request.timeout + self.options.timeout_grace;
        let outcome = tokio::time::timeout(deadline, async {
            let result = run_read_only(&mut conn, &request.sql, &request.params, timeout_ms).await;
            let reset = reset_session(&mut conn).await;
            (result, reset)
        })
        .await;

        let result = match outcome {
            Ok((result, Ok(()))) => result,
            Ok((result, Err(err))) => {
                tracing::warn!(error = %err, "session reset failed; closing its connection");
                if let Err(err) = conn.detach().close_hard().await {
                    tracing::debug!(error = %err, "error while closing unreset connection");
                }
                result
            }
            Err(_) => {
                tracing::warn!(timeout_ms, "statement outlived its deadline; closing its connection");
                // The connection may still be mid-protocol; it must not be reused.
                if let Err(err) = conn.detach().close_hard().await {
                    tracing::debug!(error = %err, "error while closing abandoned connection");
                }
                Err(ExecutionError::Timeout { timeout_ms })
            }
        };

        if request.params.is_empty() {
            result
        } else {
            result.map_err(ExecutionError::without_values)
        }
    }
}

/// Release what a rolled-back statement can leave on the session.
async fn reset_session(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("select pg_advisory_unlock_all()").execute(&mut *conn).await?;
    Ok(())
}

/// `sql` re-selected with each column the decoder cannot read cast to text
/// by the server. Columns are addressed by position, so repeated names are
/// fine. `None` when every column decodes as is.
fn with_text_casts(sql: &str, column_types: &[String]) -> Option<String> {
    if column_types.iter().all(|t| decode::decodes_natively(t)) {
        return None;
    }
    let aliases: Vec<String> = (1..=column_types.len()).map(|i| format!("c{i}")).collect();
    let select: Vec<String> = column_types
        .iter()
        .zip(&aliases)
        .map(|(pg_type, alias)| {
            if decode::decodes_natively(pg_type) {
                alias.clone()
            } else {
                format!("{alias}::{}", decode::text_cast(pg_type))
            }
        })
        .collect();
    Some(format!(
        "SELECT {} FROM (\n{}\n) AS pglens_cells ({})",
        select.join(", "),
        sql,
        aliases.join(", ")
    ))
}

/// Describe, bind, fetch and roll back one statement on `conn`.
async fn run_read_only(
    conn: &mut PgConnection,
    sql: &str,
    params: &[serde_json::Value],
    timeout_ms: u64,
) -> Result<RawResult, ExecutionError> {
    let map = |e| map_sqlx_error(e, timeout_ms);

    let mut tx = begin_read_only(conn, timeout_ms).await.map_err(map)?;

    let statement = (&mut *tx).prepare(sql).await.map_err(map)?;
    let placeholder_types: Vec<String> = match statement.parameters() {
        Some(Either::Left(types)) => types.iter().map(decode::type_name).collect(),
        Some(Either::Right(count)) => vec!["unknown".to_string(); count],
        None => Vec::new(),
    };
    let mut columns: Vec<ResultColumn> = statement
        .columns()
        .iter()
        .map(|column| ResultColumn::new(column.name(), decode::type_name(column.type_info())))
        .collect();
    let fetch_sql = with_text_casts(sql, &columns.iter().map(|c| c.data_type.clone()).collect::<Vec<_>>());
    disambiguate_columns(&mut columns);

    let args = bind_params(params, &placeholder_types)?;

    let started = Instant::now();
    let rows = sqlx::query_with(fetch_sql.as_deref().unwrap_or(sql), args)
        .fetch_all(&mut *tx)
        .await
        .map_err(map)?;
    tracing::debug!(
        rows = rows.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "statement fetched"
    );

    tx.rollback().await.map_err(map)?;

    let rows = rows.iter().map(|row| decode::row_to_json(row, &columns)).collect();
    Ok(RawResult { columns, rows })
}

/// Open a transaction that cannot write and is cancelled by the server
/// after `timeout_ms`. Dropping it without commit rolls it back.
pub(crate) async fn begin_read_only(
    conn: &mut PgConnection,
    timeout_ms: u64,
) -> Result<PgTransaction<'_>, sqlx::Error> {
    let mut tx = conn.begin().await?;
    sqlx::query("set transaction read only").execute(&mut *tx).await?;
    // SET does not take bind parameters; the value is an integer.
    sqlx::query(&format!("set local statement_timeout = {timeout_ms}"))
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Classify a driver error. Server errors are classified by SQLSTATE;
/// a server-side statement timeout becomes [`ExecutionError::Timeout`].
pub fn map_sqlx_error(err: sqlx::Error, timeout_ms: u64) -> ExecutionError {
    match err {
        sqlx::Error::Database(db) => {
            let sqlstate = db.code();
            match ExecutionError::from_sqlstate(sqlstate.as_deref(), db.message()) {
                ExecutionError::Database {
                    code: pglens_core::ErrorCode::QueryTimeout,
                    ..
                } => ExecutionError::Timeout { timeout_ms },
                other => other,
            }
        }
        sqlx::Error::PoolTimedOut => {
            ExecutionError::Connection("timed out waiting for a pooled connection".to_string())
        }
        sqlx::Error::PoolClosed => ExecutionError::Connection("connection pool is closed".to_string()),
        sqlx::Error::Io(e) => ExecutionError::Connection(e.to_string()),
        sqlx::Error::Tls(e) => ExecutionError::Connection(e.to_string()),
        sqlx::Error::Protocol(message) => ExecutionError::Connection(message),
        other => ExecutionError::Database {
            code: pglens_core::ErrorCode::InternalError,
            sqlstate: None,
            message: other.to_string(),
        },
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pglens_core::ErrorCode;

    #[test]
    fn test_pool_errors_are_connection_errors() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut, 1000);
        assert_eq!(err.code(), ErrorCode::ConnectionError);

        let err = map_sqlx_error(sqlx::Error::PoolClosed, 1000);
        assert_eq!(err.code(), ErrorCode::ConnectionError);
    }

    #[test]
    fn test_io_error_is_connection_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = map_sqlx_error(sqlx::Error::Io(io), 1000);
        assert_eq!(err, ExecutionError::Connection("reset by peer".to_string()));
    }

    #[test]
    fn test_decode_failures_are_internal() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound, 1000);
        assert_eq!(err.code(), ErrorCode::InternalError);
    }

    #[test]
    fn test_text_casts_address_columns_by_position() {
        let types = ["int4", "numeric", "int4", "date[]"].map(String::from);
        let sql = with_text_casts("SELECT o.*, u.id FROM orders o JOIN users u ON u.id = o.user_id", &types).unwrap();
        assert_eq!(
            sql,
            "SELECT c1, c2::text, c3, c4::text[] FROM (\n\
             SELECT o.*, u.id FROM orders o JOIN users u ON u.id = o.user_id\n\
             ) AS pglens_cells (c1, c2, c3, c4)"
        );
    }

    #[test]
    fn test_decodable_statement_is_sent_unchanged() {
        let types = ["int4", "text", "timestamptz"].map(String::from);
        assert_eq!(with_text_casts("SELECT 1", &types), None);
        assert_eq!(with_text_casts("SELECT", &[]), None);
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_options() {
        let options = PostgresAdapterOptions::default();
        assert_eq!(options.timeout_grace, Duration::from_secs(2));

        let config = QueryConfig {
            timeout_grace_ms: 500,
            statement_timeout_ms: 10_000,
            ..QueryConfig::default()
        };
        let options = PostgresAdapterOptions::from_query_config(&config);
        assert_eq!(options.timeout_grace, Duration::from_millis(500));
        assert_eq!(options.catalog_timeout, Duration::from_secs(10));
    }
}
