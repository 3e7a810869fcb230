//! Query execution pipeline.
//!
//! Every statement reaching this module has already been admitted by
//! `pglens_guard::validate`. The pipeline still checks parameter arity, then
//! bounds the statement's size and time before dispatching it:
//!
//! - rows are capped by wrapping the statement as a subquery with
//!   `LIMIT limit + 1`; seeing the extra row is what sets `has_more`,
//! - time is capped by the adapter's server-side statement timeout.

use crate::adapter::{QueryAdapter, QueryRequest, RawResult, ResultColumn};
use crate::error::ExecutionError;
use crate::explain::{ExplainFormat, ExplainOptions, PlanSummary};
use crate::sample::SampleQuery;
use pglens_core::{QueryConfig, ToolError};
use pglens_guard::AcceptedQuery;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Alias given to the wrapped statement.
const SUBQUERY_ALIAS: &str = "pglens_q";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
    /// The statement produced more than `limit` rows.
    pub has_more: bool,
    pub execution_time_ms: f64,
    pub query_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainOutput {
    /// Plan text for `text` and `yaml`, the plan document for `json`.
    pub plan: Value,
    pub format: ExplainFormat,
    pub estimated_cost: Option<f64>,
    pub estimated_rows: Option<i64>,
    /// Only with `analyze`.
    pub actual_time_ms: Option<f64>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
}

/// An execution error with how long the attempt took, when it got as far
/// as the database.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct QueryFailure {
    pub error: ExecutionError,
    pub execution_time_ms: Option<f64>,
}

impl QueryFailure {
    fn before_dispatch(error: impl Into<ExecutionError>) -> Self {
        Self {
            error: error.into(),
            execution_time_ms: None,
        }
    }
}

impl From<QueryFailure> for ToolError {
    fn from(failure: QueryFailure) -> Self {
        let tool_error = ToolError::from(failure.error);
        match failure.execution_time_ms {
            Some(ms) => tool_error.with_context("execution_time_ms", ms),
            None => tool_error,
        }
    }
}

pub struct QueryPipeline {
    adapter: Arc<dyn QueryAdapter>,
    limits: QueryConfig,
}

impl QueryPipeline {
    pub fn new(adapter: Arc<dyn QueryAdapter>, limits: QueryConfig) -> Self {
        Self { adapter, limits }
    }

    pub fn limits(&self) -> &QueryConfig {
        &self.limits
    }

    /// `execute_query` row limit: the default when absent, else clamped to
    /// `1..=max_limit`.
    pub fn effective_limit(&self, requested: Option<i64>) -> u32 {
        clamp_limit(requested, self.limits.default_limit, self.limits.max_limit)
    }

    /// `get_sample_rows` row limit.
    pub fn sample_limit(&self, requested: Option<i64>) -> u32 {
        clamp_limit(requested, self.limits.sample_default_limit, self.limits.sample_max_limit)
    }

    /// The statement timeout when absent or zero, else capped at
    /// `max_timeout_ms`.
    pub fn effective_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let ms = match requested_ms {
            Some(ms) if ms > 0 => ms.min(self.limits.max_timeout_ms),
            _ => self.limits.statement_timeout_ms,
        };
        Duration::from_millis(ms)
    }

    /// Run `query` and return at most `limit` rows.
    pub async fn execute(
        &self,
        query: &AcceptedQuery,
        params: Vec<Value>,
        limit: u32,
        timeout: Duration,
    ) -> Result<QueryOutput, QueryFailure> {
        query
            .check_parameters(params.len())
            .map_err(QueryFailure::before_dispatch)?;

        let limit = limit.max(1) as usize;
        let sql = limited_sql(&query.sql, limit + 1);
        let query_hash = query_hash(&sql);

        let (raw, execution_time_ms) = self.dispatch(&query_hash, sql, params, timeout).await?;
        let RawResult { columns, mut rows } = raw;

        let has_more = rows.len() > limit;
        rows.truncate(limit);

        tracing::info!(
            query_hash = %query_hash,
            rows = rows.len(),
            has_more,
            execution_time_ms,
            "query executed"
        );

        Ok(QueryOutput {
            columns,
            row_count: rows.len(),
            rows,
            has_more,
            execution_time_ms,
            query_hash,
        })
    }

    /// Plan `query`, running it only when `options.analyze` is set.
    pub async fn explain(
        &self,
        query: &AcceptedQuery,
        params: Vec<Value>,
        options: &ExplainOptions,
        timeout: Duration,
    ) -> Result<ExplainOutput, QueryFailure> {
        query
            .check_parameters(params.len())
            .map_err(QueryFailure::before_dispatch)?;

        let sql = options.wrap(&query.sql);
        let query_hash = query_hash(&sql);
        let (raw, _) = self.dispatch(&query_hash, sql, params, timeout).await?;

        let plan = plan_document(raw, options.format);
        let summary = PlanSummary::from_plan(&plan, options.format);
        let warnings = summary.warnings(options, self.limits.seq_scan_warning_rows);

        tracing::info!(
            query_hash = %query_hash,
            analyze = options.analyze,
            estimated_cost = ?summary.estimated_cost,
            warnings = warnings.len(),
            "query explained"
        );

        Ok(ExplainOutput {
            plan,
            format: options.format,
            estimated_cost: summary.estimated_cost,
            estimated_rows: summary.estimated_rows,
            actual_time_ms: if options.analyze { summary.actual_time_ms } else { None },
            warnings,
        })
    }

    /// Run a sample statement built from already checked parts.
    pub async fn sample(&self, sample: &SampleQuery, timeout: Duration) -> Result<SampleOutput, QueryFailure> {
        let sql = sample.to_sql();
        let query_hash = query_hash(&sql);
        let (raw, _) = self.dispatch(&query_hash, sql, Vec::new(), timeout).await?;

        Ok(SampleOutput {
            columns: raw.columns.into_iter().map(|c| c.name).collect(),
            row_count: raw.rows.len(),
            rows: raw.rows,
        })
    }

    async fn dispatch(
        &self,
        query_hash: &str,
        sql: String,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<(RawResult, f64), QueryFailure> {
        let started = Instant::now();
        let result = self.adapter.run(QueryRequest { sql, params, timeout }).await;
        let elapsed = round_ms(started.elapsed());

        result.map(|raw| (raw, elapsed)).map_err(|error| {
            tracing::warn!(
                query_hash = %query_hash,
                code = %error.code(),
                execution_time_ms = elapsed,
                "query failed"
            );
            QueryFailure {
                error,
                execution_time_ms: Some(elapsed),
            }
        })
    }
}

fn clamp_limit(requested: Option<i64>, default: u32, max: u32) -> u32 {
    let max = max.max(1);
    match requested {
        Some(n) => n.clamp(1, i64::from(max)) as u32,
        None => default.clamp(1, max),
    }
}

/// `sql` as a subquery capped at `fetch` rows.
///
/// The statement goes on its own line so a trailing `--` comment cannot
/// swallow the closing parenthesis.
pub fn limited_sql(sql: &str, fetch: usize) -> String {
    format!("SELECT * FROM (\n{}\n) AS {} LIMIT {}", sql, SUBQUERY_ALIAS, fetch)
}

/// First 16 hex digits of the SHA-256 of `sql`.
pub fn query_hash(sql: &str) -> String {
    let digest = Sha256::digest(sql.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(16);
    hex
}

fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}

/// Text and YAML plans come back one line per row; JSON as a single value.
fn plan_document(raw: RawResult, format: ExplainFormat) -> Value {
    let mut cells = raw.rows.into_iter().filter_map(|row| row.into_iter().next().map(|(_, v)| v));
    match format {
        ExplainFormat::Json => match cells.next() {
            Some(Value::String(text)) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            Some(value) => value,
            None => Value::Null,
        },
        ExplainFormat::Text | ExplainFormat::Yaml => Value::String(
            cells
                .map(|cell| match cell {
                    Value::String(line) => line,
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
    }
}
