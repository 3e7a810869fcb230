//! The eight tool handlers.
//!
//! Each handler resolves its inputs against the catalog, calls into the
//! validator, graph or pipeline, and returns a serialisable payload. Every
//! failure is a [`ToolError`]; none escapes as a protocol error.

use crate::tools::*;
use pglens_core::{
    ColumnForeignKey, ColumnInfo, ConstraintInfo, ErrorCode, ForeignKeyEdge, GraphConfig, IndexInfo,
    PglensConfig, SchemaInfo, TableInfo, TableKind, TableRef, ToolError, suggest,
};
use pglens_graph::{GraphSnapshots, JoinPath, MAX_DEPTH_LIMIT, Scope, search_paths};
use pglens_guard::{validate, validate_fragment};
use pglens_runtime::{
    CatalogAdapter, ExplainFormat, ExplainOptions, QueryAdapter, QueryPipeline, SampleOrder, SampleQuery,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct SchemaList {
    pub schemas: Vec<SchemaInfo>,
    pub total_count: usize,
}

#[derive(Debug, Serialize)]
pub struct TableList {
    pub schema_name: String,
    pub tables: Vec<TableInfo>,
    pub total_count: usize,
}

#[derive(Debug, Serialize)]
pub struct TableDescription {
    pub table_name: String,
    pub schema_name: String,
    #[serde(rename = "type")]
    pub kind: TableKind,
    pub description: Option<String>,
    pub estimated_row_count: i64,
    pub size_pretty: Option<String>,
    pub columns: Vec<ColumnInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexes: Option<Vec<IndexInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<ConstraintInfo>>,
}

#[derive(Debug, Serialize)]
pub struct SampleRows {
    pub table_name: String,
    pub schema_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub total_table_rows: i64,
    pub note: String,
}

#[derive(Debug, Serialize)]
pub struct ForeignKeys {
    pub table_name: String,
    pub schema_name: String,
    pub outgoing: Vec<ForeignKeyEdge>,
    pub incoming: Vec<ForeignKeyEdge>,
    pub outgoing_count: usize,
    pub incoming_count: usize,
}

#[derive(Debug, Serialize)]
pub struct JoinPaths {
    pub from_table: String,
    pub to_table: String,
    pub max_depth: usize,
    pub paths: Vec<JoinPath>,
    pub paths_found: usize,
    /// The search hit its path or frontier bound; `paths` is not exhaustive.
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Shared state behind every tool call.
pub struct ToolHandlers {
    catalog: Arc<dyn CatalogAdapter>,
    pipeline: QueryPipeline,
    snapshots: GraphSnapshots,
    default_schema: String,
    graph: GraphConfig,
}

impl ToolHandlers {
    pub fn new(catalog: Arc<dyn CatalogAdapter>, queries: Arc<dyn QueryAdapter>, config: &PglensConfig) -> Self {
        Self {
            catalog,
            pipeline: QueryPipeline::new(queries, config.query.clone()),
            snapshots: GraphSnapshots::new(Duration::from_secs(config.graph.snapshot_ttl_seconds)),
            default_schema: config.database.default_schema.clone(),
            graph: config.graph.clone(),
        }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogAdapter> {
        &self.catalog
    }

    /// Forget cached relationship graphs.
    pub fn refresh_relationships(&self) {
        self.snapshots.refresh();
    }

    pub async fn call(&self, request: ToolRequest) -> Result<Value, ToolError> {
        match request {
            ToolRequest::ListSchemas(args) => payload(&self.list_schemas(args).await?),
            ToolRequest::ListTables(args) => payload(&self.list_tables(args).await?),
            ToolRequest::DescribeTable(args) => payload(&self.describe_table(args).await?),
            ToolRequest::GetSampleRows(args) => payload(&self.get_sample_rows(args).await?),
            ToolRequest::GetForeignKeys(args) => payload(&self.get_foreign_keys(args).await?),
            ToolRequest::FindJoinPath(args) => payload(&self.find_join_path(args).await?),
            ToolRequest::ExecuteQuery(args) => {
                let accepted = validate(&args.sql)?;
                let limit = self.pipeline.effective_limit(args.limit);
                let timeout = self.pipeline.effective_timeout(args.timeout_ms);
                let output = self
                    .pipeline
                    .execute(&accepted, args.params.unwrap_or_default(), limit, timeout)
                    .await?;
                payload(&output)
            }
            ToolRequest::ExplainQuery(args) => {
                let accepted = validate(&args.sql)?;
                let options = ExplainOptions {
                    analyze: args.analyze,
                    format: args
                        .format
                        .as_deref()
                        .map(ExplainFormat::parse_lenient)
                        .unwrap_or_default(),
                    verbose: args.verbose,
                    buffers: args.buffers,
                };
                let timeout = self.pipeline.effective_timeout(None);
                let output = self
                    .pipeline
                    .explain(&accepted, args.params.unwrap_or_default(), &options, timeout)
                    .await?;
                payload(&output)
            }
        }
    }

    async fn list_schemas(&self, args: ListSchemasArgs) -> Result<SchemaList, ToolError> {
        let schemas = self.catalog.list_schemas(args.include_system).await?;
        Ok(SchemaList {
            total_count: schemas.len(),
            schemas,
        })
    }

    async fn list_tables(&self, args: ListTablesArgs) -> Result<TableList, ToolError> {
        let schema = self.schema_or_default(args.schema_name);
        self.require_schema(&schema).await?;

        let tables = self
            .catalog
            .list_tables(&schema, args.include_views, args.name_pattern.as_deref())
            .await?;
        Ok(TableList {
            schema_name: schema,
            total_count: tables.len(),
            tables,
        })
    }

    async fn describe_table(&self, args: DescribeTableArgs) -> Result<TableDescription, ToolError> {
        let table = TableRef::new(self.schema_or_default(args.schema_name), args.table_name);
        let info = self.require_table(&table).await?;

        let mut columns = self.catalog.columns(&table).await?;
        let primary_key = self.catalog.primary_key(&table).await?;
        let constraints = self.catalog.constraints(&table).await?;
        let outgoing = self.catalog.outgoing_foreign_keys(&table).await?;
        annotate_columns(&mut columns, &primary_key, &constraints, &outgoing);

        let indexes = if args.include_indexes {
            Some(self.catalog.indexes(&table).await?)
        } else {
            None
        };

        Ok(TableDescription {
            table_name: table.name,
            schema_name: table.schema,
            kind: info.kind,
            description: info.description,
            estimated_row_count: info.estimated_row_count,
            size_pretty: info.size_pretty,
            columns,
            indexes,
            constraints: args.include_constraints.then_some(constraints),
        })
    }

    async fn get_sample_rows(&self, args: GetSampleRowsArgs) -> Result<SampleRows, ToolError> {
        let table = TableRef::new(self.schema_or_default(args.schema_name), args.table_name);
        let info = self.require_table(&table).await?;

        let columns = match args.columns {
            Some(requested) if !requested.is_empty() => {
                let known: Vec<String> = self.catalog.columns(&table).await?.into_iter().map(|c| c.name).collect();
                for column in &requested {
                    if !known.contains(column) {
                        return Err(
                            ToolError::not_found(ErrorCode::ColumnNotFound, "column", column, suggest(column, &known))
                                .with_context("table", table.to_string()),
                        );
                    }
                }
                Some(requested)
            }
            _ => None,
        };

        let predicate = match args.where_clause.as_deref().map(str::trim) {
            Some(fragment) if !fragment.is_empty() => Some(validate_fragment(fragment)?),
            _ => None,
        };

        let order = if args.randomize {
            SampleOrder::Random
        } else {
            let key = self.catalog.primary_key(&table).await?;
            if key.is_empty() {
                SampleOrder::Unordered
            } else {
                SampleOrder::PrimaryKey(key)
            }
        };

        let sample = SampleQuery {
            table,
            columns,
            predicate,
            order,
            limit: self.pipeline.sample_limit(args.limit),
        };
        let output = self
            .pipeline
            .sample(&sample, self.pipeline.effective_timeout(None))
            .await?;

        tracing::debug!(table = %sample.table, rows = output.row_count, "sample rows fetched");
        Ok(SampleRows {
            note: sample.note(),
            table_name: sample.table.name,
            schema_name: sample.table.schema,
            columns: output.columns,
            row_count: output.row_count,
            rows: output.rows,
            total_table_rows: info.estimated_row_count.max(0),
        })
    }

    async fn get_foreign_keys(&self, args: GetForeignKeysArgs) -> Result<ForeignKeys, ToolError> {
        let table = TableRef::new(self.schema_or_default(args.schema_name), args.table_name);
        self.require_table(&table).await?;

        let outgoing = self.catalog.outgoing_foreign_keys(&table).await?;
        let incoming = self.catalog.incoming_foreign_keys(&table).await?;
        Ok(ForeignKeys {
            table_name: table.name,
            schema_name: table.schema,
            outgoing_count: outgoing.len(),
            incoming_count: incoming.len(),
            outgoing,
            incoming,
        })
    }

    async fn find_join_path(&self, args: FindJoinPathArgs) -> Result<JoinPaths, ToolError> {
        let from = TableRef::new(self.schema_or_default(args.from_schema), args.from_table);
        let to = TableRef::new(self.schema_or_default(args.to_schema), args.to_table);
        self.require_table(&from).await?;
        self.require_table(&to).await?;

        let max_depth = self.max_depth(args.max_depth);
        if from == to {
            return Ok(JoinPaths {
                from_table: from.to_string(),
                to_table: to.to_string(),
                max_depth,
                paths: Vec::new(),
                paths_found: 0,
                truncated: false,
                note: Some("from_table and to_table are the same table; no join is needed".to_string()),
            });
        }

        let scope: Scope = [from.schema.clone(), to.schema.clone()].into_iter().collect();
        let schemas: Vec<String> = scope.iter().cloned().collect();
        let graph = self
            .snapshots
            .get_or_load(&scope, || self.catalog.foreign_keys_in(&schemas))
            .await?;

        let search = search_paths(&graph, &from, &to, max_depth);
        let paths = search.paths;
        tracing::debug!(
            from = %from,
            to = %to,
            max_depth,
            paths = paths.len(),
            truncated = search.truncated,
            "join paths searched"
        );

        let note = match (paths.len(), search.truncated) {
            (0, true) => Some(format!(
                "No path found within {max_depth} joins before the search limit was reached; \
                 the schema is too densely connected to search exhaustively"
            )),
            (0, false) => Some(format!(
                "No path found between tables via foreign keys within {max_depth} joins"
            )),
            (n, true) => Some(format!(
                "Search limit reached; showing the first {n} shortest paths, more exist"
            )),
            (1, false) => None,
            (n, false) => Some(format!("Multiple paths found ({n}), showing all shortest")),
        };
        Ok(JoinPaths {
            from_table: from.to_string(),
            to_table: to.to_string(),
            max_depth,
            paths_found: paths.len(),
            truncated: search.truncated,
            paths,
            note,
        })
    }

    fn schema_or_default(&self, schema: Option<String>) -> String {
        schema
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.default_schema.clone())
    }

    /// Requested depth clamped to `1..=max_depth_limit`, or the configured
    /// default.
    fn max_depth(&self, requested: Option<i64>) -> usize {
        let limit = self.graph.max_depth_limit.clamp(1, MAX_DEPTH_LIMIT);
        match requested {
            Some(depth) => depth.clamp(1, limit as i64) as usize,
            None => self.graph.default_max_depth.clamp(1, limit),
        }
    }

    async fn require_schema(&self, schema: &str) -> Result<(), ToolError> {
        let names = self.catalog.schema_names().await?;
        if names.iter().any(|n| n == schema) {
            return Ok(());
        }
        Err(ToolError::not_found(
            ErrorCode::SchemaNotFound,
            "schema",
            schema,
            suggest(schema, &names),
        ))
    }

    async fn require_table(&self, table: &TableRef) -> Result<TableInfo, ToolError> {
        self.require_schema(&table.schema).await?;
        if let Some(info) = self.catalog.table_info(table).await? {
            return Ok(info);
        }
        let names = self.catalog.table_names(&table.schema).await?;
        Err(
            ToolError::not_found(ErrorCode::TableNotFound, "table", &table.name, suggest(&table.name, &names))
                .with_context("schema", table.schema.as_str()),
        )
    }
}

/// Fill in key flags and single-column foreign key targets.
fn annotate_columns(
    columns: &mut [ColumnInfo],
    primary_key: &[String],
    constraints: &[ConstraintInfo],
    outgoing: &[ForeignKeyEdge],
) {
    for column in columns.iter_mut() {
        column.is_primary_key = primary_key.contains(&column.name);
        column.is_unique = constraints.iter().any(|c| {
            (c.kind == "UNIQUE" || c.kind == "PRIMARY KEY") && c.columns.len() == 1 && c.columns[0] == column.name
        });
        column.foreign_key = outgoing.iter().find_map(|edge| {
            edge.column_pairs()
                .find(|(from, _)| *from == column.name)
                .map(|(_, to)| ColumnForeignKey {
                    constraint_name: edge.constraint_name().to_string(),
                    to_schema: edge.target().schema.clone(),
                    to_table: edge.target().name.clone(),
                    to_column: to.to_string(),
                })
        });
    }
}

fn payload<T: Serialize>(output: &T) -> Result<Value, ToolError> {
    serde_json::to_value(output)
        .map_err(|e| ToolError::new(ErrorCode::InternalError, format!("failed to encode result: {e}")))
}
