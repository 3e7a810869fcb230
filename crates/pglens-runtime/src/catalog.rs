//! Catalog metadata source.

use crate::error::CatalogError;
use async_trait::async_trait;
use pglens_core::{ColumnInfo, ConstraintInfo, ForeignKeyEdge, IndexInfo, SchemaInfo, TableInfo, TableRef};

/// Read access to schema metadata.
///
/// Implementations return rows as fetched; they never cache across calls.
/// Lookups on a table that does not exist return empty results (or `None`),
/// not errors, so callers can decide how to report the miss.
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    /// Cheap connectivity probe, run once before serving.
    async fn ping(&self) -> Result<(), CatalogError>;

    /// Schemas ordered by name. System schemas (`pg_*`,
    /// `information_schema`) only when `include_system` is set.
    async fn list_schemas(&self, include_system: bool) -> Result<Vec<SchemaInfo>, CatalogError>;

    /// Tables, and views when `include_views` is set, ordered by name.
    /// `name_pattern` is a SQL `LIKE` pattern.
    async fn list_tables(
        &self,
        schema: &str,
        include_views: bool,
        name_pattern: Option<&str>,
    ) -> Result<Vec<TableInfo>, CatalogError>;

    async fn table_info(&self, table: &TableRef) -> Result<Option<TableInfo>, CatalogError>;

    /// Columns in ordinal order. Key and uniqueness flags are filled in by
    /// the caller.
    async fn columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>, CatalogError>;

    async fn indexes(&self, table: &TableRef) -> Result<Vec<IndexInfo>, CatalogError>;

    async fn constraints(&self, table: &TableRef) -> Result<Vec<ConstraintInfo>, CatalogError>;

    /// Primary key columns in key order; empty when there is none.
    async fn primary_key(&self, table: &TableRef) -> Result<Vec<String>, CatalogError>;

    /// Foreign keys declared on `table`.
    async fn outgoing_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyEdge>, CatalogError>;

    /// Foreign keys on any table that reference `table`.
    async fn incoming_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyEdge>, CatalogError>;

    /// Every foreign key whose source or target lies in one of `schemas`.
    async fn foreign_keys_in(&self, schemas: &[String]) -> Result<Vec<ForeignKeyEdge>, CatalogError>;

    /// All schema names, system schemas included. Used for suggestions.
    async fn schema_names(&self) -> Result<Vec<String>, CatalogError>;

    /// Table and view names in `schema`. Used for suggestions.
    async fn table_names(&self, schema: &str) -> Result<Vec<String>, CatalogError>;
}
