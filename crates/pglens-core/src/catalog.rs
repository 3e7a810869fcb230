//! Catalog metadata rows.
//!
//! These are the shapes catalog adapters return and the schema tools emit.
//! They are snapshots fetched per request and never cached past it.

use serde::{Deserialize, Serialize};

/// A schema (namespace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    pub owner: String,
    pub description: Option<String>,
    pub table_count: i64,
}

/// Relation kind reported by `list_tables` / `describe_table`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Table,
    View,
}

/// A table or view in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub schema_name: String,
    #[serde(rename = "type")]
    pub kind: TableKind,
    pub description: Option<String>,
    /// Planner estimate from `pg_class.reltuples`, clamped at zero.
    pub estimated_row_count: i64,
    pub size_bytes: Option<i64>,
    pub size_pretty: Option<String>,
    pub has_primary_key: bool,
    pub column_count: i64,
}

/// Target of a single-column foreign key, attached to the referencing column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnForeignKey {
    pub constraint_name: String,
    pub to_schema: String,
    pub to_table: String,
    pub to_column: String,
}

/// A column, owned by the table it was fetched for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    pub description: Option<String>,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub foreign_key: Option<ColumnForeignKey>,
    pub character_maximum_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
}

impl ColumnInfo {
    /// Bare column with only name and type set.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default_value: None,
            description: None,
            is_primary_key: false,
            is_unique: false,
            foreign_key: None,
            character_maximum_length: None,
            numeric_precision: None,
            numeric_scale: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    pub index_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintInfo {
    pub name: String,
    /// `PRIMARY KEY`, `FOREIGN KEY`, `UNIQUE`, `CHECK` or `EXCLUDE`.
    #[serde(rename = "type")]
    pub kind: String,
    pub columns: Vec<String>,
    pub definition: String,
    pub referenced_table: Option<String>,
}
