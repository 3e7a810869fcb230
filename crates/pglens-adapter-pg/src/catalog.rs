//! Catalog metadata read from `pg_catalog` and `information_schema`.

use crate::{PostgresAdapter, begin_read_only, map_sqlx_error, millis};
use async_trait::async_trait;
use pglens_core::{
    ColumnInfo, ConstraintInfo, ForeignKeyEdge, IndexInfo, ReferentialAction, SchemaInfo, TableInfo, TableKind,
    TableRef,
};
use pglens_runtime::{CatalogAdapter, CatalogError, ExecutionError};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Decode, Postgres, Row, Type};

const LIST_SCHEMAS: &str = r#"
select n.nspname::text as name,
       pg_catalog.pg_get_userbyid(n.nspowner)::text as owner,
       pg_catalog.obj_description(n.oid, 'pg_namespace') as description,
       (select count(*) from pg_catalog.pg_tables t where t.schemaname = n.nspname) as table_count
from pg_catalog.pg_namespace n
where $1 or (n.nspname !~ '^pg_' and n.nspname <> 'information_schema')
order by n.nspname
"#;

macro_rules! relation_query {
    ($filter:literal) => {
        concat!(
            r#"
select c.relname::text as name,
       n.nspname::text as schema_name,
       case when c.relkind in ('v', 'm') then 'view' else 'table' end as kind,
       pg_catalog.obj_description(c.oid, 'pg_class') as description,
       greatest(c.reltuples::bigint, 0) as estimated_row_count,
       case when c.relkind in ('r', 'p') then pg_catalog.pg_total_relation_size(c.oid) end as size_bytes,
       case when c.relkind in ('r', 'p')
            then pg_catalog.pg_size_pretty(pg_catalog.pg_total_relation_size(c.oid)) end as size_pretty,
       exists (select 1 from pg_catalog.pg_index i where i.indrelid = c.oid and i.indisprimary) as has_primary_key,
       (select count(*) from pg_catalog.pg_attribute a
         where a.attrelid = c.oid and a.attnum > 0 and not a.attisdropped) as column_count
from pg_catalog.pg_class c
join pg_catalog.pg_namespace n on n.oid = c.relnamespace
"#,
            $filter,
            "\norder by c.relname\n"
        )
    };
}

const LIST_RELATIONS: &str = relation_query!(
    r#"where n.nspname = $1
  and (c.relkind in ('r', 'p') or ($2 and c.relkind in ('v', 'm')))
  and ($3::text is null or c.relname like $3)"#
);

const TABLE_INFO: &str = relation_query!(
    r#"where n.nspname = $1 and c.relname = $2 and c.relkind in ('r', 'p', 'v', 'm')"#
);

const COLUMNS: &str = r#"
select c.column_name::text as name,
       c.udt_name::text as data_type,
       c.is_nullable::text = 'YES' as is_nullable,
       c.column_default::text as default_value,
       pg_catalog.col_description(
           format('%I.%I', c.table_schema, c.table_name)::regclass, c.ordinal_position::int) as description,
       c.character_maximum_length::int as character_maximum_length,
       c.numeric_precision::int as numeric_precision,
       c.numeric_scale::int as numeric_scale
from information_schema.columns c
where c.table_schema::text = $1 and c.table_name::text = $2
order by c.ordinal_position
"#;

const INDEXES: &str = r#"
select i.relname::text as name,
       array_agg(a.attname::text order by array_position(ix.indkey::int2[], a.attnum)) as columns,
       ix.indisunique as is_unique,
       ix.indisprimary as is_primary,
       am.amname::text as index_type
from pg_catalog.pg_class t
join pg_catalog.pg_namespace n on n.oid = t.relnamespace
join pg_catalog.pg_index ix on ix.indrelid = t.oid
join pg_catalog.pg_class i on i.oid = ix.indexrelid
join pg_catalog.pg_am am on am.oid = i.relam
join pg_catalog.pg_attribute a on a.attrelid = t.oid and a.attnum = any(ix.indkey)
where n.nspname = $1 and t.relname = $2
group by i.relname, ix.indisunique, ix.indisprimary, am.amname
order by ix.indisprimary desc, i.relname
"#;

const CONSTRAINTS: &str = r#"
select con.conname::text as name,
       case con.contype
            when 'p' then 'PRIMARY KEY'
            when 'f' then 'FOREIGN KEY'
            when 'u' then 'UNIQUE'
            when 'c' then 'CHECK'
            when 'x' then 'EXCLUDE'
            else con.contype::text
       end as kind,
       array(select a.attname::text
               from unnest(con.conkey) with ordinality as k(attnum, ord)
               join pg_catalog.pg_attribute a on a.attrelid = con.conrelid and a.attnum = k.attnum
              order by k.ord) as columns,
       pg_catalog.pg_get_constraintdef(con.oid) as definition,
       ft.relname::text as referenced_table
from pg_catalog.pg_constraint con
join pg_catalog.pg_class c on c.oid = con.conrelid
join pg_catalog.pg_namespace n on n.oid = c.relnamespace
left join pg_catalog.pg_class ft on ft.oid = con.confrelid
where n.nspname = $1 and c.relname = $2
order by kind, con.conname
"#;

const PRIMARY_KEY: &str = r#"
select a.attname::text as column_name
from pg_catalog.pg_index i
join pg_catalog.pg_class c on c.oid = i.indrelid
join pg_catalog.pg_namespace n on n.oid = c.relnamespace
join pg_catalog.pg_attribute a on a.attrelid = i.indrelid and a.attnum = any(i.indkey)
where i.indisprimary and n.nspname = $1 and c.relname = $2
order by array_position(i.indkey::int2[], a.attnum)
"#;

/// Column lists come from `conkey`/`confkey` in key order, so composite
/// keys pair up positionally.
macro_rules! foreign_key_query {
    ($filter:literal) => {
        concat!(
            r#"
select con.conname::text as constraint_name,
       sn.nspname::text as from_schema,
       sc.relname::text as from_table,
       array(select a.attname::text
               from unnest(con.conkey) with ordinality as k(attnum, ord)
               join pg_catalog.pg_attribute a on a.attrelid = con.conrelid and a.attnum = k.attnum
              order by k.ord) as from_columns,
       tn.nspname::text as to_schema,
       tc.relname::text as to_table,
       array(select a.attname::text
               from unnest(con.confkey) with ordinality as k(attnum, ord)
               join pg_catalog.pg_attribute a on a.attrelid = con.confrelid and a.attnum = k.attnum
              order by k.ord) as to_columns,
       con.confupdtype::text as on_update,
       con.confdeltype::text as on_delete
from pg_catalog.pg_constraint con
join pg_catalog.pg_class sc on sc.oid = con.conrelid
join pg_catalog.pg_namespace sn on sn.oid = sc.relnamespace
join pg_catalog.pg_class tc on tc.oid = con.confrelid
join pg_catalog.pg_namespace tn on tn.oid = tc.relnamespace
where con.contype = 'f' and "#,
            $filter,
            "\norder by sn.nspname, sc.relname, con.conname\n"
        )
    };
}

const OUTGOING_FOREIGN_KEYS: &str = foreign_key_query!("sn.nspname = $1 and sc.relname = $2");
const INCOMING_FOREIGN_KEYS: &str = foreign_key_query!("tn.nspname = $1 and tc.relname = $2");
const FOREIGN_KEYS_IN: &str =
    foreign_key_query!("(sn.nspname::text = any($1) or tn.nspname::text = any($1))");

const SCHEMA_NAMES: &str = "select nspname::text as name from pg_catalog.pg_namespace order by nspname";

const TABLE_NAMES: &str = r#"
select c.relname::text as name
from pg_catalog.pg_class c
join pg_catalog.pg_namespace n on n.oid = c.relnamespace
where n.nspname = $1 and c.relkind in ('r', 'p', 'v', 'm')
order by c.relname
"#;

impl PostgresAdapter {
    /// Run one catalog query in its own read-only transaction.
    async fn fetch_catalog<'q>(&self, query: Query<'q, Postgres, PgArguments>) -> Result<Vec<PgRow>, CatalogError> {
        let timeout_ms = millis(self.options.catalog_timeout);
        let map = |e| CatalogError::Query(map_sqlx_error(e, timeout_ms));

        let mut conn = self.pool.acquire().await.map_err(map)?;
        let mut tx = begin_read_only(&mut conn, timeout_ms).await.map_err(map)?;
        let rows = query.fetch_all(&mut *tx).await.map_err(map)?;
        tx.rollback().await.map_err(map)?;
        Ok(rows)
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, CatalogError>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(column).map_err(|e| {
        CatalogError::Query(ExecutionError::Database {
            code: pglens_core::ErrorCode::InternalError,
            sqlstate: None,
            message: format!("catalog column {column}: {e}"),
        })
    })
}

fn table_from_row(row: &PgRow) -> Result<TableInfo, CatalogError> {
    let kind: String = get(row, "kind")?;
    Ok(TableInfo {
        name: get(row, "name")?,
        schema_name: get(row, "schema_name")?,
        kind: if kind == "view" { TableKind::View } else { TableKind::Table },
        description: get(row, "description")?,
        estimated_row_count: get(row, "estimated_row_count")?,
        size_bytes: get(row, "size_bytes")?,
        size_pretty: get(row, "size_pretty")?,
        has_primary_key: get(row, "has_primary_key")?,
        column_count: get(row, "column_count")?,
    })
}

fn foreign_key_from_row(row: &PgRow) -> Result<ForeignKeyEdge, CatalogError> {
    let constraint_name: String = get(row, "constraint_name")?;
    let invalid = |source| CatalogError::InvalidRow {
        object: format!("foreign key {constraint_name}"),
        source,
    };

    let on_update: String = get(row, "on_update")?;
    let on_delete: String = get(row, "on_delete")?;
    let on_update: ReferentialAction = on_update.parse().map_err(invalid)?;
    let on_delete: ReferentialAction = on_delete.parse().map_err(invalid)?;

    let edge = ForeignKeyEdge::new(
        constraint_name.clone(),
        TableRef::new(get::<String>(row, "from_schema")?, get::<String>(row, "from_table")?),
        get(row, "from_columns")?,
        TableRef::new(get::<String>(row, "to_schema")?, get::<String>(row, "to_table")?),
        get(row, "to_columns")?,
    )
    .map_err(invalid)?;
    Ok(edge.with_actions(on_update, on_delete))
}

#[async_trait]
impl CatalogAdapter for PostgresAdapter {
    async fn ping(&self) -> Result<(), CatalogError> {
        self.fetch_catalog(sqlx::query("select 1")).await.map(|_| ())
    }

    async fn list_schemas(&self, include_system: bool) -> Result<Vec<SchemaInfo>, CatalogError> {
        let rows = self.fetch_catalog(sqlx::query(LIST_SCHEMAS).bind(include_system)).await?;
        rows.iter()
            .map(|row| {
                Ok(SchemaInfo {
                    name: get(row, "name")?,
                    owner: get(row, "owner")?,
                    description: get(row, "description")?,
                    table_count: get(row, "table_count")?,
                })
            })
            .collect()
    }

    async fn list_tables(
        &self,
        schema: &str,
        include_views: bool,
        name_pattern: Option<&str>,
    ) -> Result<Vec<TableInfo>, CatalogError> {
        let query = sqlx::query(LIST_RELATIONS)
            .bind(schema)
            .bind(include_views)
            .bind(name_pattern);
        let rows = self.fetch_catalog(query).await?;
        rows.iter().map(table_from_row).collect()
    }

    async fn table_info(&self, table: &TableRef) -> Result<Option<TableInfo>, CatalogError> {
        let query = sqlx::query(TABLE_INFO).bind(&table.schema).bind(&table.name);
        let rows = self.fetch_catalog(query).await?;
        rows.first().map(table_from_row).transpose()
    }

    async fn columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>, CatalogError> {
        let query = sqlx::query(COLUMNS).bind(&table.schema).bind(&table.name);
        let rows = self.fetch_catalog(query).await?;
        rows.iter()
            .map(|row| {
                let mut column = ColumnInfo::new(get::<String>(row, "name")?, get::<String>(row, "data_type")?);
                column.is_nullable = get(row, "is_nullable")?;
                column.default_value = get(row, "default_value")?;
                column.description = get(row, "description")?;
                column.character_maximum_length = get(row, "character_maximum_length")?;
                column.numeric_precision = get(row, "numeric_precision")?;
                column.numeric_scale = get(row, "numeric_scale")?;
                Ok(column)
            })
            .collect()
    }

    async fn indexes(&self, table: &TableRef) -> Result<Vec<IndexInfo>, CatalogError> {
        let query = sqlx::query(INDEXES).bind(&table.schema).bind(&table.name);
        let rows = self.fetch_catalog(query).await?;
        rows.iter()
            .map(|row| {
                Ok(IndexInfo {
                    name: get(row, "name")?,
                    columns: get(row, "columns")?,
                    is_unique: get(row, "is_unique")?,
                    is_primary: get(row, "is_primary")?,
                    index_type: get(row, "index_type")?,
                })
            })
            .collect()
    }

    async fn constraints(&self, table: &TableRef) -> Result<Vec<ConstraintInfo>, CatalogError> {
        let query = sqlx::query(CONSTRAINTS).bind(&table.schema).bind(&table.name);
        let rows = self.fetch_catalog(query).await?;
        rows.iter()
            .map(|row| {
                Ok(ConstraintInfo {
                    name: get(row, "name")?,
                    kind: get(row, "kind")?,
                    columns: get(row, "columns")?,
                    definition: get(row, "definition")?,
                    referenced_table: get(row, "referenced_table")?,
                })
            })
            .collect()
    }

    async fn primary_key(&self, table: &TableRef) -> Result<Vec<String>, CatalogError> {
        let query = sqlx::query(PRIMARY_KEY).bind(&table.schema).bind(&table.name);
        let rows = self.fetch_catalog(query).await?;
        rows.iter().map(|row| get(row, "column_name")).collect()
    }

    async fn outgoing_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyEdge>, CatalogError> {
        let query = sqlx::query(OUTGOING_FOREIGN_KEYS).bind(&table.schema).bind(&table.name);
        let rows = self.fetch_catalog(query).await?;
        rows.iter().map(foreign_key_from_row).collect()
    }

    async fn incoming_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyEdge>, CatalogError> {
        let query = sqlx::query(INCOMING_FOREIGN_KEYS).bind(&table.schema).bind(&table.name);
        let rows = self.fetch_catalog(query).await?;
        rows.iter().map(foreign_key_from_row).collect()
    }

    async fn foreign_keys_in(&self, schemas: &[String]) -> Result<Vec<ForeignKeyEdge>, CatalogError> {
        let rows = self.fetch_catalog(sqlx::query(FOREIGN_KEYS_IN).bind(schemas)).await?;
        let edges: Vec<ForeignKeyEdge> = rows.iter().map(foreign_key_from_row).collect::<Result<_, _>>()?;
        tracing::debug!(schemas = ?schemas, edges = edges.len(), "foreign keys loaded");
        Ok(edges)
    }

    async fn schema_names(&self) -> Result<Vec<String>, CatalogError> {
        let rows = self.fetch_catalog(sqlx::query(SCHEMA_NAMES)).await?;
        rows.iter().map(|row| get(row, "name")).collect()
    }

    async fn table_names(&self, schema: &str) -> Result<Vec<String>, CatalogError> {
        let rows = self.fetch_catalog(sqlx::query(TABLE_NAMES).bind(schema)).await?;
        rows.iter().map(|row| get(row, "name")).collect()
    }
}
