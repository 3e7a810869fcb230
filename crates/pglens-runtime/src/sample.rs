//! Sample row statements.

use pglens_core::TableRef;
use pglens_core::ident::{qualified, quote_ident};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOrder {
    /// `ORDER BY random()`; repeated calls differ.
    Random,
    /// Order by these key columns for a stable sample.
    PrimaryKey(Vec<String>),
    /// No usable key: whatever order the scan yields.
    Unordered,
}

/// A `SELECT` over one table built from checked parts.
///
/// `columns` must already be known to exist and `predicate` must already
/// have passed `pglens_guard::validate_fragment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleQuery {
    pub table: TableRef,
    pub columns: Option<Vec<String>>,
    pub predicate: Option<String>,
    pub order: SampleOrder,
    pub limit: u32,
}

impl SampleQuery {
    pub fn to_sql(&self) -> String {
        let projection = match &self.columns {
            Some(columns) if !columns.is_empty() => columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            _ => "*".to_string(),
        };

        let mut sql = format!("SELECT {} FROM {}", projection, qualified(&self.table));
        if let Some(predicate) = &self.predicate {
            sql.push_str(&format!(" WHERE ({})", predicate));
        }
        match &self.order {
            SampleOrder::Random => sql.push_str(" ORDER BY random()"),
            SampleOrder::PrimaryKey(keys) if !keys.is_empty() => {
                let keys = keys.iter().map(|k| quote_ident(k)).collect::<Vec<_>>().join(", ");
                sql.push_str(&format!(" ORDER BY {}", keys));
            }
            _ => {}
        }
        sql.push_str(&format!(" LIMIT {}", self.limit));
        sql
    }

    /// How the rows were chosen, for the caller.
    pub fn note(&self) -> String {
        match (&self.order, &self.predicate) {
            (SampleOrder::Random, _) => "Rows selected randomly".to_string(),
            (_, Some(predicate)) => format!("Filtered by: {predicate}"),
            (SampleOrder::PrimaryKey(_), None) => "Showing first rows ordered by primary key".to_string(),
            (SampleOrder::Unordered, None) => {
                "Showing first rows in storage order; the table has no primary key".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> SampleQuery {
        SampleQuery {
            table: TableRef::new("public", "orders"),
            columns: None,
            predicate: None,
            order: SampleOrder::PrimaryKey(vec!["id".to_string()]),
            limit: 5,
        }
    }

    #[test]
    fn test_primary_key_order() {
        let query = orders();
        assert_eq!(query.to_sql(), "SELECT * FROM public.orders ORDER BY id LIMIT 5");
        assert_eq!(query.note(), "Showing first rows ordered by primary key");
    }

    #[test]
    fn test_columns_predicate_and_quoting() {
        let query = SampleQuery {
            table: TableRef::new("Sales", "order"),
            columns: Some(vec!["id".to_string(), "Status".to_string()]),
            predicate: Some("status = 'shipped' OR total > 10".to_string()),
            order: SampleOrder::Unordered,
            limit: 3,
        };
        assert_eq!(
            query.to_sql(),
            "SELECT id, \"Status\" FROM \"Sales\".\"order\" WHERE (status = 'shipped' OR total > 10) LIMIT 3"
        );
        assert_eq!(query.note(), "Filtered by: status = 'shipped' OR total > 10");
    }

    #[test]
    fn test_random_order() {
        let query = SampleQuery {
            order: SampleOrder::Random,
            predicate: Some("total > 10".to_string()),
            ..orders()
        };
        assert_eq!(
            query.to_sql(),
            "SELECT * FROM public.orders WHERE (total > 10) ORDER BY random() LIMIT 5"
        );
        assert_eq!(query.note(), "Rows selected randomly");
    }
}
