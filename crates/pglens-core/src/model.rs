//! Table identities and foreign-key edges.

use crate::error::ModelError;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identity of a table or view.
///
/// Names are kept exactly as the catalog reports them. `Orders` and `orders`
/// are different tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// `ON UPDATE` / `ON DELETE` action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReferentialAction {
    #[default]
    #[serde(rename = "NO ACTION")]
    NoAction,
    #[serde(rename = "RESTRICT")]
    Restrict,
    #[serde(rename = "CASCADE")]
    Cascade,
    #[serde(rename = "SET NULL")]
    SetNull,
    #[serde(rename = "SET DEFAULT")]
    SetDefault,
}

impl ReferentialAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

impl FromStr for ReferentialAction {
    type Err = ModelError;

    /// Accepts both the `information_schema` rule text (`"SET NULL"`) and the
    /// single-letter `pg_constraint.confupdtype` codes (`'n'`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NO ACTION" | "A" => Ok(ReferentialAction::NoAction),
            "RESTRICT" | "R" => Ok(ReferentialAction::Restrict),
            "CASCADE" | "C" => Ok(ReferentialAction::Cascade),
            "SET NULL" | "N" => Ok(ReferentialAction::SetNull),
            "SET DEFAULT" | "D" => Ok(ReferentialAction::SetDefault),
            other => Err(ModelError::UnknownReferentialAction(other.to_string())),
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed foreign-key reference from `source` columns to `target` columns.
///
/// Column lists are ordered pairwise: `source_columns[i]` references
/// `target_columns[i]`. Construction rejects empty or mismatched lists so the
/// rest of the system can rely on `len(source) == len(target) >= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKeyEdge {
    constraint_name: String,
    source: TableRef,
    source_columns: Vec<String>,
    target: TableRef,
    target_columns: Vec<String>,
    on_update: ReferentialAction,
    on_delete: ReferentialAction,
}

impl ForeignKeyEdge {
    pub fn new(
        constraint_name: impl Into<String>,
        source: TableRef,
        source_columns: Vec<String>,
        target: TableRef,
        target_columns: Vec<String>,
    ) -> Result<Self, ModelError> {
        let constraint_name = constraint_name.into();
        if source_columns.is_empty() || target_columns.is_empty() {
            return Err(ModelError::EmptyForeignKey { constraint_name });
        }
        if source_columns.len() != target_columns.len() {
            return Err(ModelError::ForeignKeyArity {
                constraint_name,
                source_len: source_columns.len(),
                target_len: target_columns.len(),
            });
        }
        Ok(Self {
            constraint_name,
            source,
            source_columns,
            target,
            target_columns,
            on_update: ReferentialAction::default(),
            on_delete: ReferentialAction::default(),
        })
    }

    pub fn with_actions(mut self, on_update: ReferentialAction, on_delete: ReferentialAction) -> Self {
        self.on_update = on_update;
        self.on_delete = on_delete;
        self
    }

    pub fn constraint_name(&self) -> &str {
        &self.constraint_name
    }

    pub fn source(&self) -> &TableRef {
        &self.source
    }

    pub fn source_columns(&self) -> &[String] {
        &self.source_columns
    }

    pub fn target(&self) -> &TableRef {
        &self.target
    }

    pub fn target_columns(&self) -> &[String] {
        &self.target_columns
    }

    pub fn on_update(&self) -> ReferentialAction {
        self.on_update
    }

    pub fn on_delete(&self) -> ReferentialAction {
        self.on_delete
    }

    pub fn is_self_reference(&self) -> bool {
        self.source == self.target
    }

    /// Column pairs `(source, target)` in declaration order.
    pub fn column_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.source_columns
            .iter()
            .zip(self.target_columns.iter())
            .map(|(s, t)| (s.as_str(), t.as_str()))
    }
}

/// Wire shape used by `get_foreign_keys`.
#[derive(Serialize)]
struct ForeignKeyView<'a> {
    constraint_name: &'a str,
    from_schema: &'a str,
    from_table: &'a str,
    from_columns: &'a [String],
    to_schema: &'a str,
    to_table: &'a str,
    to_columns: &'a [String],
    on_update: ReferentialAction,
    on_delete: ReferentialAction,
}

impl Serialize for ForeignKeyEdge {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ForeignKeyView {
            constraint_name: &self.constraint_name,
            from_schema: &self.source.schema,
            from_table: &self.source.name,
            from_columns: &self.source_columns,
            to_schema: &self.target.schema,
            to_table: &self.target.name,
            to_columns: &self.target_columns,
            on_update: self.on_update,
            on_delete: self.on_delete,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_edge_rejects_empty_columns() {
        let err = ForeignKeyEdge::new(
            "fk",
            TableRef::new("public", "a"),
            vec![],
            TableRef::new("public", "b"),
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::EmptyForeignKey { .. }));
    }

    #[test]
    fn test_edge_rejects_arity_mismatch() {
        let err = ForeignKeyEdge::new(
            "fk",
            TableRef::new("public", "a"),
            cols(&["x", "y"]),
            TableRef::new("public", "b"),
            cols(&["id"]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ModelError::ForeignKeyArity {
                source_len: 2,
                target_len: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_edge_serializes_as_relation() {
        let edge = ForeignKeyEdge::new(
            "orders_user_id_fkey",
            TableRef::new("public", "orders"),
            cols(&["user_id"]),
            TableRef::new("public", "users"),
            cols(&["id"]),
        )
        .unwrap()
        .with_actions(ReferentialAction::NoAction, ReferentialAction::Cascade);

        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(
            value,
            json!({
                "constraint_name": "orders_user_id_fkey",
                "from_schema": "public",
                "from_table": "orders",
                "from_columns": ["user_id"],
                "to_schema": "public",
                "to_table": "users",
                "to_columns": ["id"],
                "on_update": "NO ACTION",
                "on_delete": "CASCADE"
            })
        );
    }

    #[test]
    fn test_referential_action_parsing() {
        assert_eq!("SET NULL".parse::<ReferentialAction>().unwrap(), ReferentialAction::SetNull);
        assert_eq!("c".parse::<ReferentialAction>().unwrap(), ReferentialAction::Cascade);
        assert!("sometimes".parse::<ReferentialAction>().is_err());
    }

    #[test]
    fn test_table_ref_is_case_sensitive() {
        assert_ne!(TableRef::new("public", "Orders"), TableRef::new("public", "orders"));
    }
}
