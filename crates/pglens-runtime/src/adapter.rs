use crate::error::ExecutionError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Duration;

/// A statement ready to send, with its positional parameter values.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub sql: String,
    /// Values for `$1..$N`, in order.
    pub params: Vec<Value>,
    pub timeout: Duration,
}

/// Column metadata taken from the result descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultColumn {
    pub name: String,
    pub data_type: String,
}

impl ResultColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Rows exactly as the database produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    /// Present even when `rows` is empty. Names are unique and match the
    /// row keys; see [`disambiguate_columns`].
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Map<String, Value>>,
}

/// Rename repeated column names in place so each can key a row object.
///
/// The second `id` becomes `id_2`, the third `id_3`, skipping suffixes that
/// are already column names. First occurrences keep their name.
pub fn disambiguate_columns(columns: &mut [ResultColumn]) {
    let mut taken: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(columns.len());
    for column in columns.iter_mut() {
        if seen.insert(column.name.clone()) {
            continue;
        }
        let renamed = (2..)
            .map(|n| format!("{}_{n}", column.name))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_default();
        taken.insert(renamed.clone());
        seen.insert(renamed.clone());
        column.name = renamed;
    }
}

#[async_trait]
pub trait QueryAdapter: Send + Sync {
    /// Run one statement in a read-only transaction that is always rolled
    /// back, bounded by `request.timeout`.
    ///
    /// On timeout or cancellation the connection must not go back to the
    /// pool in an unknown state. Result column names must be unique (see
    /// [`disambiguate_columns`]).
    async fn run(&self, request: QueryRequest) -> Result<RawResult, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(columns: &[ResultColumn]) -> Vec<&str> {
        columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_repeated_names_get_suffixes() {
        // SELECT * over orders JOIN users: both carry id.
        let mut columns = vec![
            ResultColumn::new("id", "int4"),
            ResultColumn::new("user_id", "int4"),
            ResultColumn::new("id", "int4"),
            ResultColumn::new("email", "text"),
            ResultColumn::new("id", "int4"),
        ];
        disambiguate_columns(&mut columns);
        assert_eq!(names(&columns), vec!["id", "user_id", "id_2", "email", "id_3"]);
        assert_eq!(columns[2].data_type, "int4");
    }

    #[test]
    fn test_suffix_skips_existing_names() {
        let mut columns = vec![
            ResultColumn::new("id", "int4"),
            ResultColumn::new("id", "int4"),
            ResultColumn::new("id_2", "text"),
        ];
        disambiguate_columns(&mut columns);
        assert_eq!(names(&columns), vec!["id", "id_3", "id_2"]);
    }

    #[test]
    fn test_unique_names_are_untouched() {
        let mut columns = vec![ResultColumn::new("a", "int4"), ResultColumn::new("b", "int4")];
        disambiguate_columns(&mut columns);
        assert_eq!(names(&columns), vec!["a", "b"]);
    }
}
