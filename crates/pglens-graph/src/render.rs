//! Join path to SQL.

use crate::path::JoinStep;
use pglens_core::TableRef;
use pglens_core::ident::{qualified, quote_ident};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write;

/// Render `steps` as `SELECT * FROM a AS x INNER JOIN b AS y ON x.c = y.c ...`.
///
/// Aliases are the initials of each table name's underscore-separated
/// words (`order_items` becomes `oi`), with a numeric suffix when two tables
/// share initials or the initials are a reserved word.
pub fn join_sql(steps: &[JoinStep]) -> String {
    let Some(first) = steps.first() else {
        return String::new();
    };

    let mut aliases = Aliases::default();
    let mut sql = format!("SELECT * FROM {} AS {}", qualified(&first.from), aliases.assign(&first.from));

    for step in steps {
        let left = aliases.assign(&step.from);
        let right = aliases.assign(&step.to);
        let _ = write!(sql, " INNER JOIN {} AS {} ON ", qualified(&step.to), right);
        for (i, (from_col, to_col)) in step.column_pairs().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }
            let _ = write!(
                sql,
                "{left}.{} = {right}.{}",
                quote_ident(from_col),
                quote_ident(to_col)
            );
        }
    }
    sql
}

#[derive(Default)]
struct Aliases {
    by_table: HashMap<TableRef, String>,
}

impl Aliases {
    fn assign(&mut self, table: &TableRef) -> String {
        if let Some(alias) = self.by_table.get(table) {
            return alias.clone();
        }
        let base = initials(&table.name);
        let mut alias = base.clone();
        let mut n = 2;
        while self.taken(&alias) || matches!(quote_ident(&alias), Cow::Owned(_)) {
            alias = format!("{base}{n}");
            n += 1;
        }
        self.by_table.insert(table.clone(), alias.clone());
        alias
    }

    fn taken(&self, alias: &str) -> bool {
        self.by_table.values().any(|a| a == alias)
    }
}

fn initials(name: &str) -> String {
    let letters: String = name
        .split('_')
        .filter_map(|word| word.chars().next())
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if letters.is_empty() { "t".to_string() } else { letters }
}
