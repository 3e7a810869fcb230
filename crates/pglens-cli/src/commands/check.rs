//! `pglens check` - run the read-only validator offline.
//!
//! Prints a JSON verdict and exits non-zero when the input is rejected.

use anyhow::{Context, Result};
use clap::Args;
use pglens_guard::{GuardError, validate, validate_fragment};
use serde_json::{Value, json};
use std::io::Read;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// SQL to check. Read from stdin when omitted or `-`.
    pub sql: Option<String>,

    /// Check a WHERE predicate (as passed to get_sample_rows) instead of a
    /// full statement.
    #[arg(long)]
    pub fragment: bool,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let sql = match args.sql.as_deref() {
        Some("-") | None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read SQL from stdin")?;
            buf
        }
        Some(sql) => sql.to_string(),
    };

    let (accepted, verdict) = verdict(&sql, args.fragment);
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    if !accepted {
        anyhow::bail!("rejected");
    }
    Ok(())
}

fn verdict(sql: &str, fragment: bool) -> (bool, Value) {
    let outcome = if fragment {
        validate_fragment(sql).map(|predicate| json!({"accepted": true, "predicate": predicate}))
    } else {
        validate(sql).map(|query| {
            json!({
                "accepted": true,
                "kind": query.kind,
                "sql": query.sql,
                "placeholder_count": query.placeholder_count,
            })
        })
    };
    match outcome {
        Ok(report) => (true, report),
        Err(err) => (false, rejection(&err)),
    }
}

fn rejection(err: &GuardError) -> Value {
    json!({
        "accepted": false,
        "code": err.code(),
        "message": err.to_string(),
        "offending_token": err.offending_token(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_is_accepted() {
        let (accepted, report) = verdict("SELECT * FROM orders WHERE id = $1;", false);
        assert!(accepted);
        assert_eq!(report["kind"], "select");
        assert_eq!(report["sql"], "SELECT * FROM orders WHERE id = $1");
        assert_eq!(report["placeholder_count"], 1);
    }

    #[test]
    fn test_write_is_rejected_with_keyword() {
        let (accepted, report) = verdict("DELETE FROM orders", false);
        assert!(!accepted);
        assert_eq!(report["code"], "WRITE_OPERATION_DENIED");
        assert_eq!(report["offending_token"], "DELETE");
    }

    #[test]
    fn test_fragment_mode() {
        let (accepted, report) = verdict("WHERE status = 'open'", true);
        assert!(accepted);
        assert_eq!(report["predicate"], "status = 'open'");

        let (accepted, report) = verdict("1=1) UNION SELECT * FROM pg_shadow --", true);
        assert!(!accepted);
        assert_eq!(report["code"], "INVALID_SQL");
    }
}
