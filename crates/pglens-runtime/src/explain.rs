//! `EXPLAIN` statement construction and plan summaries.
//!
//! Cost, row and timing figures are pulled out of the plan in whichever
//! format it was requested. Text plans are read with regular expressions;
//! JSON and YAML plans are walked as a tree.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;

static TOP_COST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"cost=\d+(?:\.\d+)?\.\.(\d+(?:\.\d+)?) rows=(\d+)").expect("valid cost regex")
});

static EXECUTION_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Execution Time: (\d+(?:\.\d+)?) ms").expect("valid timing regex"));

static SEQ_SCAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Seq Scan on ([^\s(]+)[^(]*\(cost=\d+(?:\.\d+)?\.\.\d+(?:\.\d+)?\s+rows=(\d+)")
        .expect("valid seq scan regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplainFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl ExplainFormat {
    /// Case-insensitive; anything unrecognised is `Text`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => ExplainFormat::Json,
            "yaml" => ExplainFormat::Yaml,
            _ => ExplainFormat::Text,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            ExplainFormat::Text => "TEXT",
            ExplainFormat::Json => "JSON",
            ExplainFormat::Yaml => "YAML",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExplainOptions {
    /// Run the statement for real and report actual timings.
    pub analyze: bool,
    pub format: ExplainFormat,
    pub verbose: bool,
    /// Only honoured together with `analyze`.
    pub buffers: bool,
}

impl ExplainOptions {
    /// Prefix `sql` with an `EXPLAIN (...)` option list.
    pub fn wrap(&self, sql: &str) -> String {
        let mut options = vec![format!("FORMAT {}", self.format.keyword())];
        if self.analyze {
            options.push("ANALYZE".to_string());
        }
        if self.verbose {
            options.push("VERBOSE".to_string());
        }
        if self.buffers && self.analyze {
            options.push("BUFFERS".to_string());
        }
        format!("EXPLAIN ({}) {}", options.join(", "), sql)
    }
}

/// Figures extracted from a plan. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanSummary {
    pub estimated_cost: Option<f64>,
    pub estimated_rows: Option<i64>,
    pub actual_time_ms: Option<f64>,
    /// `(relation, estimated rows)` for every sequential scan node.
    pub seq_scans: Vec<(String, f64)>,
}

impl PlanSummary {
    pub fn from_plan(plan: &Value, format: ExplainFormat) -> Self {
        match (format, plan) {
            (ExplainFormat::Text, Value::String(text)) => Self::from_text(text),
            (ExplainFormat::Yaml, Value::String(text)) => serde_yaml::from_str::<Value>(text)
                .map(|tree| Self::from_tree(&tree))
                .unwrap_or_default(),
            (_, tree) => Self::from_tree(tree),
        }
    }

    fn from_text(text: &str) -> Self {
        let mut summary = PlanSummary::default();
        if let Some(caps) = TOP_COST.captures(text) {
            summary.estimated_cost = caps[1].parse().ok();
            summary.estimated_rows = caps[2].parse().ok();
        }
        if let Some(caps) = EXECUTION_TIME.captures(text) {
            summary.actual_time_ms = caps[1].parse().ok();
        }
        summary.seq_scans = SEQ_SCAN
            .captures_iter(text)
            .filter_map(|caps| Some((caps[1].to_string(), caps[2].parse().ok()?)))
            .collect();
        summary
    }

    /// `[{"Plan": {...}, "Execution Time": ..}]`, as both JSON and YAML
    /// plans deserialise.
    fn from_tree(tree: &Value) -> Self {
        let root = match tree {
            Value::Array(items) => items.first().unwrap_or(&Value::Null),
            other => other,
        };
        let plan = &root["Plan"];
        let mut summary = PlanSummary {
            estimated_cost: plan["Total Cost"].as_f64(),
            estimated_rows: plan["Plan Rows"].as_f64().map(|rows| rows as i64),
            actual_time_ms: root["Execution Time"].as_f64(),
            seq_scans: Vec::new(),
        };
        collect_seq_scans(plan, &mut summary.seq_scans);
        summary
    }

    /// Caller-facing warnings about the plan and the options it ran with.
    pub fn warnings(&self, options: &ExplainOptions, seq_scan_warning_rows: f64) -> Vec<String> {
        let mut warnings = Vec::new();
        for (relation, rows) in &self.seq_scans {
            if *rows >= seq_scan_warning_rows {
                warnings.push(format!(
                    "Sequential scan on {relation} (estimated {rows} rows); an index on the filtered columns may help"
                ));
            }
        }
        if options.buffers && !options.analyze {
            warnings.push("buffers=true requires analyze=true; buffer statistics were not collected".to_string());
        }
        warnings
    }
}

fn collect_seq_scans(node: &Value, out: &mut Vec<(String, f64)>) {
    if node["Node Type"].as_str() == Some("Seq Scan") {
        let relation = match (node["Schema"].as_str(), node["Relation Name"].as_str()) {
            (Some(schema), Some(name)) => format!("{schema}.{name}"),
            (None, Some(name)) => name.to_string(),
            _ => "?".to_string(),
        };
        if let Some(rows) = node["Plan Rows"].as_f64() {
            out.push((relation, rows));
        }
    }
    if let Some(children) = node["Plans"].as_array() {
        for child in children {
            collect_seq_scans(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEXT_PLAN: &str = "\
Hash Join  (cost=35.50..1960.73 rows=100000 width=48) (actual time=0.412..31.228 rows=100000 loops=1)
  Hash Cond: (o.user_id = u.id)
  ->  Seq Scan on orders o  (cost=0.00..1637.00 rows=100000 width=16) (actual time=0.010..8.921 rows=100000 loops=1)
  ->  Hash  (cost=22.00..22.00 rows=1000 width=36) (actual time=0.390..0.391 rows=1000 loops=1)
        ->  Seq Scan on users u  (cost=0.00..22.00 rows=1000 width=36) (actual time=0.006..0.142 rows=1000 loops=1)
Planning Time: 0.233 ms
Execution Time: 35.187 ms";

    #[test]
    fn test_wrap_options() {
        let options = ExplainOptions {
            analyze: true,
            format: ExplainFormat::Json,
            verbose: true,
            buffers: true,
        };
        assert_eq!(
            options.wrap("SELECT 1"),
            "EXPLAIN (FORMAT JSON, ANALYZE, VERBOSE, BUFFERS) SELECT 1"
        );

        let plan_only = ExplainOptions {
            buffers: true,
            ..Default::default()
        };
        assert_eq!(plan_only.wrap("SELECT 1"), "EXPLAIN (FORMAT TEXT) SELECT 1");
    }

    #[test]
    fn test_unknown_format_is_text() {
        assert_eq!(ExplainFormat::parse_lenient("JSON"), ExplainFormat::Json);
        assert_eq!(ExplainFormat::parse_lenient("yaml"), ExplainFormat::Yaml);
        assert_eq!(ExplainFormat::parse_lenient("xml"), ExplainFormat::Text);
    }

    #[test]
    fn test_text_summary() {
        let summary = PlanSummary::from_plan(&json!(TEXT_PLAN), ExplainFormat::Text);
        assert_eq!(summary.estimated_cost, Some(1960.73));
        assert_eq!(summary.estimated_rows, Some(100_000));
        assert_eq!(summary.actual_time_ms, Some(35.187));
        assert_eq!(
            summary.seq_scans,
            vec![("orders".to_string(), 100_000.0), ("users".to_string(), 1000.0)]
        );
    }

    #[test]
    fn test_json_summary() {
        let plan = json!([{
            "Plan": {
                "Node Type": "Nested Loop",
                "Total Cost": 120.5,
                "Plan Rows": 42,
                "Plans": [
                    {"Node Type": "Seq Scan", "Relation Name": "orders", "Schema": "public", "Plan Rows": 50000},
                    {"Node Type": "Index Scan", "Relation Name": "users", "Plan Rows": 1}
                ]
            },
            "Execution Time": 1.25
        }]);
        let summary = PlanSummary::from_plan(&plan, ExplainFormat::Json);
        assert_eq!(summary.estimated_cost, Some(120.5));
        assert_eq!(summary.estimated_rows, Some(42));
        assert_eq!(summary.actual_time_ms, Some(1.25));
        assert_eq!(summary.seq_scans, vec![("public.orders".to_string(), 50_000.0)]);
    }

    #[test]
    fn test_yaml_summary() {
        let plan = "- Plan: \n    Node Type: \"Seq Scan\"\n    Relation Name: \"users\"\n    Total Cost: 22.00\n    Plan Rows: 1000\n";
        let summary = PlanSummary::from_plan(&json!(plan), ExplainFormat::Yaml);
        assert_eq!(summary.estimated_cost, Some(22.0));
        assert_eq!(summary.estimated_rows, Some(1000));
        assert_eq!(summary.actual_time_ms, None);
        assert_eq!(summary.seq_scans, vec![("users".to_string(), 1000.0)]);
    }

    #[test]
    fn test_unparseable_plan_has_no_figures() {
        let summary = PlanSummary::from_plan(&json!("Result"), ExplainFormat::Text);
        assert_eq!(summary, PlanSummary::default());
    }

    #[test]
    fn test_warnings() {
        let summary = PlanSummary::from_plan(&json!(TEXT_PLAN), ExplainFormat::Text);
        let options = ExplainOptions {
            buffers: true,
            ..Default::default()
        };
        let warnings = summary.warnings(&options, 10_000.0);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("Sequential scan on orders"));
        assert!(warnings[1].contains("requires analyze=true"));
    }
}
