//! Shortest join path search.
//!
//! Foreign keys are walked in both directions: a join can be written along
//! an FK or against it. The search is a layered breadth-first expansion, so
//! the first layer that reaches the target holds every shortest path and
//! nothing longer is ever returned.

use crate::graph::{Direction, RelationshipGraph};
use crate::render;
use pglens_core::{ForeignKeyEdge, TableRef};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::HashMap;

/// Hard ceiling on search depth.
pub const MAX_DEPTH_LIMIT: usize = 6;

pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Equal-length paths kept per search.
pub const MAX_PATHS: usize = 25;

/// Partial paths kept per layer. Only reachable on very dense schemas.
const MAX_FRONTIER: usize = 10_000;

/// One traversed foreign key, oriented in the direction the join reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep {
    pub from: TableRef,
    pub from_columns: Vec<String>,
    pub to: TableRef,
    pub to_columns: Vec<String>,
    pub constraint_name: String,
    pub direction: Direction,
}

impl JoinStep {
    fn along(edge: &ForeignKeyEdge, direction: Direction) -> Self {
        let (from, from_columns, to, to_columns) = match direction {
            Direction::Forward => (edge.source(), edge.source_columns(), edge.target(), edge.target_columns()),
            Direction::Reverse => (edge.target(), edge.target_columns(), edge.source(), edge.source_columns()),
        };
        Self {
            from: from.clone(),
            from_columns: from_columns.to_vec(),
            to: to.clone(),
            to_columns: to_columns.to_vec(),
            constraint_name: edge.constraint_name().to_string(),
            direction,
        }
    }

    /// `(from column, to column)` equalities in key order.
    pub fn column_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.from_columns
            .iter()
            .map(String::as_str)
            .zip(self.to_columns.iter().map(String::as_str))
    }
}

impl Serialize for JoinStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("JoinStep", 9)?;
        s.serialize_field("from_schema", &self.from.schema)?;
        s.serialize_field("from_table", &self.from.name)?;
        s.serialize_field("from_columns", &self.from_columns)?;
        s.serialize_field("to_schema", &self.to.schema)?;
        s.serialize_field("to_table", &self.to.name)?;
        s.serialize_field("to_columns", &self.to_columns)?;
        s.serialize_field("join_type", "INNER JOIN")?;
        s.serialize_field("constraint_name", &self.constraint_name)?;
        s.serialize_field("direction", &self.direction)?;
        s.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct JoinPath {
    pub steps: Vec<JoinStep>,
    pub depth: usize,
    /// Runnable `SELECT * FROM .. INNER JOIN ..` over the whole path.
    pub sql_example: String,
}

impl JoinPath {
    fn from_steps(steps: Vec<JoinStep>) -> Self {
        let sql_example = render::join_sql(&steps);
        Self {
            depth: steps.len(),
            steps,
            sql_example,
        }
    }

    /// Every table on the path, starting table first.
    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        self.steps
            .first()
            .map(|s| &s.from)
            .into_iter()
            .chain(self.steps.iter().map(|s| &s.to))
    }
}

/// Clamp a requested depth into `1..=MAX_DEPTH_LIMIT`.
pub fn clamp_depth(requested: usize) -> usize {
    requested.clamp(1, MAX_DEPTH_LIMIT)
}

struct Partial<'g> {
    node: &'g TableRef,
    steps: Vec<(&'g ForeignKeyEdge, Direction)>,
    /// Tables already on this path. At most `MAX_DEPTH_LIMIT + 1` entries.
    visited: Vec<&'g TableRef>,
}

/// Result of a path search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSearch {
    pub paths: Vec<JoinPath>,
    /// Set when [`MAX_PATHS`] or the frontier bound cut the search short, so
    /// `paths` may be missing shortest paths (or be empty when one exists).
    pub truncated: bool,
}

/// All shortest join paths from `from` to `to` of at most `max_depth` steps.
///
/// Equal-length paths are ordered by their constraint names. The result is
/// empty when the tables are the same, either is absent from the graph, or
/// no path fits within the depth bound.
pub fn find_paths(
    graph: &RelationshipGraph,
    from: &TableRef,
    to: &TableRef,
    max_depth: usize,
) -> Vec<JoinPath> {
    search_paths(graph, from, to, max_depth).paths
}

/// [`find_paths`], also reporting whether the search bounds dropped paths.
pub fn search_paths(
    graph: &RelationshipGraph,
    from: &TableRef,
    to: &TableRef,
    max_depth: usize,
) -> PathSearch {
    if from == to {
        return PathSearch::default();
    }
    let (Some(start), Some(target)) = (graph.resolve(from), graph.resolve(to)) else {
        return PathSearch::default();
    };
    let max_depth = clamp_depth(max_depth);
    let mut truncated = false;

    // Depth at which each table was first reached. A table first reached at
    // a shallower layer cannot lie on a shortest path at a deeper one.
    let mut first_reached: HashMap<&TableRef, usize> = HashMap::from([(start, 0)]);
    let mut frontier = vec![Partial {
        node: start,
        steps: Vec::new(),
        visited: vec![start],
    }];

    for depth in 1..=max_depth {
        let mut next = Vec::new();
        let mut found: Vec<Vec<(&ForeignKeyEdge, Direction)>> = Vec::new();

        for partial in &frontier {
            for (edge, direction, other) in graph.neighbours(partial.node) {
                if partial.visited.contains(&other) {
                    continue;
                }
                if *first_reached.entry(other).or_insert(depth) < depth {
                    continue;
                }

                let mut steps = partial.steps.clone();
                steps.push((edge, direction));
                if other == target {
                    found.push(steps);
                    continue;
                }

                let mut visited = partial.visited.clone();
                visited.push(other);
                next.push(Partial {
                    node: other,
                    steps,
                    visited,
                });
            }
        }

        if !found.is_empty() {
            found.sort_by(|a, b| {
                a.iter()
                    .map(|(e, d)| (e.constraint_name(), *d))
                    .cmp(b.iter().map(|(e, d)| (e.constraint_name(), *d)))
            });
            if found.len() > MAX_PATHS {
                tracing::debug!(found = found.len(), kept = MAX_PATHS, "join paths truncated");
                found.truncate(MAX_PATHS);
                truncated = true;
            }
            let paths = found
                .into_iter()
                .map(|steps| {
                    JoinPath::from_steps(
                        steps
                            .into_iter()
                            .map(|(edge, direction)| JoinStep::along(edge, direction))
                            .collect(),
                    )
                })
                .collect();
            return PathSearch { paths, truncated };
        }

        if next.is_empty() {
            break;
        }
        if next.len() > MAX_FRONTIER {
            tracing::warn!(
                depth,
                frontier = next.len(),
                limit = MAX_FRONTIER,
                "join path frontier truncated"
            );
            next.truncate(MAX_FRONTIER);
            truncated = true;
        }
        frontier = next;
    }

    PathSearch {
        paths: Vec::new(),
        truncated,
    }
}
