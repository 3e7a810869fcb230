//! Immutable foreign-key graph.

use pglens_core::{ForeignKeyEdge, TableRef};
use serde::Serialize;
use std::collections::HashMap;

/// Which way a join step walks its foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// From the referencing table to the referenced one.
    Forward,
    /// From the referenced table back to the referencing one.
    Reverse,
}

#[derive(Debug, Default, Clone)]
struct Adjacency {
    outgoing: Vec<usize>,
    incoming: Vec<usize>,
    /// Undirected neighbours for path search, self-loops excluded, ordered by
    /// constraint name then direction.
    neighbours: Vec<(usize, Direction)>,
}

/// Tables and the foreign keys between them.
///
/// Built once from a complete edge list and never mutated afterwards, so a
/// single snapshot can be shared behind an `Arc` by any number of concurrent
/// searches.
#[derive(Debug, Default, Clone)]
pub struct RelationshipGraph {
    edges: Vec<ForeignKeyEdge>,
    nodes: HashMap<TableRef, Adjacency>,
}

impl RelationshipGraph {
    /// Group edges by source (`outgoing`) and by target (`incoming`).
    ///
    /// Duplicate edges are collapsed. Self-referencing edges are kept in both
    /// lists of their table but never offered as a path-search neighbour.
    pub fn build(edges: impl IntoIterator<Item = ForeignKeyEdge>) -> Self {
        let mut edges: Vec<ForeignKeyEdge> = edges.into_iter().collect();
        edges.sort_by(|a, b| {
            a.constraint_name()
                .cmp(b.constraint_name())
                .then_with(|| a.source().cmp(b.source()))
                .then_with(|| a.target().cmp(b.target()))
        });
        edges.dedup();

        let mut nodes: HashMap<TableRef, Adjacency> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            let source = nodes.entry(edge.source().clone()).or_default();
            source.outgoing.push(i);
            if !edge.is_self_reference() {
                source.neighbours.push((i, Direction::Forward));
            }

            let target = nodes.entry(edge.target().clone()).or_default();
            target.incoming.push(i);
            if !edge.is_self_reference() {
                target.neighbours.push((i, Direction::Reverse));
            }
        }

        for adjacency in nodes.values_mut() {
            adjacency.neighbours.sort_by(|(a, da), (b, db)| {
                edges[*a]
                    .constraint_name()
                    .cmp(edges[*b].constraint_name())
                    .then(da.cmp(db))
            });
        }

        tracing::debug!(tables = nodes.len(), edges = edges.len(), "relationship graph built");
        Self { edges, nodes }
    }

    /// Foreign keys declared on `table`.
    pub fn outgoing<'g>(&'g self, table: &TableRef) -> impl Iterator<Item = &'g ForeignKeyEdge> + use<'g> {
        let indices = self.nodes.get(table).map(|a| a.outgoing.as_slice()).unwrap_or(&[]);
        indices.iter().map(|&i| &self.edges[i])
    }

    /// Foreign keys on other tables that reference `table`.
    pub fn incoming<'g>(&'g self, table: &TableRef) -> impl Iterator<Item = &'g ForeignKeyEdge> + use<'g> {
        let indices = self.nodes.get(table).map(|a| a.incoming.as_slice()).unwrap_or(&[]);
        indices.iter().map(|&i| &self.edges[i])
    }

    /// Edges usable as one join step away from `table`, paired with the
    /// table on the other end.
    pub(crate) fn neighbours<'g>(
        &'g self,
        table: &TableRef,
    ) -> impl Iterator<Item = (&'g ForeignKeyEdge, Direction, &'g TableRef)> + use<'g> {
        let entries = self.nodes.get(table).map(|a| a.neighbours.as_slice()).unwrap_or(&[]);
        entries.iter().map(|&(i, direction)| {
            let edge = &self.edges[i];
            let other = match direction {
                Direction::Forward => edge.target(),
                Direction::Reverse => edge.source(),
            };
            (edge, direction, other)
        })
    }

    /// The graph's own copy of `table`, if present.
    pub(crate) fn resolve(&self, table: &TableRef) -> Option<&TableRef> {
        self.nodes.get_key_value(table).map(|(key, _)| key)
    }

    pub fn contains(&self, table: &TableRef) -> bool {
        self.nodes.contains_key(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        self.nodes.keys()
    }

    pub fn edges(&self) -> &[ForeignKeyEdge] {
        &self.edges
    }

    pub fn table_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn table(name: &str) -> TableRef {
        TableRef::new("public", name)
    }

    pub fn fk(name: &str, from: &str, from_col: &str, to: &str, to_col: &str) -> ForeignKeyEdge {
        ForeignKeyEdge::new(
            name,
            table(from),
            vec![from_col.to_string()],
            table(to),
            vec![to_col.to_string()],
        )
        .unwrap()
    }

    /// order_items -> orders -> users, order_items -> products.
    pub fn shop() -> RelationshipGraph {
        RelationshipGraph::build([
            fk("orders_user_id_fkey", "orders", "user_id", "users", "id"),
            fk("order_items_order_id_fkey", "order_items", "order_id", "orders", "id"),
            fk("order_items_product_id_fkey", "order_items", "product_id", "products", "id"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_groups_outgoing_and_incoming() {
        let graph = shop();
        let outgoing: Vec<_> = graph.outgoing(&table("order_items")).map(|e| e.constraint_name()).collect();
        assert_eq!(outgoing, vec!["order_items_order_id_fkey", "order_items_product_id_fkey"]);

        let incoming: Vec<_> = graph.incoming(&table("orders")).map(|e| e.source().name.as_str()).collect();
        assert_eq!(incoming, vec!["order_items"]);

        assert_eq!(graph.outgoing(&table("users")).count(), 0);
        assert_eq!(graph.table_count(), 4);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_unknown_table_has_no_edges() {
        let graph = shop();
        assert!(!graph.contains(&table("invoices")));
        assert_eq!(graph.outgoing(&table("invoices")).count(), 0);
        assert_eq!(graph.neighbours(&table("invoices")).count(), 0);
    }

    #[test]
    fn test_self_reference_kept_but_not_a_neighbour() {
        let graph = RelationshipGraph::build([fk("employees_manager_id_fkey", "employees", "manager_id", "employees", "id")]);
        let employees = table("employees");
        assert_eq!(graph.outgoing(&employees).count(), 1);
        assert_eq!(graph.incoming(&employees).count(), 1);
        assert_eq!(graph.neighbours(&employees).count(), 0);
    }

    #[test]
    fn test_duplicates_collapse() {
        let edge = fk("orders_user_id_fkey", "orders", "user_id", "users", "id");
        let graph = RelationshipGraph::build([edge.clone(), edge]);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_neighbours_are_ordered_by_constraint() {
        let graph = shop();
        let names: Vec<_> = graph
            .neighbours(&table("orders"))
            .map(|(e, d, other)| (e.constraint_name(), d, other.name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("order_items_order_id_fkey", Direction::Reverse, "order_items"),
                ("orders_user_id_fkey", Direction::Forward, "users"),
            ]
        );
    }
}
