//! Shared graph snapshots with a time-to-live.
//!
//! Each entry is keyed by the set of schemas its foreign keys were loaded
//! from. A snapshot is never modified after it is built: a refresh swaps a
//! new `Arc` into the map and searches still holding the old one finish on
//! it undisturbed.

use crate::graph::RelationshipGraph;
use pglens_core::ForeignKeyEdge;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Schemas a snapshot covers.
pub type Scope = BTreeSet<String>;

struct Snapshot {
    built_at: Instant,
    graph: Arc<RelationshipGraph>,
}

pub struct GraphSnapshots {
    ttl: Duration,
    entries: RwLock<HashMap<Scope, Snapshot>>,
}

impl GraphSnapshots {
    /// A zero `ttl` disables reuse: every lookup misses.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The cached graph for `scope` if it is still fresh.
    pub fn get(&self, scope: &Scope) -> Option<Arc<RelationshipGraph>> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(scope)
            .filter(|s| s.built_at.elapsed() < self.ttl)
            .map(|s| Arc::clone(&s.graph))
    }

    /// Publish `graph` as the snapshot for `scope`, replacing any older one.
    pub fn insert(&self, scope: Scope, graph: RelationshipGraph) -> Arc<RelationshipGraph> {
        let graph = Arc::new(graph);
        if !self.ttl.is_zero() {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.insert(
                scope,
                Snapshot {
                    built_at: Instant::now(),
                    graph: Arc::clone(&graph),
                },
            );
        }
        graph
    }

    /// Return the fresh snapshot for `scope`, or build one from the edges
    /// `load` fetches.
    ///
    /// No lock is held while `load` runs. Two callers that miss at the same
    /// time both load, and the later insert wins.
    pub async fn get_or_load<F, Fut, E>(&self, scope: &Scope, load: F) -> Result<Arc<RelationshipGraph>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ForeignKeyEdge>, E>>,
    {
        if let Some(graph) = self.get(scope) {
            tracing::trace!(?scope, "relationship graph snapshot hit");
            return Ok(graph);
        }
        let edges = load().await?;
        tracing::debug!(?scope, edges = edges.len(), "relationship graph snapshot rebuilt");
        Ok(self.insert(scope.clone(), RelationshipGraph::build(edges)))
    }

    /// Drop every snapshot so the next lookup reloads from the catalog.
    pub fn refresh(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }
}

impl Default for GraphSnapshots {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixtures::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scope(schemas: &[&str]) -> Scope {
        schemas.iter().map(|s| s.to_string()).collect()
    }

    fn shop_edges() -> Vec<ForeignKeyEdge> {
        shop().edges().to_vec()
    }

    #[tokio::test]
    async fn test_loads_once_within_ttl() {
        let snapshots = GraphSnapshots::new(Duration::from_secs(60));
        let counter = AtomicUsize::new(0);
        let loads = &counter;
        let load = move || async move {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::convert::Infallible>(shop_edges())
        };

        let first = snapshots.get_or_load(&scope(&["public"]), load).await.unwrap();
        let second = snapshots.get_or_load(&scope(&["public"]), load).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.edge_count(), 3);
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let snapshots = GraphSnapshots::new(Duration::from_secs(60));
        snapshots.insert(scope(&["public"]), shop());
        assert!(snapshots.get(&scope(&["public"])).is_some());
        assert!(snapshots.get(&scope(&["public", "sales"])).is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_always_reloads() {
        let snapshots = GraphSnapshots::new(Duration::ZERO);
        let counter = AtomicUsize::new(0);
        let loads = &counter;
        let load = move || async move {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::convert::Infallible>(shop_edges())
        };
        snapshots.get_or_load(&scope(&["public"]), load).await.unwrap();
        snapshots.get_or_load(&scope(&["public"]), load).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_drops_snapshots_but_not_readers() {
        let snapshots = GraphSnapshots::new(Duration::from_secs(60));
        let held = snapshots.insert(scope(&["public"]), shop());
        snapshots.refresh();
        assert!(snapshots.get(&scope(&["public"])).is_none());
        assert_eq!(held.table_count(), 4);
    }

    #[tokio::test]
    async fn test_load_error_is_returned_and_not_cached() {
        let snapshots = GraphSnapshots::new(Duration::from_secs(60));
        let err = snapshots
            .get_or_load(&scope(&["public"]), || async { Err::<Vec<ForeignKeyEdge>, _>("catalog down") })
            .await
            .unwrap_err();
        assert_eq!(err, "catalog down");
        assert!(snapshots.get(&scope(&["public"])).is_none());
    }
}
