//! # pglens-graph
//!
//! Foreign-key relationship graph and join path search.
//!
//! [`RelationshipGraph::build`] groups foreign keys into outgoing and
//! incoming edges per table. [`find_paths`] searches that graph for the
//! shortest chains of joins between two tables and renders each as a
//! runnable SQL example. [`GraphSnapshots`] keeps built graphs around for a
//! configurable time so consecutive searches don't re-read the catalog.
//!
//! ```
//! use pglens_core::{ForeignKeyEdge, TableRef};
//! use pglens_graph::{RelationshipGraph, find_paths};
//!
//! let orders = TableRef::new("public", "orders");
//! let users = TableRef::new("public", "users");
//! let fk = ForeignKeyEdge::new(
//!     "orders_user_id_fkey",
//!     orders.clone(),
//!     vec!["user_id".into()],
//!     users.clone(),
//!     vec!["id".into()],
//! )
//! .unwrap();
//!
//! let graph = RelationshipGraph::build([fk]);
//! let paths = find_paths(&graph, &orders, &users, 4);
//! assert_eq!(
//!     paths[0].sql_example,
//!     "SELECT * FROM public.orders AS o INNER JOIN public.users AS u ON o.user_id = u.id"
//! );
//! ```

pub mod graph;
pub mod path;
pub mod render;
pub mod snapshot;

pub use graph::{Direction, RelationshipGraph};
pub use path::{
    DEFAULT_MAX_DEPTH, JoinPath, JoinStep, MAX_DEPTH_LIMIT, MAX_PATHS, PathSearch, clamp_depth, find_paths, search_paths,
};
pub use snapshot::{GraphSnapshots, Scope};
