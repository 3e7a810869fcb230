//! # pglens-runtime
//!
//! The seams between pglens and a database, and the pipeline that drives
//! statements through them.
//!
//! - [`CatalogAdapter`] supplies schema metadata.
//! - [`QueryAdapter`] runs one read-only statement under a timeout.
//! - [`QueryPipeline`] checks parameters, caps rows and time, shapes results
//!   and fingerprints the executed SQL. `EXPLAIN` and sample-row statements
//!   go through the same pipeline.

pub mod adapter;
pub mod catalog;
pub mod error;
pub mod explain;
pub mod pipeline;
pub mod sample;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapter::{QueryAdapter, QueryRequest, RawResult, ResultColumn, disambiguate_columns};
pub use catalog::CatalogAdapter;
pub use error::{CatalogError, ExecutionError};
pub use explain::{ExplainFormat, ExplainOptions, PlanSummary};
pub use pipeline::{ExplainOutput, QueryFailure, QueryOutput, QueryPipeline, SampleOutput, limited_sql, query_hash};
pub use sample::{SampleOrder, SampleQuery};
