//! scoregraph-graph: everything that talks to the property-graph store.
//!
//! The [`GraphStore`] trait is the seam between the pipeline and Neo4j. The
//! staging layer buffers extracted vertices and edges and commits them through
//! it in order-preserving batches; the query builder compiles pattern entities
//! into Cypher and executes them through the same trait.

pub mod client;
pub mod mutations;
pub mod queries;
pub mod query;
pub mod staging;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use queries::{PropertyValues, ScoreSummary};
pub use query::{QueryBuilder, QuerySpec};
pub use staging::StagingStore;
pub use store::{Cell, EntityHandle, GraphStore, ParamValue, QueryRows, Statement};
