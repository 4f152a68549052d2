//! scoregraph-core: shared types for the score graph pipeline.
//!
//! This crate provides the foundational types used across all scoregraph components:
//! - The arena-backed score tree that ingestion walks and reconstruction rebuilds
//! - Vertex, edge, and staging record types exchanged with the graph store
//! - Property-bag coercion between in-memory values and stored values
//! - Configuration management
//! - Common error types

pub mod config;
pub mod error;
pub mod properties;
pub mod score;
pub mod vertex;

pub use error::ScoregraphError;
pub use properties::Properties;
pub use score::{KindTag, NodeId, NodeKind, ScoreNode, ScoreTree};
pub use vertex::{EdgeData, EdgeSpec, RelationshipType, RemoteRef, VertexData};
