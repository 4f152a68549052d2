//! Declarative graph-pattern queries.

pub mod builder;
pub mod entity;
pub mod spec;

pub use builder::{CompiledPattern, QueryBuilder, ResultProperties};
pub use entity::{ComparisonOp, EntityRef, NodeRef, NodeSpec, Operand, Property, RelRef, RelSpec};
pub use spec::{PreparedQuery, QuerySpec, LEAF_TYPES};
