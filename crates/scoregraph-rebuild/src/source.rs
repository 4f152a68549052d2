//! Where reconstruction gets its supplemental subgraphs from.
//!
//! Each method answers one hop of the closure or fill phases as a set of
//! vertices plus the edges that connect them. [`StoreSource`] compiles those
//! hops into patterns and runs them against a [`GraphStore`].

use async_trait::async_trait;
use serde_json::json;

use scoregraph_core::vertex::RelationshipType;
use scoregraph_core::{EdgeData, RemoteRef, VertexData};
use scoregraph_graph::query::{ComparisonOp, NodeSpec, Property, RelSpec};
use scoregraph_graph::{GraphError, GraphStore, QueryBuilder};

/// Rows fetched per closure pattern. One leaf rarely has more than a handful
/// of metadata, staff group and instrument combinations.
const CLOSURE_ROW_LIMIT: u32 = 100;

/// Rows fetched per measure-range pattern.
const RANGE_ROW_LIMIT: u32 = 10_000;

/// Vertices and edges returned by one supplemental fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subgraph {
    pub vertices: Vec<VertexData>,
    pub edges: Vec<EdgeData>,
}

#[async_trait]
pub trait SubgraphSource: Send + Sync {
    /// The leaf's measure, part and score, plus the score's metadata and
    /// staff groups and the part's instrument when present.
    async fn closure_up(&self, leaf: RemoteRef) -> Result<Subgraph, GraphError>;

    /// Every measure of `part` numbered `lo..=hi`, plus the part's instrument.
    async fn measures_in_range(
        &self,
        part: RemoteRef,
        lo: i64,
        hi: i64,
    ) -> Result<Subgraph, GraphError>;

    /// Up to `limit` children linked to `parent` by `rel_type`.
    async fn children(
        &self,
        parent: RemoteRef,
        rel_type: &str,
        limit: usize,
    ) -> Result<Subgraph, GraphError>;

    async fn relationship_types(&self) -> Result<Vec<RelationshipType>, GraphError>;
}

/// [`SubgraphSource`] backed by compiled patterns on a store.
pub struct StoreSource<'a, S: GraphStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: GraphStore + ?Sized> StoreSource<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    async fn fetch(&self, mut q: QueryBuilder, limit: u32) -> Result<Subgraph, GraphError> {
        let rows = q.execute(self.store, 0, limit).await?;
        let props = q.get_result_properties(self.store, &rows.handles()).await?;
        Ok(Subgraph {
            vertices: props.vertices,
            edges: props.edges,
        })
    }
}

#[async_trait]
impl<S: GraphStore + ?Sized> SubgraphSource for StoreSource<'_, S> {
    async fn closure_up(&self, leaf: RemoteRef) -> Result<Subgraph, GraphError> {
        let mut q = QueryBuilder::new();
        let leaf_node = q.add_node(NodeSpec::any().named("leaf").with_id(leaf.0))?;
        let measure = q.add_node(NodeSpec::typed("Measure").named("m"))?;
        let part = q.add_node(NodeSpec::typed("Part").named("p"))?;
        let score = q.add_node(NodeSpec::typed("Score").named("s"))?;
        q.set_start_node(leaf_node)?;

        q.add_relationship(RelSpec::any().named("lm").start(leaf_node).end(measure))?;
        q.add_relationship(
            RelSpec::typed("MeasureInPart")
                .named("mp")
                .start(measure)
                .end(part),
        )?;
        q.add_relationship(
            RelSpec::typed("PartInScore")
                .named("ps")
                .start(part)
                .end(score),
        )?;
        for (rel_type, name, end) in [
            ("MetadataInScore", "md", score),
            ("StaffGroupInScore", "sg", score),
            ("InstrumentInPart", "ip", part),
        ] {
            q.add_relationship(RelSpec::typed(rel_type).named(name).end(end).optional())?;
        }

        let sub = self.fetch(q, CLOSURE_ROW_LIMIT).await?;
        tracing::debug!(leaf = leaf.0, vertices = sub.vertices.len(), "Closure fetched");
        Ok(sub)
    }

    async fn measures_in_range(
        &self,
        part: RemoteRef,
        lo: i64,
        hi: i64,
    ) -> Result<Subgraph, GraphError> {
        let mut q = QueryBuilder::new();
        let part_node = q.add_node(NodeSpec::any().named("p").with_id(part.0))?;
        let measure = q.add_node(NodeSpec::typed("Measure").named("m"))?;
        q.set_start_node(part_node)?;
        q.add_relationship(
            RelSpec::typed("MeasureInPart")
                .named("mp")
                .start(measure)
                .end(part_node),
        )?;
        q.add_relationship(
            RelSpec::typed("InstrumentInPart")
                .named("ip")
                .end(part_node)
                .optional(),
        )?;
        q.add_comparison_filter(Property::new(measure, "number"), ComparisonOp::Ge, json!(lo))?;
        q.add_comparison_filter(Property::new(measure, "number"), ComparisonOp::Le, json!(hi))?;

        self.fetch(q, RANGE_ROW_LIMIT).await
    }

    async fn children(
        &self,
        parent: RemoteRef,
        rel_type: &str,
        limit: usize,
    ) -> Result<Subgraph, GraphError> {
        let mut q = QueryBuilder::new();
        let parent_node = q.add_node(NodeSpec::any().named("parent").with_id(parent.0))?;
        q.set_start_node(parent_node)?;
        q.add_relationship(RelSpec::typed(rel_type).named("r").end(parent_node))?;

        let limit = u32::try_from(limit).unwrap_or(u32::MAX);
        self.fetch(q, limit).await
    }

    async fn relationship_types(&self) -> Result<Vec<RelationshipType>, GraphError> {
        self.store.relationship_type_catalog().await
    }
}
