//! The vertices and edges gathered for one reconstruction.

use std::collections::BTreeMap;

use scoregraph_core::{EdgeData, RemoteRef, VertexData};

use crate::source::Subgraph;

/// Everything fetched so far, keyed by remote identity.
///
/// Merging is idempotent: an entity already present is kept as it was.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    vertices: BTreeMap<RemoteRef, VertexData>,
    edges: BTreeMap<RemoteRef, EdgeData>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a fetched subgraph. Returns how many entities were new.
    pub fn merge(&mut self, sub: Subgraph) -> usize {
        let mut added = 0;
        for vertex in sub.vertices {
            if !self.vertices.contains_key(&vertex.id) {
                self.vertices.insert(vertex.id, vertex);
                added += 1;
            }
        }
        for edge in sub.edges {
            if !self.edges.contains_key(&edge.id) {
                self.edges.insert(edge.id, edge);
                added += 1;
            }
        }
        added
    }

    pub fn vertex(&self, id: RemoteRef) -> Option<&VertexData> {
        self.vertices.get(&id)
    }

    pub fn vertex_type(&self, id: RemoteRef) -> Option<&str> {
        self.vertices.get(&id).and_then(VertexData::vertex_type)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &VertexData> {
        self.vertices.values()
    }

    /// Identities of every vertex of `vertex_type`, ascending.
    pub fn of_type(&self, vertex_type: &str) -> Vec<RemoteRef> {
        self.vertices
            .values()
            .filter(|v| v.vertex_type() == Some(vertex_type))
            .map(|v| v.id)
            .collect()
    }

    /// Edges in ascending edge id order.
    pub fn edges(&self) -> impl Iterator<Item = &EdgeData> {
        self.edges.values()
    }

    /// Edges ending at `end` with the given type, ascending by edge id.
    pub fn edges_into<'a>(
        &'a self,
        end: RemoteRef,
        rel_type: &'a str,
    ) -> impl Iterator<Item = &'a EdgeData> + 'a {
        self.edges
            .values()
            .filter(move |e| e.end == end && e.rel_type == rel_type)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vertex(id: i64, vertex_type: &str) -> VertexData {
        VertexData {
            id: RemoteRef(id),
            properties: json!({ "type": vertex_type }).as_object().cloned().unwrap(),
        }
    }

    fn edge(id: i64, start: i64, rel_type: &str, end: i64) -> EdgeData {
        EdgeData {
            id: RemoteRef(id),
            start: RemoteRef(start),
            end: RemoteRef(end),
            rel_type: rel_type.into(),
            properties: Default::default(),
        }
    }

    #[test]
    fn test_merge_keeps_first_copy() {
        let mut ws = WorkingSet::new();
        let added = ws.merge(Subgraph {
            vertices: vec![vertex(1, "Measure"), vertex(2, "Part")],
            edges: vec![edge(10, 1, "MeasureInPart", 2)],
        });
        assert_eq!(added, 3);

        let again = ws.merge(Subgraph {
            vertices: vec![vertex(1, "Changed"), vertex(3, "Measure")],
            edges: vec![edge(10, 1, "MeasureInPart", 2)],
        });
        assert_eq!(again, 1);
        assert_eq!(ws.vertex_type(RemoteRef(1)), Some("Measure"));
        assert_eq!(ws.of_type("Measure"), vec![RemoteRef(1), RemoteRef(3)]);
        assert_eq!(ws.edge_count(), 1);
    }

    #[test]
    fn test_edges_into_filters_by_end_and_type() {
        let mut ws = WorkingSet::new();
        ws.merge(Subgraph {
            vertices: vec![],
            edges: vec![
                edge(12, 3, "MeasureInPart", 2),
                edge(10, 1, "MeasureInPart", 2),
                edge(11, 5, "InstrumentInPart", 2),
            ],
        });
        let ids: Vec<_> = ws.edges_into(RemoteRef(2), "MeasureInPart").map(|e| e.id.0).collect();
        assert_eq!(ids, vec![10, 12]);
    }
}
