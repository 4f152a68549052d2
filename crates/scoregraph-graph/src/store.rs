//! The remote store interface.

use async_trait::async_trait;
use neo4rs::{query, Query};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use scoregraph_core::vertex::RelationshipType;
use scoregraph_core::{EdgeData, EdgeSpec, Properties, RemoteRef, VertexData};

use crate::client::{GraphClient, GraphError};

/// A bound query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    IntList(Vec<i64>),
    TextList(Vec<String>),
}

/// Cypher text plus parameters. Rebuilt into a `neo4rs::Query` for every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub name: &'static str,
    pub text: String,
    pub params: Vec<(String, ParamValue)>,
}

impl Statement {
    pub fn new(name: &'static str, text: impl Into<String>) -> Self {
        Self {
            name,
            text: text.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: ParamValue) -> Self {
        self.params.push((key.to_string(), value));
        self
    }

    pub fn to_query(&self) -> Query {
        let mut q = query(&self.text);
        for (key, value) in &self.params {
            q = match value {
                ParamValue::Int(v) => q.param(key, *v),
                ParamValue::Float(v) => q.param(key, *v),
                ParamValue::Bool(v) => q.param(key, *v),
                ParamValue::Text(v) => q.param(key, v.clone()),
                ParamValue::IntList(v) => q.param(key, v.clone()),
                ParamValue::TextList(v) => q.param(key, v.clone()),
            };
        }
        q
    }
}

/// One column value of a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cell", rename_all = "snake_case")]
pub enum Cell {
    Vertex {
        id: RemoteRef,
        vertex_type: Option<String>,
    },
    Edge {
        id: RemoteRef,
        rel_type: Option<String>,
    },
    Value {
        value: Value,
    },
}

impl Cell {
    pub fn handle(&self) -> Option<EntityHandle> {
        match self {
            Self::Vertex { id, .. } => Some(EntityHandle::Vertex(*id)),
            Self::Edge { id, .. } => Some(EntityHandle::Edge(*id)),
            Self::Value { .. } => None,
        }
    }
}

/// A matched vertex or edge, by remote identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityHandle {
    Vertex(RemoteRef),
    Edge(RemoteRef),
}

/// Raw rows plus column names, as returned by a pattern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl QueryRows {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Every vertex or edge handle in the result, first occurrence order.
    pub fn handles(&self) -> Vec<EntityHandle> {
        let mut seen = std::collections::HashSet::new();
        self.rows
            .iter()
            .flatten()
            .filter_map(Cell::handle)
            .filter(|h| seen.insert(*h))
            .collect()
    }
}

/// Request/response interface to the property-graph store.
///
/// Batch creates must answer with one reference per request entry, in request
/// order: callers zip the two positionally. `batch_key` identifies the batch so
/// a retried request does not create duplicates.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn create_vertices(
        &self,
        batch: &[Properties],
        batch_key: Uuid,
    ) -> Result<Vec<RemoteRef>, GraphError>;

    async fn create_edges(
        &self,
        batch: &[EdgeSpec],
        batch_key: Uuid,
    ) -> Result<Vec<RemoteRef>, GraphError>;

    /// Run pattern text; `columns` names the values to read from every row.
    async fn execute(
        &self,
        text: &str,
        params: &[(String, ParamValue)],
        columns: &[String],
    ) -> Result<QueryRows, GraphError>;

    async fn delete_batch(&self, refs: &[RemoteRef]) -> Result<u64, GraphError>;

    async fn count_vertices(&self) -> Result<u64, GraphError>;

    async fn count_edges(&self) -> Result<u64, GraphError>;

    async fn relationship_type_catalog(&self) -> Result<Vec<RelationshipType>, GraphError>;

    /// Full property bags, in the order of `refs`. Unknown refs are left out.
    async fn vertex_properties(&self, refs: &[RemoteRef]) -> Result<Vec<VertexData>, GraphError>;

    /// Full edge records, in the order of `refs`. Unknown refs are left out.
    async fn edge_records(&self, refs: &[RemoteRef]) -> Result<Vec<EdgeData>, GraphError>;
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn create_vertices(
        &self,
        batch: &[Properties],
        batch_key: Uuid,
    ) -> Result<Vec<RemoteRef>, GraphError> {
        self.create_vertex_batch(batch, batch_key).await
    }

    async fn create_edges(
        &self,
        batch: &[EdgeSpec],
        batch_key: Uuid,
    ) -> Result<Vec<RemoteRef>, GraphError> {
        self.create_edge_batch(batch, batch_key).await
    }

    async fn execute(
        &self,
        text: &str,
        params: &[(String, ParamValue)],
        columns: &[String],
    ) -> Result<QueryRows, GraphError> {
        self.execute_pattern(text, params, columns).await
    }

    async fn delete_batch(&self, refs: &[RemoteRef]) -> Result<u64, GraphError> {
        self.delete_vertices(refs).await
    }

    async fn count_vertices(&self) -> Result<u64, GraphError> {
        self.count("MATCH (n) RETURN count(n) AS cnt").await
    }

    async fn count_edges(&self) -> Result<u64, GraphError> {
        self.count("MATCH ()-[r]->() RETURN count(r) AS cnt").await
    }

    async fn relationship_type_catalog(&self) -> Result<Vec<RelationshipType>, GraphError> {
        self.list_relationship_types().await
    }

    async fn vertex_properties(&self, refs: &[RemoteRef]) -> Result<Vec<VertexData>, GraphError> {
        self.fetch_vertices(refs).await
    }

    async fn edge_records(&self, refs: &[RemoteRef]) -> Result<Vec<EdgeData>, GraphError> {
        self.fetch_edges(refs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_deduplicate_in_order() {
        let rows = QueryRows {
            columns: vec!["n".into(), "r".into()],
            rows: vec![
                vec![
                    Cell::Vertex {
                        id: RemoteRef(4),
                        vertex_type: Some("Note".into()),
                    },
                    Cell::Edge {
                        id: RemoteRef(9),
                        rel_type: None,
                    },
                ],
                vec![
                    Cell::Vertex {
                        id: RemoteRef(4),
                        vertex_type: Some("Note".into()),
                    },
                    Cell::Value { value: Value::Null },
                ],
            ],
        };
        assert_eq!(
            rows.handles(),
            vec![
                EntityHandle::Vertex(RemoteRef(4)),
                EntityHandle::Edge(RemoteRef(9))
            ]
        );
        assert_eq!(rows.column_index("r"), Some(1));
    }

    #[test]
    fn test_statement_collects_params() {
        let stmt = Statement::new("probe", "RETURN $x")
            .param("x", ParamValue::Int(1))
            .param("names", ParamValue::TextList(vec!["a".into()]));
        assert_eq!(stmt.params.len(), 2);
        assert_eq!(stmt.params[0], ("x".to_string(), ParamValue::Int(1)));
    }
}
