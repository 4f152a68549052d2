//! Vertex and edge records exchanged between the pipeline stages and the store.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::properties::Properties;
use crate::score::NodeId;

/// Property key holding a vertex's or edge's type.
pub const TYPE_KEY: &str = "type";

/// Identity assigned by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemoteRef(pub i64);

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read the `type` property of a bag.
pub fn type_of(props: &Properties) -> Option<&str> {
    props.get(TYPE_KEY).and_then(|v| v.as_str())
}

// ── Local (staged) records ───────────────────────────────────────

/// A vertex waiting in the staging store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRecord {
    pub key: NodeId,
    pub parent_key: Option<NodeId>,
    pub vertex: Properties,
    pub remote_ref: Option<RemoteRef>,
}

impl From<&StagingRecord> for NodeId {
    fn from(record: &StagingRecord) -> Self {
        record.key
    }
}

/// An edge waiting in the staging store. Endpoints are staging keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub start: NodeId,
    pub rel_type: String,
    pub end: NodeId,
    pub properties: Properties,
    pub remote_ref: Option<RemoteRef>,
}

// ── Remote records ───────────────────────────────────────────────

/// An edge ready to be created remotely, endpoints already resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub start: RemoteRef,
    pub rel_type: String,
    pub end: RemoteRef,
    pub properties: Properties,
}

/// A vertex as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexData {
    pub id: RemoteRef,
    pub properties: Properties,
}

impl VertexData {
    pub fn vertex_type(&self) -> Option<&str> {
        type_of(&self.properties)
    }
}

/// An edge as read back from the store. Direction is child → parent for containment edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub id: RemoteRef,
    pub start: RemoteRef,
    pub end: RemoteRef,
    pub rel_type: String,
    pub properties: Properties,
}

/// One row of the relationship-type catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipType {
    pub start: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub end: String,
}

/// Name of the containment edge between a child and parent type.
pub fn containment_type(child_type: &str, parent_type: &str) -> String {
    format!("{child_type}In{parent_type}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containment_type() {
        assert_eq!(containment_type("Note", "Measure"), "NoteInMeasure");
    }

    #[test]
    fn test_relationship_type_serde() {
        let rt = RelationshipType {
            start: "Part".into(),
            rel_type: "PartInScore".into(),
            end: "Score".into(),
        };
        let json = serde_json::to_value(&rt).unwrap();
        assert_eq!(json["type"], "PartInScore");
        let back: RelationshipType = serde_json::from_value(json).unwrap();
        assert_eq!(back, rt);
    }
}
