//! JSON query documents.
//!
//! ```json
//! { "nodes": [ { "type": "Note", "name": "n1" }, { "type": "Note", "name": "n2" } ],
//!   "relationships": [ { "start": "n1", "type": "NoteSimultaneousWithNote", "end": "n2", "name": "s" } ],
//!   "startNode": "n1",
//!   "relationshipProperties": [ { "relationship": "s", "property": "simpleHarmonicInterval", "name": "shi" } ],
//!   "comparisonFilters": [ { "preType": "property", "pre": "shi", "operator": "=", "postType": "value", "post": 7 } ] }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::builder::QueryBuilder;
use super::entity::{EntityRef, NodeRef, NodeSpec, Operand, Property, RelRef, RelSpec};
use crate::client::GraphError;

/// Node types whose matches seed reconstruction.
pub const LEAF_TYPES: &[&str] = &["Note", "Rest"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    #[serde(default)]
    pub nodes: Vec<NodeDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_relationship: Option<String>,
    #[serde(default)]
    pub relationships: Vec<RelDecl>,
    #[serde(default)]
    pub node_properties: Vec<NodePropertyDecl>,
    #[serde(default)]
    pub relationship_properties: Vec<RelPropertyDecl>,
    #[serde(default)]
    pub comparison_filters: Vec<FilterDecl>,
    #[serde(default)]
    pub returns: Vec<ReturnDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDecl {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub rel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    pub name: String,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePropertyDecl {
    pub node: String,
    pub property: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelPropertyDecl {
    pub relationship: String,
    pub property: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandType {
    Property,
    Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDecl {
    pub pre_type: OperandType,
    pub pre: Value,
    pub operator: String,
    pub post_type: OperandType,
    pub post: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnDecl {
    pub property: String,
}

/// A built query together with the columns holding reconstruction leaves.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub builder: QueryBuilder,
    pub leaf_columns: Vec<String>,
}

impl QuerySpec {
    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        serde_json::from_str(text)
            .map_err(|e| GraphError::Serialization(format!("Invalid query document: {e}")))
    }

    /// Assemble the builder the document describes.
    pub fn into_builder(&self) -> Result<PreparedQuery, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Usage("query has no nodes".to_string()));
        }
        let mut q = QueryBuilder::new();
        let mut nodes: HashMap<&str, NodeRef> = HashMap::new();
        let mut rels: HashMap<&str, RelRef> = HashMap::new();
        let mut properties: HashMap<&str, Property> = HashMap::new();
        let mut leaf_columns = Vec::new();

        for decl in &self.nodes {
            let mut spec = NodeSpec {
                node_type: decl.node_type.clone(),
                name: Some(decl.name.clone()),
                id: None,
            };
            if let Some(id) = decl.id {
                spec = spec.with_id(id);
            }
            nodes.insert(&decl.name, q.add_node(spec)?);
            if decl
                .node_type
                .as_deref()
                .is_some_and(|t| LEAF_TYPES.contains(&t))
            {
                leaf_columns.push(decl.name.clone());
            }
        }

        let lookup_node = |nodes: &HashMap<&str, NodeRef>, name: &Option<String>| {
            name.as_deref()
                .map(|n| {
                    nodes
                        .get(n)
                        .copied()
                        .ok_or_else(|| GraphError::Usage(format!("unknown node '{n}'")))
                })
                .transpose()
        };
        for decl in &self.relationships {
            let spec = RelSpec {
                rel_type: decl.rel_type.clone(),
                start: lookup_node(&nodes, &decl.start)?,
                end: lookup_node(&nodes, &decl.end)?,
                optional: decl.optional,
                name: Some(decl.name.clone()),
            };
            rels.insert(&decl.name, q.add_relationship(spec)?);
        }

        match (&self.start_node, &self.start_relationship) {
            (Some(name), _) => {
                let node = nodes
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| GraphError::Usage(format!("unknown node '{name}'")))?;
                q.set_start_node(node)?;
            }
            (None, Some(name)) => {
                let rel = rels
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| GraphError::Usage(format!("unknown relationship '{name}'")))?;
                q.set_start_relationship(rel)?;
            }
            (None, None) => {
                return Err(GraphError::QueryCompilation(
                    "query has no startNode or startRelationship".to_string(),
                ))
            }
        }

        for decl in &self.node_properties {
            let node = nodes
                .get(decl.node.as_str())
                .copied()
                .ok_or_else(|| GraphError::Usage(format!("unknown node '{}'", decl.node)))?;
            properties.insert(&decl.name, Property::new(node, decl.property.clone()));
        }
        for decl in &self.relationship_properties {
            let rel = rels.get(decl.relationship.as_str()).copied().ok_or_else(|| {
                GraphError::Usage(format!("unknown relationship '{}'", decl.relationship))
            })?;
            properties.insert(&decl.name, Property::new(rel, decl.property.clone()));
        }

        for decl in &self.comparison_filters {
            let pre = operand(&properties, decl.pre_type, &decl.pre)?;
            let post = operand(&properties, decl.post_type, &decl.post)?;
            q.add_comparison_filter(pre, decl.operator.parse()?, post)?;
        }

        let mut returns = Vec::with_capacity(self.returns.len());
        for decl in &self.returns {
            let property = properties.get(decl.property.as_str()).ok_or_else(|| {
                GraphError::Usage(format!("unknown property '{}'", decl.property))
            })?;
            returns.push(property.clone());
        }
        if !returns.is_empty() {
            q.add_returns(returns)?;
        }

        Ok(PreparedQuery {
            builder: q,
            leaf_columns,
        })
    }
}

fn operand(
    properties: &HashMap<&str, Property>,
    kind: OperandType,
    raw: &Value,
) -> Result<Operand, GraphError> {
    match kind {
        OperandType::Value => Ok(Operand::Literal(raw.clone())),
        OperandType::Property => {
            let name = raw.as_str().ok_or_else(|| {
                GraphError::Usage(format!("property operand must be a name, got {raw}"))
            })?;
            properties
                .get(name)
                .cloned()
                .map(Operand::Property)
                .ok_or_else(|| GraphError::Usage(format!("unknown property '{name}'")))
        }
    }
}

impl PreparedQuery {
    /// Entity of a leaf column.
    pub fn leaf_entity(&self, column: &str) -> Option<EntityRef> {
        self.builder.find(column)
    }
}
