//! Entities a pattern query is assembled from.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::client::GraphError;

/// Handle to a node of one [`QueryBuilder`](super::QueryBuilder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(pub(crate) usize);

/// Handle to a relationship of one [`QueryBuilder`](super::QueryBuilder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelRef(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Node(NodeRef),
    Rel(RelRef),
}

impl From<NodeRef> for EntityRef {
    fn from(node: NodeRef) -> Self {
        Self::Node(node)
    }
}

impl From<RelRef> for EntityRef {
    fn from(rel: RelRef) -> Self {
        Self::Rel(rel)
    }
}

/// A node to match, optionally typed and pinned to a store id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSpec {
    pub node_type: Option<String>,
    pub name: Option<String>,
    pub id: Option<i64>,
}

impl NodeSpec {
    pub fn typed(node_type: impl Into<String>) -> Self {
        Self {
            node_type: Some(node_type.into()),
            ..Self::default()
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A directed relationship to match. Missing endpoints become untyped nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelSpec {
    pub rel_type: Option<String>,
    pub start: Option<NodeRef>,
    pub end: Option<NodeRef>,
    pub optional: bool,
    pub name: Option<String>,
}

impl RelSpec {
    pub fn typed(rel_type: impl Into<String>) -> Self {
        Self {
            rel_type: Some(rel_type.into()),
            ..Self::default()
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn start(mut self, node: NodeRef) -> Self {
        self.start = Some(node);
        self
    }

    pub fn end(mut self, node: NodeRef) -> Self {
        self.end = Some(node);
        self
    }

    /// Match as an outer join.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Name used for the store-internal identity of a node or relationship.
pub const ID_PROPERTY: &str = "ID";

/// A property of a node or relationship, resolved only at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Property {
    pub owner: EntityRef,
    pub name: String,
}

impl Property {
    pub fn new(owner: impl Into<EntityRef>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn id(owner: impl Into<EntityRef>) -> Self {
        Self::new(owner, ID_PROPERTY)
    }

    pub fn is_id(&self) -> bool {
        self.name == ID_PROPERTY
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Property(Property),
    Literal(Value),
}

impl From<Property> for Operand {
    fn from(property: Property) -> Self {
        Self::Property(property)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl ComparisonOp {
    pub fn cypher(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cypher())
    }
}

impl FromStr for ComparisonOp {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(Self::Eq),
            "≠" | "<>" | "!=" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            ">" => Ok(Self::Gt),
            "≤" | "<=" => Ok(Self::Le),
            "≥" | ">=" => Ok(Self::Ge),
            other => Err(GraphError::Usage(format!(
                "unknown comparison operator '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Filter {
    Comparison {
        pre: Operand,
        op: ComparisonOp,
        post: Operand,
    },
    Raw(String),
}

/// Whether `name` can be used bare as a Cypher variable.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_spellings() {
        assert_eq!("≠".parse::<ComparisonOp>().unwrap(), ComparisonOp::Ne);
        assert_eq!("!=".parse::<ComparisonOp>().unwrap(), ComparisonOp::Ne);
        assert_eq!("<>".parse::<ComparisonOp>().unwrap(), ComparisonOp::Ne);
        assert_eq!("≥".parse::<ComparisonOp>().unwrap(), ComparisonOp::Ge);
        assert_eq!("<=".parse::<ComparisonOp>().unwrap(), ComparisonOp::Le);
        assert!("~".parse::<ComparisonOp>().is_err());
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("note_1"));
        assert!(is_identifier("_x"));
        assert!(!is_identifier("1note"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }
}
