//! Arena-backed score tree.
//!
//! Nodes live in one `Vec` and refer to each other by [`NodeId`]. Moments and
//! spanners hold ids of the notes they cover, never the notes themselves, so a
//! node's lifetime is that of the tree.

mod kind;

pub use kind::{
    clef_from_name, clef_name, parse_pitch_name, parse_tuplets, pitch_midi, pitch_name,
    tuplet_text, Category, KindTag, NodeKind, OrnamentKind, Tuplet,
};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoregraphError};
use crate::properties::Properties;

/// Index of a node in its [`ScoreTree`]. Also the staging identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreNode {
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Position relative to the parent stream.
    #[serde(default)]
    pub offset: Option<f64>,
    #[serde(default)]
    pub parent: Option<NodeId>,
    /// Stream elements, in order.
    #[serde(default)]
    pub children: Vec<NodeId>,
    /// Attribute-owned objects (pitch, duration, beams, ornaments, ...).
    #[serde(default)]
    pub components: Vec<NodeId>,
    /// Dictionary attributes, merged straight into the vertex.
    #[serde(default)]
    pub extra: Properties,
    /// Set on rebuilt nodes that were hits of the originating query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_name: Option<String>,
}

impl ScoreNode {
    pub fn new(kind: NodeKind, offset: Option<f64>) -> Self {
        Self {
            kind,
            offset,
            parent: None,
            children: Vec::new(),
            components: Vec::new(),
            extra: Properties::new(),
            query_name: None,
        }
    }

    pub fn tag(&self) -> KindTag {
        self.kind.tag()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTree {
    nodes: Vec<ScoreNode>,
    root: NodeId,
}

impl ScoreTree {
    /// A tree holding only its root.
    pub fn new(root: NodeKind) -> Self {
        Self {
            nodes: vec![ScoreNode::new(root, Some(0.0))],
            root: NodeId(0),
        }
    }

    /// Parse a serialized tree and check that every index resolves.
    pub fn from_json(text: &str) -> Result<Self> {
        let tree: ScoreTree = serde_json::from_str(text)?;
        tree.validate()?;
        Ok(tree)
    }

    pub fn validate(&self) -> Result<()> {
        self.node(self.root)?;
        for (i, node) in self.nodes.iter().enumerate() {
            for id in node.children.iter().chain(&node.components) {
                let child = self.node(*id)?;
                if child.parent != Some(NodeId(i)) {
                    return Err(ScoregraphError::data(format!(
                        "node {id} is listed under #{i} but its parent is {:?}",
                        child.parent
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&ScoreNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| ScoregraphError::data(format!("node {id} is not in the tree")))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut ScoreNode> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| ScoregraphError::data(format!("node {id} is not in the tree")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ScoreNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    // ── Construction ─────────────────────────────────────────────

    fn push(&mut self, parent: NodeId, kind: NodeKind, offset: Option<f64>) -> Result<NodeId> {
        self.node(parent)?;
        let id = NodeId(self.nodes.len());
        let mut node = ScoreNode::new(kind, offset);
        node.parent = Some(parent);
        self.nodes.push(node);
        Ok(id)
    }

    /// Append a stream element.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        offset: Option<f64>,
    ) -> Result<NodeId> {
        let id = self.push(parent, kind, offset)?;
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Insert a stream element ordered by offset, after any element at the same offset.
    pub fn insert_at(&mut self, parent: NodeId, kind: NodeKind, offset: f64) -> Result<NodeId> {
        let id = self.push(parent, kind, Some(offset))?;
        let position = {
            let siblings = &self.node(parent)?.children;
            let mut position = siblings.len();
            for (i, sibling) in siblings.iter().enumerate() {
                if self.node(*sibling)?.offset.unwrap_or(0.0) > offset {
                    position = i;
                    break;
                }
            }
            position
        };
        self.node_mut(parent)?.children.insert(position, id);
        Ok(id)
    }

    /// Attach an attribute-owned object.
    pub fn add_component(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId> {
        let id = self.push(parent, kind, None)?;
        self.node_mut(parent)?.components.push(id);
        Ok(id)
    }

    // ── Navigation ───────────────────────────────────────────────

    /// Offset from the root: the sum of offsets up the parent chain.
    pub fn absolute_offset(&self, id: NodeId) -> Result<f64> {
        let mut total = 0.0;
        let mut current = Some(id);
        while let Some(c) = current {
            let node = self.node(c)?;
            total += node.offset.unwrap_or(0.0);
            current = node.parent;
        }
        Ok(total)
    }

    pub fn component_of_kind(&self, id: NodeId, tag: KindTag) -> Result<Option<NodeId>> {
        for c in &self.node(id)?.components {
            if self.node(*c)?.tag() == tag {
                return Ok(Some(*c));
            }
        }
        Ok(None)
    }

    /// Closest ancestor (excluding `id`) of the given kind.
    pub fn ancestor_of_kind(&self, id: NodeId, tag: KindTag) -> Result<Option<NodeId>> {
        let mut current = self.node(id)?.parent;
        while let Some(c) = current {
            let node = self.node(c)?;
            if node.tag() == tag {
                return Ok(Some(c));
            }
            current = node.parent;
        }
        Ok(None)
    }

    /// MIDI number from the node's Pitch component, if it has one.
    pub fn midi(&self, id: NodeId) -> Result<Option<i64>> {
        let Some(pitch) = self.component_of_kind(id, KindTag::Pitch)? else {
            return Ok(None);
        };
        match &self.node(pitch)?.kind {
            NodeKind::Pitch {
                step,
                octave,
                alter,
                ..
            } => pitch_midi(step, *octave, *alter)
                .map(Some)
                .ok_or_else(|| ScoregraphError::data(format!("unknown pitch step {step:?}"))),
            _ => Ok(None),
        }
    }

    /// Length in quarter notes from the Duration component; zero without one.
    pub fn quarter_length(&self, id: NodeId) -> Result<f64> {
        let Some(duration) = self.component_of_kind(id, KindTag::Duration)? else {
            return Ok(0.0);
        };
        match &self.node(duration)?.kind {
            NodeKind::Duration { quarter_length, .. } => Ok(*quarter_length),
            _ => Ok(0.0),
        }
    }

    /// Stream elements of the given kind in document order (components excluded).
    pub fn descendants_of_kind(&self, tag: KindTag) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.node(id)?;
            if node.tag() == tag {
                out.push(id);
            }
            stack.extend(node.children.iter().rev());
        }
        Ok(out)
    }

    /// Notes in document order.
    pub fn leaves(&self) -> Result<Vec<NodeId>> {
        self.descendants_of_kind(KindTag::Note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(tree: &mut ScoreTree, parent: NodeId, offset: f64, step: &str, ql: f64) -> NodeId {
        let n = tree
            .add_child(
                parent,
                NodeKind::Note {
                    stem_direction: None,
                },
                Some(offset),
            )
            .unwrap();
        tree.add_component(
            n,
            NodeKind::Pitch {
                step: step.into(),
                octave: 4,
                alter: 0.0,
                microtone: 0.0,
            },
        )
        .unwrap();
        tree.add_component(
            n,
            NodeKind::Duration {
                quarter_length: ql,
                tuplets: vec![],
                is_grace: false,
                steal_time_previous: None,
                steal_time_following: None,
                slash: None,
            },
        )
        .unwrap();
        n
    }

    #[test]
    fn test_absolute_offset_and_components() {
        let mut tree = ScoreTree::new(NodeKind::Score);
        let part = tree
            .add_child(
                tree.root(),
                NodeKind::Part {
                    part_id: None,
                    part_name: None,
                },
                Some(0.0),
            )
            .unwrap();
        let m2 = tree
            .add_child(part, NodeKind::Measure { number: 2 }, Some(4.0))
            .unwrap();
        let n = note(&mut tree, m2, 1.5, "E", 0.5);

        assert_eq!(tree.absolute_offset(n).unwrap(), 5.5);
        assert_eq!(tree.midi(n).unwrap(), Some(64));
        assert_eq!(tree.quarter_length(n).unwrap(), 0.5);
        assert_eq!(tree.ancestor_of_kind(n, KindTag::Part).unwrap(), Some(part));
    }

    #[test]
    fn test_insert_at_keeps_offset_order() {
        let mut tree = ScoreTree::new(NodeKind::Score);
        let root = tree.root();
        let a = tree.insert_at(root, NodeKind::Rest, 2.0).unwrap();
        let b = tree.insert_at(root, NodeKind::Rest, 0.0).unwrap();
        let c = tree.insert_at(root, NodeKind::Rest, 2.0).unwrap();
        assert_eq!(tree.node(root).unwrap().children, vec![b, a, c]);
    }

    #[test]
    fn test_missing_node_is_data_error() {
        let tree = ScoreTree::new(NodeKind::Score);
        let err = tree.node(NodeId(9)).unwrap_err();
        assert!(matches!(err, ScoregraphError::Data(_)));
    }

    #[test]
    fn test_json_round_trip_validates() {
        let mut tree = ScoreTree::new(NodeKind::Score);
        let root = tree.root();
        note(&mut tree, root, 0.0, "C", 1.0);
        let text = serde_json::to_string(&tree).unwrap();
        let back = ScoreTree::from_json(&text).unwrap();
        assert_eq!(back, tree);

        let broken = text.replace("\"parent\":0", "\"parent\":5");
        assert!(ScoreTree::from_json(&broken).is_err());
    }

    #[test]
    fn test_descendants_in_document_order() {
        let mut tree = ScoreTree::new(NodeKind::Score);
        let root = tree.root();
        let m = tree
            .add_child(root, NodeKind::Measure { number: 1 }, Some(0.0))
            .unwrap();
        let chord = tree.add_child(m, NodeKind::Chord, Some(0.0)).unwrap();
        let low = note(&mut tree, chord, 0.0, "C", 1.0);
        let high = note(&mut tree, chord, 0.0, "G", 1.0);
        let after = note(&mut tree, m, 1.0, "D", 1.0);
        assert_eq!(
            tree.descendants_of_kind(KindTag::Note).unwrap(),
            vec![low, high, after]
        );
    }
}
