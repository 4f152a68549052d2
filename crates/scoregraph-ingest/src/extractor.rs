//! Recursive score-tree → graph extraction.
//!
//! Every visited node gets a base vertex `{type, offset}`, then the callbacks
//! registered for its kind run. Unless one of them hides the node, its fields
//! are copied onto the vertex, the vertex is staged together with a
//! `<Type>In<ParentType>` edge, and its components and children are visited.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use scoregraph_core::properties::float;
use scoregraph_core::vertex::{containment_type, type_of, TYPE_KEY};
use scoregraph_core::{NodeId, NodeKind, Properties, ScoreTree};
use scoregraph_graph::StagingStore;

use crate::callbacks::{CallbackRegistry, Flow, Visit};
use crate::error::{IngestError, Result};
use crate::moments::PairTracker;

/// Prefix given to dictionary attributes that would clash with `type`.
const ATTR_TYPE_KEY: &str = "attr_type";

/// Vertices and edges written to staging by one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractCounts {
    pub vertices: usize,
    pub edges: usize,
}

/// The last note seen in one voice-leading chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeadingNote {
    pub note: NodeId,
    pub onset: f64,
    pub midi: i64,
}

/// State carried between callbacks during one extraction.
#[derive(Debug)]
pub struct ExtractState {
    /// Length of a bar in quarter notes, from the latest time signature.
    pub bar_duration: f64,
    pub clef: Option<String>,
    pub time_signature: Option<String>,
    pub key_sharps: Option<i64>,
    pub key_mode: Option<String>,
    /// Previous note per `(voice, by_beat)` chain.
    pub history: HashMap<(i64, bool), LeadingNote>,
    pub pairs: PairTracker,
}

impl Default for ExtractState {
    fn default() -> Self {
        Self {
            bar_duration: 4.0,
            clef: None,
            time_signature: None,
            key_sharps: None,
            key_mode: None,
            history: HashMap::new(),
            pairs: PairTracker::default(),
        }
    }
}

impl ExtractState {
    /// Forget everything carried within a part.
    pub fn reset_part(&mut self) {
        self.history.clear();
        self.clef = None;
        self.time_signature = None;
        self.key_sharps = None;
        self.key_mode = None;
    }
}

pub struct Extractor<'a> {
    tree: &'a ScoreTree,
    registry: &'a CallbackRegistry,
    staging: &'a mut StagingStore,
    state: ExtractState,
    seeds: HashMap<NodeId, Properties>,
    staged_types: HashMap<NodeId, String>,
    counts: ExtractCounts,
}

impl<'a> Extractor<'a> {
    pub fn new(
        tree: &'a ScoreTree,
        registry: &'a CallbackRegistry,
        staging: &'a mut StagingStore,
    ) -> Self {
        Self {
            tree,
            registry,
            staging,
            state: ExtractState::default(),
            seeds: HashMap::new(),
            staged_types: HashMap::new(),
            counts: ExtractCounts::default(),
        }
    }

    /// Walk the tree from `root` and stage everything reachable.
    pub fn extract(&mut self, root: NodeId) -> Result<ExtractCounts> {
        self.visit(root, None)?;
        tracing::info!(
            vertices = self.counts.vertices,
            edges = self.counts.edges,
            "Extracted score tree"
        );
        Ok(self.counts)
    }

    pub fn tree(&self) -> &'a ScoreTree {
        self.tree
    }

    pub fn state(&self) -> &ExtractState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ExtractState {
        &mut self.state
    }

    pub fn counts(&self) -> ExtractCounts {
        self.counts
    }

    /// Type of a staged vertex, after callbacks had their say.
    pub fn staged_type(&self, id: NodeId) -> Option<&str> {
        self.staged_types.get(&id).map(String::as_str)
    }

    /// Properties merged into the base vertex of `id` when it is visited later.
    pub fn seed(&mut self, id: NodeId, props: Properties) {
        self.seeds.entry(id).or_default().extend(props);
    }

    // ── Traversal ────────────────────────────────────────────────

    pub fn visit(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<()> {
        self.visit_with(id, parent, Properties::new())
    }

    /// Visit `id` as if it were a child of `parent`, with extra base properties.
    pub fn visit_with(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        seed: Properties,
    ) -> Result<()> {
        let tree = self.tree;
        let node = tree.node(id)?;

        let mut vertex = Properties::new();
        vertex.insert(TYPE_KEY.into(), Value::String(node.kind.type_name()));
        if let Some(offset) = node.offset {
            vertex.insert("offset".into(), float(offset));
        }
        if let Some(pending) = self.seeds.remove(&id) {
            vertex.extend(pending);
        }
        vertex.extend(seed);

        let mut visit = Visit {
            node: id,
            parent,
            vertex,
        };
        if self.run_callbacks(&node.kind, &mut visit)? == Flow::Hide {
            return Ok(());
        }

        for (key, value) in node.kind.fields() {
            visit.vertex.insert(key.to_string(), value);
        }
        for (key, value) in &node.extra {
            let key = if key == TYPE_KEY { ATTR_TYPE_KEY } else { key.as_str() };
            visit.vertex.insert(key.to_string(), value.clone());
        }

        let vertex_type = type_of(&visit.vertex)
            .map(str::to_string)
            .unwrap_or_else(|| node.kind.type_name());
        self.staging.add_vertex(id, parent, visit.vertex)?;
        self.counts.vertices += 1;
        if let Some(parent) = parent {
            let parent_type = self.staged_types.get(&parent).cloned().ok_or_else(|| {
                IngestError::data(format!("parent {parent} of {id} was never staged"))
            })?;
            self.add_edge(id, containment_type(&vertex_type, &parent_type), parent, None)?;
        }
        self.staged_types.insert(id, vertex_type);

        if node.kind.category() == Some(scoregraph_core::score::Category::Spanner)
            || matches!(node.kind, NodeKind::Moment { .. })
        {
            return Ok(());
        }
        for component in &node.components {
            self.visit(*component, Some(id))?;
        }
        for child in &node.children {
            self.visit(*child, Some(id))?;
        }
        Ok(())
    }

    fn run_callbacks(&mut self, kind: &NodeKind, visit: &mut Visit) -> Result<Flow> {
        let registry = self.registry;
        for callback in registry.resolve(kind) {
            if callback(&mut *self, &mut *visit)? == Flow::Hide {
                return Ok(Flow::Hide);
            }
        }
        Ok(Flow::Continue)
    }

    // ── Staging access for callbacks ─────────────────────────────

    pub fn add_edge(
        &mut self,
        start: NodeId,
        rel_type: impl Into<String>,
        end: NodeId,
        props: Option<Properties>,
    ) -> Result<()> {
        self.staging.add_edge(start, rel_type, end, props)?;
        self.counts.edges += 1;
        Ok(())
    }

    /// Overwrite one field of an already staged vertex.
    pub fn update_vertex(&mut self, id: NodeId, field: &str, value: Value) -> Result<()> {
        self.staging.update_vertex(id, field, value)?;
        Ok(())
    }
}
