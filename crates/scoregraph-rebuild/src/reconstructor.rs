//! Turn a sparse query result back into a typed score tree.
//!
//! Matched leaves are widened in phases before anything is rebuilt:
//!
//! 1. closure-up: each leaf's measure, part and score (plus metadata, staff
//!    groups and instruments);
//! 2. sibling fill: every measure between the first and last matched measure
//!    of each part;
//! 3. leaf fill: the notes and rests of every measure gathered so far;
//! 4. with `full`, one more hop along every containment type that ends at a
//!    gathered vertex.
//!
//! The typed rebuild then walks containment edges down from the single Score
//! vertex, handing each edge to its construction callback.

use std::collections::{BTreeSet, HashMap};

use scoregraph_core::config::RebuildSettings;
use scoregraph_core::properties::as_i64;
use scoregraph_core::{EdgeData, NodeId, NodeKind, RemoteRef, ScoreTree};
use scoregraph_graph::{Cell, QueryRows};

use crate::construct::{
    apply_residual, decoded, insert_or_append, ConstructRegistry, Construction, Outcome,
    RebuildState, SPANNER_REL,
};
use crate::error::{RebuildError, Result};
use crate::source::SubgraphSource;
use crate::working_set::WorkingSet;

/// Children fetched for every measure during leaf fill.
const LEAF_RELS: [&str; 2] = ["NoteInMeasure", "RestInMeasure"];

/// Containment types the one-hop expansion leaves alone.
const EXPANSION_EXCLUDED: [&str; 5] = [
    "NoteInMeasure",
    "RestInMeasure",
    "MomentInScore",
    "PartInScore",
    "MeasureInPart",
];

pub struct Reconstructor<'a, S: SubgraphSource + ?Sized> {
    source: &'a S,
    registry: &'a ConstructRegistry,
    leaf_fetch_limit: usize,
}

impl<'a, S: SubgraphSource + ?Sized> Reconstructor<'a, S> {
    pub fn new(source: &'a S, registry: &'a ConstructRegistry, settings: &RebuildSettings) -> Self {
        Self {
            source,
            registry,
            leaf_fetch_limit: settings.leaf_fetch_limit,
        }
    }

    /// Rebuild the score around `leaves`. `column_names[i]` is the query
    /// column that matched `leaves[i]` and ends up as its node's `query_name`.
    pub async fn reconstruct(
        &self,
        leaves: &[RemoteRef],
        column_names: &[String],
        full: bool,
    ) -> Result<ScoreTree> {
        if leaves.len() != column_names.len() {
            return Err(RebuildError::usage(format!(
                "{} leaves but {} column names",
                leaves.len(),
                column_names.len()
            )));
        }
        let ws = self.gather(leaves, full).await?;
        let tree = rebuild_tree(&ws, self.registry, leaves, column_names)?;
        tracing::info!(
            leaves = leaves.len(),
            vertices = ws.vertex_count(),
            edges = ws.edge_count(),
            nodes = tree.len(),
            "Score reconstructed"
        );
        Ok(tree)
    }

    /// Run the closure and fill phases.
    pub async fn gather(&self, leaves: &[RemoteRef], full: bool) -> Result<WorkingSet> {
        let mut ws = WorkingSet::new();

        let unique: BTreeSet<RemoteRef> = leaves.iter().copied().collect();
        for leaf in unique {
            ws.merge(self.source.closure_up(leaf).await?);
        }
        tracing::debug!(vertices = ws.vertex_count(), "Closure-up done");

        for (part, lo, hi) in measure_ranges(&ws)? {
            let added = ws.merge(self.source.measures_in_range(part, lo, hi).await?);
            tracing::debug!(part = part.0, lo, hi, added, "Sibling fill");
        }

        for measure in ws.of_type("Measure") {
            for rel_type in LEAF_RELS {
                let sub = self
                    .source
                    .children(measure, rel_type, self.leaf_fetch_limit)
                    .await?;
                ws.merge(sub);
            }
        }
        tracing::debug!(vertices = ws.vertex_count(), "Leaf fill done");

        if full {
            self.expand_one_hop(&mut ws).await?;
        }
        Ok(ws)
    }

    async fn expand_one_hop(&self, ws: &mut WorkingSet) -> Result<()> {
        let catalog = self.source.relationship_types().await?;
        let snapshot: Vec<(RemoteRef, String)> = ws
            .vertices()
            .filter_map(|v| Some((v.id, v.vertex_type()?.to_string())))
            .collect();

        for (id, vertex_type) in snapshot {
            let suffix = format!("In{vertex_type}");
            let rel_types: BTreeSet<&str> = catalog
                .iter()
                .filter(|r| r.end == vertex_type)
                .map(|r| r.rel_type.as_str())
                .filter(|t| t.ends_with(&suffix) || *t == SPANNER_REL)
                .filter(|t| !EXPANSION_EXCLUDED.contains(t))
                .collect();
            for rel_type in rel_types {
                let sub = self
                    .source
                    .children(id, rel_type, self.leaf_fetch_limit)
                    .await?;
                ws.merge(sub);
            }
        }
        tracing::debug!(vertices = ws.vertex_count(), "One-hop expansion done");
        Ok(())
    }
}

/// `(part, lowest, highest)` measure number per part with gathered measures.
fn measure_ranges(ws: &WorkingSet) -> Result<Vec<(RemoteRef, i64, i64)>> {
    let mut ranges = Vec::new();
    for part in ws.of_type("Part") {
        let mut bounds: Option<(i64, i64)> = None;
        for edge in ws.edges_into(part, "MeasureInPart") {
            let Some(measure) = ws.vertex(edge.start) else {
                continue;
            };
            let number = measure
                .properties
                .get("number")
                .and_then(as_i64)
                .ok_or_else(|| {
                    RebuildError::data(format!("measure {} has no number", measure.id))
                })?;
            bounds = Some(match bounds {
                Some((lo, hi)) => (lo.min(number), hi.max(number)),
                None => (number, number),
            });
        }
        if let Some((lo, hi)) = bounds {
            ranges.push((part, lo, hi));
        }
    }
    Ok(ranges)
}

/// Every vertex cell of the leaf columns, paired with its column name.
pub fn matched_leaves(rows: &QueryRows, leaf_columns: &[String]) -> (Vec<RemoteRef>, Vec<String>) {
    let mut seen = BTreeSet::new();
    let mut leaves = Vec::new();
    let mut names = Vec::new();
    let indices: Vec<(usize, &String)> = leaf_columns
        .iter()
        .filter_map(|c| Some((rows.column_index(c)?, c)))
        .collect();
    for row in &rows.rows {
        for (index, name) in &indices {
            if let Some(Cell::Vertex { id, .. }) = row.get(*index) {
                if seen.insert((*id, (*name).clone())) {
                    leaves.push(*id);
                    names.push((*name).clone());
                }
            }
        }
    }
    (leaves, names)
}

// ── Typed rebuild ────────────────────────────────────────────────

/// Build the tree from a gathered working set.
pub fn rebuild_tree(
    ws: &WorkingSet,
    registry: &ConstructRegistry,
    leaves: &[RemoteRef],
    column_names: &[String],
) -> Result<ScoreTree> {
    let root_ref = match ws.of_type("Score").as_slice() {
        [one] => *one,
        [] => return Err(RebuildError::data("no Score vertex among the fetched vertices")),
        many => {
            return Err(RebuildError::data(format!(
                "{} Score vertices among the fetched vertices",
                many.len()
            )))
        }
    };

    let mut state = RebuildState::new(ScoreTree::new(NodeKind::Score));
    let root = state.tree.root();
    state.register(root_ref, root);
    if let Some(vertex) = ws.vertex(root_ref) {
        apply_residual(&mut state.tree, root, decoded(&vertex.properties))?;
    }

    let mut by_end: HashMap<RemoteRef, Vec<&EdgeData>> = HashMap::new();
    for edge in ws.edges() {
        by_end.entry(edge.end).or_default().push(edge);
    }

    let mut walk = Walk {
        ws,
        registry,
        by_end,
        deferred: Vec::new(),
    };
    walk.attach(&mut state, root_ref, root)?;

    for edge in std::mem::take(&mut walk.deferred) {
        let (Some(_), Some(parent)) = (state.rebuilt(edge.start), state.rebuilt(edge.end)) else {
            tracing::warn!(
                edge = edge.id.0,
                rel_type = %edge.rel_type,
                "Deferred edge reaches outside the rebuilt tree, skipped"
            );
            continue;
        };
        let callback = registry.resolve(&edge.rel_type).ok_or_else(|| {
            RebuildError::usage(format!("no construction callback for {}", edge.rel_type))
        })?;
        let mut construction = walk.construction(edge, parent)?;
        callback(&mut state, &mut construction)?;
    }

    for (leaf, name) in leaves.iter().zip(column_names) {
        match state.rebuilt(*leaf) {
            Some(id) => state.tree.node_mut(id)?.query_name = Some(name.clone()),
            None => tracing::warn!(leaf = leaf.0, column = %name, "Matched leaf was not rebuilt"),
        }
    }
    Ok(state.tree)
}

struct Walk<'w> {
    ws: &'w WorkingSet,
    registry: &'w ConstructRegistry,
    by_end: HashMap<RemoteRef, Vec<&'w EdgeData>>,
    deferred: Vec<&'w EdgeData>,
}

impl<'w> Walk<'w> {
    fn construction(&self, edge: &'w EdgeData, parent: NodeId) -> Result<Construction<'w>> {
        let vertex = self.ws.vertex(edge.start).ok_or_else(|| {
            RebuildError::data(format!(
                "edge {} starts at vertex {}, which was not fetched",
                edge.id, edge.start
            ))
        })?;
        let child_type = vertex
            .vertex_type()
            .ok_or_else(|| RebuildError::data(format!("vertex {} has no type", vertex.id)))?
            .to_string();
        let kind = NodeKind::instantiate(&child_type).unwrap_or_else(|| NodeKind::Other {
            type_name: child_type.clone(),
        });
        Ok(Construction {
            edge,
            child: edge.start,
            child_type,
            parent,
            kind,
            props: decoded(&vertex.properties),
        })
    }

    /// Rebuild everything contained in `parent`, edges in ascending id order.
    fn attach(&mut self, state: &mut RebuildState, parent_ref: RemoteRef, parent: NodeId) -> Result<()> {
        let Some(edges) = self.by_end.get(&parent_ref).cloned() else {
            return Ok(());
        };
        let suffix = format!("In{}", state.tree.node(parent)?.kind.type_name());

        for edge in edges {
            if self.registry.is_deferred(&edge.rel_type) {
                self.deferred.push(edge);
                continue;
            }
            if !edge.rel_type.ends_with(&suffix) || state.rebuilt(edge.start).is_some() {
                continue;
            }
            let mut construction = self.construction(edge, parent)?;
            let outcome = match self.registry.resolve(&edge.rel_type) {
                Some(callback) => callback(&mut *state, &mut construction)?,
                None => insert_or_append(state, &mut construction)?,
            };
            match outcome {
                Outcome::Continue(id) => {
                    state.register(edge.start, id);
                    apply_residual(&mut state.tree, id, construction.props)?;
                    self.attach(state, edge.start, id)?;
                }
                Outcome::Registered(id) => state.register(edge.start, id),
                Outcome::Suppressed => {}
            }
        }
        Ok(())
    }
}
