//! Per-relationship construction callbacks for the typed rebuild.
//!
//! Each containment edge followed during the rebuild is handed to the
//! callback registered for its relationship type, or to [`insert_or_append`]
//! when there is none. A callback may consume keys from the child's property
//! bag before the rest is assigned to the new node.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::Value;

use scoregraph_core::properties::{as_bool, as_f64, as_i64, from_stored};
use scoregraph_core::score::{clef_from_name, parse_pitch_name, parse_tuplets, OrnamentKind};
use scoregraph_core::vertex::TYPE_KEY;
use scoregraph_core::{EdgeData, KindTag, NodeId, NodeKind, Properties, RemoteRef, ScoreTree};

use crate::error::{RebuildError, Result};

/// Key the extractor gives to a dictionary attribute named `type`.
const ATTR_TYPE_KEY: &str = "attr_type";

pub const SPANNER_REL: &str = "spannerTo";
pub const STAFF_GROUP_REL: &str = "PartInStaffGroup";

/// What a construction callback did with the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Node inserted; remaining properties are assigned and its own children rebuilt.
    Continue(NodeId),
    /// Node inserted and complete. Its identity is recorded, nothing else happens.
    Registered(NodeId),
    /// Nothing inserted.
    Suppressed,
}

/// The child about to be rebuilt under an already rebuilt parent.
#[derive(Debug)]
pub struct Construction<'e> {
    pub edge: &'e EdgeData,
    /// Stored identity of the child vertex (the edge's start).
    pub child: RemoteRef,
    pub child_type: String,
    pub parent: NodeId,
    /// Default instance for `child_type`; callbacks may replace it.
    pub kind: NodeKind,
    /// The child's properties without `type`, already decoded from their stored form.
    pub props: Properties,
}

/// The tree under construction and the stored identities already placed in it.
#[derive(Debug)]
pub struct RebuildState {
    pub tree: ScoreTree,
    lookup: HashMap<RemoteRef, NodeId>,
    parts_with_measures: HashSet<NodeId>,
}

impl RebuildState {
    pub fn new(tree: ScoreTree) -> Self {
        Self {
            tree,
            lookup: HashMap::new(),
            parts_with_measures: HashSet::new(),
        }
    }

    pub fn register(&mut self, stored: RemoteRef, node: NodeId) {
        self.lookup.insert(stored, node);
    }

    pub fn rebuilt(&self, stored: RemoteRef) -> Option<NodeId> {
        self.lookup.get(&stored).copied()
    }

    /// Node rebuilt for `stored`, which a deferred callback needs to exist.
    pub fn endpoint(&self, stored: RemoteRef) -> Result<NodeId> {
        self.rebuilt(stored).ok_or_else(|| {
            RebuildError::usage(format!("vertex {stored} has not been rebuilt"))
        })
    }

    /// Attach `kind` under `parent` the way the parent holds that kind of object.
    pub fn insert(&mut self, parent: NodeId, kind: NodeKind, offset: Option<f64>) -> Result<NodeId> {
        if kind.is_component() {
            return Ok(self.tree.add_component(parent, kind)?);
        }
        let holder = &self.tree.node(parent)?.kind;
        if !holder.accepts_children() {
            return Err(RebuildError::usage(format!(
                "a {} cannot hold a {}",
                holder.type_name(),
                kind.type_name()
            )));
        }
        Ok(match offset {
            Some(offset) => self.tree.insert_at(parent, kind, offset)?,
            None => self.tree.add_child(parent, kind, None)?,
        })
    }

    /// True the first time it is asked about `part`.
    fn first_measure_of(&mut self, part: NodeId) -> bool {
        self.parts_with_measures.insert(part)
    }
}

pub type ConstructFn =
    Box<dyn Fn(&mut RebuildState, &mut Construction<'_>) -> Result<Outcome> + Send + Sync>;

/// Construction callbacks keyed by relationship type.
///
/// Deferred types run in a second pass, once every node reachable through
/// plain containment exists.
#[derive(Default)]
pub struct ConstructRegistry {
    callbacks: HashMap<String, ConstructFn>,
    deferred: HashSet<String>,
}

impl fmt::Debug for ConstructRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.callbacks.keys().collect();
        types.sort();
        f.debug_struct("ConstructRegistry")
            .field("types", &types)
            .field("deferred", &self.deferred)
            .finish()
    }
}

impl ConstructRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, rel_type: impl Into<String>, callback: F) -> &mut Self
    where
        F: Fn(&mut RebuildState, &mut Construction<'_>) -> Result<Outcome> + Send + Sync + 'static,
    {
        let rel_type = rel_type.into();
        self.deferred.remove(&rel_type);
        self.callbacks.insert(rel_type, Box::new(callback));
        self
    }

    pub fn register_deferred<F>(&mut self, rel_type: impl Into<String>, callback: F) -> &mut Self
    where
        F: Fn(&mut RebuildState, &mut Construction<'_>) -> Result<Outcome> + Send + Sync + 'static,
    {
        let rel_type = rel_type.into();
        self.deferred.insert(rel_type.clone());
        self.callbacks.insert(rel_type, Box::new(callback));
        self
    }

    pub fn resolve(&self, rel_type: &str) -> Option<&ConstructFn> {
        self.callbacks.get(rel_type)
    }

    pub fn is_deferred(&self, rel_type: &str) -> bool {
        self.deferred.contains(rel_type)
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register("ContributorInMetadata", contributor_names)
            .register("PartInScore", part_in_score)
            .register("MeasureInPart", measure_context)
            .register("MidmeasureClefInMeasure", midmeasure_clef)
            .register("NoteInMeasure", note_in_measure)
            .register("RestInMeasure", rest_in_measure)
            .register("ExpressionInNote", ornament_in_note)
            .register("ArticulationInNote", ornament_in_note)
            .register_deferred(STAFF_GROUP_REL, part_in_staff_group)
            .register_deferred(SPANNER_REL, spanner_to);
        registry
    }
}

// ── Property handling ────────────────────────────────────────────

/// A stored property bag without `type`, values decoded.
pub fn decoded(stored: &Properties) -> Properties {
    stored
        .iter()
        .filter(|(key, _)| key.as_str() != TYPE_KEY)
        .map(|(key, value)| (key.clone(), from_stored(value)))
        .collect()
}

/// Assign what the callbacks left over: `offset`, then the kind's own
/// fields, then the node's `extra` map.
pub fn apply_residual(tree: &mut ScoreTree, id: NodeId, props: Properties) -> Result<()> {
    let node = tree.node_mut(id)?;
    for (key, value) in props {
        if key == TYPE_KEY {
            continue;
        }
        if key == "offset" {
            node.offset = as_f64(&value);
            continue;
        }
        if node.kind.set_field(&key, &value)? {
            continue;
        }
        let key = if key == ATTR_TYPE_KEY {
            TYPE_KEY.to_string()
        } else {
            key
        };
        node.extra.insert(key, value);
    }
    Ok(())
}

fn offset_of(props: &Properties) -> Option<f64> {
    props.get("offset").and_then(as_f64)
}

fn take_flag(props: &mut Properties, key: &str) -> bool {
    props.remove(key).and_then(|v| as_bool(&v)).unwrap_or(false)
}

fn take_text(props: &mut Properties, key: &str) -> Option<String> {
    match props.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Duration component from the duration keys lifted onto a note or rest.
fn take_duration(props: &mut Properties, with_grace: bool) -> Option<NodeKind> {
    let quarter_length = props.remove("quarterLength").and_then(|v| as_f64(&v));
    let tuplets = take_text(props, "tuplet")
        .map(|t| parse_tuplets(&t))
        .unwrap_or_default();
    let (mut is_grace, mut steal_previous, mut steal_following, mut slash) =
        (false, None, None, None);
    if with_grace {
        is_grace = take_flag(props, "isGrace");
        steal_previous = props.remove("stealTimePrevious").and_then(|v| as_f64(&v));
        steal_following = props.remove("stealTimeFollowing").and_then(|v| as_f64(&v));
        slash = props.remove("slash").and_then(|v| as_bool(&v));
    }
    if quarter_length.is_none() && !is_grace {
        return None;
    }
    Some(NodeKind::Duration {
        quarter_length: quarter_length.unwrap_or(0.0),
        tuplets,
        is_grace,
        steal_time_previous: steal_previous,
        steal_time_following: steal_following,
        slash,
    })
}

fn parse_time_signature(text: &str) -> Result<NodeKind> {
    let parsed = text.split_once('/').and_then(|(n, d)| {
        Some((n.trim().parse::<u32>().ok()?, d.trim().parse::<u32>().ok()?))
    });
    match parsed {
        Some((numerator, denominator)) if denominator > 0 => Ok(NodeKind::TimeSignature {
            numerator,
            denominator,
        }),
        _ => Err(RebuildError::data(format!("malformed time signature {text:?}"))),
    }
}

// ── Default callbacks ────────────────────────────────────────────

/// Insert the child into the parent's stream (by offset when it has one) or
/// attach it as a component.
pub fn insert_or_append(state: &mut RebuildState, c: &mut Construction<'_>) -> Result<Outcome> {
    let id = state.insert(c.parent, c.kind.clone(), offset_of(&c.props))?;
    Ok(Outcome::Continue(id))
}

fn contributor_names(state: &mut RebuildState, c: &mut Construction<'_>) -> Result<Outcome> {
    if let Some(names) = c.props.remove("names") {
        c.kind.set_field("names", &names)?;
    }
    insert_or_append(state, c)
}

/// Part numbers are derived on import.
fn part_in_score(state: &mut RebuildState, c: &mut Construction<'_>) -> Result<Outcome> {
    c.props.remove("number");
    insert_or_append(state, c)
}

/// Restore the clef, key and time signature carried on the measure vertex
/// where they changed, and on the first measure of each part.
fn measure_context(state: &mut RebuildState, c: &mut Construction<'_>) -> Result<Outcome> {
    let clef = take_text(&mut c.props, "clef");
    let time_signature = take_text(&mut c.props, "timeSignature");
    let sharps = c.props.remove("keySignatureSharps").and_then(|v| as_i64(&v));
    let mode = take_text(&mut c.props, "keySignatureMode");
    let clef_new = take_flag(&mut c.props, "clefIsNew");
    let time_new = take_flag(&mut c.props, "timeSignatureIsNew");
    let key_new = take_flag(&mut c.props, "keyIsNew");

    let measure = state.insert(c.parent, c.kind.clone(), offset_of(&c.props))?;
    let first = state.first_measure_of(c.parent);

    if let Some(name) = clef.filter(|_| clef_new || first) {
        let kind = clef_from_name(&name)
            .ok_or_else(|| RebuildError::data(format!("unknown clef {name:?}")))?;
        state.tree.insert_at(measure, kind, 0.0)?;
    }
    if let Some(sharps) = sharps.filter(|_| key_new || first) {
        state
            .tree
            .insert_at(measure, NodeKind::KeySignature { sharps, mode }, 0.0)?;
    }
    if let Some(text) = time_signature.filter(|_| time_new || first) {
        state.tree.insert_at(measure, parse_time_signature(&text)?, 0.0)?;
    }
    Ok(Outcome::Continue(measure))
}

fn midmeasure_clef(state: &mut RebuildState, c: &mut Construction<'_>) -> Result<Outcome> {
    let name = take_text(&mut c.props, "name")
        .ok_or_else(|| RebuildError::data(format!("midmeasure clef {} has no name", c.child)))?;
    c.kind = clef_from_name(&name)
        .ok_or_else(|| RebuildError::data(format!("unknown clef {name:?}")))?;
    insert_or_append(state, c)
}

fn note_in_measure(state: &mut RebuildState, c: &mut Construction<'_>) -> Result<Outcome> {
    let pitch = take_text(&mut c.props, "pitch");
    c.props.remove("midi");
    let microtone = c
        .props
        .remove("microtone")
        .and_then(|v| as_f64(&v))
        .unwrap_or(0.0);
    let duration = take_duration(&mut c.props, true);

    let note = state.insert(c.parent, c.kind.clone(), offset_of(&c.props))?;
    if let Some(name) = pitch {
        let (step, alter, octave) = parse_pitch_name(&name)
            .ok_or_else(|| RebuildError::data(format!("malformed pitch {name:?}")))?;
        state.tree.add_component(
            note,
            NodeKind::Pitch {
                step,
                octave,
                alter,
                microtone,
            },
        )?;
    }
    if let Some(duration) = duration {
        state.tree.add_component(note, duration)?;
    }
    Ok(Outcome::Continue(note))
}

fn rest_in_measure(state: &mut RebuildState, c: &mut Construction<'_>) -> Result<Outcome> {
    let duration = take_duration(&mut c.props, false);
    let rest = state.insert(c.parent, c.kind.clone(), offset_of(&c.props))?;
    if let Some(duration) = duration {
        state.tree.add_component(rest, duration)?;
    }
    Ok(Outcome::Continue(rest))
}

fn ornament_in_note(state: &mut RebuildState, c: &mut Construction<'_>) -> Result<Outcome> {
    let name = take_text(&mut c.props, "name").unwrap_or_default();
    let ornament = OrnamentKind::from_name(&name).ok_or_else(|| {
        RebuildError::data(format!("unknown {} {name:?}", c.child_type))
    })?;
    c.kind = NodeKind::Ornament {
        ornament,
        size: None,
    };
    insert_or_append(state, c)
}

fn part_in_staff_group(state: &mut RebuildState, c: &mut Construction<'_>) -> Result<Outcome> {
    let part = state.endpoint(c.edge.start)?;
    let group = state.endpoint(c.edge.end)?;
    match &mut state.tree.node_mut(group)?.kind {
        NodeKind::StaffGroup { parts, .. } => {
            if !parts.contains(&part) {
                parts.push(part);
            }
            Ok(Outcome::Suppressed)
        }
        other => Err(RebuildError::usage(format!(
            "{STAFF_GROUP_REL} ends at a {}",
            other.type_name()
        ))),
    }
}

/// Rebuild a slur from its edge and hang it in the measure of its first note.
fn spanner_to(state: &mut RebuildState, c: &mut Construction<'_>) -> Result<Outcome> {
    let first = state.endpoint(c.edge.start)?;
    let last = state.endpoint(c.edge.end)?;

    let mut props = decoded(&c.edge.properties);
    let name = take_text(&mut props, "name").unwrap_or_else(|| "Slur".to_string());
    if name != "Slur" {
        return Err(RebuildError::data(format!("unsupported spanner {name:?}")));
    }
    let mut kind = NodeKind::Slur {
        first,
        last,
        line_type: None,
    };
    for (key, value) in &props {
        kind.set_field(key, value)?;
    }

    let holder = state
        .tree
        .ancestor_of_kind(first, KindTag::Measure)?
        .unwrap_or_else(|| state.tree.root());
    let slur = state.tree.add_child(holder, kind, None)?;
    Ok(Outcome::Registered(slur))
}
