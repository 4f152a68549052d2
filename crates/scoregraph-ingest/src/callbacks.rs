//! Kind-keyed extraction callbacks.
//!
//! A registry maps a node kind (or, as a fallback, its abstract category) to an
//! ordered list of callbacks. They run before a node is staged and may rewrite
//! its base vertex, add edges, visit other nodes explicitly, or hide the node.

use serde_json::{json, Value};

use scoregraph_core::properties::{as_i64, bool_text, float};
use scoregraph_core::score::{clef_name, pitch_midi, pitch_name, tuplet_text, Category};
use scoregraph_core::vertex::TYPE_KEY;
use scoregraph_core::{KindTag, NodeId, NodeKind, Properties};

use crate::error::{IngestError, Result};
use crate::extractor::{Extractor, LeadingNote};
use crate::moments::pairwise_intervals;

/// Whether extraction of a node goes on after a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// No vertex, no edges, children not visited.
    Hide,
}

/// The node being visited and its vertex under construction.
#[derive(Debug)]
pub struct Visit {
    pub node: NodeId,
    /// Parent the node will be attached to, which is not always its tree parent.
    pub parent: Option<NodeId>,
    pub vertex: Properties,
}

pub type Callback = Box<dyn Fn(&mut Extractor<'_>, &mut Visit) -> Result<Flow> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKey {
    Kind(KindTag),
    Category(Category),
}

/// Ordered callbacks, built once and shared read-only by an extraction.
#[derive(Default)]
pub struct CallbackRegistry {
    entries: Vec<(CallbackKey, Callback)>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: CallbackKey, callback: Callback) -> &mut Self {
        self.entries.push((key, callback));
        self
    }

    pub fn on_kind<F>(&mut self, tag: KindTag, callback: F) -> &mut Self
    where
        F: Fn(&mut Extractor<'_>, &mut Visit) -> Result<Flow> + Send + Sync + 'static,
    {
        self.register(CallbackKey::Kind(tag), Box::new(callback))
    }

    pub fn on_category<F>(&mut self, category: Category, callback: F) -> &mut Self
    where
        F: Fn(&mut Extractor<'_>, &mut Visit) -> Result<Flow> + Send + Sync + 'static,
    {
        self.register(CallbackKey::Category(category), Box::new(callback))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Callbacks for `kind`: those under its exact tag, or under its category
    /// when the tag has none.
    pub fn resolve<'r>(&'r self, kind: &NodeKind) -> impl Iterator<Item = &'r Callback> + 'r {
        let exact = CallbackKey::Kind(kind.tag());
        let key = if self.entries.iter().any(|(k, _)| *k == exact) {
            Some(exact)
        } else {
            kind.category().map(CallbackKey::Category)
        };
        self.entries
            .iter()
            .filter(move |(k, _)| Some(*k) == key)
            .map(|(_, callback)| callback)
    }

    /// The score importer's callbacks.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .on_kind(KindTag::Score, number_parts)
            .on_kind(KindTag::Part, reset_part_state)
            .on_kind(KindTag::Measure, carry_measure_context)
            .on_kind(KindTag::Chord, spread_chord)
            .on_kind(KindTag::Voice, flatten_voice)
            .on_kind(KindTag::Note, link_voice_leading)
            .on_kind(KindTag::Pitch, lift_pitch)
            .on_kind(KindTag::Duration, lift_duration)
            .on_category(Category::Expression, name_ornament)
            .on_category(Category::Articulation, name_ornament)
            .on_kind(KindTag::Beams, unpack_beams)
            .on_kind(KindTag::Clef, midmeasure_clef)
            .on_kind(KindTag::TimeSignature, track_time_signature)
            .on_kind(KindTag::KeySignature, |_, _| Ok(Flow::Hide))
            .on_kind(KindTag::Moment, link_moment)
            .on_category(Category::Spanner, link_spanner)
            .on_kind(KindTag::Editorial, skip_empty_editorial);
        registry
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(key, _)| key))
            .finish()
    }
}

fn bag<const N: usize>(pairs: [(&str, Value); N]) -> Properties {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn bar_duration(numerator: u32, denominator: u32) -> Result<f64> {
    if denominator == 0 {
        return Err(IngestError::data(format!(
            "time signature {numerator}/{denominator} has a zero denominator"
        )));
    }
    Ok(f64::from(numerator) * 4.0 / f64::from(denominator))
}

// ── Containers ───────────────────────────────────────────────────

fn number_parts(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    let tree = ex.tree();
    let mut number = 0;
    for child in &tree.node(visit.node)?.children {
        if tree.node(*child)?.tag() == KindTag::Part {
            number += 1;
            ex.seed(*child, bag([("number", json!(number))]));
        }
    }
    Ok(Flow::Continue)
}

fn reset_part_state(ex: &mut Extractor<'_>, _visit: &mut Visit) -> Result<Flow> {
    ex.state_mut().reset_part();
    Ok(Flow::Continue)
}

/// Write the clef, time and key in force onto the measure.
fn carry_measure_context(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    let tree = ex.tree();
    let (mut clef_new, mut time_new, mut key_new) = (false, false, false);
    for child in &tree.node(visit.node)?.children {
        let child = tree.node(*child)?;
        if child.offset.unwrap_or(0.0) != 0.0 {
            continue;
        }
        let state = ex.state_mut();
        match &child.kind {
            NodeKind::Clef {
                sign,
                line,
                octave_change,
            } => {
                state.clef = Some(clef_name(sign, *line, *octave_change));
                clef_new = true;
            }
            NodeKind::TimeSignature {
                numerator,
                denominator,
            } => {
                state.bar_duration = bar_duration(*numerator, *denominator)?;
                state.time_signature = Some(format!("{numerator}/{denominator}"));
                time_new = true;
            }
            NodeKind::KeySignature { sharps, mode } => {
                state.key_sharps = Some(*sharps);
                state.key_mode = mode.clone();
                key_new = true;
            }
            _ => {}
        }
    }

    let state = ex.state();
    let text = |v: &Option<String>| v.as_ref().map_or(Value::Null, |s| json!(s));
    visit.vertex.insert("clef".into(), text(&state.clef));
    visit
        .vertex
        .insert("timeSignature".into(), text(&state.time_signature));
    visit.vertex.insert(
        "keySignatureSharps".into(),
        state.key_sharps.map_or(Value::Null, |n| json!(n)),
    );
    visit
        .vertex
        .insert("keySignatureMode".into(), text(&state.key_mode));
    visit.vertex.insert("clefIsNew".into(), json!(clef_new));
    visit
        .vertex
        .insert("timeSignatureIsNew".into(), json!(time_new));
    visit.vertex.insert("keyIsNew".into(), json!(key_new));
    Ok(Flow::Continue)
}

/// Visit the chord's notes directly under the chord's parent, lowest first,
/// numbering voices from the top down.
fn spread_chord(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    let tree = ex.tree();
    let chord = tree.node(visit.node)?;
    let mut notes = Vec::new();
    for child in &chord.children {
        if tree.node(*child)?.tag() == KindTag::Note {
            let midi = tree.midi(*child)?.ok_or_else(|| {
                IngestError::data(format!("note {child} in chord {} has no pitch", visit.node))
            })?;
            notes.push((midi, *child));
        }
    }
    notes.sort_by_key(|(midi, _)| *midi);

    let chord_offset = chord.offset.unwrap_or(0.0);
    let count = notes.len() as i64;
    for (i, (_, note)) in notes.into_iter().enumerate() {
        let offset = chord_offset + tree.node(note)?.offset.unwrap_or(0.0);
        ex.visit_with(
            note,
            visit.parent,
            bag([("voice", json!(count - i as i64)), ("offset", float(offset))]),
        )?;
    }
    Ok(Flow::Hide)
}

fn flatten_voice(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    let tree = ex.tree();
    let node = tree.node(visit.node)?;
    let NodeKind::Voice { id } = node.kind else {
        return Ok(Flow::Continue);
    };
    let voice_offset = node.offset.unwrap_or(0.0);
    for child in &node.children {
        let offset = voice_offset + tree.node(*child)?.offset.unwrap_or(0.0);
        ex.visit_with(
            *child,
            visit.parent,
            bag([("voice", json!(id)), ("offset", float(offset))]),
        )?;
    }
    Ok(Flow::Hide)
}

// ── Notes ────────────────────────────────────────────────────────

/// Link the note to the previous note of its voice, once in the chain of all
/// notes and once more in the chain of notes falling on whole beats.
fn link_voice_leading(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    let tree = ex.tree();
    let note = visit.node;
    let voice = visit.vertex.get("voice").and_then(as_i64).unwrap_or(1);
    visit.vertex.insert("voice".into(), json!(voice));

    let midi = tree
        .midi(note)?
        .ok_or_else(|| IngestError::data(format!("note {note} has no pitch")))?;
    let onset = tree.absolute_offset(note)?;
    let local = match tree.ancestor_of_kind(note, KindTag::Measure)? {
        Some(measure) => onset - tree.absolute_offset(measure)?,
        None => onset,
    };
    let bar = ex.state().bar_duration;

    for by_beat in [false, true] {
        if by_beat && local.fract() != 0.0 {
            continue;
        }
        let previous = ex
            .state_mut()
            .history
            .insert((voice, by_beat), LeadingNote { note, onset, midi });
        if let Some(prev) = previous {
            if onset - prev.onset <= bar {
                ex.add_edge(
                    prev.note,
                    "NoteToNote",
                    note,
                    Some(bag([
                        ("interval", json!(midi - prev.midi)),
                        ("byBeat", json!(bool_text(by_beat))),
                    ])),
                )?;
            }
        }
    }
    Ok(Flow::Continue)
}

fn lift_pitch(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    let tree = ex.tree();
    let (Some(parent), NodeKind::Pitch { step, octave, alter, microtone }) =
        (visit.parent, &tree.node(visit.node)?.kind)
    else {
        return Ok(Flow::Hide);
    };
    let midi = pitch_midi(step, *octave, *alter)
        .ok_or_else(|| IngestError::data(format!("unknown pitch step {step:?}")))?;
    ex.update_vertex(parent, "pitch", json!(pitch_name(step, *octave, *alter)))?;
    ex.update_vertex(parent, "midi", json!(midi))?;
    ex.update_vertex(parent, "microtone", float(*microtone))?;
    Ok(Flow::Hide)
}

fn lift_duration(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    let tree = ex.tree();
    let NodeKind::Duration {
        quarter_length,
        tuplets,
        is_grace,
        steal_time_previous,
        steal_time_following,
        slash,
    } = &tree.node(visit.node)?.kind
    else {
        return Ok(Flow::Hide);
    };
    let Some(parent) = visit.parent else {
        return Ok(Flow::Hide);
    };
    if *quarter_length == 0.0 {
        return Ok(Flow::Hide);
    }
    let parent_type = ex.staged_type(parent).unwrap_or_default().to_string();
    if matches!(parent_type.as_str(), "StaffGroup" | "Instrument" | "Metadata") {
        return Ok(Flow::Hide);
    }

    ex.update_vertex(parent, "quarterLength", float(*quarter_length))?;
    let tuplet = if tuplets.is_empty() {
        Value::Null
    } else {
        json!(tuplet_text(tuplets))
    };
    ex.update_vertex(parent, "tuplet", tuplet)?;

    if parent_type == "Note" {
        ex.update_vertex(parent, "isGrace", json!(is_grace))?;
        if let Some(steal) = steal_time_previous {
            ex.update_vertex(parent, "stealTimePrevious", float(*steal))?;
        }
        if let Some(steal) = steal_time_following {
            ex.update_vertex(parent, "stealTimeFollowing", float(*steal))?;
        }
        if let Some(slash) = slash {
            ex.update_vertex(parent, "slash", json!(slash))?;
        }
    }
    Ok(Flow::Hide)
}

fn name_ornament(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    if let NodeKind::Ornament { ornament, .. } = &ex.tree().node(visit.node)?.kind {
        visit
            .vertex
            .insert(TYPE_KEY.into(), json!(ornament.category().name()));
        visit.vertex.insert("name".into(), json!(ornament.name()));
    }
    Ok(Flow::Continue)
}

fn unpack_beams(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    let tree = ex.tree();
    for beam in &tree.node(visit.node)?.components {
        ex.visit(*beam, visit.parent)?;
    }
    Ok(Flow::Hide)
}

// ── Measure context ──────────────────────────────────────────────

/// Clefs at the start of a measure live on the measure vertex.
fn midmeasure_clef(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    let node = ex.tree().node(visit.node)?;
    let NodeKind::Clef {
        sign,
        line,
        octave_change,
    } = &node.kind
    else {
        return Ok(Flow::Continue);
    };
    if node.offset.unwrap_or(0.0) == 0.0 {
        return Ok(Flow::Hide);
    }
    visit.vertex.insert(TYPE_KEY.into(), json!("MidmeasureClef"));
    visit
        .vertex
        .insert("name".into(), json!(clef_name(sign, *line, *octave_change)));
    Ok(Flow::Continue)
}

fn track_time_signature(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    if let NodeKind::TimeSignature {
        numerator,
        denominator,
    } = ex.tree().node(visit.node)?.kind
    {
        ex.state_mut().bar_duration = bar_duration(numerator, denominator)?;
    }
    Ok(Flow::Hide)
}

// ── Moments and spanners ─────────────────────────────────────────

fn link_moment(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    let tree = ex.tree();
    let NodeKind::Moment {
        same_offset,
        simultaneous,
    } = &tree.node(visit.node)?.kind
    else {
        return Ok(Flow::Continue);
    };
    for note in same_offset {
        ex.add_edge(*note, "NoteStartsAtMoment", visit.node, None)?;
    }
    for note in simultaneous {
        ex.add_edge(*note, "NoteSustainedAtMoment", visit.node, None)?;
    }

    let members: Vec<NodeId> = same_offset.iter().chain(simultaneous).copied().collect();
    let pairs = pairwise_intervals(tree, &members, &mut ex.state_mut().pairs)?;
    for (a, b, props) in pairs {
        ex.add_edge(a, "NoteSimultaneousWithNote", b, Some(props))?;
    }
    Ok(Flow::Continue)
}

fn link_spanner(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    let tree = ex.tree();
    let kind = &tree.node(visit.node)?.kind;
    match kind {
        NodeKind::StaffGroup { parts, .. } => {
            for part in parts {
                if tree.node(*part)?.tag() != KindTag::Part {
                    return Err(IngestError::data(format!(
                        "staff group {} spans {part}, which is not a part",
                        visit.node
                    )));
                }
                ex.add_edge(*part, "PartInStaffGroup", visit.node, None)?;
            }
            Ok(Flow::Continue)
        }
        NodeKind::Slur { first, last, .. } => {
            for end in [first, last] {
                let tag = tree.node(*end)?.tag();
                if !matches!(tag, KindTag::Note | KindTag::Rest) {
                    return Err(IngestError::data(format!(
                        "slur {} ends on a {}",
                        visit.node,
                        tag.name()
                    )));
                }
            }
            let mut props: Properties = kind
                .fields()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            props.insert("name".into(), json!("Slur"));
            ex.add_edge(*first, "spannerTo", *last, Some(props))?;
            Ok(Flow::Hide)
        }
        other => Err(IngestError::data(format!(
            "unsupported spanner {}",
            other.type_name()
        ))),
    }
}

fn skip_empty_editorial(ex: &mut Extractor<'_>, visit: &mut Visit) -> Result<Flow> {
    let node = ex.tree().node(visit.node)?;
    if node.kind.fields().is_empty() && node.extra.is_empty() {
        return Ok(Flow::Hide);
    }
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::moments::add_moments;
    use scoregraph_core::score::OrnamentKind;
    use scoregraph_core::vertex::EdgeRecord;
    use scoregraph_core::{ScoreTree, ScoregraphError};
    use scoregraph_graph::StagingStore;

    struct Fixture {
        tree: ScoreTree,
        part: NodeId,
        measure: NodeId,
    }

    impl Fixture {
        fn new(numerator: u32, denominator: u32) -> Self {
            let mut tree = ScoreTree::new(NodeKind::Score);
            let root = tree.root();
            let part = tree
                .add_child(
                    root,
                    NodeKind::Part {
                        part_id: Some("P1".into()),
                        part_name: None,
                    },
                    Some(0.0),
                )
                .unwrap();
            let measure = tree
                .add_child(part, NodeKind::Measure { number: 1 }, Some(0.0))
                .unwrap();
            tree.add_child(
                measure,
                NodeKind::Clef {
                    sign: "G".into(),
                    line: Some(2),
                    octave_change: 0,
                },
                Some(0.0),
            )
            .unwrap();
            tree.add_child(
                measure,
                NodeKind::TimeSignature {
                    numerator,
                    denominator,
                },
                Some(0.0),
            )
            .unwrap();
            tree.add_child(
                measure,
                NodeKind::KeySignature {
                    sharps: 2,
                    mode: Some("major".into()),
                },
                Some(0.0),
            )
            .unwrap();
            Self {
                tree,
                part,
                measure,
            }
        }

        fn note(&mut self, parent: NodeId, offset: f64, step: &str, octave: i32, ql: f64) -> NodeId {
            let n = self
                .tree
                .add_child(parent, NodeKind::Note { stem_direction: None }, Some(offset))
                .unwrap();
            self.tree
                .add_component(
                    n,
                    NodeKind::Pitch {
                        step: step.into(),
                        octave,
                        alter: 0.0,
                        microtone: 0.0,
                    },
                )
                .unwrap();
            self.tree
                .add_component(
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

        fn extract(&self) -> crate::error::Result<StagingStore> {
            let registry = CallbackRegistry::with_defaults();
            let mut staging = StagingStore::default();
            Extractor::new(&self.tree, &registry, &mut staging).extract(self.tree.root())?;
            Ok(staging)
        }
    }

    fn vertices(staging: &mut StagingStore) -> HashMap<NodeId, Properties> {
        staging
            .vertices()
            .unwrap()
            .iter()
            .map(|r| (r.key, r.vertex.clone()))
            .collect()
    }

    fn edges_of(staging: &mut StagingStore, rel_type: &str) -> Vec<EdgeRecord> {
        staging
            .edges()
            .unwrap()
            .iter()
            .filter(|e| e.rel_type == rel_type)
            .cloned()
            .collect()
    }

    #[test]
    fn test_resolve_prefers_exact_kind_over_category() {
        let mut registry = CallbackRegistry::new();
        registry.on_category(Category::Expression, |_, _| Ok(Flow::Continue));
        let trill = NodeKind::Ornament {
            ornament: OrnamentKind::Trill,
            size: None,
        };
        assert_eq!(registry.resolve(&trill).count(), 1);

        registry.on_kind(KindTag::Ornament, |_, _| Ok(Flow::Hide));
        registry.on_kind(KindTag::Ornament, |_, _| Ok(Flow::Continue));
        assert_eq!(registry.resolve(&trill).count(), 2);
        assert_eq!(registry.resolve(&NodeKind::Rest).count(), 0);
    }

    #[test]
    fn test_measure_carries_context_and_parts_are_numbered() {
        let mut fx = Fixture::new(3, 4);
        let m = fx.measure;
        fx.note(m, 0.0, "C", 4, 1.0);
        let mut staging = fx.extract().unwrap();
        let vertices = vertices(&mut staging);

        assert_eq!(vertices[&fx.part]["number"], 1);
        let measure = &vertices[&fx.measure];
        assert_eq!(measure["clef"], "TrebleClef");
        assert_eq!(measure["timeSignature"], "3/4");
        assert_eq!(measure["keySignatureSharps"], 2);
        assert_eq!(measure["keySignatureMode"], "major");
        assert_eq!(measure["clefIsNew"], true);
        // Score, part, measure, note; clef and signatures stay on the measure.
        assert_eq!(vertices.len(), 4);
    }

    #[test]
    fn test_pitch_and_duration_land_on_the_note() {
        let mut fx = Fixture::new(4, 4);
        let m = fx.measure;
        let n = fx.note(m, 0.0, "E", 4, 0.5);
        let mut staging = fx.extract().unwrap();
        let note = &vertices(&mut staging)[&n];

        assert_eq!(note["type"], "Note");
        assert_eq!(note["pitch"], "E4");
        assert_eq!(note["midi"], 64);
        assert_eq!(note["quarterLength"], 0.5);
        assert_eq!(note["isGrace"], false);
        assert_eq!(note["voice"], 1);
        assert_eq!(edges_of(&mut staging, "NoteInMeasure").len(), 1);
    }

    #[test]
    fn test_chord_notes_are_spread_into_voices() {
        let mut fx = Fixture::new(4, 4);
        let m = fx.measure;
        let chord = fx.tree.add_child(m, NodeKind::Chord, Some(2.0)).unwrap();
        let g = fx.note(chord, 0.0, "G", 4, 1.0);
        let c = fx.note(chord, 0.0, "C", 4, 1.0);
        let e = fx.note(chord, 0.0, "E", 4, 1.0);
        let mut staging = fx.extract().unwrap();
        let vertices = vertices(&mut staging);

        assert!(!vertices.contains_key(&chord));
        assert_eq!(vertices[&c]["voice"], 3);
        assert_eq!(vertices[&e]["voice"], 2);
        assert_eq!(vertices[&g]["voice"], 1);
        assert_eq!(vertices[&g]["offset"], 2.0);
        let in_measure = edges_of(&mut staging, "NoteInMeasure");
        assert_eq!(in_measure.len(), 3);
        assert!(in_measure.iter().all(|e| e.end == m));
    }

    #[test]
    fn test_voice_leading_chains() {
        let mut fx = Fixture::new(4, 4);
        let m = fx.measure;
        let c = fx.note(m, 0.0, "C", 4, 1.5);
        let e = fx.note(m, 1.5, "E", 4, 0.5);
        let g = fx.note(m, 2.0, "G", 4, 2.0);
        let mut staging = fx.extract().unwrap();

        let links: Vec<_> = edges_of(&mut staging, "NoteToNote")
            .into_iter()
            .map(|e| {
                (
                    e.start,
                    e.end,
                    e.properties["interval"].clone(),
                    e.properties["byBeat"].clone(),
                )
            })
            .collect();
        assert_eq!(
            links,
            vec![
                (c, e, json!(4), json!("False")),
                (e, g, json!(3), json!("False")),
                (c, g, json!(7), json!("True")),
            ]
        );
    }

    #[test]
    fn test_voice_leading_skips_notes_more_than_a_bar_apart() {
        let mut fx = Fixture::new(2, 4);
        let m1 = fx.measure;
        fx.note(m1, 0.0, "C", 4, 1.0);
        let m2 = fx
            .tree
            .add_child(fx.part, NodeKind::Measure { number: 2 }, Some(2.0))
            .unwrap();
        fx.note(m2, 1.0, "D", 4, 1.0);
        let mut staging = fx.extract().unwrap();
        assert!(edges_of(&mut staging, "NoteToNote").is_empty());
    }

    #[test]
    fn test_ornament_typed_by_category() {
        let mut fx = Fixture::new(4, 4);
        let m = fx.measure;
        let n = fx.note(m, 0.0, "C", 4, 1.0);
        let trill = fx
            .tree
            .add_component(
                n,
                NodeKind::Ornament {
                    ornament: OrnamentKind::Trill,
                    size: None,
                },
            )
            .unwrap();
        let mut staging = fx.extract().unwrap();
        let vertex = &vertices(&mut staging)[&trill];
        assert_eq!(vertex["type"], "Expression");
        assert_eq!(vertex["name"], "Trill");
        assert_eq!(edges_of(&mut staging, "ExpressionInNote").len(), 1);
    }

    #[test]
    fn test_midmeasure_clef_is_kept() {
        let mut fx = Fixture::new(4, 4);
        let m = fx.measure;
        let clef = fx
            .tree
            .add_child(
                m,
                NodeKind::Clef {
                    sign: "F".into(),
                    line: Some(4),
                    octave_change: 0,
                },
                Some(2.0),
            )
            .unwrap();
        let mut staging = fx.extract().unwrap();
        let vertex = &vertices(&mut staging)[&clef];
        assert_eq!(vertex["type"], "MidmeasureClef");
        assert_eq!(vertex["name"], "BassClef");
        assert_eq!(edges_of(&mut staging, "MidmeasureClefInMeasure").len(), 1);
    }

    #[test]
    fn test_slur_becomes_spanner_edge() {
        let mut fx = Fixture::new(4, 4);
        let m = fx.measure;
        let a = fx.note(m, 0.0, "C", 4, 1.0);
        let b = fx.note(m, 1.0, "D", 4, 1.0);
        let root = fx.tree.root();
        let slur = fx
            .tree
            .add_child(
                root,
                NodeKind::Slur {
                    first: a,
                    last: b,
                    line_type: Some("dashed".into()),
                },
                None,
            )
            .unwrap();
        let mut staging = fx.extract().unwrap();
        assert!(!vertices(&mut staging).contains_key(&slur));
        let spans = edges_of(&mut staging, "spannerTo");
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].start, spans[0].end), (a, b));
        assert_eq!(spans[0].properties["name"], "Slur");
        assert_eq!(spans[0].properties["lineType"], "dashed");
    }

    #[test]
    fn test_slur_onto_measure_is_data_error() {
        let mut fx = Fixture::new(4, 4);
        let m = fx.measure;
        let a = fx.note(m, 0.0, "C", 4, 1.0);
        let root = fx.tree.root();
        fx.tree
            .add_child(
                root,
                NodeKind::Slur {
                    first: a,
                    last: m,
                    line_type: None,
                },
                None,
            )
            .unwrap();
        let err = fx.extract().unwrap_err();
        assert!(matches!(err, IngestError::Core(ScoregraphError::Data(_))));
    }

    #[test]
    fn test_staff_group_links_parts() {
        let mut fx = Fixture::new(4, 4);
        let root = fx.tree.root();
        let group = fx
            .tree
            .add_child(
                root,
                NodeKind::StaffGroup {
                    name: Some("Strings".into()),
                    symbol: Some("bracket".into()),
                    parts: vec![fx.part],
                },
                None,
            )
            .unwrap();
        let mut staging = fx.extract().unwrap();
        assert_eq!(vertices(&mut staging)[&group]["name"], "Strings");
        let links = edges_of(&mut staging, "PartInStaffGroup");
        assert_eq!(links.len(), 1);
        assert_eq!((links[0].start, links[0].end), (fx.part, group));
    }

    #[test]
    fn test_moments_link_notes_and_pairs() {
        let mut fx = Fixture::new(4, 4);
        let m = fx.measure;
        fx.note(m, 0.0, "C", 4, 2.0);
        let chord = fx.tree.add_child(m, NodeKind::Chord, Some(1.0)).unwrap();
        fx.note(chord, 0.0, "E", 4, 1.0);
        fx.note(chord, 0.0, "G", 4, 1.0);
        assert_eq!(add_moments(&mut fx.tree, false).unwrap(), 2);

        let mut staging = fx.extract().unwrap();
        assert_eq!(edges_of(&mut staging, "NoteStartsAtMoment").len(), 3);
        assert_eq!(edges_of(&mut staging, "NoteSustainedAtMoment").len(), 1);
        assert_eq!(edges_of(&mut staging, "MomentInScore").len(), 2);

        let pairs = edges_of(&mut staging, "NoteSimultaneousWithNote");
        assert_eq!(pairs.len(), 3);
        let same: Vec<_> = pairs
            .iter()
            .filter(|e| e.properties["sameOffset"] == "True")
            .collect();
        assert_eq!(same.len(), 1);
        assert_eq!(same[0].properties["harmonicInterval"], 3);
    }

    #[test]
    fn test_empty_editorial_is_hidden() {
        let mut fx = Fixture::new(4, 4);
        let m = fx.measure;
        let n = fx.note(m, 0.0, "C", 4, 1.0);
        let empty = fx
            .tree
            .add_component(
                n,
                NodeKind::Editorial {
                    color: None,
                    comment: None,
                },
            )
            .unwrap();
        let filled = fx
            .tree
            .add_component(
                n,
                NodeKind::Editorial {
                    color: Some("red".into()),
                    comment: None,
                },
            )
            .unwrap();
        let mut staging = fx.extract().unwrap();
        let vertices = vertices(&mut staging);
        assert!(!vertices.contains_key(&empty));
        assert_eq!(vertices[&filled]["color"], "red");
    }
}
