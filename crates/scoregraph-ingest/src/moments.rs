//! Vertical slices ("moments") of a score.
//!
//! A sweep over note onsets in ascending order, with a min-heap of release
//! positions. Sounding intervals are half-open: a note released at `t` is no
//! longer sounding at a moment starting at `t`.

use std::cmp::{Ordering, Reverse};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashSet};

use serde_json::json;

use scoregraph_core::properties::bool_text;
use scoregraph_core::{KindTag, NodeId, NodeKind, Properties, ScoreTree, ScoregraphError};

use crate::error::Result;

/// Notes starting at one onset, plus the notes still sounding there.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentSlice {
    pub offset: f64,
    pub same_offset: BTreeSet<NodeId>,
    pub simultaneous: BTreeSet<NodeId>,
}

/// Total order over positions so they can key maps and heaps.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Position(f64);

impl Eq for Position {}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One slice per distinct onset among `leaves`, in ascending order.
pub fn build_moments(tree: &ScoreTree, leaves: &[NodeId]) -> Result<Vec<MomentSlice>> {
    let mut attacks: BTreeMap<Position, Vec<NodeId>> = BTreeMap::new();
    for &leaf in leaves {
        attacks
            .entry(Position(tree.absolute_offset(leaf)?))
            .or_default()
            .push(leaf);
    }

    let mut releases: BinaryHeap<Reverse<Position>> = BinaryHeap::new();
    let mut sounding: BTreeMap<Position, BTreeSet<NodeId>> = BTreeMap::new();
    let mut slices = Vec::with_capacity(attacks.len());

    for (onset, starting) in attacks {
        while let Some(&Reverse(next)) = releases.peek() {
            if next > onset {
                break;
            }
            releases.pop();
            sounding.remove(&next);
        }

        let simultaneous: BTreeSet<NodeId> = sounding.values().flatten().copied().collect();
        let mut same_offset = BTreeSet::new();
        for leaf in starting {
            same_offset.insert(leaf);
            let release = Position(onset.0 + tree.quarter_length(leaf)?);
            match sounding.entry(release) {
                Entry::Occupied(mut set) => {
                    set.get_mut().insert(leaf);
                }
                Entry::Vacant(slot) => {
                    releases.push(Reverse(release));
                    slot.insert(BTreeSet::from([leaf]));
                }
            }
        }

        slices.push(MomentSlice {
            offset: onset.0,
            same_offset,
            simultaneous,
        });
    }

    Ok(slices)
}

/// Insert one Moment per slice under the score root.
///
/// A tree that already has Moments is left alone unless `force` is set.
/// Returns the number of Moments added.
pub fn add_moments(tree: &mut ScoreTree, force: bool) -> Result<usize> {
    let root = tree.root();
    let mut existing = false;
    for child in &tree.node(root)?.children {
        if tree.node(*child)?.tag() == KindTag::Moment {
            existing = true;
            break;
        }
    }
    if existing && !force {
        tracing::warn!("Score already has moments; pass force to add them again");
        return Ok(0);
    }

    let leaves = tree.leaves()?;
    let slices = build_moments(tree, &leaves)?;
    for slice in &slices {
        tree.insert_at(
            root,
            NodeKind::Moment {
                same_offset: slice.same_offset.clone(),
                simultaneous: slice.simultaneous.clone(),
            },
            slice.offset,
        )?;
    }
    tracing::debug!(moments = slices.len(), leaves = leaves.len(), "Added moments");
    Ok(slices.len())
}

// ── Pairwise intervals ───────────────────────────────────────────

/// Unordered note pairs already linked during one extraction.
#[derive(Debug, Default)]
pub struct PairTracker {
    seen: HashSet<(NodeId, NodeId)>,
}

impl PairTracker {
    /// Record the pair; false if it was seen before.
    pub fn insert(&mut self, a: NodeId, b: NodeId) -> bool {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Interval properties for every new pair among `members`, in member order.
pub fn pairwise_intervals(
    tree: &ScoreTree,
    members: &[NodeId],
    pairs: &mut PairTracker,
) -> Result<Vec<(NodeId, NodeId, Properties)>> {
    let mut out = Vec::new();
    for (i, &a) in members.iter().enumerate() {
        for &b in &members[i + 1..] {
            if a == b || !pairs.insert(a, b) {
                continue;
            }
            let distance = sounding_midi(tree, b)? - sounding_midi(tree, a)?;
            let same_offset = tree.absolute_offset(a)? == tree.absolute_offset(b)?;

            let mut props = Properties::new();
            props.insert("harmonicInterval".into(), json!(distance));
            // `%` keeps the dividend's sign.
            props.insert("simpleHarmonicInterval".into(), json!(distance % 12));
            props.insert("sameOffset".into(), json!(bool_text(same_offset)));
            out.push((a, b, props));
        }
    }
    Ok(out)
}

fn sounding_midi(tree: &ScoreTree, note: NodeId) -> Result<i64> {
    tree.midi(note)?
        .ok_or_else(|| ScoregraphError::data(format!("note {note} in a moment has no pitch")).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(tree: &mut ScoreTree, parent: NodeId, offset: f64, step: &str, octave: i32, ql: f64) -> NodeId {
        let n = tree
            .add_child(parent, NodeKind::Note { stem_direction: None }, Some(offset))
            .unwrap();
        tree.add_component(
            n,
            NodeKind::Pitch {
                step: step.into(),
                octave,
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

    fn measure(tree: &mut ScoreTree) -> NodeId {
        let root = tree.root();
        tree.add_child(root, NodeKind::Measure { number: 1 }, Some(0.0))
            .unwrap()
    }

    #[test]
    fn test_sweep_sustains_and_releases() {
        let mut tree = ScoreTree::new(NodeKind::Score);
        let m = measure(&mut tree);
        let a = note(&mut tree, m, 0.0, "C", 4, 2.0);
        let b = note(&mut tree, m, 1.0, "E", 4, 1.0);
        let c = note(&mut tree, m, 1.0, "G", 4, 1.0);
        let d = note(&mut tree, m, 2.0, "C", 5, 1.0);

        let slices = build_moments(&tree, &[a, b, c, d]).unwrap();
        assert_eq!(slices.len(), 3);

        assert_eq!(slices[0].offset, 0.0);
        assert_eq!(slices[0].same_offset, BTreeSet::from([a]));
        assert!(slices[0].simultaneous.is_empty());

        assert_eq!(slices[1].same_offset, BTreeSet::from([b, c]));
        assert_eq!(slices[1].simultaneous, BTreeSet::from([a]));

        // `a` is released exactly at 2.0, so it no longer sounds there.
        assert_eq!(slices[2].same_offset, BTreeSet::from([d]));
        assert!(slices[2].simultaneous.is_empty());
    }

    #[test]
    fn test_add_moments_skips_unless_forced() {
        let mut tree = ScoreTree::new(NodeKind::Score);
        let m = measure(&mut tree);
        note(&mut tree, m, 0.0, "C", 4, 1.0);
        note(&mut tree, m, 1.0, "D", 4, 1.0);

        assert_eq!(add_moments(&mut tree, false).unwrap(), 2);
        assert_eq!(add_moments(&mut tree, false).unwrap(), 0);
        assert_eq!(add_moments(&mut tree, true).unwrap(), 2);

        let root = tree.root();
        let moments = tree
            .node(root)
            .unwrap()
            .children
            .iter()
            .filter(|c| tree.node(**c).unwrap().tag() == KindTag::Moment)
            .count();
        assert_eq!(moments, 4);
    }

    #[test]
    fn test_pairwise_intervals_signed_and_deduplicated() {
        let mut tree = ScoreTree::new(NodeKind::Score);
        let m = measure(&mut tree);
        let low = note(&mut tree, m, 0.0, "C", 4, 2.0);
        let high = note(&mut tree, m, 0.0, "D", 5, 1.0);
        let later = note(&mut tree, m, 1.0, "G", 3, 1.0);

        let mut pairs = PairTracker::default();
        let edges = pairwise_intervals(&tree, &[low, high], &mut pairs).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].2["harmonicInterval"], 14);
        assert_eq!(edges[0].2["simpleHarmonicInterval"], 2);
        assert_eq!(edges[0].2["sameOffset"], "True");

        let edges = pairwise_intervals(&tree, &[later, low, high], &mut pairs).unwrap();
        assert_eq!(edges.len(), 2);
        let (a, b, props) = &edges[0];
        assert_eq!((*a, *b), (later, low));
        assert_eq!(props["harmonicInterval"], 5);
        assert_eq!(props["sameOffset"], "False");
        let (_, _, props) = &edges[1];
        assert_eq!(props["harmonicInterval"], 19);
        assert_eq!(props["simpleHarmonicInterval"], 7);
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn test_negative_interval_keeps_sign() {
        let mut tree = ScoreTree::new(NodeKind::Score);
        let m = measure(&mut tree);
        let upper = note(&mut tree, m, 0.0, "E", 5, 1.0);
        let lower = note(&mut tree, m, 0.0, "C", 4, 1.0);
        let mut pairs = PairTracker::default();
        let edges = pairwise_intervals(&tree, &[upper, lower], &mut pairs).unwrap();
        assert_eq!(edges[0].2["harmonicInterval"], -16);
        assert_eq!(edges[0].2["simpleHarmonicInterval"], -4);
    }
}
