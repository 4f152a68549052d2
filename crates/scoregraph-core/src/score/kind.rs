//! Node kinds of the score tree.
//!
//! Every kind lists its own extractable scalar fields and accepts assignment by
//! the same names, so ingestion and reconstruction never reflect over structs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, ScoregraphError};
use crate::properties::{as_bool, as_f64, as_i64, float};
use crate::score::NodeId;

/// A kind of score node, with the data that kind owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeKind {
    Score,
    Metadata {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        movement_name: Option<String>,
        #[serde(default)]
        composer: Option<String>,
    },
    Contributor {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        names: Vec<String>,
    },
    StaffGroup {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        symbol: Option<String>,
        #[serde(default)]
        parts: Vec<NodeId>,
    },
    Part {
        #[serde(default)]
        part_id: Option<String>,
        #[serde(default)]
        part_name: Option<String>,
    },
    Instrument {
        #[serde(default)]
        instrument_name: Option<String>,
        #[serde(default)]
        midi_program: Option<i64>,
    },
    Measure {
        number: i64,
    },
    Voice {
        id: i64,
    },
    Chord,
    Note {
        #[serde(default)]
        stem_direction: Option<String>,
    },
    Rest,
    Pitch {
        step: String,
        octave: i32,
        #[serde(default)]
        alter: f64,
        #[serde(default)]
        microtone: f64,
    },
    Duration {
        quarter_length: f64,
        #[serde(default)]
        tuplets: Vec<Tuplet>,
        #[serde(default)]
        is_grace: bool,
        #[serde(default)]
        steal_time_previous: Option<f64>,
        #[serde(default)]
        steal_time_following: Option<f64>,
        #[serde(default)]
        slash: Option<bool>,
    },
    Beams,
    Beam {
        beam_type: String,
        #[serde(default = "default_beam_number")]
        number: i64,
    },
    Tie {
        tie_type: String,
    },
    Ornament {
        ornament: OrnamentKind,
        #[serde(default)]
        size: Option<String>,
    },
    Clef {
        sign: String,
        #[serde(default)]
        line: Option<i64>,
        #[serde(default)]
        octave_change: i64,
    },
    TimeSignature {
        numerator: u32,
        denominator: u32,
    },
    KeySignature {
        sharps: i64,
        #[serde(default)]
        mode: Option<String>,
    },
    MetronomeMark {
        #[serde(default)]
        number: Option<f64>,
        #[serde(default)]
        referent: Option<f64>,
        #[serde(default)]
        text: Option<String>,
    },
    Slur {
        first: NodeId,
        last: NodeId,
        #[serde(default)]
        line_type: Option<String>,
    },
    Moment {
        #[serde(default)]
        same_offset: BTreeSet<NodeId>,
        #[serde(default)]
        simultaneous: BTreeSet<NodeId>,
    },
    Barline {
        style: String,
    },
    Editorial {
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        comment: Option<String>,
    },
    Other {
        type_name: String,
    },
}

fn default_beam_number() -> i64 {
    1
}

/// A tuplet ratio: `actual` notes in the time of `normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuplet {
    pub actual: u32,
    pub normal: u32,
}

/// Concrete ornament and articulation marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrnamentKind {
    Trill,
    Mordent,
    Turn,
    Fermata,
    Staccato,
    Accent,
    StrongAccent,
    Tenuto,
}

impl OrnamentKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Trill => "Trill",
            Self::Mordent => "Mordent",
            Self::Turn => "Turn",
            Self::Fermata => "Fermata",
            Self::Staccato => "Staccato",
            Self::Accent => "Accent",
            Self::StrongAccent => "StrongAccent",
            Self::Tenuto => "Tenuto",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Trill" => Self::Trill,
            "Mordent" => Self::Mordent,
            "Turn" => Self::Turn,
            "Fermata" => Self::Fermata,
            "Staccato" => Self::Staccato,
            "Accent" => Self::Accent,
            "StrongAccent" => Self::StrongAccent,
            "Tenuto" => Self::Tenuto,
            _ => return None,
        })
    }

    pub fn category(self) -> Category {
        match self {
            Self::Trill | Self::Mordent | Self::Turn | Self::Fermata => Category::Expression,
            Self::Staccato | Self::Accent | Self::StrongAccent | Self::Tenuto => {
                Category::Articulation
            }
        }
    }
}

/// Abstract categories used as a fallback when dispatching callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Expression,
    Articulation,
    Spanner,
}

impl Category {
    pub fn name(self) -> &'static str {
        match self {
            Self::Expression => "Expression",
            Self::Articulation => "Articulation",
            Self::Spanner => "Spanner",
        }
    }
}

/// Field-less discriminant of [`NodeKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KindTag {
    Score,
    Metadata,
    Contributor,
    StaffGroup,
    Part,
    Instrument,
    Measure,
    Voice,
    Chord,
    Note,
    Rest,
    Pitch,
    Duration,
    Beams,
    Beam,
    Tie,
    Ornament,
    Clef,
    TimeSignature,
    KeySignature,
    MetronomeMark,
    Slur,
    Moment,
    Barline,
    Editorial,
    Other,
}

impl KindTag {
    pub fn name(self) -> &'static str {
        match self {
            Self::Score => "Score",
            Self::Metadata => "Metadata",
            Self::Contributor => "Contributor",
            Self::StaffGroup => "StaffGroup",
            Self::Part => "Part",
            Self::Instrument => "Instrument",
            Self::Measure => "Measure",
            Self::Voice => "Voice",
            Self::Chord => "Chord",
            Self::Note => "Note",
            Self::Rest => "Rest",
            Self::Pitch => "Pitch",
            Self::Duration => "Duration",
            Self::Beams => "Beams",
            Self::Beam => "Beam",
            Self::Tie => "Tie",
            Self::Ornament => "Ornament",
            Self::Clef => "Clef",
            Self::TimeSignature => "TimeSignature",
            Self::KeySignature => "KeySignature",
            Self::MetronomeMark => "MetronomeMark",
            Self::Slur => "Slur",
            Self::Moment => "Moment",
            Self::Barline => "Barline",
            Self::Editorial => "Editorial",
            Self::Other => "Other",
        }
    }
}

impl NodeKind {
    pub fn tag(&self) -> KindTag {
        match self {
            Self::Score => KindTag::Score,
            Self::Metadata { .. } => KindTag::Metadata,
            Self::Contributor { .. } => KindTag::Contributor,
            Self::StaffGroup { .. } => KindTag::StaffGroup,
            Self::Part { .. } => KindTag::Part,
            Self::Instrument { .. } => KindTag::Instrument,
            Self::Measure { .. } => KindTag::Measure,
            Self::Voice { .. } => KindTag::Voice,
            Self::Chord => KindTag::Chord,
            Self::Note { .. } => KindTag::Note,
            Self::Rest => KindTag::Rest,
            Self::Pitch { .. } => KindTag::Pitch,
            Self::Duration { .. } => KindTag::Duration,
            Self::Beams => KindTag::Beams,
            Self::Beam { .. } => KindTag::Beam,
            Self::Tie { .. } => KindTag::Tie,
            Self::Ornament { .. } => KindTag::Ornament,
            Self::Clef { .. } => KindTag::Clef,
            Self::TimeSignature { .. } => KindTag::TimeSignature,
            Self::KeySignature { .. } => KindTag::KeySignature,
            Self::MetronomeMark { .. } => KindTag::MetronomeMark,
            Self::Slur { .. } => KindTag::Slur,
            Self::Moment { .. } => KindTag::Moment,
            Self::Barline { .. } => KindTag::Barline,
            Self::Editorial { .. } => KindTag::Editorial,
            Self::Other { .. } => KindTag::Other,
        }
    }

    /// The `type` written on this node's vertex before callbacks run.
    pub fn type_name(&self) -> String {
        match self {
            Self::Ornament { ornament, .. } => ornament.name().to_string(),
            Self::Other { type_name } => type_name.clone(),
            other => other.tag().name().to_string(),
        }
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            Self::Ornament { ornament, .. } => Some(ornament.category()),
            Self::StaffGroup { .. } | Self::Slur { .. } => Some(Category::Spanner),
            _ => None,
        }
    }

    /// Attribute-owned objects, as opposed to stream elements.
    pub fn is_component(&self) -> bool {
        matches!(
            self.tag(),
            KindTag::Pitch
                | KindTag::Duration
                | KindTag::Beams
                | KindTag::Beam
                | KindTag::Tie
                | KindTag::Ornament
                | KindTag::Editorial
        )
    }

    /// Whether stream elements can be inserted under this kind.
    pub fn accepts_children(&self) -> bool {
        matches!(
            self.tag(),
            KindTag::Score
                | KindTag::Metadata
                | KindTag::Part
                | KindTag::Measure
                | KindTag::Voice
                | KindTag::Chord
                | KindTag::Other
        )
    }

    /// Default instance for a stored vertex type, if the type maps onto one kind.
    pub fn instantiate(type_name: &str) -> Option<Self> {
        if let Some(ornament) = OrnamentKind::from_name(type_name) {
            return Some(Self::Ornament {
                ornament,
                size: None,
            });
        }
        Some(match type_name {
            "Score" => Self::Score,
            "Metadata" => Self::Metadata {
                title: None,
                movement_name: None,
                composer: None,
            },
            "Contributor" => Self::Contributor {
                role: None,
                names: Vec::new(),
            },
            "StaffGroup" => Self::StaffGroup {
                name: None,
                symbol: None,
                parts: Vec::new(),
            },
            "Part" => Self::Part {
                part_id: None,
                part_name: None,
            },
            "Instrument" => Self::Instrument {
                instrument_name: None,
                midi_program: None,
            },
            "Measure" => Self::Measure { number: 0 },
            "Voice" => Self::Voice { id: 1 },
            "Chord" => Self::Chord,
            "Note" => Self::Note {
                stem_direction: None,
            },
            "Rest" => Self::Rest,
            "Beams" => Self::Beams,
            "Beam" => Self::Beam {
                beam_type: "start".to_string(),
                number: 1,
            },
            "Tie" => Self::Tie {
                tie_type: "start".to_string(),
            },
            "TimeSignature" => Self::TimeSignature {
                numerator: 4,
                denominator: 4,
            },
            "KeySignature" => Self::KeySignature {
                sharps: 0,
                mode: None,
            },
            "MetronomeMark" => Self::MetronomeMark {
                number: None,
                referent: None,
                text: None,
            },
            "Moment" => Self::Moment {
                same_offset: BTreeSet::new(),
                simultaneous: BTreeSet::new(),
            },
            "Barline" => Self::Barline {
                style: "regular".to_string(),
            },
            "Editorial" => Self::Editorial {
                color: None,
                comment: None,
            },
            _ => return None,
        })
    }

    /// Scalar fields extracted onto the vertex. `None` fields are omitted.
    pub fn fields(&self) -> Vec<(&'static str, Value)> {
        let mut out = Vec::new();
        let mut opt = |key: &'static str, v: Option<Value>| {
            if let Some(v) = v {
                out.push((key, v));
            }
        };
        match self {
            Self::Metadata {
                title,
                movement_name,
                composer,
            } => {
                opt("title", title.as_ref().map(|s| json!(s)));
                opt("movementName", movement_name.as_ref().map(|s| json!(s)));
                opt("composer", composer.as_ref().map(|s| json!(s)));
            }
            Self::Contributor { role, names } => {
                opt("role", role.as_ref().map(|s| json!(s)));
                opt("names", (!names.is_empty()).then(|| json!(names.join("; "))));
            }
            Self::StaffGroup { name, symbol, .. } => {
                opt("name", name.as_ref().map(|s| json!(s)));
                opt("symbol", symbol.as_ref().map(|s| json!(s)));
            }
            Self::Part { part_id, part_name } => {
                opt("partId", part_id.as_ref().map(|s| json!(s)));
                opt("partName", part_name.as_ref().map(|s| json!(s)));
            }
            Self::Instrument {
                instrument_name,
                midi_program,
            } => {
                opt("instrumentName", instrument_name.as_ref().map(|s| json!(s)));
                opt("midiProgram", midi_program.map(|n| json!(n)));
            }
            Self::Measure { number } => opt("number", Some(json!(number))),
            Self::Voice { id } => opt("voiceId", Some(json!(id))),
            Self::Note { stem_direction } => {
                opt("stemDirection", stem_direction.as_ref().map(|s| json!(s)));
            }
            Self::Pitch {
                step,
                octave,
                alter,
                microtone,
            } => {
                opt("step", Some(json!(step)));
                opt("octave", Some(json!(octave)));
                opt("alter", Some(float(*alter)));
                opt("microtone", Some(float(*microtone)));
            }
            Self::Duration {
                quarter_length,
                tuplets,
                is_grace,
                ..
            } => {
                opt("quarterLength", Some(float(*quarter_length)));
                opt("tuplet", (!tuplets.is_empty()).then(|| json!(tuplet_text(tuplets))));
                opt("isGrace", Some(json!(is_grace)));
            }
            Self::Beam { beam_type, number } => {
                opt("beamType", Some(json!(beam_type)));
                opt("number", Some(json!(number)));
            }
            Self::Tie { tie_type } => opt("tieType", Some(json!(tie_type))),
            Self::Ornament { size, .. } => opt("size", size.as_ref().map(|s| json!(s))),
            Self::Clef {
                sign,
                line,
                octave_change,
            } => {
                opt("sign", Some(json!(sign)));
                opt("line", line.map(|l| json!(l)));
                opt("octaveChange", Some(json!(octave_change)));
            }
            Self::TimeSignature {
                numerator,
                denominator,
            } => {
                opt("numerator", Some(json!(numerator)));
                opt("denominator", Some(json!(denominator)));
            }
            Self::KeySignature { sharps, mode } => {
                opt("sharps", Some(json!(sharps)));
                opt("mode", mode.as_ref().map(|s| json!(s)));
            }
            Self::MetronomeMark {
                number,
                referent,
                text,
            } => {
                opt("number", number.map(float));
                opt("referent", referent.map(float));
                opt("text", text.as_ref().map(|s| json!(s)));
            }
            Self::Slur { line_type, .. } => opt("lineType", line_type.as_ref().map(|s| json!(s))),
            Self::Barline { style } => opt("style", Some(json!(style))),
            Self::Editorial { color, comment } => {
                opt("color", color.as_ref().map(|s| json!(s)));
                opt("comment", comment.as_ref().map(|s| json!(s)));
            }
            Self::Score
            | Self::Chord
            | Self::Rest
            | Self::Beams
            | Self::Moment { .. }
            | Self::Other { .. } => {}
        }
        out
    }

    /// Assign a field by its vertex name. Returns false when this kind has no such field.
    ///
    /// An integer that does not fit the field is a data error.
    pub fn set_field(&mut self, key: &str, value: &Value) -> Result<bool> {
        let text = || value.as_str().map(str::to_string).or_else(|| {
            (!value.is_null()).then(|| value.to_string())
        });
        match (self, key) {
            (Self::Metadata { title, .. }, "title") => *title = text(),
            (Self::Metadata { movement_name, .. }, "movementName") => *movement_name = text(),
            (Self::Metadata { composer, .. }, "composer") => *composer = text(),
            (Self::Contributor { role, .. }, "role") => *role = text(),
            (Self::Contributor { names, .. }, "names") => {
                *names = text()
                    .map(|s| s.split("; ").map(str::to_string).collect())
                    .unwrap_or_default();
            }
            (Self::StaffGroup { name, .. }, "name") => *name = text(),
            (Self::StaffGroup { symbol, .. }, "symbol") => *symbol = text(),
            (Self::Part { part_id, .. }, "partId") => *part_id = text(),
            (Self::Part { part_name, .. }, "partName") => *part_name = text(),
            (Self::Instrument { instrument_name, .. }, "instrumentName") => {
                *instrument_name = text();
            }
            (Self::Instrument { midi_program, .. }, "midiProgram") => *midi_program = as_i64(value),
            (Self::Measure { number }, "number") => match as_i64(value) {
                Some(n) => *number = n,
                None => return Ok(false),
            },
            (Self::Voice { id }, "voiceId") => match as_i64(value) {
                Some(n) => *id = n,
                None => return Ok(false),
            },
            (Self::Note { stem_direction }, "stemDirection") => *stem_direction = text(),
            (Self::Pitch { step, .. }, "step") => match value.as_str() {
                Some(s) => *step = s.to_string(),
                None => return Ok(false),
            },
            (Self::Pitch { octave, .. }, "octave") => match as_i64(value) {
                Some(n) => *octave = narrow(key, n)?,
                None => return Ok(false),
            },
            (Self::Pitch { alter, .. }, "alter") => *alter = as_f64(value).unwrap_or(0.0),
            (Self::Pitch { microtone, .. }, "microtone") => {
                *microtone = as_f64(value).unwrap_or(0.0);
            }
            (Self::Duration { quarter_length, .. }, "quarterLength") => match as_f64(value) {
                Some(q) => *quarter_length = q,
                None => return Ok(false),
            },
            (Self::Duration { tuplets, .. }, "tuplet") => {
                *tuplets = value.as_str().map(parse_tuplets).unwrap_or_default();
            }
            (Self::Duration { is_grace, .. }, "isGrace") => {
                *is_grace = as_bool(value).unwrap_or(false);
            }
            (Self::Duration { steal_time_previous, .. }, "stealTimePrevious") => {
                *steal_time_previous = as_f64(value);
            }
            (Self::Duration { steal_time_following, .. }, "stealTimeFollowing") => {
                *steal_time_following = as_f64(value);
            }
            (Self::Duration { slash, .. }, "slash") => *slash = as_bool(value),
            (Self::Beam { beam_type, .. }, "beamType") => match value.as_str() {
                Some(s) => *beam_type = s.to_string(),
                None => return Ok(false),
            },
            (Self::Beam { number, .. }, "number") => *number = as_i64(value).unwrap_or(1),
            (Self::Tie { tie_type }, "tieType") => match value.as_str() {
                Some(s) => *tie_type = s.to_string(),
                None => return Ok(false),
            },
            (Self::Ornament { size, .. }, "size") => *size = text(),
            (Self::Clef { sign, .. }, "sign") => match value.as_str() {
                Some(s) => *sign = s.to_string(),
                None => return Ok(false),
            },
            (Self::Clef { line, .. }, "line") => *line = as_i64(value),
            (Self::Clef { octave_change, .. }, "octaveChange") => {
                *octave_change = as_i64(value).unwrap_or(0);
            }
            (Self::TimeSignature { numerator, .. }, "numerator") => match as_i64(value) {
                Some(n) => *numerator = narrow(key, n)?,
                None => return Ok(false),
            },
            (Self::TimeSignature { denominator, .. }, "denominator") => match as_i64(value) {
                Some(n) => *denominator = narrow(key, n)?,
                None => return Ok(false),
            },
            (Self::KeySignature { sharps, .. }, "sharps") => match as_i64(value) {
                Some(n) => *sharps = n,
                None => return Ok(false),
            },
            (Self::KeySignature { mode, .. }, "mode") => *mode = text(),
            (Self::MetronomeMark { number, .. }, "number") => *number = as_f64(value),
            (Self::MetronomeMark { referent, .. }, "referent") => *referent = as_f64(value),
            (Self::MetronomeMark { text: t, .. }, "text") => *t = text(),
            (Self::Slur { line_type, .. }, "lineType") => *line_type = text(),
            (Self::Barline { style }, "style") => match value.as_str() {
                Some(s) => *style = s.to_string(),
                None => return Ok(false),
            },
            (Self::Editorial { color, .. }, "color") => *color = text(),
            (Self::Editorial { comment, .. }, "comment") => *comment = text(),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

fn narrow<T: TryFrom<i64>>(key: &str, n: i64) -> Result<T> {
    T::try_from(n).map_err(|_| ScoregraphError::data(format!("{key} value {n} is out of range")))
}

// ── Pitch helpers ────────────────────────────────────────────────

fn step_class(step: &str) -> Option<i64> {
    Some(match step {
        "C" => 0,
        "D" => 2,
        "E" => 4,
        "F" => 5,
        "G" => 7,
        "A" => 9,
        "B" => 11,
        _ => return None,
    })
}

/// MIDI number of a spelled pitch. `None` for an unknown step letter.
pub fn pitch_midi(step: &str, octave: i32, alter: f64) -> Option<i64> {
    let pc = step_class(step)?;
    Some((octave as i64 + 1) * 12 + pc + alter.round() as i64)
}

/// Name with accidentals and octave, `#` for sharps and `-` for flats: `C#4`, `B-3`.
pub fn pitch_name(step: &str, octave: i32, alter: f64) -> String {
    let steps = alter.round() as i64;
    let accidental = if steps >= 0 {
        "#".repeat(steps as usize)
    } else {
        "-".repeat(steps.unsigned_abs() as usize)
    };
    format!("{step}{accidental}{octave}")
}

/// Parse a name produced by [`pitch_name`] into `(step, alter, octave)`.
pub fn parse_pitch_name(name: &str) -> Option<(String, f64, i32)> {
    let mut chars = name.chars();
    let step = chars.next()?.to_ascii_uppercase();
    step_class(&step.to_string())?;
    let rest: String = chars.collect();
    let digits_at = rest.find(|c: char| c.is_ascii_digit())?;
    let (accidentals, octave) = rest.split_at(digits_at);
    let mut alter = 0.0;
    for c in accidentals.chars() {
        match c {
            '#' => alter += 1.0,
            '-' => alter -= 1.0,
            _ => return None,
        }
    }
    Some((step.to_string(), alter, octave.parse().ok()?))
}

// ── Duration helpers ─────────────────────────────────────────────

/// `"3:2*5:4"` form of a tuplet chain.
pub fn tuplet_text(tuplets: &[Tuplet]) -> String {
    tuplets
        .iter()
        .map(|t| format!("{}:{}", t.actual, t.normal))
        .collect::<Vec<_>>()
        .join("*")
}

/// Parse [`tuplet_text`] output. Malformed entries are dropped.
pub fn parse_tuplets(text: &str) -> Vec<Tuplet> {
    text.split('*')
        .filter_map(|part| {
            let (actual, normal) = part.split_once(':')?;
            Some(Tuplet {
                actual: actual.trim().parse().ok()?,
                normal: normal.trim().parse().ok()?,
            })
        })
        .collect()
}

// ── Clef names ───────────────────────────────────────────────────

/// Conventional class name of a clef, e.g. `TrebleClef`.
pub fn clef_name(sign: &str, line: Option<i64>, octave_change: i64) -> String {
    let base = match (sign, line) {
        ("G", Some(2)) if octave_change == -1 => "Treble8vbClef",
        ("G", Some(2)) => "TrebleClef",
        ("G", Some(1)) => "FrenchViolinClef",
        ("F", Some(4)) => "BassClef",
        ("F", Some(3)) => "CBaritoneClef",
        ("C", Some(1)) => "SopranoClef",
        ("C", Some(2)) => "MezzoSopranoClef",
        ("C", Some(3)) => "AltoClef",
        ("C", Some(4)) => "TenorClef",
        ("percussion", _) => "PercussionClef",
        ("TAB", _) => "TabClef",
        _ => "Clef",
    };
    base.to_string()
}

/// Inverse of [`clef_name`].
pub fn clef_from_name(name: &str) -> Option<NodeKind> {
    let (sign, line, octave_change) = match name {
        "Treble8vbClef" => ("G", Some(2), -1),
        "TrebleClef" | "GClef" => ("G", Some(2), 0),
        "FrenchViolinClef" => ("G", Some(1), 0),
        "BassClef" | "FClef" => ("F", Some(4), 0),
        "CBaritoneClef" => ("F", Some(3), 0),
        "SopranoClef" => ("C", Some(1), 0),
        "MezzoSopranoClef" => ("C", Some(2), 0),
        "AltoClef" | "CClef" => ("C", Some(3), 0),
        "TenorClef" => ("C", Some(4), 0),
        "PercussionClef" => ("percussion", None, 0),
        "TabClef" => ("TAB", None, 0),
        _ => return None,
    };
    Some(NodeKind::Clef {
        sign: sign.to_string(),
        line,
        octave_change,
    })
}
