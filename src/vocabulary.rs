//! Chord Vocabulary
//!
//! The closed, ordered set of chord labels a classifier may emit. Labels are
//! addressed by stable string keys ("C", "C#m", "G7", "N") so a reordered or
//! extended vocabulary never silently reinterprets stored model outputs.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of pitch classes in an octave.
pub const SEMITONES: usize = 12;

/// Supported chord qualities, in vocabulary order.
pub const CHORD_KINDS: [ChordKind; 8] = [
    ChordKind::Major,
    ChordKind::Minor,
    ChordKind::DominantSeventh,
    ChordKind::MajorSeventh,
    ChordKind::MinorSeventh,
    ChordKind::Diminished,
    ChordKind::Augmented,
    ChordKind::SuspendedFourth,
];

/// Roots without accidentals, used for the extended-quality block of the
/// standard vocabulary.
const NATURAL_ROOTS: [NoteName; 7] = [
    NoteName::C,
    NoteName::D,
    NoteName::E,
    NoteName::F,
    NoteName::G,
    NoteName::A,
    NoteName::B,
];

/// Twelve chromatic pitch classes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NoteName {
    /// C
    C,
    /// C sharp / D flat
    Cs,
    /// D
    D,
    /// D sharp / E flat
    Ds,
    /// E
    E,
    /// F
    F,
    /// F sharp / G flat
    Fs,
    /// G
    G,
    /// G sharp / A flat
    Gs,
    /// A
    A,
    /// A sharp / B flat
    As,
    /// B
    B,
}

impl NoteName {
    /// All pitch classes in chroma-bin order.
    pub const ALL: [NoteName; SEMITONES] = [
        NoteName::C,
        NoteName::Cs,
        NoteName::D,
        NoteName::Ds,
        NoteName::E,
        NoteName::F,
        NoteName::Fs,
        NoteName::G,
        NoteName::Gs,
        NoteName::A,
        NoteName::As,
        NoteName::B,
    ];

    /// Pitch class for a chroma bin, wrapping at the octave.
    pub const fn from_index(idx: usize) -> NoteName {
        Self::ALL[idx % SEMITONES]
    }

    /// Chroma bin of this pitch class (C = 0).
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Sharp-spelled name, e.g. "F#".
    pub const fn name(self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::Cs => "C#",
            NoteName::D => "D",
            NoteName::Ds => "D#",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::Fs => "F#",
            NoteName::G => "G",
            NoteName::Gs => "G#",
            NoteName::A => "A",
            NoteName::As => "A#",
            NoteName::B => "B",
        }
    }

    /// Split a leading note name off `s`, accepting sharps and flats.
    fn split_prefix(s: &str) -> Option<(NoteName, &str)> {
        let mut chars = s.chars();
        let natural = match chars.next()? {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let rest = chars.as_str();
        if let Some(rest) = rest.strip_prefix('#') {
            Some((NoteName::from_index(natural + 1), rest))
        } else if let Some(rest) = rest.strip_prefix('b') {
            Some((NoteName::from_index(natural + SEMITONES - 1), rest))
        } else {
            Some((NoteName::from_index(natural), rest))
        }
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Supported chord qualities
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChordKind {
    /// Major chord (e.g., C-E-G)
    Major,
    /// Minor chord (e.g., C-Eb-G)
    Minor,
    /// Dominant seventh chord (e.g., C-E-G-Bb)
    DominantSeventh,
    /// Major seventh chord (e.g., C-E-G-B)
    MajorSeventh,
    /// Minor seventh chord (e.g., C-Eb-G-Bb)
    MinorSeventh,
    /// Diminished chord (e.g., C-Eb-Gb)
    Diminished,
    /// Augmented chord (e.g., C-E-G#)
    Augmented,
    /// Suspended fourth chord (e.g., C-F-G)
    SuspendedFourth,
}

impl ChordKind {
    /// Label suffix appended to the root name.
    pub const fn suffix(self) -> &'static str {
        match self {
            ChordKind::Major => "",
            ChordKind::Minor => "m",
            ChordKind::DominantSeventh => "7",
            ChordKind::MajorSeventh => "maj7",
            ChordKind::MinorSeventh => "m7",
            ChordKind::Diminished => "dim",
            ChordKind::Augmented => "aug",
            ChordKind::SuspendedFourth => "sus4",
        }
    }

    /// Intervals in semitones above the root.
    pub const fn intervals(self) -> &'static [usize] {
        match self {
            ChordKind::Major => &[0, 4, 7],
            ChordKind::Minor => &[0, 3, 7],
            ChordKind::DominantSeventh => &[0, 4, 7, 10],
            ChordKind::MajorSeventh => &[0, 4, 7, 11],
            ChordKind::MinorSeventh => &[0, 3, 7, 10],
            ChordKind::Diminished => &[0, 3, 6],
            ChordKind::Augmented => &[0, 4, 8],
            ChordKind::SuspendedFourth => &[0, 5, 7],
        }
    }

    fn from_suffix(suffix: &str) -> Option<ChordKind> {
        CHORD_KINDS.iter().copied().find(|k| k.suffix() == suffix)
    }
}

impl fmt::Display for ChordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One entry of a chord vocabulary.
///
/// Serializes as its string key so stored progressions and model label
/// tables stay readable and order-independent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ChordLabel {
    /// A rooted chord of a given quality.
    Chord {
        /// Root pitch class.
        root: NoteName,
        /// Chord quality.
        kind: ChordKind,
    },
    /// The "no chord" sentinel, keyed "N".
    NoChord,
}

impl ChordLabel {
    /// Shorthand for a rooted chord.
    pub const fn new(root: NoteName, kind: ChordKind) -> Self {
        ChordLabel::Chord { root, kind }
    }

    /// Binary pitch-class membership of this chord; all zeros for "N".
    pub fn pitch_classes(&self) -> [f32; SEMITONES] {
        let mut profile = [0.0; SEMITONES];
        if let ChordLabel::Chord { root, kind } = self {
            for &off in kind.intervals() {
                profile[(root.index() + off) % SEMITONES] = 1.0;
            }
        }
        profile
    }
}

impl fmt::Display for ChordLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChordLabel::Chord { root, kind } => write!(f, "{}{}", root.name(), kind.suffix()),
            ChordLabel::NoChord => f.write_str("N"),
        }
    }
}

impl FromStr for ChordLabel {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        if key == "N" {
            return Ok(ChordLabel::NoChord);
        }
        let parsed = NoteName::split_prefix(key)
            .and_then(|(root, rest)| ChordKind::from_suffix(rest).map(|kind| (root, kind)));
        match parsed {
            Some((root, kind)) => Ok(ChordLabel::Chord { root, kind }),
            None => Err(VocabularyError::UnknownKey(s.to_string())),
        }
    }
}

impl From<ChordLabel> for String {
    fn from(label: ChordLabel) -> String {
        label.to_string()
    }
}

impl TryFrom<String> for ChordLabel {
    type Error = VocabularyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Errors when building or parsing a vocabulary
#[derive(Debug, Error)]
pub enum VocabularyError {
    /// A vocabulary must hold at least one label.
    #[error("vocabulary cannot be empty")]
    Empty,

    /// The same label appeared twice.
    #[error("duplicate chord label `{0}`")]
    Duplicate(ChordLabel),

    /// A string key did not parse as a chord label.
    #[error("unrecognized chord label `{0}`")]
    UnknownKey(String),
}

/// Ordered, immutable chord vocabulary.
///
/// Entry 0 doubles as the fallback for lookups that miss: both
/// [`Vocabulary::label_at`] and [`Vocabulary::index_of`] resolve to it
/// rather than failing, since a reduced vocabulary may legitimately lack a
/// label a classifier proposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    labels: Vec<ChordLabel>,
}

impl Vocabulary {
    /// Build from an explicit label list.
    pub fn new(labels: Vec<ChordLabel>) -> Result<Self, VocabularyError> {
        if labels.is_empty() {
            return Err(VocabularyError::Empty);
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(VocabularyError::Duplicate(*label));
            }
        }
        Ok(Vocabulary { labels })
    }

    /// Build from string keys such as `["C", "Am", "G7", "N"]`.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Result<Self, VocabularyError> {
        let labels = keys
            .iter()
            .map(|k| k.as_ref().parse())
            .collect::<Result<Vec<ChordLabel>, _>>()?;
        Self::new(labels)
    }

    /// The default 67-label vocabulary: 12 major, 12 minor, the seven
    /// natural roots for each extended quality, then "N".
    pub fn standard() -> Self {
        let mut labels = Vec::with_capacity(67);
        for kind in [ChordKind::Major, ChordKind::Minor] {
            labels.extend(NoteName::ALL.iter().map(|&root| ChordLabel::new(root, kind)));
        }
        for &kind in &CHORD_KINDS[2..] {
            labels.extend(NATURAL_ROOTS.iter().map(|&root| ChordLabel::new(root, kind)));
        }
        labels.push(ChordLabel::NoChord);
        Vocabulary { labels }
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label at `index`, or entry 0 if `index` is out of range.
    pub fn label_at(&self, index: usize) -> ChordLabel {
        self.labels.get(index).copied().unwrap_or(self.labels[0])
    }

    /// Position of `label`, or 0 if it is not in this vocabulary.
    pub fn index_of(&self, label: &ChordLabel) -> usize {
        self.try_index_of(label).unwrap_or(0)
    }

    /// Position of `label`, if present.
    pub fn try_index_of(&self, label: &ChordLabel) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Whether `label` belongs to this vocabulary.
    pub fn contains(&self, label: &ChordLabel) -> bool {
        self.labels.contains(label)
    }

    /// Labels in index order.
    pub fn iter(&self) -> impl Iterator<Item = &ChordLabel> {
        self.labels.iter()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Vocabulary::standard()
    }
}
