//! Template correlation classifier.
//!
//! Scores a sum-normalized chroma vector against binary triad profiles and
//! picks the best match. Needs no training data; only plain major and minor
//! triads are modeled.

use serde::{Deserialize, Serialize};

use super::{argmax, ChordClassifier, ClassifierError};
use crate::{
    segment::AnalysisWindow,
    vocabulary::{ChordKind, ChordLabel, NoteName, Vocabulary, SEMITONES},
};

/// Added to the chroma sum before normalizing.
const EPSILON: f32 = 1e-8;

/// Canonical template order of [`TemplateSet::NaturalTriads`]. Earlier
/// entries win score ties.
const NATURAL_TRIADS: [ChordLabel; 10] = [
    ChordLabel::new(NoteName::C, ChordKind::Major),
    ChordLabel::new(NoteName::D, ChordKind::Major),
    ChordLabel::new(NoteName::E, ChordKind::Major),
    ChordLabel::new(NoteName::F, ChordKind::Major),
    ChordLabel::new(NoteName::G, ChordKind::Major),
    ChordLabel::new(NoteName::A, ChordKind::Major),
    ChordLabel::new(NoteName::B, ChordKind::Major),
    ChordLabel::new(NoteName::A, ChordKind::Minor),
    ChordLabel::new(NoteName::E, ChordKind::Minor),
    ChordLabel::new(NoteName::D, ChordKind::Minor),
];

/// Which triads the template classifier scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSet {
    /// C D E F G A B major, then A E D minor.
    #[default]
    NaturalTriads,
    /// All 12 major triads from C, then all 12 minor triads from C.
    AllTriads,
}

impl TemplateSet {
    /// Template labels in tie-break order.
    pub fn labels(self) -> Vec<ChordLabel> {
        match self {
            TemplateSet::NaturalTriads => NATURAL_TRIADS.to_vec(),
            TemplateSet::AllTriads => [ChordKind::Major, ChordKind::Minor]
                .iter()
                .flat_map(|&kind| NoteName::ALL.iter().map(move |&root| ChordLabel::new(root, kind)))
                .collect(),
        }
    }
}

/// Precomputed template: label plus binary pitch-class profile
#[derive(Debug, Clone, Copy)]
struct Template {
    label: ChordLabel,
    profile: [f32; SEMITONES],
}

/// Builder for [`TemplateClassifier`]
pub struct TemplateClassifierBuilder {
    templates: TemplateSet,
    silence_threshold: Option<f32>,
    vocabulary: Vocabulary,
}

impl TemplateClassifierBuilder {
    /// Natural triads, no silence detection, standard vocabulary.
    pub fn new() -> Self {
        TemplateClassifierBuilder {
            templates: TemplateSet::default(),
            silence_threshold: None,
            vocabulary: Vocabulary::standard(),
        }
    }

    /// Set which templates are scored.
    pub fn templates(mut self, set: TemplateSet) -> Self {
        self.templates = set;
        self
    }

    /// Map windows whose total chroma energy is below `threshold` to "N",
    /// when the vocabulary has it. `None` disables this.
    pub fn silence_threshold(mut self, threshold: Option<f32>) -> Self {
        self.silence_threshold = threshold;
        self
    }

    /// Set the vocabulary predictions are indexed against.
    pub fn vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Build the `TemplateClassifier`
    pub fn build(self) -> TemplateClassifier {
        let templates = self
            .templates
            .labels()
            .into_iter()
            .map(|label| Template {
                label,
                profile: label.pitch_classes(),
            })
            .collect();
        let silence = self
            .silence_threshold
            .and_then(|t| self.vocabulary.try_index_of(&ChordLabel::NoChord).map(|idx| (t, idx)));

        TemplateClassifier {
            templates,
            silence,
            vocabulary: self.vocabulary,
        }
    }
}

impl Default for TemplateClassifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Training-free chord classifier
#[derive(Debug, Clone)]
pub struct TemplateClassifier {
    templates: Vec<Template>,
    /// (energy threshold, index of "N")
    silence: Option<(f32, usize)>,
    vocabulary: Vocabulary,
}

impl TemplateClassifier {
    /// Return a builder to customize templates and vocabulary
    pub fn builder() -> TemplateClassifierBuilder {
        TemplateClassifierBuilder::new()
    }

    /// Natural-triad classifier over the standard vocabulary.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Classify any 12-bin chroma vector.
    ///
    /// Returns `Err(ClassifierError::InvalidLength)` if `chroma.len() != 12`.
    pub fn classify_chroma(&self, chroma: &[f32]) -> Result<usize, ClassifierError> {
        if chroma.len() != SEMITONES {
            return Err(ClassifierError::InvalidLength {
                expected: SEMITONES,
                got: chroma.len(),
            });
        }

        let total: f32 = chroma.iter().sum();
        if let Some((threshold, no_chord)) = self.silence {
            if total < threshold {
                return Ok(no_chord);
            }
        }

        let norm = total + EPSILON;
        let best = argmax(self.templates.iter().map(|t| score(chroma, &t.profile, norm)));
        // A label outside the vocabulary resolves to entry 0.
        Ok(self.vocabulary.index_of(&self.templates[best].label))
    }

    /// Template labels in tie-break order.
    pub fn template_labels(&self) -> impl Iterator<Item = ChordLabel> + '_ {
        self.templates.iter().map(|t| t.label)
    }
}

impl Default for TemplateClassifier {
    fn default() -> Self {
        TemplateClassifier::new()
    }
}

impl ChordClassifier for TemplateClassifier {
    fn classify(&self, window: &AnalysisWindow) -> usize {
        // window.chroma always has 12 bins
        self.classify_chroma(&window.chroma).unwrap_or(0)
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

/// Dot product of the normalized chroma with a template profile
#[inline(always)]
fn score(chroma: &[f32], profile: &[f32; SEMITONES], norm: f32) -> f32 {
    chroma
        .iter()
        .zip(profile)
        .map(|(&c, &p)| (c / norm) * p)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chroma_of(classes: &[usize]) -> [f32; SEMITONES] {
        let mut c = [0.0; SEMITONES];
        for &i in classes {
            c[i] = 1.0;
        }
        c
    }

    fn label(classifier: &TemplateClassifier, chroma: &[f32]) -> String {
        let idx = classifier.classify_chroma(chroma).unwrap();
        classifier.vocabulary().label_at(idx).to_string()
    }

    #[test]
    fn picks_matching_triads() {
        let classifier = TemplateClassifier::new();
        assert_eq!(label(&classifier, &chroma_of(&[0, 4, 7])), "C");
        assert_eq!(label(&classifier, &chroma_of(&[7, 11, 2])), "G");
        assert_eq!(label(&classifier, &chroma_of(&[9, 1, 4])), "A");
        assert_eq!(label(&classifier, &chroma_of(&[9, 0, 4])), "Am");
        assert_eq!(label(&classifier, &chroma_of(&[2, 5, 9])), "Dm");
    }

    #[test]
    fn ties_go_to_the_earliest_template() {
        let classifier = TemplateClassifier::new();
        // E and G are shared by C major and E minor; C comes first.
        assert_eq!(label(&classifier, &chroma_of(&[4, 7])), "C");
        // Only G is lit: C, E, G and Em all score equally.
        assert_eq!(label(&classifier, &chroma_of(&[7])), "C");
        // Only B is lit: E, G, B and Em tie; E comes first.
        assert_eq!(label(&classifier, &chroma_of(&[11])), "E");
    }

    #[test]
    fn silence_does_not_panic() {
        let classifier = TemplateClassifier::new();
        assert_eq!(classifier.classify_chroma(&[0.0; 12]).unwrap(), 0);
    }

    #[test]
    fn silence_threshold_maps_to_no_chord() {
        let classifier = TemplateClassifier::builder()
            .silence_threshold(Some(1e-3))
            .build();
        let idx = classifier.classify_chroma(&[0.0; 12]).unwrap();
        assert_eq!(classifier.vocabulary().label_at(idx), ChordLabel::NoChord);
        // loud input is unaffected
        assert_eq!(label(&classifier, &chroma_of(&[0, 4, 7])), "C");
    }

    #[test]
    fn labels_missing_from_vocabulary_fall_back_to_zero() {
        let classifier = TemplateClassifier::builder()
            .vocabulary(Vocabulary::from_keys(&["G", "C", "F"]).unwrap())
            .build();
        assert_eq!(classifier.classify_chroma(&chroma_of(&[0, 4, 7])).unwrap(), 1);
        // Am is not in this vocabulary
        assert_eq!(classifier.classify_chroma(&chroma_of(&[9, 0, 4])).unwrap(), 0);
    }

    #[test]
    fn all_triads_cover_sharp_roots() {
        let classifier = TemplateClassifier::builder()
            .templates(TemplateSet::AllTriads)
            .build();
        assert_eq!(classifier.template_labels().count(), 24);
        assert_eq!(label(&classifier, &chroma_of(&[1, 5, 8])), "C#");
        assert_eq!(label(&classifier, &chroma_of(&[6, 9, 1])), "F#m");
    }

    #[test]
    fn rejects_wrong_length() {
        let classifier = TemplateClassifier::new();
        assert!(matches!(
            classifier.classify_chroma(&[1.0; 11]),
            Err(ClassifierError::InvalidLength { expected: 12, got: 11 })
        ));
    }
}
