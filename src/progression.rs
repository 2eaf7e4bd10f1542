//! Progression Builder
//!
//! Runs windows through a classifier in time order and merges runs of equal
//! predictions into labeled segments.

use serde::{Deserialize, Serialize};

use crate::{
    classifier::ChordClassifier, segment::AnalysisWindow, vocabulary::ChordLabel,
};

/// One labeled span of the progression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChordSegment {
    /// Predicted chord.
    pub chord: ChordLabel,
    /// Start in seconds, 2-decimal precision.
    pub start_time: f64,
    /// End in seconds, 2-decimal precision.
    pub end_time: f64,
}

impl ChordSegment {
    /// Length of the segment in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Time-ordered chord segments plus the signal duration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChordProgression {
    /// Segments in time order; neighbours never share a chord.
    #[serde(rename = "progression")]
    pub segments: Vec<ChordSegment>,
    /// Signal duration in seconds, 2-decimal precision.
    pub duration: f64,
}

impl ChordProgression {
    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when no segment was produced.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Chord sounding at `time` seconds. Segment ends are exclusive except
    /// for the final segment.
    pub fn chord_at(&self, time: f64) -> Option<ChordLabel> {
        let last = self.segments.len().checked_sub(1)?;
        self.segments
            .iter()
            .enumerate()
            .find(|(i, s)| {
                time >= s.start_time
                    && (time < s.end_time || (*i == last && time <= s.end_time))
            })
            .map(|(_, s)| s.chord)
    }

    /// Chord sequence without timing, e.g. `["C", "G", "Am", "F"]`.
    pub fn chord_names(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.chord.to_string()).collect()
    }
}

/// Single-pass segment merger.
///
/// Holds at most one open segment; a window with a different prediction
/// closes it for good.
pub struct ProgressionBuilder<'a> {
    classifier: &'a dyn ChordClassifier,
    closed: Vec<ChordSegment>,
    open: Option<ChordSegment>,
}

impl<'a> ProgressionBuilder<'a> {
    /// Start an empty progression classified by `classifier`.
    pub fn new(classifier: &'a dyn ChordClassifier) -> Self {
        ProgressionBuilder {
            classifier,
            closed: Vec::new(),
            open: None,
        }
    }

    /// Classify the next window and extend or close the open segment.
    pub fn push(&mut self, window: &AnalysisWindow) {
        let index = self.classifier.classify(window);
        let chord = self.classifier.vocabulary().label_at(index);
        if let Some(segment) = &mut self.open {
            if segment.chord == chord {
                segment.end_time = window.end_time;
                return;
            }
        }

        let segment = ChordSegment {
            chord,
            start_time: window.start_time,
            end_time: window.end_time,
        };
        if let Some(done) = self.open.replace(segment) {
            self.closed.push(done);
        }
    }

    /// Close the open segment and return the progression.
    pub fn finish(mut self, duration: f64) -> ChordProgression {
        if let Some(done) = self.open.take() {
            self.closed.push(done);
        }
        ChordProgression {
            segments: self.closed,
            duration,
        }
    }
}

/// Classify `windows` in order and merge them into a progression.
pub fn build_progression(
    windows: &[AnalysisWindow],
    classifier: &dyn ChordClassifier,
    duration: f64,
) -> ChordProgression {
    let mut builder = ProgressionBuilder::new(classifier);
    for window in windows {
        builder.push(window);
    }
    builder.finish(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::Vocabulary;

    /// Classifier that reads the predicted index out of chroma bin 0.
    struct Scripted {
        vocabulary: Vocabulary,
    }

    impl ChordClassifier for Scripted {
        fn classify(&self, window: &AnalysisWindow) -> usize {
            window.chroma[0] as usize
        }

        fn vocabulary(&self) -> &Vocabulary {
            &self.vocabulary
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn scripted() -> Scripted {
        Scripted {
            vocabulary: Vocabulary::from_keys(&["C", "G", "Am", "F"]).unwrap(),
        }
    }

    fn windows(labels: &[usize]) -> Vec<AnalysisWindow> {
        labels
            .iter()
            .enumerate()
            .map(|(i, &label)| {
                let mut chroma = [0.0; 12];
                chroma[0] = label as f32;
                AnalysisWindow {
                    start_time: i as f64,
                    end_time: (i + 1) as f64,
                    frame_count: 1,
                    chroma,
                    features: Vec::new(),
                }
            })
            .collect()
    }

    #[test]
    fn merges_consecutive_equal_labels() {
        let classifier = scripted();
        let progression = build_progression(&windows(&[0, 0, 1, 2, 2, 2, 0]), &classifier, 7.0);
        assert_eq!(progression.chord_names(), vec!["C", "G", "Am", "C"]);
        let spans: Vec<_> = progression
            .segments
            .iter()
            .map(|s| (s.start_time, s.end_time))
            .collect();
        assert_eq!(spans, vec![(0.0, 2.0), (2.0, 3.0), (3.0, 6.0), (6.0, 7.0)]);
        assert_eq!(progression.duration, 7.0);
    }

    #[test]
    fn single_window_single_segment() {
        let classifier = scripted();
        let progression = build_progression(&windows(&[3]), &classifier, 0.5);
        assert_eq!(progression.len(), 1);
        assert_eq!(progression.segments[0].chord.to_string(), "F");
    }

    #[test]
    fn no_windows_no_segments() {
        let classifier = scripted();
        let progression = build_progression(&[], &classifier, 0.0);
        assert!(progression.is_empty());
        assert_eq!(progression.duration, 0.0);
    }

    #[test]
    fn chord_at_looks_up_segments() {
        let classifier = scripted();
        let progression = build_progression(&windows(&[0, 1, 1]), &classifier, 3.0);
        assert_eq!(progression.chord_at(0.5).map(|c| c.to_string()), Some("C".into()));
        assert_eq!(progression.chord_at(1.0).map(|c| c.to_string()), Some("G".into()));
        assert_eq!(progression.chord_at(3.0).map(|c| c.to_string()), Some("G".into()));
        assert_eq!(progression.chord_at(3.5), None);
    }

    #[test]
    fn serializes_as_response_payload() {
        let classifier = scripted();
        let progression = build_progression(&windows(&[2]), &classifier, 1.0);
        let json = serde_json::to_value(&progression).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "progression": [{ "chord": "Am", "start_time": 0.0, "end_time": 1.0 }],
                "duration": 1.0
            })
        );
    }
}
