//! Chord Analyzer
//!
//! End-to-end pipeline: signal → chromagram → windows → classifier →
//! progression.

use std::{num::NonZeroU32, sync::Arc, time::Instant};

use log::debug;
use thiserror::Error;

use crate::{
    chromagram::{ChromaExtractor, ChromagramError},
    classifier::{load_classifier, ChordClassifier, ClassifierError, TemplateClassifier},
    config::AnalysisConfig,
    progression::{ChordProgression, ProgressionBuilder},
    segment::{round2, SegmentAverager},
    vocabulary::VocabularyError,
};

/// Errors that can occur while building or running an analyzer
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The sample rate must be positive.
    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    /// Chromagram configuration error.
    #[error(transparent)]
    Chromagram(#[from] ChromagramError),

    /// Classifier load or shape error.
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    /// Vocabulary configuration error.
    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),
}

/// Builder for a [`ChordAnalyzer`].
pub struct ChordAnalyzerBuilder {
    extractor: Option<ChromaExtractor>,
    window_frames: usize,
    classifier: Option<Arc<dyn ChordClassifier>>,
}

impl ChordAnalyzerBuilder {
    /// Default extractor, 50-frame windows, natural-triad templates.
    pub fn new() -> Self {
        ChordAnalyzerBuilder {
            extractor: None,
            window_frames: crate::segment::DEFAULT_WINDOW_FRAMES,
            classifier: None,
        }
    }

    /// Use a custom chromagram extractor. Its hop length also drives window
    /// timing.
    pub fn extractor(mut self, extractor: ChromaExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Set the number of frames per classification window.
    pub fn window_frames(mut self, frames: usize) -> Self {
        self.window_frames = frames;
        self
    }

    /// Use a preloaded, shared classifier.
    pub fn classifier(mut self, classifier: Arc<dyn ChordClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Finalize and create the analyzer.
    ///
    /// Returns `Err(ClassifierError::InputSizeMismatch)` when a fixed-shape
    /// classifier does not accept the windows this analyzer produces.
    pub fn build(self) -> Result<ChordAnalyzer, AnalysisError> {
        let extractor = match self.extractor {
            Some(extractor) => extractor,
            None => ChromaExtractor::builder().build()?,
        };
        let averager = SegmentAverager::builder()
            .window_frames(self.window_frames)
            .hop_length(extractor.hop_length())
            .build();
        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(TemplateClassifier::new()));

        if let Some(expected) = classifier.input_len() {
            if expected != averager.feature_len() {
                return Err(ClassifierError::InputSizeMismatch {
                    expected,
                    got: averager.feature_len(),
                }
                .into());
            }
        }

        Ok(ChordAnalyzer {
            extractor,
            averager,
            classifier,
        })
    }
}

impl Default for ChordAnalyzerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Chord progression extractor.
///
/// Cheap to clone; clones share the same classifier. Holds no mutable
/// state, so one analyzer can serve concurrent requests.
#[derive(Clone)]
pub struct ChordAnalyzer {
    extractor: ChromaExtractor,
    averager: SegmentAverager,
    classifier: Arc<dyn ChordClassifier>,
}

impl ChordAnalyzer {
    /// Start customizing with a builder.
    pub fn builder() -> ChordAnalyzerBuilder {
        ChordAnalyzerBuilder::new()
    }

    /// Build an analyzer, including its classifier, from configuration.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let extractor = ChromaExtractor::builder()
            .n_fft(config.n_fft)
            .hop_length(config.hop_length)
            .min_frequency(config.min_frequency)
            .max_frequency(config.max_frequency)
            .tuning(config.tuning)
            .build()?;
        let classifier = load_classifier(&config.classifier, config.vocabulary()?)?;
        ChordAnalyzer::builder()
            .extractor(extractor)
            .window_frames(config.window_frames)
            .classifier(classifier)
            .build()
    }

    /// The shared classifier.
    pub fn classifier(&self) -> &Arc<dyn ChordClassifier> {
        &self.classifier
    }

    /// Extract the chord progression of a whole mono signal.
    ///
    /// An empty signal yields an empty progression with duration 0.
    pub fn analyze(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<ChordProgression, AnalysisError> {
        let rate = NonZeroU32::new(sample_rate).ok_or(AnalysisError::InvalidSampleRate(sample_rate))?;
        let started = Instant::now();

        let exact_duration = samples.len() as f64 / rate.get() as f64;
        let chroma = self.extractor.extract(samples, rate);
        let windows = self.averager.average(chroma.view(), rate, exact_duration);
        debug!(
            "{} frames -> {} windows ({} classifier)",
            chroma.ncols(),
            windows.len(),
            self.classifier.name()
        );

        let mut builder = ProgressionBuilder::new(self.classifier.as_ref());
        for window in &windows {
            builder.push(window);
        }
        let progression = builder.finish(round2(exact_duration));

        debug!(
            "chord analysis: {} segments over {:.2}s in {:?}",
            progression.len(),
            progression.duration,
            started.elapsed()
        );
        Ok(progression)
    }
}

impl std::fmt::Debug for ChordAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChordAnalyzer")
            .field("extractor", &self.extractor)
            .field("averager", &self.averager)
            .field("classifier", &self.classifier.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Conv1dWeights, LinearWeights, NetworkClassifier, NetworkWeights};
    use crate::vocabulary::Vocabulary;

    fn zero_network(input_size: usize) -> NetworkClassifier {
        let vocab = Vocabulary::standard();
        let pooled = input_size / 4;
        let weights = NetworkWeights {
            input_size,
            labels: Vec::new(),
            conv1: Conv1dWeights { weight: vec![0.0; 16 * 3], bias: vec![0.0; 16] },
            conv2: Conv1dWeights { weight: vec![0.0; 32 * 16 * 3], bias: vec![0.0; 32] },
            fc1: LinearWeights { weight: vec![0.0; 128 * pooled * 32], bias: vec![0.0; 128] },
            fc2: LinearWeights { weight: vec![0.0; vocab.len() * 128], bias: vec![0.0; vocab.len()] },
        };
        NetworkClassifier::new(weights, vocab).unwrap()
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let analyzer = ChordAnalyzer::builder().build().unwrap();
        assert!(matches!(
            analyzer.analyze(&[0.0; 100], 0),
            Err(AnalysisError::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn network_input_size_is_checked_at_build() {
        let err = ChordAnalyzer::builder()
            .window_frames(10)
            .classifier(Arc::new(zero_network(600)))
            .build()
            .err();
        assert!(matches!(
            err,
            Some(AnalysisError::Classifier(ClassifierError::InputSizeMismatch {
                expected: 600,
                got: 120
            }))
        ));
    }

    #[test]
    fn network_runs_on_padded_windows() {
        let analyzer = ChordAnalyzer::builder()
            .window_frames(10)
            .classifier(Arc::new(zero_network(120)))
            .build()
            .unwrap();
        // 0.1 s -> 2 frames, padded to 10
        let progression = analyzer.analyze(&vec![0.1; 1102], 11_025).unwrap();
        assert_eq!(progression.len(), 1);
        assert_eq!(progression.segments[0].chord.to_string(), "C");
    }

    #[test]
    fn from_default_config() {
        let analyzer = ChordAnalyzer::from_config(&AnalysisConfig::default()).unwrap();
        assert_eq!(analyzer.classifier().name(), "template");
        let progression = analyzer.analyze(&[], 11_025).unwrap();
        assert!(progression.is_empty());
        assert_eq!(progression.duration, 0.0);
    }
}
