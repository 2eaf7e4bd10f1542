//! Chord Classifier
//!
//! Maps one analysis window to a vocabulary index. Two strategies share the
//! [`ChordClassifier`] contract: a trained convolutional network and a
//! training-free template correlation fallback. Which one runs is decided
//! once, from [`ClassifierConfig`], when the analyzer is built.

use std::sync::Arc;

use log::info;
use thiserror::Error;

use crate::{config::ClassifierConfig, segment::AnalysisWindow, vocabulary::Vocabulary};

pub mod network;
pub mod template;

pub use network::{Conv1dWeights, LinearWeights, NetworkClassifier, NetworkWeights};
pub use template::{TemplateClassifier, TemplateSet};

/// Common contract of every chord classification strategy.
///
/// Implementations are immutable after construction and shared across
/// threads behind an `Arc`.
pub trait ChordClassifier: Send + Sync {
    /// Best-guess vocabulary index for `window`. Never fails.
    fn classify(&self, window: &AnalysisWindow) -> usize;

    /// Vocabulary the returned indices refer to.
    fn vocabulary(&self) -> &Vocabulary;

    /// Required length of [`AnalysisWindow::features`], for fixed-shape
    /// models. `None` if any window is accepted.
    fn input_len(&self) -> Option<usize> {
        None
    }

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Errors when building a classifier or classifying raw vectors
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The chromagram provided did not have the expected number of semitones.
    #[error("expected a {expected}-bin chromagram, got {got}")]
    InvalidLength {
        /// The expected number of semitones (12).
        expected: usize,
        /// The actual number of values provided.
        got: usize,
    },

    /// A weight tensor does not have the shape its layer requires.
    #[error("layer `{layer}`: expected {expected} values, got {got}")]
    Shape {
        /// Layer name.
        layer: &'static str,
        /// Number of values the layer requires.
        expected: usize,
        /// Number of values found.
        got: usize,
    },

    /// The network's input size disagrees with the windows it would receive.
    #[error("network expects {expected} input values but windows provide {got}")]
    InputSizeMismatch {
        /// Input size the network was trained with.
        expected: usize,
        /// Feature length the segment averager produces.
        got: usize,
    },

    /// A label stored with the weights is not in the active vocabulary.
    #[error("model label `{0}` is not in the active vocabulary")]
    UnknownLabel(String),

    /// Weights carry no label table and their class count differs from the
    /// vocabulary size.
    #[error("model has {classes} classes but the vocabulary has {vocabulary} labels")]
    ClassCountMismatch {
        /// Output classes in the weights.
        classes: usize,
        /// Labels in the active vocabulary.
        vocabulary: usize,
    },

    /// The weights file could not be read.
    #[error("failed to read model weights: {0}")]
    Io(#[from] std::io::Error),

    /// The weights blob is not valid JSON for [`NetworkWeights`].
    #[error("failed to parse model weights: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Build the classifier selected by `config` over `vocabulary`.
///
/// This is the one place the strategy is chosen; the result is meant to be
/// built at startup and shared by every analysis.
pub fn load_classifier(
    config: &ClassifierConfig,
    vocabulary: Vocabulary,
) -> Result<Arc<dyn ChordClassifier>, ClassifierError> {
    match config {
        ClassifierConfig::Template {
            templates,
            silence_threshold,
        } => {
            info!("using template chord classifier ({templates:?})");
            let classifier = TemplateClassifier::builder()
                .templates(*templates)
                .silence_threshold(*silence_threshold)
                .vocabulary(vocabulary)
                .build();
            Ok(Arc::new(classifier))
        }
        ClassifierConfig::Network { weights } => {
            info!("loading chord network weights from {}", weights.display());
            let weights = NetworkWeights::from_path(weights)?;
            Ok(Arc::new(NetworkClassifier::new(weights, vocabulary)?))
        }
    }
}

/// Index of the largest score; the first one wins ties.
pub(crate) fn argmax(scores: impl IntoIterator<Item = f32>) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, s) in scores.into_iter().enumerate() {
        if s > best_score {
            best = i;
            best_score = s;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_of_equal_scores() {
        assert_eq!(argmax([0.1, 0.7, 0.7, 0.2]), 1);
        assert_eq!(argmax([f32::NAN, 0.5]), 1);
        assert_eq!(argmax(Vec::<f32>::new()), 0);
    }

    #[test]
    fn template_config_loads_template_classifier() {
        let config = ClassifierConfig::default();
        let classifier = load_classifier(&config, Vocabulary::standard()).unwrap();
        assert_eq!(classifier.name(), "template");
        assert_eq!(classifier.input_len(), None);
    }

    #[test]
    fn missing_weights_file_is_an_error() {
        let config = ClassifierConfig::Network {
            weights: "/nonexistent/chord-weights.json".into(),
        };
        let err = load_classifier(&config, Vocabulary::standard()).err();
        assert!(matches!(err, Some(ClassifierError::Io(_))));
    }
}
