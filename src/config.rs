//! Configuration parameters for chord analysis

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    chromagram::{DEFAULT_HOP_LENGTH, DEFAULT_MIN_FREQUENCY, DEFAULT_N_FFT},
    classifier::TemplateSet,
    segment::DEFAULT_WINDOW_FRAMES,
    vocabulary::{Vocabulary, VocabularyError},
};

/// Sample rate the pipeline's defaults are tuned for. Analysing at this
/// reduced rate bounds compute cost; callers should decode to it.
pub const DEFAULT_SAMPLE_RATE: u32 = 11_025;

/// Errors when loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON for [`AnalysisConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which chord classifier to run, chosen once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierConfig {
    /// Training-free template correlation.
    Template {
        /// Template set to score (default: natural triads).
        #[serde(default)]
        templates: TemplateSet,
        /// Total chroma energy below which a window is labeled "N".
        /// Disabled when absent.
        #[serde(default)]
        silence_threshold: Option<f32>,
    },
    /// Trained network loaded from a JSON weights file.
    Network {
        /// Path of the weights file.
        weights: PathBuf,
    },
}

impl ClassifierConfig {
    /// Use the network if `weights` exists, otherwise fall back to templates.
    pub fn detect<P: AsRef<Path>>(weights: P) -> Self {
        let weights = weights.as_ref();
        if weights.is_file() {
            ClassifierConfig::Network {
                weights: weights.to_path_buf(),
            }
        } else {
            warn!(
                "no chord model at {}; using template classifier",
                weights.display()
            );
            ClassifierConfig::default()
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::Template {
            templates: TemplateSet::default(),
            silence_threshold: None,
        }
    }
}

/// Analysis configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// FFT size for the chromagram (default: 2048)
    pub n_fft: usize,

    /// Hop between chromagram frames (default: 1024)
    pub hop_length: usize,

    /// Frames averaged into one classification window (default: 50).
    /// Larger windows smooth out spurious changes but blur fast ones.
    pub window_frames: usize,

    /// Lowest frequency folded into the chromagram, in Hz (default: 80.0)
    pub min_frequency: f32,

    /// Highest frequency folded into the chromagram, in Hz (default: Nyquist)
    pub max_frequency: Option<f32>,

    /// Reference frequency of A4 (default: 440.0)
    pub tuning: f32,

    /// Vocabulary as string keys (default: the standard 67-label set)
    pub vocabulary: Option<Vec<String>>,

    /// Classifier selection (default: natural-triad templates)
    pub classifier: ClassifierConfig,
}

impl AnalysisConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Resolve the configured vocabulary.
    pub fn vocabulary(&self) -> Result<Vocabulary, VocabularyError> {
        match &self.vocabulary {
            Some(keys) => Vocabulary::from_keys(keys),
            None => Ok(Vocabulary::standard()),
        }
    }

    /// Length of a flattened window, i.e. the input size a network must have.
    pub fn feature_len(&self) -> usize {
        crate::vocabulary::SEMITONES * self.window_frames
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            n_fft: DEFAULT_N_FFT,
            hop_length: DEFAULT_HOP_LENGTH,
            window_frames: DEFAULT_WINDOW_FRAMES,
            min_frequency: DEFAULT_MIN_FREQUENCY,
            max_frequency: None,
            tuning: 440.0,
            vocabulary: None,
            classifier: ClassifierConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config = AnalysisConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.feature_len(), 600);
    }

    #[test]
    fn parses_network_classifier() {
        let config = AnalysisConfig::from_json_str(
            r#"{ "window_frames": 20, "classifier": { "kind": "network", "weights": "model.json" } }"#,
        )
        .unwrap();
        assert_eq!(config.window_frames, 20);
        assert_eq!(
            config.classifier,
            ClassifierConfig::Network { weights: "model.json".into() }
        );
    }

    #[test]
    fn parses_template_options() {
        let config = AnalysisConfig::from_json_str(
            r#"{ "classifier": { "kind": "template", "templates": "all_triads", "silence_threshold": 0.01 } }"#,
        )
        .unwrap();
        assert_eq!(
            config.classifier,
            ClassifierConfig::Template {
                templates: TemplateSet::AllTriads,
                silence_threshold: Some(0.01),
            }
        );
    }

    #[test]
    fn custom_vocabulary_is_validated() {
        let config = AnalysisConfig {
            vocabulary: Some(vec!["C".into(), "G".into(), "N".into()]),
            ..AnalysisConfig::default()
        };
        assert_eq!(config.vocabulary().unwrap().len(), 3);
        let config = AnalysisConfig {
            vocabulary: Some(vec!["C".into(), "Q7".into()]),
            ..AnalysisConfig::default()
        };
        assert!(config.vocabulary().is_err());
    }

    #[test]
    fn detect_falls_back_without_weights() {
        let config = ClassifierConfig::detect("/nonexistent/weights.json");
        assert_eq!(config, ClassifierConfig::default());
    }
}
