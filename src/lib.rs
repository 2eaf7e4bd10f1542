//! # chord_progression
//!
//! Extract a time-aligned chord progression from a whole audio recording:
//! compute a 12-bin chromagram, average it over fixed windows, classify
//! each window, and merge runs of equal chords into labeled segments.
//!
//! ## Example
//! ```rust
//! use chord_progression::{AnalysisConfig, ChordAnalyzer, DEFAULT_SAMPLE_RATE};
//!
//! fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1) Build the analyzer once at startup
//!     let analyzer = ChordAnalyzer::from_config(&AnalysisConfig::default())?;
//!
//!     // 2) Per request: mono samples, already decoded and resampled
//!     let samples: Vec<f32> = vec![0.0; DEFAULT_SAMPLE_RATE as usize * 2];
//!     let progression = analyzer.analyze(&samples, DEFAULT_SAMPLE_RATE)?;
//!     for segment in &progression.segments {
//!         println!(
//!             "{:>6} {:.2}s - {:.2}s",
//!             segment.chord.to_string(),
//!             segment.start_time,
//!             segment.end_time
//!         );
//!     }
//!
//!     Ok(())
//! }
//! # run().unwrap();
//! ```
//!
//! ## Classifiers
//! - template correlation (default): needs no model, major/minor triads only
//! - trained network: a small 1-D CNN loaded from a JSON weights file

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rust_2018_idioms)]
#![deny(clippy::all)]

/// End-to-end analysis pipeline.
pub use analyzer::{AnalysisError, ChordAnalyzer, ChordAnalyzerBuilder};

/// Whole-signal chromagram extractor.
pub use chromagram::{ChromaExtractor, ChromaExtractorBuilder, ChromagramError};

/// Classification strategies.
pub use classifier::{
    load_classifier, ChordClassifier, ClassifierError, NetworkClassifier, NetworkWeights,
    TemplateClassifier, TemplateSet,
};

/// Configuration.
pub use config::{AnalysisConfig, ClassifierConfig, ConfigError, DEFAULT_SAMPLE_RATE};

/// Progression output types.
pub use progression::{build_progression, ChordProgression, ChordSegment, ProgressionBuilder};

/// Window averaging.
pub use segment::{AnalysisWindow, ChromaVector, SegmentAverager, SegmentAveragerBuilder};

/// Chord vocabulary.
pub use vocabulary::{ChordKind, ChordLabel, NoteName, Vocabulary, VocabularyError};

/// Analysis pipeline module.
pub mod analyzer;

/// Chromagram computation module.
pub mod chromagram;

/// Chord classification module.
pub mod classifier;

/// Configuration module.
pub mod config;

/// Progression building module.
pub mod progression;

/// Segment averaging module.
pub mod segment;

/// Chord vocabulary module.
pub mod vocabulary;
