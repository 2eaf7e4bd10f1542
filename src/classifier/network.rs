//! Convolutional network classifier.
//!
//! Inference-only forward pass of a small 1-D CNN over a flattened chroma
//! window:
//!
//! ```text
//! conv1d(1→16, k=3) → maxpool(2) → ReLU → conv1d(16→32, k=3) → maxpool(2)
//!   → ReLU → dropout → linear(→128) → ReLU → dropout → linear(→classes)
//! ```
//!
//! Dropout is the identity at inference. Only the argmax of the final layer
//! is used, so no softmax is applied.

use std::{fs::File, io::BufReader, io::Read, path::Path};

use log::{debug, info};
use ndarray::{Array1, Array2, Array3, ArrayView1};
use serde::{Deserialize, Serialize};

use super::{argmax, ChordClassifier, ClassifierError};
use crate::{
    segment::AnalysisWindow,
    vocabulary::{ChordLabel, Vocabulary},
};

const CONV1_CHANNELS: usize = 16;
const CONV2_CHANNELS: usize = 32;
const KERNEL_SIZE: usize = 3;
const HIDDEN_UNITS: usize = 128;
const POOL: usize = 2;

/// Serialized 1-D convolution layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv1dWeights {
    /// Kernel, row-major `[out_channels][in_channels][kernel]`.
    pub weight: Vec<f32>,
    /// One bias per output channel.
    pub bias: Vec<f32>,
}

/// Serialized fully-connected layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearWeights {
    /// Matrix, row-major `[out_features][in_features]`.
    pub weight: Vec<f32>,
    /// One bias per output feature.
    pub bias: Vec<f32>,
}

/// Trained weights blob, as supplied by model storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkWeights {
    /// Length of the flattened input window (12 × window frames).
    pub input_size: usize,
    /// String keys of the output classes, in output-row order. When empty,
    /// rows map positionally onto the vocabulary.
    #[serde(default)]
    pub labels: Vec<String>,
    /// First convolution.
    pub conv1: Conv1dWeights,
    /// Second convolution.
    pub conv2: Conv1dWeights,
    /// Hidden fully-connected layer.
    pub fc1: LinearWeights,
    /// Output layer.
    pub fc2: LinearWeights,
}

impl NetworkWeights {
    /// Parse a JSON weights blob.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ClassifierError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Parse a JSON weights file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ClassifierError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Number of output classes, as implied by the output bias.
    pub fn num_classes(&self) -> usize {
        self.fc2.bias.len()
    }
}

/// Conv layer in tensor form.
#[derive(Debug, Clone)]
struct Conv1d {
    /// (out, in, kernel)
    weight: Array3<f32>,
    bias: Array1<f32>,
}

impl Conv1d {
    fn load(
        layer: &'static str,
        w: Conv1dWeights,
        in_ch: usize,
        out_ch: usize,
    ) -> Result<Self, ClassifierError> {
        check_len(layer, &w.bias, out_ch)?;
        check_len(layer, &w.weight, out_ch * in_ch * KERNEL_SIZE)?;
        let got = w.weight.len();
        let weight = Array3::from_shape_vec((out_ch, in_ch, KERNEL_SIZE), w.weight).map_err(|_| {
            ClassifierError::Shape {
                layer,
                expected: out_ch * in_ch * KERNEL_SIZE,
                got,
            }
        })?;
        Ok(Conv1d {
            weight,
            bias: Array1::from(w.bias),
        })
    }

    /// Same-length convolution (zero padding of `kernel / 2` on each side).
    /// Input and output are `(channels, length)`.
    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let (out_ch, in_ch, kernel) = self.weight.dim();
        let len = x.ncols();
        let pad = kernel / 2;
        let mut y = Array2::zeros((out_ch, len));
        for o in 0..out_ch {
            for t in 0..len {
                let mut acc = self.bias[o];
                for i in 0..in_ch {
                    for k in 0..kernel {
                        // input position t + k - pad, skipped when in the padding
                        if let Some(pos) = (t + k).checked_sub(pad) {
                            if pos < len {
                                acc += self.weight[[o, i, k]] * x[[i, pos]];
                            }
                        }
                    }
                }
                y[[o, t]] = acc;
            }
        }
        y
    }
}

/// Linear layer in tensor form.
#[derive(Debug, Clone)]
struct Linear {
    /// (out, in)
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    fn load(
        layer: &'static str,
        w: LinearWeights,
        in_features: usize,
        out_features: usize,
    ) -> Result<Self, ClassifierError> {
        check_len(layer, &w.bias, out_features)?;
        check_len(layer, &w.weight, out_features * in_features)?;
        let got = w.weight.len();
        let weight = Array2::from_shape_vec((out_features, in_features), w.weight).map_err(|_| {
            ClassifierError::Shape {
                layer,
                expected: out_features * in_features,
                got,
            }
        })?;
        Ok(Linear {
            weight,
            bias: Array1::from(w.bias),
        })
    }

    fn forward(&self, x: ArrayView1<'_, f32>) -> Array1<f32> {
        self.weight.dot(&x) + &self.bias
    }
}

/// Trained CNN chord classifier
#[derive(Debug, Clone)]
pub struct NetworkClassifier {
    input_size: usize,
    conv1: Conv1d,
    conv2: Conv1d,
    fc1: Linear,
    fc2: Linear,
    /// Vocabulary index of each output row.
    class_indices: Vec<usize>,
    vocabulary: Vocabulary,
}

impl NetworkClassifier {
    /// Validate `weights` and bind their output classes to `vocabulary`.
    ///
    /// Every tensor shape is checked here, so a malformed blob fails at load
    /// time rather than on the first window.
    pub fn new(weights: NetworkWeights, vocabulary: Vocabulary) -> Result<Self, ClassifierError> {
        let input_size = weights.input_size;
        let pooled = input_size / POOL / POOL;
        if pooled == 0 {
            return Err(ClassifierError::Shape {
                layer: "input",
                expected: POOL * POOL,
                got: input_size,
            });
        }
        let num_classes = weights.num_classes();
        let class_indices = bind_labels(&weights.labels, num_classes, &vocabulary)?;

        let conv1 = Conv1d::load("conv1", weights.conv1, 1, CONV1_CHANNELS)?;
        let conv2 = Conv1d::load("conv2", weights.conv2, CONV1_CHANNELS, CONV2_CHANNELS)?;
        let fc1 = Linear::load("fc1", weights.fc1, pooled * CONV2_CHANNELS, HIDDEN_UNITS)?;
        let fc2 = Linear::load("fc2", weights.fc2, HIDDEN_UNITS, num_classes)?;

        info!(
            "loaded chord network: {} inputs, {} classes",
            input_size, num_classes
        );
        Ok(NetworkClassifier {
            input_size,
            conv1,
            conv2,
            fc1,
            fc2,
            class_indices,
            vocabulary,
        })
    }

    /// Raw output scores, one per model class.
    ///
    /// Returns `Err(ClassifierError::InputSizeMismatch)` if `features` is not
    /// exactly the configured input size.
    pub fn scores(&self, features: &[f32]) -> Result<Array1<f32>, ClassifierError> {
        if features.len() != self.input_size {
            return Err(ClassifierError::InputSizeMismatch {
                expected: self.input_size,
                got: features.len(),
            });
        }

        let x = Array2::from_shape_fn((1, features.len()), |(_, t)| features[t]);
        let x = relu(max_pool(self.conv1.forward(&x)));
        let x = relu(max_pool(self.conv2.forward(&x)));
        // Flatten channel-major: (channels, length) row-major is already that order.
        let flat = Array1::from_iter(x.iter().copied());
        let hidden = relu1(self.fc1.forward(flat.view()));
        Ok(self.fc2.forward(hidden.view()))
    }

    /// Vocabulary index for a flattened chroma window.
    pub fn classify_features(&self, features: &[f32]) -> Result<usize, ClassifierError> {
        let scores = self.scores(features)?;
        let class = argmax(scores.iter().copied());
        debug!("network scores argmax = {class}");
        Ok(self.class_indices[class])
    }
}

impl ChordClassifier for NetworkClassifier {
    /// # Panics
    ///
    /// Panics if the window's feature length differs from the network input
    /// size. Analyzers check this when they are built.
    fn classify(&self, window: &AnalysisWindow) -> usize {
        match self.classify_features(&window.features) {
            Ok(idx) => idx,
            Err(e) => panic!("chord network misconfigured: {e}"),
        }
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    fn input_len(&self) -> Option<usize> {
        Some(self.input_size)
    }

    fn name(&self) -> &'static str {
        "network"
    }
}

/// Map each output row to a vocabulary index.
fn bind_labels(
    labels: &[String],
    num_classes: usize,
    vocabulary: &Vocabulary,
) -> Result<Vec<usize>, ClassifierError> {
    if labels.is_empty() {
        if num_classes != vocabulary.len() {
            return Err(ClassifierError::ClassCountMismatch {
                classes: num_classes,
                vocabulary: vocabulary.len(),
            });
        }
        return Ok((0..num_classes).collect());
    }
    if labels.len() != num_classes {
        return Err(ClassifierError::Shape {
            layer: "labels",
            expected: num_classes,
            got: labels.len(),
        });
    }
    labels
        .iter()
        .map(|key| {
            key.parse::<ChordLabel>()
                .ok()
                .and_then(|label| vocabulary.try_index_of(&label))
                .ok_or_else(|| ClassifierError::UnknownLabel(key.clone()))
        })
        .collect()
}

fn check_len(layer: &'static str, values: &[f32], expected: usize) -> Result<(), ClassifierError> {
    if values.len() != expected {
        return Err(ClassifierError::Shape {
            layer,
            expected,
            got: values.len(),
        });
    }
    Ok(())
}

/// Non-overlapping max-pool along the time axis, dropping a trailing odd sample.
fn max_pool(x: Array2<f32>) -> Array2<f32> {
    let (channels, len) = x.dim();
    Array2::from_shape_fn((channels, len / POOL), |(c, t)| {
        (0..POOL)
            .map(|k| x[[c, t * POOL + k]])
            .fold(f32::NEG_INFINITY, f32::max)
    })
}

fn relu(x: Array2<f32>) -> Array2<f32> {
    x.mapv_into(|v| v.max(0.0))
}

fn relu1(x: Array1<f32>) -> Array1<f32> {
    x.mapv_into(|v| v.max(0.0))
}
