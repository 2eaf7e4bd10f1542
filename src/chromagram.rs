//! Chromagram
//!
//! Whole-signal 12-bin chromagram computation via a short-time Fourier
//! transform. Each analysis frame's power spectrum is folded onto the twelve
//! pitch classes, yielding a `(12, num_frames)` matrix of raw (unnormalized)
//! pitch-class energy.

use std::{f32::consts::PI, num::NonZeroU32, sync::Arc};

use log::debug;
use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use thiserror::Error;

use crate::vocabulary::SEMITONES;

/// Default FFT size in samples.
pub const DEFAULT_N_FFT: usize = 2048;

/// Default hop between frames in samples.
pub const DEFAULT_HOP_LENGTH: usize = 1024;

/// Lowest frequency folded into the chromagram by default. Bins below this
/// are wider than a semitone at the default resolution.
pub const DEFAULT_MIN_FREQUENCY: f32 = 80.0;

/// Errors returned by the chromagram pipeline.
#[derive(Debug, Error)]
pub enum ChromagramError {
    /// An error occurred during the configuration of the extractor.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Builder for a [`ChromaExtractor`].
#[derive(Debug, Clone)]
pub struct ChromaExtractorBuilder {
    n_fft: usize,
    hop_length: usize,
    min_frequency: f32,
    max_frequency: Option<f32>,
    tuning: f32,
}

impl ChromaExtractorBuilder {
    /// Start with default parameters:
    /// n_fft = 2048, hop_length = 1024, min_frequency = 80 Hz,
    /// max_frequency = Nyquist, tuning = 440 Hz.
    pub fn new() -> Self {
        ChromaExtractorBuilder {
            n_fft: DEFAULT_N_FFT,
            hop_length: DEFAULT_HOP_LENGTH,
            min_frequency: DEFAULT_MIN_FREQUENCY,
            max_frequency: None,
            tuning: 440.0,
        }
    }

    /// Set the FFT size in samples.
    pub fn n_fft(mut self, size: usize) -> Self {
        self.n_fft = size;
        self
    }

    /// Set the hop between consecutive frames in samples.
    pub fn hop_length(mut self, hop: usize) -> Self {
        self.hop_length = hop;
        self
    }

    /// Set the lowest frequency (Hz) that contributes to the chromagram.
    pub fn min_frequency(mut self, hz: f32) -> Self {
        self.min_frequency = hz;
        self
    }

    /// Set the highest frequency (Hz) that contributes; `None` means Nyquist.
    pub fn max_frequency(mut self, hz: Option<f32>) -> Self {
        self.max_frequency = hz;
        self
    }

    /// Set the reference frequency of A4.
    pub fn tuning(mut self, a4_hz: f32) -> Self {
        self.tuning = a4_hz;
        self
    }

    /// Finalize and create the extractor.
    pub fn build(self) -> Result<ChromaExtractor, ChromagramError> {
        if self.n_fft == 0 {
            return Err(ChromagramError::Configuration("n_fft cannot be zero".into()));
        }
        if self.hop_length == 0 {
            return Err(ChromagramError::Configuration("hop_length cannot be zero".into()));
        }
        if self.tuning.is_nan() || self.tuning <= 0.0 {
            return Err(ChromagramError::Configuration("tuning must be positive".into()));
        }
        if let Some(max) = self.max_frequency {
            if max <= self.min_frequency {
                return Err(ChromagramError::Configuration(format!(
                    "empty frequency band {}..{} Hz",
                    self.min_frequency, max
                )));
            }
        }

        // Prepare FFT plan once
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(self.n_fft);

        Ok(ChromaExtractor {
            window: hann_window(self.n_fft),
            n_fft: self.n_fft,
            hop_length: self.hop_length,
            min_frequency: self.min_frequency,
            max_frequency: self.max_frequency,
            tuning: self.tuning,
            fft,
        })
    }
}

impl Default for ChromaExtractorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// STFT chromagram extractor.
///
/// Immutable once built, so one extractor can serve concurrent analyses.
#[derive(Clone)]
pub struct ChromaExtractor {
    window: Vec<f32>,
    n_fft: usize,
    hop_length: usize,
    min_frequency: f32,
    max_frequency: Option<f32>,
    tuning: f32,
    fft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for ChromaExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromaExtractor")
            .field("n_fft", &self.n_fft)
            .field("hop_length", &self.hop_length)
            .field("min_frequency", &self.min_frequency)
            .field("max_frequency", &self.max_frequency)
            .field("tuning", &self.tuning)
            .finish()
    }
}

impl ChromaExtractor {
    /// Start customizing with a builder.
    pub fn builder() -> ChromaExtractorBuilder {
        ChromaExtractorBuilder::new()
    }

    /// FFT size in samples.
    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    /// Hop between frames in samples.
    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Number of frames [`extract`](Self::extract) yields for `num_samples`.
    ///
    /// Frames are centered on multiples of the hop, so any non-empty signal
    /// produces at least one frame, even one shorter than the FFT.
    pub fn frame_count(&self, num_samples: usize) -> usize {
        if num_samples == 0 {
            0
        } else {
            1 + num_samples / self.hop_length
        }
    }

    /// Compute the chromagram of a whole mono signal.
    ///
    /// Returns a `(12, frames)` matrix; frame `i` is centered on sample
    /// `i * hop_length`, with zeros standing in for samples outside the signal.
    pub fn extract(&self, samples: &[f32], sample_rate: NonZeroU32) -> Array2<f32> {
        let num_frames = self.frame_count(samples.len());
        let mut chroma = Array2::<f32>::zeros((SEMITONES, num_frames));
        if num_frames == 0 {
            return chroma;
        }

        let bin_classes = self.bin_pitch_classes(sample_rate);

        // Centered framing: pad n_fft/2 on the left, enough on the right for
        // the last frame.
        let offset = self.n_fft / 2;
        let mut padded = vec![0.0f32; samples.len() + self.n_fft];
        padded[offset..offset + samples.len()].copy_from_slice(samples);

        let mut fft_buffer = vec![Complex { re: 0.0, im: 0.0 }; self.n_fft];
        for frame in 0..num_frames {
            let start = frame * self.hop_length;
            let segment = &padded[start..start + self.n_fft];
            for ((slot, &sample), &w) in fft_buffer.iter_mut().zip(segment).zip(&self.window) {
                *slot = Complex { re: sample * w, im: 0.0 };
            }

            self.fft.process(&mut fft_buffer);

            for (bin, class) in bin_classes.iter().enumerate() {
                if let Some(pc) = *class {
                    chroma[[pc, frame]] += fft_buffer[bin].norm_sqr();
                }
            }
        }

        debug!(
            "chromagram: {} samples at {} Hz -> {} frames",
            samples.len(),
            sample_rate,
            num_frames
        );
        chroma
    }

    /// Pitch class of every non-negative frequency bin, `None` outside the band.
    fn bin_pitch_classes(&self, sample_rate: NonZeroU32) -> Vec<Option<usize>> {
        let rate = sample_rate.get() as f32;
        let bin_width = rate / self.n_fft as f32;
        let max_frequency = self.max_frequency.unwrap_or(rate / 2.0).min(rate / 2.0);

        (0..=self.n_fft / 2)
            .map(|bin| {
                let freq = bin as f32 * bin_width;
                if bin == 0 || freq < self.min_frequency || freq > max_frequency {
                    return None;
                }
                // MIDI 69 = A4
                let midi = 69.0 + 12.0 * (freq / self.tuning).log2();
                if midi < 0.0 {
                    return None;
                }
                Some(midi.round() as usize % SEMITONES)
            })
            .collect()
    }
}

/// Periodic Hann window of length `n`.
fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n as f32).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 11_025;

    fn rate() -> NonZeroU32 {
        NonZeroU32::new(RATE).unwrap()
    }

    fn sine(freq: f32, seconds: f32) -> Vec<f32> {
        let n = (seconds * RATE as f32) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / RATE as f32).sin())
            .collect()
    }

    fn argmax(column: ndarray::ArrayView1<'_, f32>) -> usize {
        column
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
            .0
    }

    #[test]
    fn frame_count_matches_centered_framing() {
        let extractor = ChromaExtractor::builder().build().unwrap();
        assert_eq!(extractor.frame_count(0), 0);
        assert_eq!(extractor.frame_count(1), 1);
        assert_eq!(extractor.frame_count(1023), 1);
        assert_eq!(extractor.frame_count(1024), 2);
        assert_eq!(extractor.frame_count(11_025), 11);
    }

    #[test]
    fn empty_signal_has_no_frames() {
        let extractor = ChromaExtractor::builder().build().unwrap();
        let chroma = extractor.extract(&[], rate());
        assert_eq!(chroma.shape(), &[12, 0]);
    }

    #[test]
    fn short_signal_is_zero_padded_to_a_frame() {
        let extractor = ChromaExtractor::builder().build().unwrap();
        let chroma = extractor.extract(&sine(440.0, 0.05), rate());
        assert!(chroma.ncols() >= 1);
        assert_eq!(argmax(chroma.column(0)), 9);
    }

    #[test]
    fn pure_tones_land_in_their_pitch_class() {
        let extractor = ChromaExtractor::builder().build().unwrap();
        for (freq, class) in [(261.63, 0), (329.63, 4), (392.0, 7), (493.88, 11)] {
            let chroma = extractor.extract(&sine(freq, 1.0), rate());
            let mid = chroma.ncols() / 2;
            assert_eq!(argmax(chroma.column(mid)), class, "{freq} Hz");
        }
    }

    #[test]
    fn energy_is_non_negative_and_silence_is_zero() {
        let extractor = ChromaExtractor::builder().build().unwrap();
        let chroma = extractor.extract(&vec![0.0; 4096], rate());
        assert!(chroma.iter().all(|&v| v == 0.0));
        let chroma = extractor.extract(&sine(300.0, 0.5), rate());
        assert!(chroma.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(ChromaExtractor::builder().n_fft(0).build().is_err());
        assert!(ChromaExtractor::builder().hop_length(0).build().is_err());
        assert!(ChromaExtractor::builder()
            .min_frequency(500.0)
            .max_frequency(Some(400.0))
            .build()
            .is_err());
    }
}
