//! Segment Averager
//!
//! Groups consecutive chromagram frames into fixed-size analysis windows.

use std::num::NonZeroU32;

use ndarray::{ArrayView2, Axis};

use crate::{chromagram::DEFAULT_HOP_LENGTH, vocabulary::SEMITONES};

/// Default number of frames per analysis window.
pub const DEFAULT_WINDOW_FRAMES: usize = 50;

/// A 12-element pitch-class energy vector, C first.
pub type ChromaVector = [f32; SEMITONES];

/// A contiguous span of frames ready for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisWindow {
    /// Start of the window in seconds, rounded to 2 decimals.
    pub start_time: f64,
    /// End of the window in seconds, rounded to 2 decimals.
    pub end_time: f64,
    /// Number of real (unpadded) frames in the window.
    pub frame_count: usize,
    /// Mean chroma over the real frames.
    pub chroma: ChromaVector,
    /// Frame-major flattening of the window, zero-padded to
    /// `12 * window_frames` values.
    pub features: Vec<f32>,
}

/// Builder for a [`SegmentAverager`].
#[derive(Debug, Clone)]
pub struct SegmentAveragerBuilder {
    window_frames: usize,
    hop_length: usize,
}

impl SegmentAveragerBuilder {
    /// Start with default parameters: window_frames = 50, hop_length = 1024.
    pub fn new() -> Self {
        SegmentAveragerBuilder {
            window_frames: DEFAULT_WINDOW_FRAMES,
            hop_length: DEFAULT_HOP_LENGTH,
        }
    }

    /// Set the number of frames per window. Zero is treated as one.
    pub fn window_frames(mut self, frames: usize) -> Self {
        self.window_frames = frames.max(1);
        self
    }

    /// Set the hop length the chromagram was computed with. Zero is treated
    /// as one.
    pub fn hop_length(mut self, hop: usize) -> Self {
        self.hop_length = hop.max(1);
        self
    }

    /// Build the `SegmentAverager`
    pub fn build(self) -> SegmentAverager {
        SegmentAverager {
            window_frames: self.window_frames,
            hop_length: self.hop_length,
        }
    }
}

impl Default for SegmentAveragerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a chromagram into non-overlapping windows and averages each.
#[derive(Debug, Clone, Copy)]
pub struct SegmentAverager {
    window_frames: usize,
    hop_length: usize,
}

impl SegmentAverager {
    /// Return a builder to customize window and hop sizes
    pub fn builder() -> SegmentAveragerBuilder {
        SegmentAveragerBuilder::new()
    }

    /// Frames per window.
    pub fn window_frames(&self) -> usize {
        self.window_frames
    }

    /// Length of [`AnalysisWindow::features`].
    pub fn feature_len(&self) -> usize {
        SEMITONES * self.window_frames
    }

    /// Partition a `(12, frames)` chromagram into windows.
    ///
    /// The trailing partial window is kept. Times follow
    /// `frame * hop_length / sample_rate`; the last window's end is clamped
    /// to `duration` so the windows tile `[0, duration]` exactly.
    pub fn average(
        &self,
        chroma: ArrayView2<'_, f32>,
        sample_rate: NonZeroU32,
        duration: f64,
    ) -> Vec<AnalysisWindow> {
        let num_frames = chroma.ncols();
        let to_time =
            |frame: usize| frame as f64 * self.hop_length as f64 / sample_rate.get() as f64;

        (0..num_frames)
            .step_by(self.window_frames)
            .map(|start| {
                let end = (start + self.window_frames).min(num_frames);
                let span = chroma.slice(ndarray::s![.., start..end]);

                let mut mean = [0.0; SEMITONES];
                if let Some(avg) = span.mean_axis(Axis(1)) {
                    for (slot, v) in mean.iter_mut().zip(avg.iter()) {
                        *slot = *v;
                    }
                }

                let mut features = vec![0.0; self.feature_len()];
                for (frame, column) in span.axis_iter(Axis(1)).enumerate() {
                    let base = frame * SEMITONES;
                    for (slot, v) in features[base..base + SEMITONES].iter_mut().zip(column) {
                        *slot = *v;
                    }
                }

                let mut end_time = to_time(end);
                if end == num_frames {
                    end_time = end_time.min(duration);
                }

                AnalysisWindow {
                    start_time: round2(to_time(start)),
                    end_time: round2(end_time),
                    frame_count: end - start,
                    chroma: mean,
                    features,
                }
            })
            .collect()
    }
}

impl Default for SegmentAverager {
    fn default() -> Self {
        SegmentAverager::builder().build()
    }
}

/// Round seconds to 2 decimals.
pub(crate) fn round2(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn rate() -> NonZeroU32 {
        NonZeroU32::new(11_025).unwrap()
    }

    /// Chromagram whose frame `f` has energy `f + 1` in every bin.
    fn ramp(frames: usize) -> Array2<f32> {
        Array2::from_shape_fn((SEMITONES, frames), |(_, f)| (f + 1) as f32)
    }

    #[test]
    fn keeps_trailing_partial_window() {
        let averager = SegmentAverager::builder().window_frames(4).build();
        let windows = averager.average(ramp(10).view(), rate(), 10.0);
        let counts: Vec<_> = windows.iter().map(|w| w.frame_count).collect();
        assert_eq!(counts, vec![4, 4, 2]);
    }

    #[test]
    fn mean_uses_real_frames_only() {
        let averager = SegmentAverager::builder().window_frames(4).build();
        let windows = averager.average(ramp(6).view(), rate(), 10.0);
        assert_eq!(windows[0].chroma, [2.5; SEMITONES]);
        // frames 5 and 6, not padded with zeros
        assert_eq!(windows[1].chroma, [5.5; SEMITONES]);
    }

    #[test]
    fn features_are_frame_major_and_zero_padded() {
        let averager = SegmentAverager::builder().window_frames(3).build();
        let mut chroma = Array2::zeros((SEMITONES, 2));
        chroma[[4, 0]] = 1.0;
        chroma[[7, 1]] = 2.0;
        let windows = averager.average(chroma.view(), rate(), 1.0);
        assert_eq!(windows.len(), 1);
        let f = &windows[0].features;
        assert_eq!(f.len(), 36);
        assert_eq!(f[4], 1.0);
        assert_eq!(f[12 + 7], 2.0);
        assert!(f[24..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn window_times_are_contiguous_and_clamped() {
        let averager = SegmentAverager::default();
        // 6 s at 11025 Hz with hop 1024 -> 65 frames
        let windows = averager.average(ramp(65).view(), rate(), 6.0);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start_time, 0.0);
        assert_eq!(windows[0].end_time, 4.64);
        assert_eq!(windows[1].start_time, 4.64);
        assert_eq!(windows[1].end_time, 6.0);
    }

    #[test]
    fn no_frames_no_windows() {
        let averager = SegmentAverager::default();
        let windows = averager.average(ramp(0).view(), rate(), 0.0);
        assert!(windows.is_empty());
    }

    #[test]
    fn rounds_to_hundredths() {
        assert_eq!(round2(4.6439), 4.64);
        assert_eq!(round2(0.005_1), 0.01);
        assert_eq!(round2(0.0), 0.0);
    }
}
