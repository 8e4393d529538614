//! Configuration parameters for tone scale analysis

use serde::{Deserialize, Serialize};

use crate::correlation::CorrelationMeasure;
use crate::error::{Result, ToneScaleError};
use crate::frame::TailPolicy;
use crate::histogram::{CircularHistogram, Kernel};
use crate::peaks::{PeakDetector, PeakScoring};
use crate::pitch::DEFAULT_THRESHOLD;
use crate::scale::ScaleBump;
use crate::tuning::DEFAULT_REFERENCE_FREQUENCY;

/// Frame geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Samples per frame (default: 2048)
    pub size: usize,
    /// Samples shared by consecutive frames (default: 1024)
    pub overlap: usize,
    /// Handling of a trailing partial frame (default: zero padding)
    pub tail: TailPolicy,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            size: 2048,
            overlap: 1024,
            tail: TailPolicy::ZeroPad,
        }
    }
}

/// Histogram layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    /// Cents per bin; must divide 1200 (default: 1.0)
    pub bin_width: f64,
    /// Per-observation kernel (default: Gaussian, 15 cents, the width of a scale bump)
    pub kernel: Kernel,
    /// Gaussian smoothing applied after accumulation, in bins (default: 0, off)
    pub smoothing: f64,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bin_width: 1.0,
            kernel: Kernel::Gaussian { width: 15.0 },
            smoothing: 0.0,
        }
    }
}

/// Peak picking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Odd window in bins (default: 15)
    pub window_size: usize,
    /// Scoring strategy (default: local height, min score 0)
    pub scoring: PeakScoring,
    /// Minimum distance between scale positions in cents (default: 30)
    pub min_separation: f64,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            window_size: 15,
            scoring: PeakScoring::default(),
            min_separation: 30.0,
        }
    }
}

/// All parameters of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub frames: FrameConfig,
    /// YIN absolute threshold (default: 0.15)
    pub yin_threshold: f32,
    /// Reference for absolute cents in Hz (default: C4 ≈ 261.626)
    pub reference_frequency: f64,
    /// Voiced frames below this frequency are not added to histograms (default: 20 Hz)
    pub min_frequency: f64,
    /// Voiced frames above this frequency are not added to histograms (default: 20 kHz)
    pub max_frequency: f64,
    pub histogram: HistogramConfig,
    pub peaks: PeakConfig,
    /// Bump drawn for each scale position (default: 15 cents wide, height 1)
    pub scale_bump: ScaleBump,
    /// Similarity measure for displacement search (default: intersection)
    pub correlation: CorrelationMeasure,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frames: FrameConfig::default(),
            yin_threshold: DEFAULT_THRESHOLD,
            reference_frequency: DEFAULT_REFERENCE_FREQUENCY,
            min_frequency: 20.0,
            max_frequency: 20_000.0,
            histogram: HistogramConfig::default(),
            peaks: PeakConfig::default(),
            scale_bump: ScaleBump::default(),
            correlation: CorrelationMeasure::default(),
        }
    }
}

impl AnalysisConfig {
    /// Checks every parameter and reports the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.frames.size < 4 {
            return Err(ToneScaleError::invalid(format!(
                "frame size must be at least 4, got {}",
                self.frames.size
            )));
        }
        if self.frames.overlap >= self.frames.size {
            return Err(ToneScaleError::invalid(format!(
                "overlap {} must be smaller than the frame size {}",
                self.frames.overlap, self.frames.size
            )));
        }
        if !(self.yin_threshold > 0.0 && self.yin_threshold <= 1.0) {
            return Err(ToneScaleError::invalid(format!(
                "YIN threshold must be in (0, 1], got {}",
                self.yin_threshold
            )));
        }
        if !(self.reference_frequency.is_finite() && self.reference_frequency > 0.0) {
            return Err(ToneScaleError::invalid("reference frequency must be positive"));
        }
        if !(self.min_frequency >= 0.0 && self.min_frequency < self.max_frequency) {
            return Err(ToneScaleError::invalid(format!(
                "frequency range [{}, {}] is empty",
                self.min_frequency, self.max_frequency
            )));
        }
        if !(self.histogram.smoothing.is_finite() && self.histogram.smoothing >= 0.0) {
            return Err(ToneScaleError::invalid("smoothing must be non-negative"));
        }
        if !(self.peaks.min_separation.is_finite() && self.peaks.min_separation >= 0.0) {
            return Err(ToneScaleError::invalid("minimum separation must be non-negative"));
        }
        if !(self.scale_bump.width.is_finite()
            && self.scale_bump.width > 0.0
            && self.scale_bump.height.is_finite()
            && self.scale_bump.height > 0.0)
        {
            return Err(ToneScaleError::invalid("scale bump must have positive width and height"));
        }
        self.pitch_class_histogram()?;
        self.peak_detector()?;
        Ok(())
    }

    /// An empty pitch-class histogram with the configured layout.
    pub fn pitch_class_histogram(&self) -> Result<CircularHistogram> {
        CircularHistogram::pitch_class(self.histogram.bin_width)?.with_kernel(self.histogram.kernel)
    }

    pub fn peak_detector(&self) -> Result<PeakDetector> {
        PeakDetector::new(self.peaks.window_size, self.peaks.scoring)
    }

    pub(crate) fn accepts_frequency(&self, hz: f64) -> bool {
        hz >= self.min_frequency && hz <= self.max_frequency
    }
}
