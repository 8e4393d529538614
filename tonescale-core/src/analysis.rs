//! # Analysis Module
//!
//! Runs the whole pitch-to-tone-scale pipeline for one recording:
//! frames → YIN → annotations → histogram → peaks → scale.
//!
//! Each run owns its histogram. The cancellation token is checked before
//! every frame; a cancelled run returns `Cancelled` and drops whatever it had
//! accumulated.

use std::iter::Copied;
use std::slice::Iter;

use serde::{Deserialize, Serialize};

use crate::annotation::AnnotationStream;
use crate::cancel::CancellationToken;
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::frame::FrameSource;
use crate::histogram::{AMBITUS_SPAN, AMBITUS_START, CircularHistogram};
use crate::peaks::Peak;
use crate::pitch::Yin;
use crate::scale::Scale;

/// Result of analysing one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneScaleAnalysis {
    /// Pitch-class histogram of all voiced frames.
    pub histogram: CircularHistogram,
    /// Peaks of the histogram, ordered by position.
    pub peaks: Vec<Peak>,
    /// Scale derived from the peaks.
    pub scale: Scale,
    /// Number of frames analysed.
    pub frames: usize,
    /// Number of frames that contributed to the histogram.
    pub voiced_frames: usize,
}

/// Pipeline driver for a fixed configuration.
#[derive(Debug, Clone)]
pub struct ToneScaleAnalyzer {
    config: AnalysisConfig,
}

impl ToneScaleAnalyzer {
    /// # Errors
    /// `InvalidArgument` if the configuration does not validate.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Pitch observations for every frame of `samples`.
    pub fn annotate<'a>(
        &self,
        samples: &'a [f32],
        sample_rate: f32,
        source: &str,
    ) -> Result<AnnotationStream<Copied<Iter<'a, f32>>>> {
        let frames = FrameSource::new(
            samples.iter().copied(),
            self.config.frames.size,
            self.config.frames.overlap,
            self.config.frames.tail,
        )?;
        let yin = Yin::new(sample_rate, self.config.frames.size, self.config.yin_threshold)?;
        AnnotationStream::new(frames, yin, source)
    }

    /// Accumulates the pitch-class histogram of a recording.
    pub fn pitch_class_histogram(
        &self,
        samples: &[f32],
        sample_rate: f32,
        token: &CancellationToken,
    ) -> Result<CircularHistogram> {
        let histogram = self.config.pitch_class_histogram()?;
        Ok(self.accumulate(samples, sample_rate, token, histogram)?.0)
    }

    /// Accumulates the linear pitch histogram (eight octaves around the reference).
    pub fn ambitus(
        &self,
        samples: &[f32],
        sample_rate: f32,
        token: &CancellationToken,
    ) -> Result<CircularHistogram> {
        let histogram = CircularHistogram::ambitus(self.config.histogram.bin_width, AMBITUS_START, AMBITUS_SPAN)?
            .with_kernel(self.config.histogram.kernel)?;
        Ok(self.accumulate(samples, sample_rate, token, histogram)?.0)
    }

    /// Runs the full pipeline on one recording.
    pub fn analyze(
        &self,
        samples: &[f32],
        sample_rate: f32,
        token: &CancellationToken,
    ) -> Result<ToneScaleAnalysis> {
        let histogram = self.config.pitch_class_histogram()?;
        let (histogram, frames, voiced_frames) =
            self.accumulate(samples, sample_rate, token, histogram)?;

        let peaks = self.config.peak_detector()?.detect(&histogram);
        let scale = Scale::from_peaks(&peaks, self.config.peaks.min_separation)?;
        log::debug!(
            "Analysed {} frames ({} voiced): {} peaks",
            frames,
            voiced_frames,
            peaks.len()
        );

        Ok(ToneScaleAnalysis {
            histogram,
            peaks,
            scale,
            frames,
            voiced_frames,
        })
    }

    /// Renders a scale with the configured bin width and bump shape.
    pub fn scale_histogram(&self, scale: &Scale) -> Result<CircularHistogram> {
        scale.to_histogram(self.config.histogram.bin_width, self.config.scale_bump)
    }

    fn accumulate(
        &self,
        samples: &[f32],
        sample_rate: f32,
        token: &CancellationToken,
        mut histogram: CircularHistogram,
    ) -> Result<(CircularHistogram, usize, usize)> {
        if samples.is_empty() {
            log::warn!("Analysing an empty recording");
        }
        let reference = self.config.reference_frequency;
        let mut stream = self.annotate(samples, sample_rate, "")?;

        let mut frames = 0;
        let mut voiced = 0;
        loop {
            token.check()?;
            let Some(observation) = stream.next() else {
                break;
            };
            frames += 1;
            if let Some(pitch) = observation.pitch() {
                if self.config.accepts_frequency(pitch.hz()) {
                    histogram.add(pitch.absolute_cents(reference));
                    voiced += 1;
                }
            }
        }

        histogram.gaussian_smooth(self.config.histogram.smoothing)?;
        Ok((histogram, frames, voiced))
    }
}
