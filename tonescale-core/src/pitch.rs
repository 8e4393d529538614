//! # Pitch Detection Module
//!
//! This module implements the YIN fundamental frequency estimator used to
//! turn frames of audio into pitch observations.
//!
//! ## Features
//! - Squared difference function over half the frame
//! - Cumulative mean normalized difference (CMND) with a seeded running sum
//! - Absolute threshold search with local-minimum refinement
//! - Parabolic interpolation for sub-sample accuracy
//!
//! The numeric steps are kept exactly as below because the histograms built
//! downstream are sensitive to any systematic bias in the estimate.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToneScaleError};

/// Default YIN absolute threshold.
pub const DEFAULT_THRESHOLD: f32 = 0.15;

/// Outcome of a single YIN estimate.
///
/// An unvoiced frame is a normal result and is reported as `frequency == None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchResult {
    /// The detected fundamental in Hz, or `None` for an unvoiced frame.
    pub frequency: Option<f32>,
    /// `1 - d'[tau]` at the selected lag; zero for unvoiced frames.
    pub probability: f32,
}

impl PitchResult {
    pub const UNVOICED: PitchResult = PitchResult {
        frequency: None,
        probability: 0.0,
    };

    pub fn was_voiced(&self) -> bool {
        self.frequency.is_some()
    }
}

/// A YIN pitch estimator for frames of one fixed size.
///
/// The estimator owns its scratch buffer, so one instance is created per
/// analysis run and reused for every frame.
#[derive(Debug, Clone)]
pub struct Yin {
    sample_rate: f32,
    buffer_size: usize,
    threshold: f32,
    yin_buffer: Vec<f32>,
}

impl Yin {
    /// Creates an estimator.
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate in Hz
    /// * `buffer_size` - Number of samples per frame, at least 4
    /// * `threshold` - Absolute CMND threshold, in `(0, 1]`
    ///
    /// # Errors
    /// `InvalidArgument` for a non-positive sample rate, a frame shorter than
    /// four samples or a threshold outside `(0, 1]`.
    pub fn new(sample_rate: f32, buffer_size: usize, threshold: f32) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ToneScaleError::invalid(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        if buffer_size < 4 {
            return Err(ToneScaleError::invalid(format!(
                "YIN needs at least 4 samples per frame, got {buffer_size}"
            )));
        }
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ToneScaleError::invalid(format!(
                "YIN threshold must be in (0, 1], got {threshold}"
            )));
        }

        Ok(Self {
            sample_rate,
            buffer_size,
            threshold,
            yin_buffer: vec![0.0; buffer_size / 2],
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Estimates the fundamental frequency of one frame.
    ///
    /// # Arguments
    /// * `frame` - Exactly `buffer_size` samples
    ///
    /// # Returns
    /// * `Ok(result)` - voiced or unvoiced estimate
    /// * `Err(InvalidArgument)` - the frame length does not match the estimator
    pub fn estimate(&mut self, frame: &[f32]) -> Result<PitchResult> {
        if frame.len() != self.buffer_size {
            return Err(ToneScaleError::invalid(format!(
                "frame has {} samples, estimator expects {}",
                frame.len(),
                self.buffer_size
            )));
        }
        Ok(self.process(frame))
    }

    /// Runs YIN on a frame whose length was already checked.
    pub(crate) fn process(&mut self, frame: &[f32]) -> PitchResult {
        self.difference(frame);
        self.cumulative_mean_normalized_difference();

        let tau = match self.absolute_threshold() {
            Some(tau) => tau,
            None => return PitchResult::UNVOICED,
        };

        let better_tau = self.parabolic_interpolation(tau);
        let frequency = self.sample_rate / better_tau;
        if !(frequency.is_finite() && frequency > 0.0) {
            return PitchResult::UNVOICED;
        }

        PitchResult {
            frequency: Some(frequency),
            probability: 1.0 - self.yin_buffer[tau],
        }
    }

    // --- Step 1: Difference function ---
    fn difference(&mut self, frame: &[f32]) {
        let half = self.yin_buffer.len();
        self.yin_buffer[0] = 0.0;
        for tau in 1..half {
            let mut diff = 0.0;
            for i in 0..half {
                let delta = frame[i] - frame[i + tau];
                diff += delta * delta;
            }
            self.yin_buffer[tau] = diff;
        }
    }

    // --- Step 2: Cumulative mean normalized difference ---
    // The running sum is seeded with d[1] and d'[1] is pinned to 1. A zero
    // running sum (silence) pins the lag to 1 instead of producing NaN.
    fn cumulative_mean_normalized_difference(&mut self) {
        let buffer = &mut self.yin_buffer;
        buffer[0] = 1.0;
        let mut running_sum = buffer[1];
        buffer[1] = 1.0;
        for tau in 2..buffer.len() {
            running_sum += buffer[tau];
            if running_sum != 0.0 {
                buffer[tau] *= tau as f32 / running_sum;
            } else {
                buffer[tau] = 1.0;
            }
        }
    }

    // --- Step 3: Absolute threshold with local-minimum refinement ---
    fn absolute_threshold(&self) -> Option<usize> {
        let buffer = &self.yin_buffer;
        let mut tau = 1;
        while tau < buffer.len() {
            if buffer[tau] < self.threshold {
                while tau + 1 < buffer.len() && buffer[tau + 1] < buffer[tau] {
                    tau += 1;
                }
                return Some(tau);
            }
            tau += 1;
        }
        None
    }

    // --- Step 4: Parabolic interpolation ---
    fn parabolic_interpolation(&self, tau: usize) -> f32 {
        let buffer = &self.yin_buffer;
        let x0 = if tau < 1 { tau } else { tau - 1 };
        let x2 = if tau + 1 < buffer.len() { tau + 1 } else { tau };

        if x0 == tau {
            if buffer[tau] <= buffer[x2] { tau as f32 } else { x2 as f32 }
        } else if x2 == tau {
            if buffer[tau] <= buffer[x0] { tau as f32 } else { x0 as f32 }
        } else {
            let s0 = buffer[x0];
            let s1 = buffer[tau];
            let s2 = buffer[x2];
            let denominator = 2.0 * (2.0 * s1 - s2 - s0);
            if denominator != 0.0 {
                tau as f32 + (s2 - s0) / denominator
            } else {
                tau as f32
            }
        }
    }
}
