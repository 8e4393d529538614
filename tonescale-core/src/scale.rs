//! # Tone Scale Module
//!
//! A tone scale is an ordered set of pitch classes in cents. Scales come from
//! external scale files (as plain arrays of cents) or from the peaks of a
//! measured histogram, and are rendered back into synthetic histograms so
//! they can be correlated against recordings.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToneScaleError};
use crate::histogram::{CircularHistogram, Kernel};
use crate::peaks::Peak;
use crate::tuning::{self, CENTS_PER_OCTAVE};

/// Shape of the bump drawn for each scale position in a synthetic histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleBump {
    /// Standard deviation of the Gaussian bump in cents.
    pub width: f64,
    /// Count at the centre of the bump.
    pub height: f64,
}

impl Default for ScaleBump {
    fn default() -> Self {
        Self {
            width: 15.0,
            height: 1.0,
        }
    }
}

/// Sorted pitch classes in `[0, 1200)`, pairwise at least the minimum separation apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    positions: Vec<f64>,
}

fn circular_cents_distance(a: f64, b: f64) -> f64 {
    let direct = (a - b).abs();
    direct.min(CENTS_PER_OCTAVE - direct)
}

/// Keeps positions in priority order, skipping repeats and any position
/// closer than `min_separation` to one already kept, then sorts the survivors.
fn select_separated(prioritized: impl Iterator<Item = f64>, min_separation: f64) -> Vec<f64> {
    let mut kept: Vec<f64> = Vec::new();
    for position in prioritized {
        if kept
            .iter()
            .all(|&k| {
                let distance = circular_cents_distance(k, position);
                distance > 0.0 && distance >= min_separation
            })
        {
            kept.push(position);
        }
    }
    kept.sort_by(f64::total_cmp);
    kept
}

fn validate_separation(min_separation: f64) -> Result<()> {
    if min_separation.is_finite() && min_separation >= 0.0 {
        Ok(())
    } else {
        Err(ToneScaleError::invalid(format!(
            "minimum separation must be non-negative, got {min_separation}"
        )))
    }
}

impl Scale {
    /// Builds a scale from raw cents values.
    ///
    /// Values are wrapped into one octave. When two positions are closer than
    /// `min_separation` the one given first wins.
    pub fn new(positions: impl IntoIterator<Item = f64>, min_separation: f64) -> Result<Scale> {
        validate_separation(min_separation)?;
        let wrapped = positions
            .into_iter()
            .map(|p| {
                if p.is_finite() {
                    Ok(tuning::pitch_class(p))
                } else {
                    Err(ToneScaleError::invalid(format!("scale position {p} is not finite")))
                }
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok(Scale {
            positions: select_separated(wrapped.into_iter(), min_separation),
        })
    }

    /// Builds a scale from histogram peaks. Close peaks are resolved in favour
    /// of the higher one.
    pub fn from_peaks(peaks: &[Peak], min_separation: f64) -> Result<Scale> {
        validate_separation(min_separation)?;
        let mut by_height: Vec<&Peak> = peaks.iter().collect();
        by_height.sort_by(|a, b| b.height.total_cmp(&a.height));

        Ok(Scale {
            positions: select_separated(
                by_height.into_iter().map(|p| tuning::pitch_class(p.position)),
                min_separation,
            ),
        })
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Steps between successive positions, including the step from the last
    /// position back up to the first one an octave higher.
    pub fn intervals(&self) -> Vec<f64> {
        match self.positions.as_slice() {
            [] => Vec::new(),
            [first, .., last] => {
                let mut intervals: Vec<f64> =
                    self.positions.windows(2).map(|w| w[1] - w[0]).collect();
                intervals.push(first + CENTS_PER_OCTAVE - last);
                intervals
            }
            [_] => vec![CENTS_PER_OCTAVE],
        }
    }

    /// Renders the scale as a pitch-class histogram with a Gaussian bump at
    /// every position.
    pub fn to_histogram(&self, bin_width: f64, bump: ScaleBump) -> Result<CircularHistogram> {
        if !(bump.height.is_finite() && bump.height > 0.0) {
            return Err(ToneScaleError::invalid(format!(
                "bump height must be positive, got {}",
                bump.height
            )));
        }
        let mut histogram = CircularHistogram::pitch_class(bin_width)?
            .with_kernel(Kernel::Gaussian { width: bump.width })?;

        // The kernel integrates to the weight; scale it so the centre reaches `height`.
        let weight = bump.height * bump.width * (2.0 * std::f64::consts::PI).sqrt() / bin_width;
        for &position in &self.positions {
            histogram.add_weighted(position, weight);
        }
        Ok(histogram)
    }
}
