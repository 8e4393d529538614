//! # Histogram Module
//!
//! Fixed-width histograms over cents. Pitch-class histograms are circular:
//! every index and every value wraps modulo the histogram period (one octave
//! for [`CircularHistogram::pitch_class`]). Ambitus histograms cover a linear
//! range and ignore values outside it.
//!
//! All mutating operations work in place and return `&mut Self` so calls can
//! be chained. Clone the histogram first when an unmodified copy is needed.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToneScaleError};
use crate::tuning::CENTS_PER_OCTAVE;

/// Width of a default ambitus histogram: eight octaves.
pub const AMBITUS_SPAN: f64 = 9600.0;

/// Lower edge of a default ambitus histogram, four octaves below the reference.
pub const AMBITUS_START: f64 = -4800.0;

const WIDTH_TOLERANCE: f64 = 1e-9;

/// How a single observation is spread over the bins.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Kernel {
    /// Increment only the bin containing the value.
    #[default]
    Rectangular,
    /// Add a normalized Gaussian with standard deviation `width` cents to every bin.
    Gaussian { width: f64 },
}

/// Target of [`CircularHistogram::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Normalization {
    /// Scale so the counts sum to one.
    #[default]
    Sum,
    /// Scale so the largest count is one.
    Max,
}

/// A histogram of cents values with fixed bin width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircularHistogram {
    bin_width: f64,
    start: f64,
    bins: Vec<f64>,
    circular: bool,
    kernel: Kernel,
}

fn validate_bin_width(bin_width: f64) -> Result<()> {
    if bin_width.is_finite() && bin_width > 0.0 {
        Ok(())
    } else {
        Err(ToneScaleError::invalid(format!(
            "bin width must be positive, got {bin_width}"
        )))
    }
}

impl CircularHistogram {
    /// A circular histogram of `len` bins covering `len * bin_width` cents.
    pub fn circular(bin_width: f64, len: usize) -> Result<Self> {
        validate_bin_width(bin_width)?;
        if len == 0 {
            return Err(ToneScaleError::invalid("histogram needs at least one bin"));
        }
        Ok(Self {
            bin_width,
            start: 0.0,
            bins: vec![0.0; len],
            circular: true,
            kernel: Kernel::Rectangular,
        })
    }

    /// A linear histogram of `len` bins starting at `start` cents.
    pub fn linear(bin_width: f64, start: f64, len: usize) -> Result<Self> {
        validate_bin_width(bin_width)?;
        if len == 0 {
            return Err(ToneScaleError::invalid("histogram needs at least one bin"));
        }
        if !start.is_finite() {
            return Err(ToneScaleError::invalid("histogram start must be finite"));
        }
        Ok(Self {
            bin_width,
            start,
            bins: vec![0.0; len],
            circular: false,
            kernel: Kernel::Rectangular,
        })
    }

    /// A circular histogram over one octave. `bin_width` must divide 1200 cents.
    pub fn pitch_class(bin_width: f64) -> Result<Self> {
        validate_bin_width(bin_width)?;
        let len = (CENTS_PER_OCTAVE / bin_width).round();
        if len < 1.0 || (len * bin_width - CENTS_PER_OCTAVE).abs() > WIDTH_TOLERANCE * CENTS_PER_OCTAVE
        {
            return Err(ToneScaleError::invalid(format!(
                "bin width {bin_width} does not divide the octave"
            )));
        }
        Self::circular(bin_width, len as usize)
    }

    /// A linear histogram covering `[start, start + span)` cents.
    pub fn ambitus(bin_width: f64, start: f64, span: f64) -> Result<Self> {
        validate_bin_width(bin_width)?;
        if !(span.is_finite() && span > 0.0) {
            return Err(ToneScaleError::invalid(format!(
                "ambitus span must be positive, got {span}"
            )));
        }
        Self::linear(bin_width, start, (span / bin_width).ceil() as usize)
    }

    /// Builds a histogram from existing counts.
    pub fn from_counts(bin_width: f64, counts: Vec<f64>, circular: bool) -> Result<Self> {
        let mut histogram = if circular {
            Self::circular(bin_width, counts.len())?
        } else {
            Self::linear(bin_width, 0.0, counts.len())?
        };
        histogram.bins = counts;
        Ok(histogram)
    }

    /// Sets the kernel used by [`add`](Self::add). Part of construction.
    pub fn with_kernel(mut self, kernel: Kernel) -> Result<Self> {
        if let Kernel::Gaussian { width } = kernel {
            if !(width.is_finite() && width > 0.0) {
                return Err(ToneScaleError::invalid(format!(
                    "kernel width must be positive, got {width}"
                )));
            }
        }
        self.kernel = kernel;
        Ok(self)
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn is_circular(&self) -> bool {
        self.circular
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Number of cents covered by all bins.
    pub fn period(&self) -> f64 {
        self.bins.len() as f64 * self.bin_width
    }

    pub fn counts(&self) -> &[f64] {
        &self.bins
    }

    /// The cents value at the centre of bin `index`.
    pub fn key(&self, index: usize) -> f64 {
        self.start + (index as f64 + 0.5) * self.bin_width
    }

    /// Iterates `(key, count)` pairs in bin order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.bins
            .iter()
            .enumerate()
            .map(move |(i, &count)| (self.key(i), count))
    }

    /// The bin containing `cents`, or `None` outside a linear histogram's range.
    pub fn bin_index(&self, cents: f64) -> Option<usize> {
        if !cents.is_finite() {
            return None;
        }
        let offset = if self.circular {
            (cents - self.start).rem_euclid(self.period())
        } else {
            let offset = cents - self.start;
            if offset < 0.0 || offset >= self.period() {
                return None;
            }
            offset
        };
        // Rounding can push a value right below the period onto the last edge.
        Some(((offset / self.bin_width).floor() as usize).min(self.bins.len() - 1))
    }

    /// Count of bin `index`. Circular histograms wrap the index; linear
    /// histograms report zero outside their range.
    pub fn count_for_class(&self, index: isize) -> f64 {
        let len = self.bins.len() as isize;
        if self.circular {
            self.bins[index.rem_euclid(len) as usize]
        } else if (0..len).contains(&index) {
            self.bins[index as usize]
        } else {
            0.0
        }
    }

    /// Distance in bins between two indices, taking the short way round for
    /// circular histograms.
    pub fn bin_distance(&self, a: usize, b: usize) -> usize {
        let direct = a.abs_diff(b);
        if self.circular {
            direct.min(self.bins.len() - direct)
        } else {
            direct
        }
    }

    /// Adds one observation at `cents`.
    pub fn add(&mut self, cents: f64) -> &mut Self {
        self.add_weighted(cents, 1.0)
    }

    /// Adds an observation at `cents` with the given weight, using the
    /// histogram's kernel.
    pub fn add_weighted(&mut self, cents: f64, weight: f64) -> &mut Self {
        if !cents.is_finite() || !weight.is_finite() {
            return self;
        }
        match self.kernel {
            Kernel::Rectangular => {
                if let Some(index) = self.bin_index(cents) {
                    self.bins[index] += weight;
                }
            }
            Kernel::Gaussian { width } => {
                let scale = weight * self.bin_width / (width * (2.0 * std::f64::consts::PI).sqrt());
                let period = self.period();
                for index in 0..self.bins.len() {
                    let mut distance = self.key(index) - cents;
                    if self.circular {
                        distance = distance.rem_euclid(period);
                        if distance > period / 2.0 {
                            distance -= period;
                        }
                    }
                    let z = distance / width;
                    self.bins[index] += scale * (-0.5 * z * z).exp();
                }
            }
        }
        self
    }

    /// Adds the counts of `other` bin by bin.
    ///
    /// # Errors
    /// `DimensionMismatch` unless both histograms share bin width, length,
    /// start and circularity.
    pub fn add_histogram(&mut self, other: &CircularHistogram) -> Result<&mut Self> {
        self.check_dimensions(other)?;
        for (bin, count) in self.bins.iter_mut().zip(&other.bins) {
            *bin += count;
        }
        Ok(self)
    }

    pub(crate) fn check_dimensions(&self, other: &CircularHistogram) -> Result<()> {
        let same = self.bins.len() == other.bins.len()
            && (self.bin_width - other.bin_width).abs() <= WIDTH_TOLERANCE
            && self.circular == other.circular
            && (self.circular || (self.start - other.start).abs() <= WIDTH_TOLERANCE);
        if same {
            Ok(())
        } else {
            Err(ToneScaleError::DimensionMismatch {
                left_bins: self.bins.len(),
                left_width: self.bin_width,
                right_bins: other.bins.len(),
                right_width: other.bin_width,
            })
        }
    }

    /// Rescales the counts so their sum or maximum becomes one.
    ///
    /// A histogram without positive mass is left untouched.
    pub fn normalize(&mut self, mode: Normalization) -> &mut Self {
        let divisor = match mode {
            Normalization::Sum => self.total(),
            Normalization::Max => self.max_count(),
        };
        if !(divisor.is_finite() && divisor > 0.0) {
            log::warn!("Skipping normalization of a histogram without positive mass");
            return self;
        }
        // Already normalized up to rounding.
        if (divisor - 1.0).abs() <= f64::EPSILON * self.bins.len() as f64 {
            return self;
        }
        for bin in self.bins.iter_mut() {
            *bin /= divisor;
        }
        self
    }

    /// Convolves the counts with a discrete Gaussian of `sigma` bins.
    ///
    /// Circular histograms wrap around; linear ones treat the outside as
    /// empty. `sigma == 0` leaves the histogram unchanged.
    ///
    /// # Errors
    /// `InvalidArgument` for a negative or non-finite sigma.
    pub fn gaussian_smooth(&mut self, sigma: f64) -> Result<&mut Self> {
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(ToneScaleError::invalid(format!(
                "smoothing sigma must be non-negative, got {sigma}"
            )));
        }
        if sigma == 0.0 {
            return Ok(self);
        }

        let radius = (4.0 * sigma).ceil().max(1.0) as isize;
        let mut weights: Vec<f64> = (-radius..=radius)
            .map(|k| {
                let z = k as f64 / sigma;
                (-0.5 * z * z).exp()
            })
            .collect();
        let weight_sum: f64 = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= weight_sum);

        let smoothed: Vec<f64> = (0..self.bins.len() as isize)
            .map(|i| {
                weights
                    .iter()
                    .zip(-radius..=radius)
                    .map(|(w, k)| w * self.count_for_class(i + k))
                    .sum()
            })
            .collect();
        self.bins = smoothed;
        Ok(self)
    }

    /// Folds this histogram into a pitch-class histogram with the same bin width.
    pub fn to_pitch_class(&self) -> Result<CircularHistogram> {
        let mut folded = CircularHistogram::pitch_class(self.bin_width)?;
        for (key, count) in self.iter() {
            folded.add_weighted(key, count);
        }
        Ok(folded)
    }

    pub fn total(&self) -> f64 {
        self.bins.iter().sum()
    }

    pub fn max_count(&self) -> f64 {
        self.bins.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn mean(&self) -> f64 {
        self.total() / self.bins.len() as f64
    }

    pub fn median(&self) -> f64 {
        let mut sorted = self.bins.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    /// Index of the largest count; the first one on ties.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &count) in self.bins.iter().enumerate() {
            if count > self.bins[best] {
                best = i;
            }
        }
        best
    }
}
