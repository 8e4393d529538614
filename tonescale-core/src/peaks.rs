//! # Peak Detection Module
//!
//! Extracts the salient peaks of a histogram. Each local maximum is scored by
//! the selected strategy, candidates are visited from the highest score down
//! and a candidate closer than `window_size` bins to an already accepted peak
//! is dropped. The score only drives selection; callers receive the bin
//! position in cents and the raw count.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToneScaleError};
use crate::histogram::CircularHistogram;

/// A salient histogram peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Position of the peak bin in cents.
    pub position: f64,
    /// Raw histogram count at that bin.
    pub height: f64,
}

/// How local maxima are scored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PeakScoring {
    /// `(count - mean) / stddev` over the window centred on the bin. Only
    /// scores strictly above `min_score` are candidates.
    LocalHeight { min_score: f64 },
    /// The count itself, for bins whose count exceeds
    /// `median(histogram) * threshold_factor`.
    AbsoluteHeight { threshold_factor: f64 },
}

impl Default for PeakScoring {
    fn default() -> Self {
        PeakScoring::LocalHeight { min_score: 0.0 }
    }
}

impl PeakScoring {
    /// Scores bin `index`, or `None` if it is not a candidate.
    fn score(&self, histogram: &CircularHistogram, index: usize, window_size: usize, median: f64) -> Option<f64> {
        let count = histogram.counts()[index];
        match *self {
            PeakScoring::LocalHeight { min_score } => {
                let score = local_height_score(histogram, index, window_size);
                (score.is_finite() && score > min_score).then_some(score)
            }
            PeakScoring::AbsoluteHeight { threshold_factor } => {
                (count > median * threshold_factor).then_some(count)
            }
        }
    }
}

/// Standard score of bin `index` within its window; negative infinity when
/// the window is flat.
fn local_height_score(histogram: &CircularHistogram, index: usize, window_size: usize) -> f64 {
    let half = (window_size / 2) as isize;
    let centre = index as isize;
    let window: Vec<f64> = (centre - half..=centre + half)
        .map(|i| histogram.count_for_class(i))
        .collect();

    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|c| (c - mean) * (c - mean)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    if stddev == 0.0 {
        return f64::NEG_INFINITY;
    }
    (histogram.counts()[index] - mean) / stddev
}

/// A bin at least as high as both neighbours and higher than one of them.
fn is_local_maximum(histogram: &CircularHistogram, index: usize) -> bool {
    let i = index as isize;
    let count = histogram.count_for_class(i);
    let before = histogram.count_for_class(i - 1);
    let after = histogram.count_for_class(i + 1);
    count >= before && count >= after && (count > before || count > after)
}

/// Peak picker configured with a window size and a scoring strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakDetector {
    window_size: usize,
    scoring: PeakScoring,
}

impl PeakDetector {
    /// # Errors
    /// `InvalidArgument` if `window_size` is even or below three, or the
    /// strategy parameter is not finite (or negative for the threshold factor).
    pub fn new(window_size: usize, scoring: PeakScoring) -> Result<Self> {
        if window_size < 3 || window_size % 2 == 0 {
            return Err(ToneScaleError::invalid(format!(
                "peak window must be odd and at least 3 bins, got {window_size}"
            )));
        }
        match scoring {
            PeakScoring::LocalHeight { min_score } if !min_score.is_finite() => {
                return Err(ToneScaleError::invalid("minimum score must be finite"));
            }
            PeakScoring::AbsoluteHeight { threshold_factor }
                if !(threshold_factor.is_finite() && threshold_factor >= 0.0) =>
            {
                return Err(ToneScaleError::invalid(format!(
                    "threshold factor must be non-negative, got {threshold_factor}"
                )));
            }
            _ => {}
        }
        Ok(Self {
            window_size,
            scoring,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn scoring(&self) -> PeakScoring {
        self.scoring
    }

    /// Finds the peaks of `histogram`, ordered by position.
    pub fn detect(&self, histogram: &CircularHistogram) -> Vec<Peak> {
        let median = match self.scoring {
            PeakScoring::AbsoluteHeight { .. } => histogram.median(),
            PeakScoring::LocalHeight { .. } => 0.0,
        };

        let mut candidates: Vec<(usize, f64)> = (0..histogram.len())
            .filter(|&i| is_local_maximum(histogram, i))
            .filter_map(|i| {
                self.scoring
                    .score(histogram, i, self.window_size, median)
                    .map(|score| (i, score))
            })
            .collect();
        // Stable: equal scores keep ascending bin order.
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut accepted: Vec<usize> = Vec::new();
        for (index, _) in candidates {
            if accepted
                .iter()
                .all(|&kept| histogram.bin_distance(index, kept) >= self.window_size)
            {
                accepted.push(index);
            }
        }
        accepted.sort_unstable();

        let peaks: Vec<Peak> = accepted
            .into_iter()
            .map(|i| Peak {
                position: histogram.key(i),
                height: histogram.counts()[i],
            })
            .collect();
        log::debug!("Detected {} peaks in {} bins", peaks.len(), histogram.len());
        peaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spikes(len: usize, at: &[(usize, f64)]) -> CircularHistogram {
        let mut counts = vec![0.0; len];
        for &(i, c) in at {
            counts[i] = c;
        }
        CircularHistogram::from_counts(1.0, counts, true).unwrap()
    }

    fn local() -> PeakScoring {
        PeakScoring::LocalHeight { min_score: 0.0 }
    }

    fn absolute() -> PeakScoring {
        PeakScoring::AbsoluteHeight { threshold_factor: 1.0 }
    }

    #[test]
    fn spikes_closer_than_the_window_merge() {
        let window = 15;
        let detector = PeakDetector::new(window, local()).unwrap();

        let close = spikes(1200, &[(100, 1.0), (100 + window - 1, 1.0)]);
        let peaks = detector.detect(&close);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].position, 100.5);

        let apart = spikes(1200, &[(100, 1.0), (100 + window + 1, 1.0)]);
        assert_eq!(detector.detect(&apart).len(), 2);
    }

    #[test]
    fn separation_wraps_around_the_octave() {
        let detector = PeakDetector::new(15, absolute()).unwrap();
        let histogram = spikes(1200, &[(2, 3.0), (1195, 5.0)]);
        let peaks = detector.detect(&histogram);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].height, 5.0);
        assert_eq!(peaks[0].position, 1195.5);
    }

    #[test]
    fn flat_histograms_have_no_peaks() {
        for scoring in [local(), absolute()] {
            let detector = PeakDetector::new(5, scoring).unwrap();
            let flat = CircularHistogram::from_counts(1.0, vec![2.0; 100], true).unwrap();
            assert!(detector.detect(&flat).is_empty());
            let empty = CircularHistogram::pitch_class(1.0).unwrap();
            assert!(detector.detect(&empty).is_empty());
        }
    }

    #[test]
    fn reports_counts_not_scores() {
        let detector = PeakDetector::new(5, local()).unwrap();
        let histogram = spikes(60, &[(10, 7.0), (40, 3.0)]);
        let peaks = detector.detect(&histogram);
        assert_eq!(
            peaks,
            vec![
                Peak { position: 10.5, height: 7.0 },
                Peak { position: 40.5, height: 3.0 },
            ]
        );
    }

    #[test]
    fn absolute_height_uses_the_median_threshold() {
        let mut counts = vec![1.0; 50];
        counts[10] = 1.5;
        counts[30] = 5.0;
        let histogram = CircularHistogram::from_counts(1.0, counts, true).unwrap();

        let strict = PeakDetector::new(3, PeakScoring::AbsoluteHeight { threshold_factor: 2.0 }).unwrap();
        let peaks = strict.detect(&histogram);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].height, 5.0);

        let loose = PeakDetector::new(3, PeakScoring::AbsoluteHeight { threshold_factor: 1.2 }).unwrap();
        assert_eq!(loose.detect(&histogram).len(), 2);
    }

    #[test]
    fn tiny_histograms_do_not_crash() {
        let detector = PeakDetector::new(15, local()).unwrap();
        let histogram = CircularHistogram::from_counts(1.0, vec![0.0, 4.0, 1.0, 0.0], true).unwrap();
        let peaks = detector.detect(&histogram);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].height, 4.0);

        let single = CircularHistogram::from_counts(1.0, vec![3.0], true).unwrap();
        assert!(detector.detect(&single).is_empty());
    }

    #[test]
    fn linear_histograms_peak_at_their_edges() {
        let detector = PeakDetector::new(3, local()).unwrap();
        let histogram = CircularHistogram::from_counts(1.0, vec![5.0, 1.0, 0.0, 0.0, 2.0], false).unwrap();
        let heights: Vec<f64> = detector.detect(&histogram).iter().map(|p| p.height).collect();
        assert_eq!(heights, vec![5.0, 2.0]);
    }

    #[test]
    fn window_must_be_odd_and_at_least_three() {
        assert!(PeakDetector::new(4, local()).is_err());
        assert!(PeakDetector::new(1, local()).is_err());
        assert!(PeakDetector::new(3, PeakScoring::AbsoluteHeight { threshold_factor: -1.0 }).is_err());
        assert!(PeakDetector::new(3, PeakScoring::LocalHeight { min_score: f64::NAN }).is_err());
    }
}
