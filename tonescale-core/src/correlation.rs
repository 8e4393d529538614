//! # Correlation Module
//!
//! Circular cross-correlation of pitch-class histograms. The search shifts
//! the second histogram by every integer displacement and keeps the one with
//! the highest similarity. Histograms are at most a few thousand bins, so
//! the brute-force search is used as is.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToneScaleError};
use crate::histogram::CircularHistogram;

/// Similarity measure between two aligned histograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CorrelationMeasure {
    /// `Σ min(a/Σa, b/Σb)`: overlap of the two histograms as distributions.
    #[default]
    Intersection,
    /// `Σ a·b / (‖a‖·‖b‖)`.
    Correlation,
    /// `Σ sqrt(a·b) / sqrt(Σa·Σb)`.
    Bhattacharyya,
}

/// Best alignment of two histograms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Displacement {
    /// Shift in bins applied to the second histogram.
    pub bins: usize,
    /// Similarity at that shift.
    pub score: f64,
}

impl Displacement {
    /// The shift expressed in cents.
    pub fn cents(&self, bin_width: f64) -> f64 {
        self.bins as f64 * bin_width
    }
}

/// Displacement search with a fixed similarity measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CircularCorrelator {
    measure: CorrelationMeasure,
}

impl CircularCorrelator {
    pub fn new(measure: CorrelationMeasure) -> Self {
        Self { measure }
    }

    pub fn measure(&self) -> CorrelationMeasure {
        self.measure
    }

    /// Finds the displacement of `b` that best matches `a`.
    ///
    /// Every shift in `[0, len)` is tried; ties go to the smallest shift.
    ///
    /// # Errors
    /// `DimensionMismatch` for histograms of different layout,
    /// `InvalidArgument` for linear histograms.
    pub fn find_optimal_displacement(
        &self,
        a: &CircularHistogram,
        b: &CircularHistogram,
    ) -> Result<Displacement> {
        check_comparable(a, b)?;
        let mut best = Displacement {
            bins: 0,
            score: self.score_at(a, b, 0),
        };
        for displacement in 1..a.len() {
            let score = self.score_at(a, b, displacement);
            if score > best.score {
                best = Displacement {
                    bins: displacement,
                    score,
                };
            }
        }
        Ok(best)
    }

    /// Similarity of `a` and `b` shifted by `displacement` bins.
    pub fn correlation_with_displacement(
        &self,
        a: &CircularHistogram,
        displacement: usize,
        b: &CircularHistogram,
    ) -> Result<f64> {
        check_comparable(a, b)?;
        Ok(self.score_at(a, b, displacement % a.len()))
    }

    fn score_at(&self, a: &CircularHistogram, b: &CircularHistogram, displacement: usize) -> f64 {
        let a = a.counts();
        let b = b.counts();
        let n = a.len();
        let shifted = |i: usize| b[(i + displacement) % n];

        match self.measure {
            CorrelationMeasure::Intersection => {
                let mass_a = a.iter().sum::<f64>();
                let mass_b = b.iter().sum::<f64>();
                if !(mass_a > 0.0 && mass_b > 0.0) {
                    return 0.0;
                }
                (0..n).map(|i| (a[i] / mass_a).min(shifted(i) / mass_b)).sum()
            }
            CorrelationMeasure::Correlation => {
                let product: f64 = (0..n).map(|i| a[i] * shifted(i)).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
                ratio(product, norm_a * norm_b)
            }
            CorrelationMeasure::Bhattacharyya => {
                let coefficient: f64 = (0..n).map(|i| (a[i] * shifted(i)).max(0.0).sqrt()).sum();
                let mass = (a.iter().sum::<f64>() * b.iter().sum::<f64>()).max(0.0).sqrt();
                ratio(coefficient, mass)
            }
        }
    }
}

// An empty histogram matches nothing.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 && denominator.is_finite() {
        numerator / denominator
    } else {
        0.0
    }
}

fn check_comparable(a: &CircularHistogram, b: &CircularHistogram) -> Result<()> {
    a.check_dimensions(b)?;
    if !a.is_circular() {
        return Err(ToneScaleError::invalid(
            "displacement search needs circular histograms",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::{Scale, ScaleBump};

    const MEASURES: [CorrelationMeasure; 3] = [
        CorrelationMeasure::Intersection,
        CorrelationMeasure::Correlation,
        CorrelationMeasure::Bhattacharyya,
    ];

    fn scale_histogram(positions: &[f64]) -> CircularHistogram {
        Scale::new(positions.iter().copied(), 0.0)
            .unwrap()
            .to_histogram(1.0, ScaleBump::default())
            .unwrap()
    }

    #[test]
    fn a_histogram_matches_itself_without_displacement() {
        let histogram = scale_histogram(&[0.0, 150.0, 470.0, 710.0, 980.0]);
        for measure in MEASURES {
            let correlator = CircularCorrelator::new(measure);
            let best = correlator
                .find_optimal_displacement(&histogram, &histogram.clone())
                .unwrap();
            assert_eq!(best.bins, 0, "{measure:?}");
            assert!((best.score - 1.0).abs() < 1e-9, "{measure:?}: {}", best.score);
        }
    }

    #[test]
    fn finds_the_rotation_between_transposed_scales() {
        let reference = scale_histogram(&[0.0, 200.0, 350.0, 700.0, 1000.0]);
        let transposed = scale_histogram(&[130.0, 330.0, 480.0, 830.0, 1130.0]);
        for measure in MEASURES {
            let correlator = CircularCorrelator::new(measure);
            let best = correlator.find_optimal_displacement(&reference, &transposed).unwrap();
            assert_eq!(best.bins, 130, "{measure:?}");
            assert_eq!(best.cents(1.0), 130.0);

            let again = correlator
                .correlation_with_displacement(&reference, best.bins, &transposed)
                .unwrap();
            assert_eq!(again, best.score);
        }
    }

    #[test]
    fn ties_resolve_to_the_smallest_displacement() {
        // Twelve-tone equal temperament is invariant under 100 cent shifts.
        let positions: Vec<f64> = (0..12).map(|i| i as f64 * 100.0).collect();
        let histogram = scale_histogram(&positions);
        let best = CircularCorrelator::default()
            .find_optimal_displacement(&histogram, &histogram)
            .unwrap();
        assert_eq!(best.bins, 0);
    }

    #[test]
    fn intersection_of_disjoint_histograms_is_zero() {
        let a = CircularHistogram::from_counts(1.0, vec![1.0, 0.0, 0.0, 0.0], true).unwrap();
        let b = CircularHistogram::from_counts(1.0, vec![0.0, 0.0, 2.0, 0.0], true).unwrap();
        let correlator = CircularCorrelator::new(CorrelationMeasure::Intersection);
        assert_eq!(correlator.correlation_with_displacement(&a, 0, &b).unwrap(), 0.0);

        let best = correlator.find_optimal_displacement(&a, &b).unwrap();
        assert_eq!(best.bins, 2);
        assert_eq!(best.score, 1.0);
    }

    #[test]
    fn scores_do_not_depend_on_total_mass() {
        let shape = scale_histogram(&[0.0, 200.0, 400.0, 700.0, 900.0]);
        let mut heavy = shape.clone();
        for _ in 0..99 {
            heavy.add_histogram(&shape).unwrap();
        }
        for measure in MEASURES {
            let correlator = CircularCorrelator::new(measure);
            let light = correlator.find_optimal_displacement(&shape, &shape).unwrap();
            let loaded = correlator.find_optimal_displacement(&shape, &heavy).unwrap();
            assert_eq!(loaded.bins, 0, "{measure:?}");
            assert!((loaded.score - light.score).abs() < 1e-9, "{measure:?}: {}", loaded.score);
        }
    }

    #[test]
    fn empty_histograms_score_zero() {
        let empty = CircularHistogram::pitch_class(10.0).unwrap();
        for measure in MEASURES {
            let best = CircularCorrelator::new(measure)
                .find_optimal_displacement(&empty, &empty)
                .unwrap();
            assert_eq!(best, Displacement { bins: 0, score: 0.0 });
        }
    }

    #[test]
    fn incompatible_histograms_are_rejected() {
        let correlator = CircularCorrelator::default();
        let fine = CircularHistogram::pitch_class(1.0).unwrap();
        let coarse = CircularHistogram::pitch_class(10.0).unwrap();
        assert!(matches!(
            correlator.find_optimal_displacement(&fine, &coarse),
            Err(ToneScaleError::DimensionMismatch { .. })
        ));

        let linear = CircularHistogram::from_counts(1.0, vec![1.0; 4], false).unwrap();
        assert!(matches!(
            correlator.find_optimal_displacement(&linear, &linear),
            Err(ToneScaleError::InvalidArgument(_))
        ));
    }
}
