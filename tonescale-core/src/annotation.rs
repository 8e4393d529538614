//! # Annotation Module
//!
//! Drives a [`FrameSource`] through the [`Yin`] estimator and yields exactly
//! one observation per frame, voiced or not, so consumers always see
//! contiguous time coverage.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToneScaleError};
use crate::frame::FrameSource;
use crate::pitch::Yin;
use crate::tuning;

/// Units a pitch can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PitchUnit {
    Hertz,
    /// Cents above the annotation's reference frequency.
    AbsoluteCents,
    /// Absolute cents wrapped into `[0, 1200)`.
    RelativeCents,
    /// Fractional MIDI key, A4 = 69.
    MidiKey,
}

/// A detected pitch. Always a positive, finite frequency.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Pitch {
    hz: f64,
}

impl Pitch {
    /// Returns `None` unless `hz` is positive and finite.
    pub fn from_hz(hz: f64) -> Option<Pitch> {
        (hz.is_finite() && hz > 0.0).then_some(Pitch { hz })
    }

    pub fn from_absolute_cents(cents: f64, reference: f64) -> Option<Pitch> {
        Pitch::from_hz(tuning::absolute_cents_to_hz(cents, reference))
    }

    pub fn hz(&self) -> f64 {
        self.hz
    }

    pub fn absolute_cents(&self, reference: f64) -> f64 {
        tuning::hz_to_absolute_cents(self.hz, reference)
    }

    pub fn pitch_class(&self, reference: f64) -> f64 {
        tuning::pitch_class(self.absolute_cents(reference))
    }

    pub fn midi_key(&self) -> f64 {
        tuning::hz_to_midi_key(self.hz)
    }

    pub fn in_unit(&self, unit: PitchUnit, reference: f64) -> f64 {
        match unit {
            PitchUnit::Hertz => self.hz,
            PitchUnit::AbsoluteCents => self.absolute_cents(reference),
            PitchUnit::RelativeCents => self.pitch_class(reference),
            PitchUnit::MidiKey => self.midi_key(),
        }
    }
}

/// Raw estimator output for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchObservation {
    /// Start of the frame in seconds.
    pub timestamp: f64,
    /// Detected frequency, `None` for unvoiced frames.
    pub frequency: Option<f64>,
    /// YIN probability of the estimate.
    pub probability: f32,
    /// Identifies the recording or detector that produced this observation.
    pub source: Arc<str>,
}

impl PitchObservation {
    pub fn pitch(&self) -> Option<Pitch> {
        self.frequency.and_then(Pitch::from_hz)
    }

    /// Attaches unit conversion relative to `reference` Hz.
    pub fn annotate(self, reference: f64) -> Annotation {
        Annotation {
            timestamp: self.timestamp,
            pitch: self.pitch(),
            probability: self.probability,
            source: self.source,
            reference,
        }
    }
}

/// An observation whose pitch can be read in any [`PitchUnit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub timestamp: f64,
    pub pitch: Option<Pitch>,
    pub probability: f32,
    pub source: Arc<str>,
    /// Reference frequency for absolute cents.
    pub reference: f64,
}

impl Annotation {
    pub fn is_voiced(&self) -> bool {
        self.pitch.is_some()
    }

    pub fn pitch_in(&self, unit: PitchUnit) -> Option<f64> {
        self.pitch.map(|p| p.in_unit(unit, self.reference))
    }

    pub fn absolute_cents(&self) -> Option<f64> {
        self.pitch_in(PitchUnit::AbsoluteCents)
    }

    pub fn pitch_class(&self) -> Option<f64> {
        self.pitch_in(PitchUnit::RelativeCents)
    }
}

/// Iterator producing one [`PitchObservation`] per frame.
#[derive(Debug)]
pub struct AnnotationStream<I> {
    frames: FrameSource<I>,
    yin: Yin,
    source: Arc<str>,
}

impl<I> AnnotationStream<I>
where
    I: Iterator<Item = f32>,
{
    /// # Errors
    /// `InvalidArgument` if the frame size differs from the estimator's buffer size.
    pub fn new(frames: FrameSource<I>, yin: Yin, source: impl Into<Arc<str>>) -> Result<Self> {
        if frames.frame_size() != yin.buffer_size() {
            return Err(ToneScaleError::invalid(format!(
                "frame size {} does not match the estimator buffer size {}",
                frames.frame_size(),
                yin.buffer_size()
            )));
        }
        Ok(Self {
            frames,
            yin,
            source: source.into(),
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.yin.sample_rate()
    }

    /// Converts every observation into an [`Annotation`].
    pub fn annotations(self, reference: f64) -> impl Iterator<Item = Annotation> {
        self.map(move |observation| observation.annotate(reference))
    }
}

impl<I> Iterator for AnnotationStream<I>
where
    I: Iterator<Item = f32>,
{
    type Item = PitchObservation;

    fn next(&mut self) -> Option<PitchObservation> {
        let frame = self.frames.next()?;
        let result = self.yin.process(&frame.samples);
        Some(PitchObservation {
            timestamp: frame.timestamp(self.yin.sample_rate()),
            frequency: result.frequency.map(f64::from),
            probability: result.probability,
            source: Arc::clone(&self.source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::TailPolicy;
    use crate::pitch::DEFAULT_THRESHOLD;
    use std::f32::consts::PI;

    fn stream(samples: Vec<f32>, frame: usize, overlap: usize) -> AnnotationStream<std::vec::IntoIter<f32>> {
        let frames = FrameSource::new(samples, frame, overlap, TailPolicy::ZeroPad).unwrap();
        let yin = Yin::new(8000.0, frame, DEFAULT_THRESHOLD).unwrap();
        AnnotationStream::new(frames, yin, "test").unwrap()
    }

    #[test]
    fn every_frame_yields_an_observation() {
        // Half a second of silence followed by half a second of 200 Hz.
        let mut samples = vec![0.0; 4000];
        samples.extend((0..4000).map(|i| (2.0 * PI * 200.0 * i as f32 / 8000.0).sin()));

        let observations: Vec<PitchObservation> = stream(samples, 512, 256).collect();
        // 8000 samples, hop 256: starts 0..=7680 plus one padded tail frame.
        assert_eq!(observations.len(), 31);

        for (i, observation) in observations.iter().enumerate() {
            assert!((observation.timestamp - i as f64 * 256.0 / 8000.0).abs() < 1e-12);
        }
        assert!(observations[0].frequency.is_none());
        let voiced = observations.iter().filter(|o| o.frequency.is_some()).count();
        assert!(voiced > 10);
        assert!(observations.iter().all(|o| &*o.source == "test"));
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        let frames = FrameSource::new(vec![0.0; 10], 512, 0, TailPolicy::Skip).unwrap();
        let yin = Yin::new(8000.0, 1024, DEFAULT_THRESHOLD).unwrap();
        assert!(AnnotationStream::new(frames, yin, "test").is_err());
    }

    #[test]
    fn annotations_convert_units() {
        let observation = PitchObservation {
            timestamp: 0.5,
            frequency: Some(440.0),
            probability: 0.9,
            source: Arc::from("a"),
        };
        let annotation = observation.annotate(tuning::DEFAULT_REFERENCE_FREQUENCY);
        assert!((annotation.pitch_class().unwrap() - 900.0).abs() < 1e-9);
        assert!((annotation.pitch_in(PitchUnit::MidiKey).unwrap() - 69.0).abs() < 1e-9);
        assert_eq!(annotation.pitch_in(PitchUnit::Hertz), Some(440.0));
    }

    #[test]
    fn unvoiced_observations_have_no_pitch() {
        let observation = PitchObservation {
            timestamp: 0.0,
            frequency: None,
            probability: 0.0,
            source: Arc::from("a"),
        };
        let annotation = observation.annotate(tuning::DEFAULT_REFERENCE_FREQUENCY);
        assert!(!annotation.is_voiced());
        assert_eq!(annotation.absolute_cents(), None);
    }

    #[test]
    fn pitch_rejects_non_positive_frequencies() {
        assert!(Pitch::from_hz(0.0).is_none());
        assert!(Pitch::from_hz(-1.0).is_none());
        assert!(Pitch::from_hz(f64::NAN).is_none());
    }
}
