// tonescale-core/src/lib.rs

//! The core logic for tone scale analysis.
//! This crate estimates pitch with YIN, accumulates pitch classes into
//! circular histograms, picks their peaks and ranks recordings or scales by
//! tonal similarity. It is completely headless and performs no file I/O:
//! callers hand in decoded mono samples and receive histograms, peaks and
//! rankings.

pub mod analysis;
pub mod annotation;
pub mod cancel;
pub mod config;
pub mod correlation;
pub mod error;
pub mod frame;
pub mod histogram;
pub mod peaks;
pub mod pitch;
pub mod ranking;
pub mod scale;
pub mod tuning;

pub use analysis::{ToneScaleAnalysis, ToneScaleAnalyzer};
pub use annotation::{Annotation, AnnotationStream, Pitch, PitchObservation, PitchUnit};
pub use cancel::CancellationToken;
pub use config::AnalysisConfig;
pub use correlation::{CircularCorrelator, CorrelationMeasure, Displacement};
pub use error::{Result, ToneScaleError};
pub use frame::{Frame, FrameSource, TailPolicy};
pub use histogram::{CircularHistogram, Kernel, Normalization};
pub use peaks::{Peak, PeakDetector, PeakScoring};
pub use pitch::{PitchResult, Yin};
pub use ranking::{Candidate, CandidateSource, RankedCandidate, Ranker, Recording};
pub use scale::{Scale, ScaleBump};
