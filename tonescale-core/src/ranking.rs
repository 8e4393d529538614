//! # Ranking Module
//!
//! Orders candidates by tone-scale similarity to a reference histogram.
//!
//! Candidates are independent, so each one is reduced to a histogram and
//! correlated on its own worker thread. Workers pull jobs from a shared
//! channel and send their scores back over a second one; nothing else is
//! shared between them.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;
use serde::{Deserialize, Serialize};

use crate::analysis::ToneScaleAnalyzer;
use crate::cancel::CancellationToken;
use crate::config::AnalysisConfig;
use crate::correlation::{CircularCorrelator, Displacement};
use crate::error::{Result, ToneScaleError};
use crate::histogram::CircularHistogram;
use crate::scale::Scale;

/// Decoded mono audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub samples: Arc<[f32]>,
    pub sample_rate: f32,
}

impl Recording {
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: f32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }
}

/// Anything that can be reduced to a pitch-class histogram.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateSource {
    Histogram(CircularHistogram),
    Scale(Scale),
    Recording(Recording),
}

/// A named item to rank.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub source: CandidateSource,
}

impl Candidate {
    pub fn new(id: impl Into<String>, source: CandidateSource) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }
}

/// One line of a ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub id: String,
    /// Position of the candidate in the input list.
    pub index: usize,
    /// Best displacement of the candidate against the reference, in bins.
    pub displacement: usize,
    pub score: f64,
}

type JobResult = (usize, String, Result<Displacement>);

/// Ranks candidates against a reference with a fixed configuration.
#[derive(Debug, Clone)]
pub struct Ranker {
    analyzer: ToneScaleAnalyzer,
    correlator: CircularCorrelator,
    workers: usize,
}

impl Ranker {
    /// Creates a ranker using one worker per available core.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let workers = thread::available_parallelism().map_or(1, |n| n.get());
        Ok(Self {
            correlator: CircularCorrelator::new(config.correlation),
            analyzer: ToneScaleAnalyzer::new(config)?,
            workers,
        })
    }

    /// Limits the number of worker threads (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn analyzer(&self) -> &ToneScaleAnalyzer {
        &self.analyzer
    }

    /// Renders a reference scale with the ranker's histogram settings.
    pub fn reference_from_scale(&self, scale: &Scale) -> Result<CircularHistogram> {
        self.analyzer.scale_histogram(scale)
    }

    /// Scores every candidate against `reference` and orders them by
    /// descending score. Equal scores keep their input order.
    ///
    /// # Errors
    /// `Cancelled` if the token fires before every candidate is scored, or
    /// the first candidate error in input order.
    pub fn rank(
        &self,
        reference: &CircularHistogram,
        candidates: Vec<Candidate>,
        token: &CancellationToken,
    ) -> Result<Vec<RankedCandidate>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let count = candidates.len();

        let (job_tx, job_rx) = unbounded::<(usize, Candidate)>();
        let (result_tx, result_rx) = unbounded::<JobResult>();
        for job in candidates.into_iter().enumerate() {
            // The receiver is alive until the scope below ends.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        thread::scope(|scope| {
            for _ in 0..self.workers.min(count) {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (index, Candidate { id, source }) in job_rx.iter() {
                        let outcome = token
                            .check()
                            .and_then(|_| self.score(reference, source, token));
                        if result_tx.send((index, id, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        if token.is_cancelled() {
            return Err(ToneScaleError::Cancelled);
        }

        let mut slots: Vec<Option<(String, Result<Displacement>)>> = vec![None; count];
        for (index, id, outcome) in result_rx.iter() {
            slots[index] = Some((id, outcome));
        }

        let mut ranked = Vec::with_capacity(count);
        for (index, slot) in slots.into_iter().enumerate() {
            let (id, outcome) = slot.ok_or(ToneScaleError::Cancelled)?;
            let displacement = outcome?;
            log::debug!(
                "Candidate {} scored {:.4} at displacement {}",
                id,
                displacement.score,
                displacement.bins
            );
            ranked.push(RankedCandidate {
                id,
                index,
                displacement: displacement.bins,
                score: displacement.score,
            });
        }
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(ranked)
    }

    fn score(
        &self,
        reference: &CircularHistogram,
        source: CandidateSource,
        token: &CancellationToken,
    ) -> Result<Displacement> {
        let histogram = match source {
            CandidateSource::Histogram(histogram) => histogram,
            CandidateSource::Scale(scale) => self.analyzer.scale_histogram(&scale)?,
            CandidateSource::Recording(recording) => {
                self.analyzer
                    .pitch_class_histogram(&recording.samples, recording.sample_rate, token)?
            }
        };
        let best = self.correlator.find_optimal_displacement(reference, &histogram)?;
        let score = self
            .correlator
            .correlation_with_displacement(reference, best.bins, &histogram)?;
        Ok(Displacement {
            bins: best.bins,
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const REFERENCE: [f64; 6] = [0.0, 130.0, 410.0, 620.0, 880.0, 1040.0];

    fn scale(positions: &[f64]) -> Scale {
        Scale::new(positions.iter().copied(), 0.0).unwrap()
    }

    fn ranker() -> Ranker {
        Ranker::new(AnalysisConfig::default()).unwrap().with_workers(3)
    }

    fn ids(ranked: &[RankedCandidate]) -> Vec<&str> {
        ranked.iter().map(|r| r.id.as_str()).collect()
    }

    fn decreasing_candidates() -> Vec<Candidate> {
        vec![
            Candidate::new("same", CandidateSource::Scale(scale(&REFERENCE))),
            Candidate::new(
                "one-moved",
                CandidateSource::Scale(scale(&[0.0, 130.0, 410.0, 680.0, 880.0, 1040.0])),
            ),
            Candidate::new(
                "three-moved",
                CandidateSource::Scale(scale(&[0.0, 190.0, 470.0, 680.0, 880.0, 1040.0])),
            ),
        ]
    }

    #[test]
    fn orders_by_decreasing_similarity() {
        let ranker = ranker();
        let reference = ranker.reference_from_scale(&scale(&REFERENCE)).unwrap();
        let token = CancellationToken::new();

        let ranked = ranker.rank(&reference, decreasing_candidates(), &token).unwrap();
        assert_eq!(ids(&ranked), vec!["same", "one-moved", "three-moved"]);
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
        assert_eq!(ranked[0].displacement, 0);
        assert!(ranked[0].score > ranked[1].score && ranked[1].score > ranked[2].score);

        let mut reversed = decreasing_candidates();
        reversed.reverse();
        let ranked = ranker.rank(&reference, reversed, &token).unwrap();
        assert_eq!(ids(&ranked), vec!["same", "one-moved", "three-moved"]);
        assert_eq!(ranked[0].index, 2);
    }

    #[test]
    fn ties_keep_input_order() {
        let ranker = ranker();
        let reference = ranker.reference_from_scale(&scale(&REFERENCE)).unwrap();
        let candidates = vec![
            Candidate::new("first", CandidateSource::Scale(scale(&REFERENCE))),
            Candidate::new("second", CandidateSource::Histogram(reference.clone())),
            Candidate::new("third", CandidateSource::Scale(scale(&REFERENCE))),
        ];
        let ranked = ranker.rank(&reference, candidates, &CancellationToken::new()).unwrap();
        assert_eq!(ids(&ranked), vec!["first", "second", "third"]);
    }

    #[test]
    fn transposed_candidates_report_their_displacement() {
        let ranker = ranker();
        let reference = ranker.reference_from_scale(&scale(&REFERENCE)).unwrap();
        let shifted: Vec<f64> = REFERENCE.iter().map(|p| p + 200.0).collect();
        let candidates = vec![Candidate::new("up", CandidateSource::Scale(scale(&shifted)))];
        let ranked = ranker.rank(&reference, candidates, &CancellationToken::new()).unwrap();
        assert_eq!(ranked[0].displacement, 200);
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_candidate_lists_rank_empty() {
        let ranker = ranker();
        let reference = CircularHistogram::pitch_class(1.0).unwrap();
        let ranked = ranker.rank(&reference, Vec::new(), &CancellationToken::new()).unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn recordings_are_analysed_on_workers() {
        let sample_rate = 22050.0;
        let tone = |frequency: f32| -> Recording {
            let samples: Vec<f32> = (0..sample_rate as usize / 2)
                .map(|i| 0.5 * (2.0 * PI * frequency * i as f32 / sample_rate).sin())
                .collect();
            Recording::new(samples, sample_rate)
        };

        let ranker = ranker();
        let reference = ranker.reference_from_scale(&scale(&[900.0])).unwrap();
        let candidates = vec![
            Candidate::new("a4", CandidateSource::Recording(tone(440.0))),
            Candidate::new("silence", CandidateSource::Recording(Recording::new(vec![0.0; 8192], sample_rate))),
        ];
        let ranked = ranker.rank(&reference, candidates, &CancellationToken::new()).unwrap();
        assert_eq!(ids(&ranked), vec!["a4", "silence"]);
        assert_eq!(ranked[1].score, 0.0);
    }

    #[test]
    fn recording_length_does_not_affect_the_score() {
        let sample_rate = 11025.0;
        let melody = |frequencies: &[f32], seconds_each: f32| -> Recording {
            let len = (sample_rate * seconds_each) as usize;
            let samples: Vec<f32> = frequencies
                .iter()
                .flat_map(|&f| (0..len).map(move |i| 0.5 * (2.0 * PI * f * i as f32 / sample_rate).sin()))
                .collect();
            Recording::new(samples, sample_rate)
        };
        let pentatonic = [261.63, 293.66, 329.63, 392.0, 440.0];

        let mut config = AnalysisConfig::default();
        config.frames.size = 1024;
        config.frames.overlap = 512;
        config.frames.tail = crate::frame::TailPolicy::Skip;
        let ranker = Ranker::new(config).unwrap().with_workers(3);
        let reference = ranker
            .reference_from_scale(&scale(&[0.0, 200.0, 400.0, 700.0, 900.0]))
            .unwrap();

        let candidates = vec![
            Candidate::new("chromatic", CandidateSource::Recording(melody(&[261.63, 269.29, 277.18, 285.30, 293.66], 0.5))),
            Candidate::new("long", CandidateSource::Recording(melody(&pentatonic, 5.0))),
            Candidate::new("short", CandidateSource::Recording(melody(&pentatonic, 0.5))),
        ];
        let ranked = ranker.rank(&reference, candidates, &CancellationToken::new()).unwrap();
        assert_eq!(ranked[2].id, "chromatic");

        let long = ranked.iter().find(|r| r.id == "long").unwrap().score;
        let short = ranked.iter().find(|r| r.id == "short").unwrap().score;
        assert!((long - short).abs() < 0.2, "long {long}, short {short}");
        assert!(short > ranked[2].score + 0.2, "short {short}, chromatic {}", ranked[2].score);
    }

    #[test]
    fn cancellation_aborts_the_batch() {
        let ranker = ranker();
        let reference = ranker.reference_from_scale(&scale(&REFERENCE)).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = ranker.rank(&reference, decreasing_candidates(), &token);
        assert_eq!(result, Err(ToneScaleError::Cancelled));
    }

    #[test]
    fn mismatched_candidates_fail() {
        let ranker = ranker();
        let reference = ranker.reference_from_scale(&scale(&REFERENCE)).unwrap();
        let coarse = CircularHistogram::pitch_class(10.0).unwrap();
        let candidates = vec![Candidate::new("coarse", CandidateSource::Histogram(coarse))];
        assert!(matches!(
            ranker.rank(&reference, candidates, &CancellationToken::new()),
            Err(ToneScaleError::DimensionMismatch { .. })
        ));
    }
}
