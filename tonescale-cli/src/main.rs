//! # tonescale - command line front end
//!
//! Thin wrapper around `tonescale-core`. Recordings are read as raw
//! little-endian `f32` mono samples (e.g. exported with
//! `sox in.wav -t f32 -c 1 out.raw`); scales are given as comma separated
//! cents. Results are printed to stdout as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tonescale_core::{
    AnalysisConfig, CancellationToken, Candidate, CandidateSource, Peak, Ranker, Recording, Scale,
    ToneScaleAnalyzer, tuning,
};

#[derive(Parser, Debug)]
#[command(name = "tonescale", version, about = "Tone scale analysis of recorded audio")]
struct Cli {
    /// JSON file overriding the default analysis configuration
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the pitch of every frame of a recording
    Annotate {
        /// Raw f32 mono recording
        input: PathBuf,
        /// Sample rate of the recording in Hz
        #[arg(short, long, default_value_t = 44100.0)]
        sample_rate: f32,
    },
    /// Extract the tone scale of a recording
    Analyze {
        /// Raw f32 mono recording
        input: PathBuf,
        /// Sample rate of the recording in Hz
        #[arg(short, long, default_value_t = 44100.0)]
        sample_rate: f32,
        /// Also print the full histogram
        #[arg(long)]
        histogram: bool,
    },
    /// Rank recordings by similarity to a reference scale
    Rank {
        /// Reference scale in cents, e.g. 0,200,400,500,700,900,1100
        #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
        scale: Vec<f64>,
        /// Raw f32 mono recordings
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Sample rate of the recordings in Hz
        #[arg(short, long, default_value_t = 44100.0)]
        sample_rate: f32,
        /// Number of worker threads (default: one per core)
        #[arg(short, long)]
        workers: Option<usize>,
    },
}

#[derive(Serialize)]
struct AnnotationLine {
    timestamp: f64,
    frequency: Option<f64>,
    pitch_class: Option<f64>,
    probability: f32,
}

#[derive(Serialize)]
struct NamedPeak {
    position: f64,
    height: f64,
    note: &'static str,
    deviation: f64,
}

impl NamedPeak {
    /// Names a peak whose position is measured in cents above `reference` Hz.
    fn new(peak: &Peak, reference: f64) -> Self {
        let above_c = tuning::hz_to_absolute_cents(reference, tuning::DEFAULT_REFERENCE_FREQUENCY);
        let (note, deviation) = tuning::nearest_pitch_class_name(peak.position + above_c);
        Self {
            position: peak.position,
            height: peak.height,
            note,
            deviation,
        }
    }
}

#[derive(Serialize)]
struct AnalysisReport<'a> {
    frames: usize,
    voiced_frames: usize,
    peaks: Vec<NamedPeak>,
    scale: &'a [f64],
    intervals: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    histogram: Option<&'a [f64]>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Annotate { input, sample_rate } => annotate(config, &input, sample_rate),
        Command::Analyze {
            input,
            sample_rate,
            histogram,
        } => analyze(config, &input, sample_rate, histogram),
        Command::Rank {
            scale,
            inputs,
            sample_rate,
            workers,
        } => rank(config, scale, &inputs, sample_rate, workers),
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: AnalysisConfig = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    config.validate()?;
    log::info!("Loaded analysis config from {}", path.display());
    Ok(config)
}

/// Reads a headerless little-endian `f32` sample file.
fn read_samples(path: &Path) -> Result<Vec<f32>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.len() % 4 != 0 {
        bail!(
            "{} is not a raw f32 file ({} bytes is not a multiple of 4)",
            path.display(),
            bytes.len()
        );
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn annotate(config: AnalysisConfig, input: &Path, sample_rate: f32) -> Result<()> {
    let samples = read_samples(input)?;
    let analyzer = ToneScaleAnalyzer::new(config)?;
    let reference = analyzer.config().reference_frequency;
    let source = input.display().to_string();

    for annotation in analyzer
        .annotate(&samples, sample_rate, &source)?
        .annotations(reference)
    {
        let line = AnnotationLine {
            timestamp: annotation.timestamp,
            frequency: annotation.pitch.map(|p| p.hz()),
            pitch_class: annotation.pitch_class(),
            probability: annotation.probability,
        };
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

fn analyze(config: AnalysisConfig, input: &Path, sample_rate: f32, with_histogram: bool) -> Result<()> {
    let samples = read_samples(input)?;
    log::info!("Analysing {} ({} samples)", input.display(), samples.len());

    let reference = config.reference_frequency;
    let analyzer = ToneScaleAnalyzer::new(config)?;
    let analysis = analyzer.analyze(&samples, sample_rate, &CancellationToken::new())?;

    let report = AnalysisReport {
        frames: analysis.frames,
        voiced_frames: analysis.voiced_frames,
        peaks: analysis.peaks.iter().map(|p| NamedPeak::new(p, reference)).collect(),
        scale: analysis.scale.positions(),
        intervals: analysis.scale.intervals(),
        histogram: with_histogram.then(|| analysis.histogram.counts()),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn rank(
    config: AnalysisConfig,
    positions: Vec<f64>,
    inputs: &[PathBuf],
    sample_rate: f32,
    workers: Option<usize>,
) -> Result<()> {
    let scale = Scale::new(positions, config.peaks.min_separation)?;
    let mut ranker = Ranker::new(config)?;
    if let Some(workers) = workers {
        ranker = ranker.with_workers(workers);
    }
    let reference = ranker.reference_from_scale(&scale)?;

    let candidates = inputs
        .iter()
        .map(|path| {
            let samples = read_samples(path)?;
            Ok(Candidate::new(
                path.display().to_string(),
                CandidateSource::Recording(Recording::new(samples, sample_rate)),
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    log::info!("Ranking {} recordings against a {}-tone scale", candidates.len(), scale.len());
    let ranked = ranker.rank(&reference, candidates, &CancellationToken::new())?;
    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}
