//! Batch and live evaluation of a persisted DOA model.

pub mod protractor;
pub mod scoring;

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;

use crate::{
    audio::{DecodeError, FrameSource, read_audio_file},
    constants::{BATCH_EVAL_ITERATIONS, LOOSE_MATCH_TOLERANCE_DEG},
    dataset::{DatasetError, enumerate_classes},
    model::{ArtifactError, DoaModel},
};

pub use protractor::{AnglePrinter, ProtractorError};
pub use scoring::{AccuracyReport, DoaLabel, angular_distance, exact_match, loose_match};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("dataset: {0}")]
    Dataset(#[from] DatasetError),
    #[error("audio: {0}")]
    Decode(#[from] DecodeError),
    #[error("model: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("display: {0}")]
    Protractor(#[from] ProtractorError),
    #[error("no test vectors found below {0}")]
    NoFiles(PathBuf),
    #[error("class name {0:?} is neither an angle nor \"silence\"")]
    Label(String),
}

#[derive(Clone, Debug)]
pub struct BatchEvalOptions {
    pub iterations: usize,
    pub tolerance_deg: f32,
    /// Fixed seed for the file picks; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for BatchEvalOptions {
    fn default() -> Self {
        Self {
            iterations: BATCH_EVAL_ITERATIONS,
            tolerance_deg: LOOSE_MATCH_TOLERANCE_DEG,
            seed: None,
        }
    }
}

/// Score `opts.iterations` randomly picked test vectors from `dataset_dir`.
///
/// The expected class of a file is the name of its class directory. One
/// `Expected: …, got: …` line per pick is written to `out`, followed by the
/// accuracy summary.
pub fn run_batch<W: Write>(
    model: &DoaModel,
    dataset_dir: &Path,
    opts: &BatchEvalOptions,
    out: &mut W,
) -> Result<AccuracyReport, EvalError> {
    let vectors: Vec<(PathBuf, String)> = enumerate_classes(dataset_dir)?
        .into_iter()
        .flat_map(|class| {
            let name = class.name;
            class.files.into_iter().map(move |p| (p, name.clone()))
        })
        .collect();
    log::info!("Found {} files.", vectors.len());
    if vectors.is_empty() {
        return Err(EvalError::NoFiles(dataset_dir.to_path_buf()));
    }

    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut report = AccuracyReport::default();
    for _ in 0..opts.iterations {
        let (path, expected) = &vectors[rng.random_range(0..vectors.len())];
        let audio = read_audio_file(path)?;
        let prediction = model.predict(&audio)?;
        log::debug!(
            "{}: {} (p={:.3})",
            path.display(),
            prediction.class_name,
            prediction.probability
        );
        writeln!(out, "Expected: {expected}, got: {}", prediction.class_name)?;
        report.record(expected, &prediction.class_name, opts.tolerance_deg);
    }
    writeln!(out, "{report}")?;
    Ok(report)
}

/// Protractor sized for `model`: one column per non-silence class.
pub fn printer_for<W: Write>(model: &DoaModel, out: W) -> AnglePrinter<W> {
    AnglePrinter::new(out, model.class_names().len().saturating_sub(1))
}

/// Classify up to `iterations` frames from `source` and draw each result.
///
/// Stops early when the stream ends; returns the number of frames shown.
pub fn run_live<W: Write>(
    model: &DoaModel,
    source: &mut FrameSource,
    iterations: usize,
    printer: &mut AnglePrinter<W>,
) -> Result<usize, EvalError> {
    printer.print_header()?;
    let mut shown = 0;
    for _ in 0..iterations {
        let Some(frame) = source.read_frame()? else {
            log::info!("Audio stream from {} ended", source.origin());
            break;
        };
        let prediction = model.predict(&frame)?;
        match DoaLabel::parse(&prediction.class_name) {
            Some(DoaLabel::Silence) => printer.update_silence()?,
            Some(DoaLabel::Angle(angle)) => printer.update_angle(angle)?,
            None => return Err(EvalError::Label(prediction.class_name)),
        }
        shown += 1;
    }
    Ok(shown)
}
