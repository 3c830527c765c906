//! DOA model trainer.
//!
//! Adam + sparse categorical cross-entropy over the streamed training set,
//! validation after every epoch, checkpoint of the best validation accuracy
//! and early stopping once it plateaus.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{self as nn, Optimizer, VarBuilder, VarMap, optim::AdamW, optim::ParamsAdamW};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use thiserror::Error;

use crate::{
    constants::{
        BATCH_SIZE, EARLY_STOP_PATIENCE, EPOCHS, FRAME_WORDS, HIDDEN_LAYERS, LEARNING_RATE,
        SHUFFLE_SEED,
    },
    dataset::{DatasetError, DatasetSplit, Example, ExampleStream, LabeledDataset, StreamOptions},
    model::{ArtifactError, ClassNames, DoaNet, ensure_model_extension, save_weights},
};

/// ------------------------------------------------------------
///  Training-time error handling
/// ------------------------------------------------------------
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("{0} set is empty")]
    EmptySet(&'static str),
    #[error("dataset: {0}")]
    Dataset(#[from] DatasetError),
    #[error("model artifact: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("debug log: {0}")]
    Json(#[from] serde_json::Error),
    #[error("mutex poison: {0}")]
    Poison(String),
}

/// Hyper-parameters accepted by the trainer.
#[derive(Clone, Debug, Serialize)]
pub struct TrainOptions {
    /// Adam learning rate
    pub lr: f64,
    /// Upper bound on training epochs
    pub epochs: usize,
    pub batch_size: usize,
    /// Epochs without validation-accuracy improvement before stopping
    pub early_stop_pat: usize,
    /// Seeds the dataset shuffle and the per-epoch stream shuffles
    pub seed: u64,
    /// Widths of the ReLU stack
    pub hidden_layers: Vec<usize>,
    /// Directory receiving `options.json` and `history.jsonl`
    pub debug_dir: Option<PathBuf>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            lr: LEARNING_RATE,
            epochs: EPOCHS,
            batch_size: BATCH_SIZE,
            early_stop_pat: EARLY_STOP_PATIENCE,
            seed: SHUFFLE_SEED,
            hidden_layers: HIDDEN_LAYERS.to_vec(),
            debug_dir: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
    /// NaN / ±Inf parameter count; only computed with a debug directory.
    pub nonfinite_params: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct TrainReport {
    pub history: Vec<EpochMetrics>,
    pub best_epoch: usize,
    pub best_val_accuracy: f32,
    /// Validation loss / accuracy of the restored best weights.
    pub final_val_loss: f32,
    pub final_val_accuracy: f32,
}

/// Train a DOA model from a dataset directory.
///
/// Writes `<output>.json` with the class names before training, then the
/// best weights to `output` (which must end in `.safetensors`).
pub fn train_dir(
    input_dir: &Path,
    output_path: &Path,
    opts: &TrainOptions,
    dev: &Device,
) -> Result<TrainReport, TrainError> {
    ensure_model_extension(output_path)?;

    let split = LabeledDataset::prepare(input_dir, opts.seed)?;

    // The class labels are not part of the weights file; keep them next to it.
    let side_car = ClassNames::new(split.class_names.clone()).save_for_model(output_path)?;
    log::info!("Class names written to {}", side_car.display());

    fit(&split, output_path, opts, dev)
}

/// Outcome of one epoch as seen by [`EarlyStopping`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochVerdict {
    /// New best validation accuracy; checkpoint.
    Improved,
    /// No improvement, patience left.
    Plateau,
    /// Patience exhausted.
    Stop,
}

/// Best-epoch tracking on validation accuracy.
///
/// Only a strictly higher accuracy counts as an improvement, and training
/// stops once `patience` consecutive epochs brought none.
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    patience: usize,
    best: f32,
    best_epoch: usize,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f32::NEG_INFINITY,
            best_epoch: 0,
            wait: 0,
        }
    }

    pub fn observe(&mut self, epoch: usize, val_accuracy: f32) -> EpochVerdict {
        if val_accuracy > self.best {
            self.best = val_accuracy;
            self.best_epoch = epoch;
            self.wait = 0;
            EpochVerdict::Improved
        } else {
            self.wait += 1;
            if self.wait >= self.patience {
                EpochVerdict::Stop
            } else {
                EpochVerdict::Plateau
            }
        }
    }

    pub fn best(&self) -> f32 {
        self.best
    }

    /// `0` until the first improvement.
    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}

/// Fit a fresh network on `split` and persist it to `output_path`.
pub fn fit(
    split: &DatasetSplit,
    output_path: &Path,
    opts: &TrainOptions,
    dev: &Device,
) -> Result<TrainReport, TrainError> {
    fit_observed(split, output_path, opts, dev, |_, _| Ok(()))
}

/// [`fit`], calling `on_epoch` with the metrics and the end-of-epoch
/// variables after every validation pass.
pub fn fit_observed<F>(
    split: &DatasetSplit,
    output_path: &Path,
    opts: &TrainOptions,
    dev: &Device,
    mut on_epoch: F,
) -> Result<TrainReport, TrainError>
where
    F: FnMut(&EpochMetrics, &VarMap) -> Result<(), TrainError>,
{
    ensure_model_extension(output_path)?;
    if split.train.is_empty() {
        return Err(TrainError::EmptySet("training"));
    }
    if split.validation.is_empty() {
        return Err(TrainError::EmptySet("validation"));
    }

    /* ---------- 1. Build neural network ---------- */

    let var_map = VarMap::new();
    let vb = VarBuilder::from_varmap(&var_map, DType::F32, dev);
    let net = DoaNet::new(
        vb,
        FRAME_WORDS,
        &opts.hidden_layers,
        split.class_names.len(),
    )?;
    log::info!("Model summary:\n{}", net.summary());

    let params = ParamsAdamW {
        lr: opts.lr,
        eps: 1e-7,
        weight_decay: 0.0,
        ..Default::default()
    };
    let mut opt = AdamW::new(var_map.all_vars(), params)?;

    let mut debug_log = opts
        .debug_dir
        .as_deref()
        .map(|dir| DebugLog::create(dir, opts))
        .transpose()?;

    /* ---------- 2. Training ------------ */

    let mut history = Vec::new();
    let mut stopper = EarlyStopping::new(opts.early_stop_pat);
    let mut best_weights: Option<HashMap<String, Tensor>> = None;

    for epoch in 1..=opts.epochs {
        let stream_opts = StreamOptions {
            batch_size: opts.batch_size,
            seed: opts.seed.wrapping_add(epoch as u64),
            ..Default::default()
        };
        let stream = ExampleStream::spawn(&split.train, &stream_opts)?;

        let pb = ProgressBar::new(stream.batches() as u64);
        pb.set_style(
            ProgressStyle::with_template("{prefix} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb.set_prefix(format!("Epoch {epoch}/{}", opts.epochs));

        let mut totals = Totals::default();
        for batch in stream {
            let batch = batch?;
            let n = batch.len();
            let (x, y) = batch.into_tensors(dev)?;

            let logits = net.forward_logits(&x)?;
            let loss = nn::loss::cross_entropy(&logits, &y)?;
            opt.backward_step(&loss)?;

            totals.add(loss.to_scalar::<f32>()?, count_correct(&logits, &y)?, n);
            pb.set_message(format!("loss: {:.4}", totals.loss()));
            pb.inc(1);
        }
        pb.finish_and_clear();

        // -------- epoch-level validation & checkpoint ----------
        let (val_loss, val_accuracy) = evaluate(&net, &split.validation, opts, dev)?;
        let nonfinite_params = if debug_log.is_some() {
            Some(count_nonfinite(&var_map)?)
        } else {
            None
        };
        let metrics = EpochMetrics {
            epoch,
            loss: totals.loss(),
            accuracy: totals.accuracy(),
            val_loss,
            val_accuracy,
            nonfinite_params,
        };
        log::info!(
            "epoch {}/{} - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
            epoch,
            opts.epochs,
            metrics.loss,
            metrics.accuracy,
            val_loss,
            val_accuracy
        );
        if let Some(dbg) = debug_log.as_mut() {
            dbg.record(&metrics)?;
        }
        on_epoch(&metrics, &var_map)?;
        history.push(metrics);

        let previous_best = stopper.best();
        match stopper.observe(epoch, val_accuracy) {
            EpochVerdict::Improved => {
                log::info!(
                    "val_accuracy improved from {:.5} to {:.5}, saving model to {}",
                    previous_best,
                    val_accuracy,
                    output_path.display()
                );
                best_weights = Some(snapshot(&var_map)?);
                save_weights(&var_map, output_path)?;
            }
            EpochVerdict::Plateau => {}
            EpochVerdict::Stop => {
                log::info!(
                    "Early stopping after epoch {epoch}; best epoch was {}",
                    stopper.best_epoch()
                );
                break;
            }
        }
    }
    let best_epoch = stopper.best_epoch();

    /* ---------- 3. Restore best weights & persist ---------- */

    if let Some(weights) = &best_weights {
        log::debug!("Restoring weights of epoch {best_epoch}");
        restore(&var_map, weights)?;
    }
    let (final_val_loss, final_val_accuracy) = evaluate(&net, &split.validation, opts, dev)?;
    log::info!("Validation loss: {final_val_loss:.4} - accuracy: {final_val_accuracy:.4}");

    save_weights(&var_map, output_path)?;
    log::info!("Model saved to {}", output_path.display());

    Ok(TrainReport {
        history,
        best_epoch,
        best_val_accuracy: stopper.best(),
        final_val_loss,
        final_val_accuracy,
    })
}

/// Mean loss and accuracy over `examples`.
pub fn evaluate(
    net: &DoaNet,
    examples: &[Example],
    opts: &TrainOptions,
    dev: &Device,
) -> Result<(f32, f32), TrainError> {
    let stream_opts = StreamOptions {
        batch_size: opts.batch_size,
        seed: opts.seed,
        ..Default::default()
    };
    let mut totals = Totals::default();
    for batch in ExampleStream::spawn(examples, &stream_opts)? {
        let batch = batch?;
        let n = batch.len();
        let (x, y) = batch.into_tensors(dev)?;
        let logits = net.forward_logits(&x)?.detach();
        let loss = nn::loss::cross_entropy(&logits, &y)?;
        totals.add(loss.to_scalar::<f32>()?, count_correct(&logits, &y)?, n);
    }
    Ok((totals.loss(), totals.accuracy()))
}

fn count_correct(logits: &Tensor, targets: &Tensor) -> candle_core::Result<usize> {
    let hits = logits
        .argmax(D::Minus1)?
        .eq(targets)?
        .to_dtype(DType::F32)?
        .sum_all()?
        .to_scalar::<f32>()?;
    Ok(hits as usize)
}

/// Sample-weighted running loss / accuracy.
#[derive(Default)]
struct Totals {
    loss_sum: f64,
    correct: usize,
    seen: usize,
}

impl Totals {
    fn add(&mut self, batch_loss: f32, correct: usize, n: usize) {
        self.loss_sum += f64::from(batch_loss) * n as f64;
        self.correct += correct;
        self.seen += n;
    }

    fn loss(&self) -> f32 {
        if self.seen == 0 {
            0.0
        } else {
            (self.loss_sum / self.seen as f64) as f32
        }
    }

    fn accuracy(&self) -> f32 {
        if self.seen == 0 {
            0.0
        } else {
            self.correct as f32 / self.seen as f32
        }
    }
}

fn snapshot(var_map: &VarMap) -> Result<HashMap<String, Tensor>, TrainError> {
    let guard = var_map
        .data()
        .lock()
        .map_err(|e| TrainError::Poison(format!("var_map.data(): {e}")))?;
    guard
        .iter()
        .map(|(k, v)| -> Result<(String, Tensor), TrainError> {
            Ok((k.clone(), v.as_tensor().copy()?))
        })
        .collect()
}

fn restore(var_map: &VarMap, weights: &HashMap<String, Tensor>) -> Result<(), TrainError> {
    let guard = var_map
        .data()
        .lock()
        .map_err(|e| TrainError::Poison(format!("var_map.data(): {e}")))?;
    for (k, t) in weights {
        if let Some(var) = guard.get(k) {
            var.set(t)?;
        }
    }
    Ok(())
}

fn count_nonfinite(var_map: &VarMap) -> Result<usize, TrainError> {
    let guard = var_map
        .data()
        .lock()
        .map_err(|e| TrainError::Poison(format!("var_map.data(): {e}")))?;
    let mut bad = 0;
    for var in guard.values() {
        bad += var
            .as_tensor()
            .flatten_all()?
            .to_vec1::<f32>()?
            .iter()
            .filter(|v| !v.is_finite())
            .count();
    }
    Ok(bad)
}

/// `--debug` output: options once, then one JSON line per epoch.
struct DebugLog {
    history: BufWriter<File>,
}

impl DebugLog {
    fn create(dir: &Path, opts: &TrainOptions) -> Result<Self, TrainError> {
        fs::create_dir_all(dir)?;
        let mut options = BufWriter::new(File::create(dir.join("options.json"))?);
        serde_json::to_writer_pretty(&mut options, opts)?;
        options.flush()?;

        let history = BufWriter::new(File::create(dir.join("history.jsonl"))?);
        log::info!("Writing training debug logs to {}", dir.display());
        Ok(Self { history })
    }

    fn record(&mut self, metrics: &EpochMetrics) -> Result<(), TrainError> {
        serde_json::to_writer(&mut self.history, metrics)?;
        self.history.write_all(b"\n")?;
        self.history.flush()?;
        Ok(())
    }
}
