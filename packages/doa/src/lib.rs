//! DOA – public crate root
//! =======================
//! Direction-of-arrival estimation for an 8-microphone circular array
//! (raw S32LE audio front-end + Candle MLP back-end).
//!
//! * [`prepare`] cuts long array recordings into labeled windows.
//! * [`dataset`] + [`trainer`] fit the classifier and persist it as
//!   `<base>.safetensors` with a `<base>.json` class-name side-car.
//! * [`evaluate`] scores a persisted model on labeled files or draws its
//!   live predictions on a text protractor.
//! * [`visualize`] dumps dense kernels as 16-bit PGM bitmaps.
#![deny(unsafe_code)]

/* ────────────────────────  sub-modules  ─────────────────────────────── */
pub mod audio;
pub mod constants;
pub mod dataset;
pub mod evaluate;
pub mod model;
pub mod pgm;
pub mod prepare;
pub mod trainer;
pub mod visualize;

/* ───────────────────────── public façade ─────────────────────────────── */
pub use audio::{DecodeError, FrameSource, decode_frame, read_audio_file};
pub use constants::*;
pub use dataset::{DatasetError, DatasetSplit, Example, LabeledDataset};
pub use evaluate::{
    AccuracyReport, AnglePrinter, BatchEvalOptions, EvalError, run_batch, run_live,
};
pub use model::{ArtifactError, ClassNames, DoaModel, DoaNet, Prediction, select_device};
pub use prepare::{PrepareError, PrepareOptions, prepare_recordings};
pub use trainer::{EarlyStopping, TrainError, TrainOptions, TrainReport, train_dir};
pub use visualize::{VisualizeError, draw_layers};
