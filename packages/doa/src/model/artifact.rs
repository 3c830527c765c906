//! Persisted model artifact: safetensors weights plus a side-car JSON file
//! mapping output indices to class names.
//!
//! The side-car always lives next to the weights with the same base name
//! (`model.safetensors` ↔ `model.json`); both are derived from the weights
//! path so they cannot drift apart.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use candle_core::{Device, Module, Tensor};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{CLASS_NAMES_EXTENSION, MODEL_EXTENSION};

use super::DoaNet;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("class names: {0}")]
    Json(#[from] serde_json::Error),
    #[error("model file {0} must have the .{MODEL_EXTENSION} extension")]
    Extension(PathBuf),
    #[error("model weight '{0}' missing in checkpoint")]
    MissingWeight(String),
    #[error("model layer shapes inconsistent: {0}")]
    Shape(String),
    #[error("model has {outputs} outputs but {names} class names")]
    ClassCount { outputs: usize, names: usize },
}

/// Reject weights paths that do not end in `.safetensors`.
pub fn ensure_model_extension(path: &Path) -> Result<(), ArtifactError> {
    match path.extension() {
        Some(ext) if ext == MODEL_EXTENSION => Ok(()),
        _ => Err(ArtifactError::Extension(path.to_path_buf())),
    }
}

/// Side-car path for a weights path: same base name, `.json` extension.
pub fn class_names_path(model_path: &Path) -> PathBuf {
    model_path.with_extension(CLASS_NAMES_EXTENSION)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// On-disk form of the side-car: `{"class_names": [...]}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassNames {
    pub class_names: Vec<String>,
}

impl ClassNames {
    pub fn new(class_names: Vec<String>) -> Self {
        Self { class_names }
    }

    /// Write the side-car belonging to `model_path`.
    /// Uses “`<file>.tmp` → rename” on the same filesystem.
    pub fn save_for_model(&self, model_path: &Path) -> Result<PathBuf, ArtifactError> {
        let path = class_names_path(model_path);
        let tmp = tmp_path(&path);
        {
            let mut bw = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut bw, self)?;
            bw.flush()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Load the side-car belonging to `model_path`.
    pub fn load_for_model(model_path: &Path) -> Result<Self, ArtifactError> {
        let f = File::open(class_names_path(model_path))?;
        Ok(serde_json::from_reader(BufReader::new(f))?)
    }
}

/// Atomically write every variable of `var_map` to `path`.
pub fn save_weights(var_map: &VarMap, path: &Path) -> Result<(), ArtifactError> {
    ensure_model_extension(path)?;
    let tmp = tmp_path(path);
    var_map.save(&tmp)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Highest-probability class of one window.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub class_name: String,
    pub probability: f32,
}

/// A loaded network together with its class names.
pub struct DoaModel {
    net: DoaNet,
    class_names: Vec<String>,
    device: Device,
}

impl DoaModel {
    /// Load `<base>.safetensors` and its `<base>.json` side-car.
    pub fn load(model_path: &Path, device: &Device) -> Result<Self, ArtifactError> {
        ensure_model_extension(model_path)?;
        let tensors = candle_core::safetensors::load(model_path, device)?;
        let net = DoaNet::from_tensors(&tensors)?;
        let ClassNames { class_names } = ClassNames::load_for_model(model_path)?;
        Self::new(net, class_names, device.clone())
    }

    pub fn new(
        net: DoaNet,
        class_names: Vec<String>,
        device: Device,
    ) -> Result<Self, ArtifactError> {
        if net.num_classes() != class_names.len() {
            return Err(ArtifactError::ClassCount {
                outputs: net.num_classes(),
                names: class_names.len(),
            });
        }
        Ok(Self {
            net,
            class_names,
            device,
        })
    }

    pub fn net(&self) -> &DoaNet {
        &self.net
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Class probabilities of one decoded window.
    pub fn probabilities(&self, audio: &[f32]) -> Result<Vec<f32>, ArtifactError> {
        let x = Tensor::from_slice(audio, (1, audio.len()), &self.device)?;
        Ok(self.net.forward(&x)?.squeeze(0)?.to_vec1::<f32>()?)
    }

    /// Run one decoded window through the network.
    pub fn predict(&self, audio: &[f32]) -> Result<Prediction, ArtifactError> {
        let probs = self.probabilities(audio)?;
        let (index, probability) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });
        Ok(Prediction {
            index,
            class_name: self.class_names.get(index).cloned().unwrap_or_default(),
            probability,
        })
    }
}
