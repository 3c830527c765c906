//! The DOA classifier network.
//!
//! `flatten → 8 × (Dense + ReLU) → Dense + softmax`, mapping one flattened
//! 8 × 512 window onto one probability per class. Layers carry
//! Keras-style names (`dense`, `dense_1`, …, `output`) so weight files and
//! kernel dumps keep stable names.

mod artifact;
mod summary;

use std::collections::HashMap;

use candle_core::{D, Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};

use crate::constants::{FRAME_WORDS, HIDDEN_LAYERS};

pub use artifact::{
    ArtifactError, ClassNames, DoaModel, Prediction, class_names_path, ensure_model_extension,
    save_weights,
};
pub use summary::{LayerSummary, ModelSummary};

/// Name of the final soft-max layer.
pub const OUTPUT_LAYER: &str = "output";

/// Keras-style name of the `i`-th hidden dense layer.
pub fn dense_layer_name(i: usize) -> String {
    if i == 0 {
        "dense".to_owned()
    } else {
        format!("dense_{i}")
    }
}

pub struct DoaNet {
    hidden: Vec<Linear>,
    output: Linear,
}

impl DoaNet {
    /// Fresh network with the fixed DOA architecture.
    pub fn standard(vb: VarBuilder, num_classes: usize) -> candle_core::Result<Self> {
        Self::new(vb, FRAME_WORDS, &HIDDEN_LAYERS, num_classes)
    }

    /// Fresh network with an arbitrary hidden stack.
    pub fn new(
        vb: VarBuilder,
        input_dim: usize,
        hidden: &[usize],
        num_classes: usize,
    ) -> candle_core::Result<Self> {
        let mut layers = Vec::with_capacity(hidden.len());
        let mut width = input_dim;
        for (i, &out) in hidden.iter().enumerate() {
            layers.push(candle_nn::linear(width, out, vb.pp(dense_layer_name(i)))?);
            width = out;
        }
        let output = candle_nn::linear(width, num_classes, vb.pp(OUTPUT_LAYER))?;
        Ok(Self {
            hidden: layers,
            output,
        })
    }

    /// Rebuild a network from stored `<layer>.weight` / `<layer>.bias` tensors.
    pub fn from_tensors(tensors: &HashMap<String, Tensor>) -> Result<Self, ArtifactError> {
        let layer = |name: &str| -> Result<Linear, ArtifactError> {
            let get = |suffix: &str| {
                let key = format!("{name}.{suffix}");
                tensors
                    .get(&key)
                    .cloned()
                    .ok_or(ArtifactError::MissingWeight(key))
            };
            Ok(Linear::new(get("weight")?, Some(get("bias")?)))
        };

        let mut hidden = Vec::new();
        while tensors.contains_key(&format!("{}.weight", dense_layer_name(hidden.len()))) {
            hidden.push(layer(&dense_layer_name(hidden.len()))?);
        }
        let net = Self {
            hidden,
            output: layer(OUTPUT_LAYER)?,
        };
        net.check_shapes()?;
        Ok(net)
    }

    fn check_shapes(&self) -> Result<(), ArtifactError> {
        let mut width = None;
        for (name, lin) in self.layers() {
            let (out, inp) = lin.weight().dims2()?;
            if width.is_some_and(|w| w != inp) {
                return Err(ArtifactError::Shape(format!(
                    "{name} expects {inp} inputs, previous layer yields {}",
                    width.unwrap_or_default()
                )));
            }
            match lin.bias() {
                Some(b) if b.dims1()? == out => {}
                _ => {
                    return Err(ArtifactError::Shape(format!(
                        "{name} bias does not match {out} outputs"
                    )));
                }
            }
            width = Some(out);
        }
        Ok(())
    }

    /// All dense layers in evaluation order with their names.
    pub fn layers(&self) -> impl Iterator<Item = (String, &Linear)> {
        self.hidden
            .iter()
            .enumerate()
            .map(|(i, l)| (dense_layer_name(i), l))
            .chain(std::iter::once((OUTPUT_LAYER.to_owned(), &self.output)))
    }

    pub fn input_dim(&self) -> usize {
        self.hidden
            .first()
            .unwrap_or(&self.output)
            .weight()
            .dim(1)
            .unwrap_or(0)
    }

    pub fn num_classes(&self) -> usize {
        self.output.weight().dim(0).unwrap_or(0)
    }

    /// Pre-softmax class scores, `[batch, classes]`.
    pub fn forward_logits(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = xs.flatten_from(1)?;
        for layer in &self.hidden {
            xs = layer.forward(&xs)?.relu()?;
        }
        self.output.forward(&xs)
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary::of(self)
    }
}

impl Module for DoaNet {
    /// Class probabilities, `[batch, classes]`.
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        candle_nn::ops::softmax(&self.forward_logits(xs)?, D::Minus1)
    }
}

/// Whether an accelerator backend was compiled in and is usable.
pub fn gpu_available() -> bool {
    candle_core::utils::cuda_is_available() || candle_core::utils::metal_is_available()
}

/// Pick the compute device: CUDA or Metal when available, else the CPU.
pub fn select_device(force_cpu: bool) -> candle_core::Result<Device> {
    if force_cpu {
        Ok(Device::Cpu)
    } else if candle_core::utils::cuda_is_available() {
        Device::new_cuda(0)
    } else if candle_core::utils::metal_is_available() {
        Device::new_metal(0)
    } else {
        Ok(Device::Cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn tiny(num_classes: usize) -> (VarMap, DoaNet) {
        let vm = VarMap::new();
        let vb = VarBuilder::from_varmap(&vm, DType::F32, &Device::Cpu);
        let net = DoaNet::new(vb, 16, &[8, 4], num_classes).unwrap();
        (vm, net)
    }

    #[test]
    fn layer_names_follow_keras() {
        let (vm, net) = tiny(3);
        let names: Vec<_> = net.layers().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["dense", "dense_1", "output"]);

        let mut keys: Vec<_> = vm.data().lock().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "dense.bias",
                "dense.weight",
                "dense_1.bias",
                "dense_1.weight",
                "output.bias",
                "output.weight"
            ]
        );
    }

    #[test]
    fn forward_yields_probabilities() {
        let (_vm, net) = tiny(3);
        let xs = Tensor::ones((2, 16), DType::F32, &Device::Cpu).unwrap();
        let probs = net.forward(&xs).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(probs.len(), 2);
        for row in probs {
            assert_eq!(row.len(), 3);
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
        assert_eq!(net.input_dim(), 16);
        assert_eq!(net.num_classes(), 3);
    }

    #[test]
    fn rebuild_from_tensors_checks_chain() {
        let (vm, _net) = tiny(2);
        let mut tensors: HashMap<String, Tensor> = vm
            .data()
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.as_tensor().clone()))
            .collect();
        let net = DoaNet::from_tensors(&tensors).unwrap();
        assert_eq!(net.layers().count(), 3);

        tensors.insert(
            "dense_1.weight".into(),
            Tensor::zeros((4, 5), DType::F32, &Device::Cpu).unwrap(),
        );
        assert!(matches!(
            DoaNet::from_tensors(&tensors),
            Err(ArtifactError::Shape(_))
        ));

        tensors.remove("output.bias");
        assert!(matches!(
            DoaNet::from_tensors(&tensors),
            Err(ArtifactError::MissingWeight(_))
        ));
    }
}
