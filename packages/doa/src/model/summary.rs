use std::fmt;

use super::DoaNet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerSummary {
    pub name: String,
    pub inputs: usize,
    pub outputs: usize,
    pub activation: &'static str,
}

impl LayerSummary {
    /// Kernel plus bias parameters.
    pub fn params(&self) -> usize {
        self.inputs * self.outputs + self.outputs
    }
}

/// Layer table of a [`DoaNet`], printed by `train` and `summary`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSummary {
    pub layers: Vec<LayerSummary>,
}

impl ModelSummary {
    pub(super) fn of(net: &DoaNet) -> Self {
        let layers = net
            .layers()
            .map(|(name, lin)| {
                let (outputs, inputs) = lin.weight().dims2().unwrap_or((0, 0));
                let activation = if name == super::OUTPUT_LAYER {
                    "softmax"
                } else {
                    "relu"
                };
                LayerSummary {
                    name,
                    inputs,
                    outputs,
                    activation,
                }
            })
            .collect();
        Self { layers }
    }

    pub fn total_params(&self) -> usize {
        self.layers.iter().map(LayerSummary::params).sum()
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let input = self.layers.first().map(|l| l.inputs).unwrap_or(0);
        writeln!(f, "{:<12} {:<12} {:<10} {:>12}", "Layer", "Output", "Activation", "Params")?;
        writeln!(f, "{}", "=".repeat(49))?;
        writeln!(f, "{:<12} {:<12} {:<10} {:>12}", "input", input, "", 0)?;
        writeln!(f, "{:<12} {:<12} {:<10} {:>12}", "flatten", input, "", 0)?;
        for l in &self.layers {
            writeln!(
                f,
                "{:<12} {:<12} {:<10} {:>12}",
                l.name,
                l.outputs,
                l.activation,
                l.params()
            )?;
        }
        writeln!(f, "{}", "=".repeat(49))?;
        write!(f, "Total params: {}", self.total_params())
    }
}
