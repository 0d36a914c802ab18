use std::path::Path;

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder, VarMap};

use crate::error::{KlisisError, Result};
use crate::nn::{AspectModel, Topology, TrainableModel};

/// Shape and size of a dense reconciliation tagger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenseConfig {
    pub input_dim: usize,
    /// Hidden layers and units per layer.
    pub topology: Topology,
    pub num_classes: usize,
}

/// ReLU multilayer perceptron with a linear head.
pub struct DenseTagger {
    config: DenseConfig,
    input_shape: [usize; 1],
    hidden: Vec<Linear>,
    head: Linear,
    varmap: VarMap,
}

impl DenseTagger {
    /// Freshly initialised weights.
    pub fn new(config: DenseConfig, device: &Device) -> Result<Self> {
        if config.topology.layers == 0 || config.topology.cells == 0 {
            return Err(KlisisError::Config(format!(
                "dense topology {} must be non-empty",
                config.topology
            )));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let units = config.topology.cells;

        let hidden = (0..config.topology.layers)
            .map(|i| {
                let in_dim = if i == 0 { config.input_dim } else { units };
                candle_nn::linear(in_dim, units, vb.pp(format!("hidden{i}")))
            })
            .collect::<candle_core::Result<Vec<_>>>()?;
        let head = candle_nn::linear(units, config.num_classes, vb.pp("head"))?;

        Ok(Self {
            config,
            input_shape: [config.input_dim],
            hidden,
            head,
            varmap,
        })
    }

    /// Builds the network and loads weights saved by [`TrainableModel::save`].
    pub fn load(path: &Path, config: DenseConfig, device: &Device) -> Result<Self> {
        let mut tagger = Self::new(config, device)?;
        tagger.varmap.load(path)?;
        Ok(tagger)
    }

    pub fn config(&self) -> &DenseConfig {
        &self.config
    }
}

impl AspectModel for DenseTagger {
    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn predict(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        candle_nn::ops::softmax(&self.logits(xs, false)?, D::Minus1)
    }
}

impl TrainableModel for DenseTagger {
    fn logits(&self, xs: &Tensor, _train: bool) -> candle_core::Result<Tensor> {
        let mut hidden = xs.clone();
        for layer in &self.hidden {
            hidden = layer.forward(&hidden)?.relu()?;
        }
        self.head.forward(&hidden)
    }

    fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}
