use std::path::Path;

use candle_core::{D, DType, Device, Tensor};
use candle_nn::rnn::{Direction, LSTM, LSTMConfig, RNN};
use candle_nn::{Dropout, Linear, Module, VarBuilder, VarMap};

use crate::error::{KlisisError, Result};
use crate::nn::{AspectModel, Topology, TrainableModel};

/// Shape and size of a stacked bidirectional LSTM tagger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceConfig {
    /// Time steps per sample.
    pub seq_len: usize,
    /// Features per time step.
    pub input_dim: usize,
    pub topology: Topology,
    pub num_classes: usize,
    /// Dropout on every LSTM layer's input while training.
    pub dropout: f32,
}

/// Stacked bidirectional LSTM with a linear head.
///
/// Inner layers feed their full output sequence upward; the top layer's final
/// forward and backward states are concatenated for the head.
pub struct SequenceTagger {
    config: SequenceConfig,
    input_shape: [usize; 2],
    forward: Vec<LSTM>,
    backward: Vec<LSTM>,
    dropout: Dropout,
    head: Linear,
    varmap: VarMap,
}

impl SequenceTagger {
    /// Freshly initialised weights.
    pub fn new(config: SequenceConfig, device: &Device) -> Result<Self> {
        if config.topology.layers == 0 || config.topology.cells == 0 {
            return Err(KlisisError::Config(format!(
                "sequence topology {} must be non-empty",
                config.topology
            )));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let cells = config.topology.cells;

        let mut forward = Vec::with_capacity(config.topology.layers);
        let mut backward = Vec::with_capacity(config.topology.layers);
        for layer_idx in 0..config.topology.layers {
            let in_dim = if layer_idx == 0 {
                config.input_dim
            } else {
                2 * cells
            };
            forward.push(candle_nn::lstm(
                in_dim,
                cells,
                LSTMConfig {
                    layer_idx,
                    direction: Direction::Forward,
                    ..Default::default()
                },
                vb.pp("lstm"),
            )?);
            backward.push(candle_nn::lstm(
                in_dim,
                cells,
                LSTMConfig {
                    layer_idx,
                    direction: Direction::Backward,
                    ..Default::default()
                },
                vb.pp("lstm"),
            )?);
        }
        let head = candle_nn::linear(2 * cells, config.num_classes, vb.pp("head"))?;

        Ok(Self {
            config,
            input_shape: [config.seq_len, config.input_dim],
            forward,
            backward,
            dropout: Dropout::new(config.dropout),
            head,
            varmap,
        })
    }

    /// Builds the network and loads weights saved by [`TrainableModel::save`].
    pub fn load(path: &Path, config: SequenceConfig, device: &Device) -> Result<Self> {
        let mut tagger = Self::new(config, device)?;
        tagger.varmap.load(path)?;
        Ok(tagger)
    }

    pub fn config(&self) -> &SequenceConfig {
        &self.config
    }
}

/// Reverses a `[batch, time, features]` tensor along time.
fn reverse_time(xs: &Tensor) -> candle_core::Result<Tensor> {
    let len = xs.dim(1)?;
    let idx: Vec<u32> = (0..len as u32).rev().collect();
    let idx = Tensor::new(idx.as_slice(), xs.device())?;
    xs.index_select(&idx, 1)
}

fn final_hidden(lstm: &LSTM, input: &Tensor) -> candle_core::Result<Tensor> {
    let states = lstm.seq(input)?;
    states
        .last()
        .map(|s| s.h().clone())
        .ok_or_else(|| candle_core::Error::Msg("empty input sequence".into()))
}

impl AspectModel for SequenceTagger {
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

impl TrainableModel for SequenceTagger {
    fn logits(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let top = self.forward.len() - 1;
        let mut hidden = xs.clone();

        for (layer_idx, (fwd, bwd)) in self.forward.iter().zip(&self.backward).enumerate() {
            let input = self.dropout.forward(&hidden, train)?;
            let reversed = reverse_time(&input)?;

            hidden = if layer_idx == top {
                let h_fwd = final_hidden(fwd, &input)?;
                let h_bwd = final_hidden(bwd, &reversed)?;
                Tensor::cat(&[&h_fwd, &h_bwd], 1)?
            } else {
                let out_fwd = fwd.states_to_tensor(&fwd.seq(&input)?)?;
                let out_bwd = reverse_time(&bwd.states_to_tensor(&bwd.seq(&reversed)?)?)?;
                Tensor::cat(&[&out_fwd, &out_bwd], 2)?
            };
        }

        self.head.forward(&hidden)
    }

    fn varmap(&self) -> &VarMap {
        &self.varmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SequenceConfig {
        SequenceConfig {
            seq_len: 4,
            input_dim: 6,
            topology: Topology::new(2, 8),
            num_classes: 5,
            dropout: 0.3,
        }
    }

    #[test]
    fn test_predict_shape_and_normalisation() {
        let device = Device::Cpu;
        let tagger = SequenceTagger::new(config(), &device).unwrap();
        let xs = Tensor::randn(0f32, 1f32, (3, 4, 6), &device).unwrap();

        let probs = tagger.predict(&xs).unwrap();
        assert_eq!(probs.dims(), &[3, 5]);
        for row in probs.to_vec2::<f32>().unwrap() {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
        assert_eq!(tagger.input_shape(), &[4, 6]);
    }

    #[test]
    fn test_weight_names() {
        let tagger = SequenceTagger::new(config(), &Device::Cpu).unwrap();
        let data = tagger.varmap().data().lock().unwrap();
        assert!(data.contains_key("lstm.weight_ih_l0"));
        assert!(data.contains_key("lstm.weight_ih_l0_reverse"));
        assert!(data.contains_key("lstm.weight_ih_l1"));
        assert!(data.contains_key("head.weight"));
    }

    #[test]
    fn test_save_and_load() {
        let device = Device::Cpu;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagger.safetensors");

        let tagger = SequenceTagger::new(config(), &device).unwrap();
        tagger.save(&path).unwrap();
        let loaded = SequenceTagger::load(&path, config(), &device).unwrap();

        let xs = Tensor::randn(0f32, 1f32, (2, 4, 6), &device).unwrap();
        let a = tagger.predict(&xs).unwrap().to_vec2::<f32>().unwrap();
        let b = loaded.predict(&xs).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_empty_topology() {
        let mut cfg = config();
        cfg.topology = Topology::new(0, 8);
        assert!(SequenceTagger::new(cfg, &Device::Cpu).is_err());
    }
}
