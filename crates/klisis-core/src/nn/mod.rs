//! # Cascade Networks
//!
//! The models behind each (aspect, stage) pair. The cascade only needs the
//! [`AspectModel`] contract; training additionally needs [`TrainableModel`].

pub mod dense;
pub mod sequence;

use std::path::Path;

use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

use crate::aspect::AspectKind;
use crate::error::Result;
use crate::types::Stage;

pub use dense::{DenseConfig, DenseTagger};
pub use sequence::{SequenceConfig, SequenceTagger};

/// A function from fixed-shape inputs to class probabilities.
pub trait AspectModel {
    /// Shape of one sample, without the batch dimension.
    fn input_shape(&self) -> &[usize];

    /// Width of the probability vector (`len(tags) + 1`).
    fn num_classes(&self) -> usize;

    /// Probabilities for a batch, shape `[batch, num_classes]`.
    fn predict(&self, xs: &Tensor) -> candle_core::Result<Tensor>;
}

/// A model whose weights live in a [`VarMap`] and can be optimised.
pub trait TrainableModel: AspectModel {
    /// Unnormalised scores, shape `[batch, num_classes]`.
    fn logits(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor>;

    fn varmap(&self) -> &VarMap;

    /// Writes the weights as safetensors.
    fn save(&self, path: &Path) -> Result<()> {
        self.varmap().save(path)?;
        Ok(())
    }
}

/// Depth and width of a network, as encoded in artefact names (`3x128`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topology {
    pub layers: usize,
    pub cells: usize,
}

impl Topology {
    pub fn new(layers: usize, cells: usize) -> Self {
        Self { layers, cells }
    }
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.layers, self.cells)
    }
}

/// Per-sample input shapes of the three stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageShapes {
    /// Character cells per token (`T`).
    pub seq_len: usize,
    /// Character classes per cell (`V`).
    pub char_width: usize,
    /// Annotator one-hot width (`A`).
    pub annotator_width: usize,
    /// Word-embedding width (`E`).
    pub embedding_dim: usize,
    /// Frames per stage-3 window (`W`).
    pub window_len: usize,
}

impl StageShapes {
    /// `V + A`.
    pub fn cell_width(&self) -> usize {
        self.char_width + self.annotator_width
    }

    /// Nine concatenated probability vectors plus the annotator.
    pub fn dense_width(&self) -> usize {
        AspectKind::total_classes() + self.annotator_width
    }

    /// Stage-2 width plus the word embedding.
    pub fn frame_width(&self) -> usize {
        self.dense_width() + self.embedding_dim
    }

    pub fn input_shape(&self, stage: Stage) -> Vec<usize> {
        match stage {
            Stage::Sequence1 => vec![self.seq_len, self.cell_width()],
            Stage::Dense => vec![self.dense_width()],
            Stage::Sequence2 => vec![self.window_len, self.frame_width()],
        }
    }

    fn sequence_config(
        &self,
        stage: Stage,
        kind: AspectKind,
        topology: Topology,
        dropout: f32,
    ) -> SequenceConfig {
        let shape = self.input_shape(stage);
        SequenceConfig {
            seq_len: shape[0],
            input_dim: shape[1],
            topology,
            num_classes: kind.num_classes(),
            dropout,
        }
    }

    fn dense_config(&self, kind: AspectKind, topology: Topology) -> DenseConfig {
        DenseConfig {
            input_dim: self.dense_width(),
            topology,
            num_classes: kind.num_classes(),
        }
    }
}

/// A freshly initialised model for one (aspect, stage).
pub fn build(
    kind: AspectKind,
    stage: Stage,
    topology: Topology,
    shapes: &StageShapes,
    dropout: f32,
    device: &Device,
) -> Result<Box<dyn TrainableModel>> {
    Ok(match stage {
        Stage::Dense => Box::new(DenseTagger::new(shapes.dense_config(kind, topology), device)?),
        _ => Box::new(SequenceTagger::new(
            shapes.sequence_config(stage, kind, topology, dropout),
            device,
        )?),
    })
}

/// Rebuilds a model from its topology and loads saved weights.
pub fn load(
    path: &Path,
    kind: AspectKind,
    stage: Stage,
    topology: Topology,
    shapes: &StageShapes,
    device: &Device,
) -> Result<Box<dyn AspectModel>> {
    Ok(match stage {
        Stage::Dense => Box::new(DenseTagger::load(
            path,
            shapes.dense_config(kind, topology),
            device,
        )?),
        _ => Box::new(SequenceTagger::load(
            path,
            shapes.sequence_config(stage, kind, topology, 0.0),
            device,
        )?),
    })
}
