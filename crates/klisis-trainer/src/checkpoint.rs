//! Best-validation checkpointing.
//!
//! After every epoch the trainer asks a [`CheckpointPolicy`] whether to keep
//! the current weights. A `Save` answer is handed to a [`CheckpointSink`].

use std::path::{Path, PathBuf};

use klisis_core::TrainableModel;
use klisis_core::artifact::ArtifactName;
use serde::{Deserialize, Serialize};

/// What to do with the weights at the end of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointDecision {
    Save,
    Skip,
}

/// One saved checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// 1-based epoch.
    pub epoch: usize,
    pub train_accuracy: f32,
    pub val_accuracy: f32,
    pub file_name: String,
}

/// Post-epoch hook.
pub trait CheckpointPolicy {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        train_accuracy: f32,
        val_accuracy: f32,
    ) -> CheckpointDecision;
}

/// Saves whenever validation accuracy strictly beats every earlier epoch.
///
/// The baseline starts at 0, so an epoch with 0 validation accuracy is never
/// saved.
#[derive(Debug, Clone, Default)]
pub struct BestValidation {
    best: f32,
    best_epoch: Option<usize>,
}

impl BestValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn best(&self) -> Option<(usize, f32)> {
        self.best_epoch.map(|epoch| (epoch, self.best))
    }
}

impl CheckpointPolicy for BestValidation {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        _train_accuracy: f32,
        val_accuracy: f32,
    ) -> CheckpointDecision {
        if val_accuracy > self.best {
            self.best = val_accuracy;
            self.best_epoch = Some(epoch);
            CheckpointDecision::Save
        } else {
            CheckpointDecision::Skip
        }
    }
}

/// Destination for saved weights.
pub trait CheckpointSink {
    fn write(&mut self, model: &dyn TrainableModel, name: &ArtifactName) -> anyhow::Result<PathBuf>;
}

/// Writes each checkpoint as its own safetensors file in one directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Creates the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CheckpointSink for DirectorySink {
    fn write(
        &mut self,
        model: &dyn TrainableModel,
        name: &ArtifactName,
    ) -> anyhow::Result<PathBuf> {
        let path = self.dir.join(name.to_string());
        model.save(&path)?;
        tracing::info!(file = %path.display(), "checkpoint written");
        Ok(path)
    }
}
