//! # Cascade Configuration
//!
//! Shapes and locations shared by every stage. Loaded from JSON or built in
//! code with the `with_*` methods.

use std::path::{Path, PathBuf};

use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::error::{KlisisError, Result};

/// Where tensors live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Cpu,
    /// First CUDA device, falling back to CPU when none is available.
    Cuda,
}

/// Configuration for the cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Character cells per token (`T`).
    pub seq_len: usize,
    /// Zero frames added at each end of a document before windowing (`P`).
    pub window_padding: usize,
    /// Word-embedding width (`E`).
    pub embedding_dim: usize,
    /// Annotator assumed when a token names none.
    pub default_annotator: String,
    pub device: DevicePreference,
    /// Directory holding model artefacts.
    pub model_dir: PathBuf,
    /// Corpus suffix used in artefact names.
    pub corpus_tag: String,
    /// JSON array of known characters.
    pub char_vocab: PathBuf,
    /// JSON array of annotator names.
    pub annotator_vocab: PathBuf,
    /// JSON object mapping short annotator names to full names.
    pub short_names: Option<PathBuf>,
    /// word2vec text file.
    pub word_vectors: PathBuf,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            seq_len: 21,
            window_padding: 7,
            embedding_dim: 100,
            default_annotator: "Vanessa Gorman".to_string(),
            device: DevicePreference::Cpu,
            model_dir: PathBuf::from("models"),
            corpus_tag: "greek".to_string(),
            char_vocab: PathBuf::from("data/jsons/chars.json"),
            annotator_vocab: PathBuf::from("data/jsons/annotators.json"),
            short_names: Some(PathBuf::from("data/jsons/short_annotators.json")),
            word_vectors: PathBuf::from("models/word2vec.txt"),
        }
    }
}

impl CascadeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON config; absent fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seq_len(mut self, seq_len: usize) -> Self {
        self.seq_len = seq_len;
        self
    }

    pub fn with_window_padding(mut self, padding: usize) -> Self {
        self.window_padding = padding;
        self
    }

    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn with_default_annotator(mut self, name: impl Into<String>) -> Self {
        self.default_annotator = name.into();
        self
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }

    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    pub fn with_corpus_tag(mut self, tag: impl Into<String>) -> Self {
        self.corpus_tag = tag.into();
        self
    }

    /// Points every vocabulary path into `dir`, keeping the file names.
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let rebase = |p: &Path| dir.join(p.file_name().unwrap_or(p.as_os_str()));
        self.char_vocab = rebase(&self.char_vocab);
        self.annotator_vocab = rebase(&self.annotator_vocab);
        self.short_names = self.short_names.as_deref().map(rebase);
        self
    }

    pub fn with_word_vectors(mut self, path: impl Into<PathBuf>) -> Self {
        self.word_vectors = path.into();
        self
    }

    /// Stage-3 window length, `2P + 1`.
    pub fn window_len(&self) -> usize {
        2 * self.window_padding + 1
    }

    /// # Errors
    ///
    /// Returns `KlisisError::Config` for a zero sequence length or embedding
    /// width, or an empty corpus tag.
    pub fn validate(&self) -> Result<()> {
        if self.seq_len == 0 {
            return Err(KlisisError::Config("seq_len must be positive".into()));
        }
        if self.embedding_dim == 0 {
            return Err(KlisisError::Config("embedding_dim must be positive".into()));
        }
        if self.corpus_tag.is_empty() {
            return Err(KlisisError::Config("corpus_tag must not be empty".into()));
        }
        Ok(())
    }

    /// Resolves the device preference.
    pub fn device(&self) -> Device {
        match self.device {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Cuda => match Device::cuda_if_available(0) {
                Ok(device) if device.is_cuda() => device,
                Ok(_) => {
                    tracing::warn!("CUDA requested but not available, using CPU");
                    Device::Cpu
                }
                Err(e) => {
                    tracing::warn!(error = %e, "CUDA initialisation failed, using CPU");
                    Device::Cpu
                }
            },
        }
    }
}
