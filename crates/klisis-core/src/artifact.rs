//! # Model Artefacts
//!
//! Naming, discovery and loading of the 27 per-(aspect, stage) weight files.
//!
//! Files are named
//! `{aspect}-{stage}-{layers}x{cells}-{train_acc}val{val_acc}-{corpus}.safetensors`,
//! e.g. `pos-lstm1-3x128-0.912val0.897-greek.safetensors`. The topology in the
//! name rebuilds the network before its weights are loaded.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use candle_core::Device;
use safetensors::SafeTensors;

use crate::aspect::{Aspect, AspectKind, AspectRegistry};
use crate::error::{KlisisError, Result};
use crate::nn::{self, AspectModel, StageShapes, Topology};
use crate::types::Stage;

pub const ARTIFACT_EXTENSION: &str = "safetensors";

/// The parsed name of a model artefact.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactName {
    pub aspect: AspectKind,
    pub stage: Stage,
    pub topology: Topology,
    pub train_accuracy: f32,
    pub val_accuracy: f32,
    pub corpus: String,
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{:.3}val{:.3}-{}.{ARTIFACT_EXTENSION}",
            self.aspect,
            self.stage,
            self.topology,
            self.train_accuracy,
            self.val_accuracy,
            self.corpus
        )
    }
}

impl FromStr for ArtifactName {
    type Err = KlisisError;

    fn from_str(name: &str) -> Result<Self> {
        let bad = || KlisisError::Config(format!("not a model artefact name: {name:?}"));

        let stem = name
            .strip_suffix(ARTIFACT_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(bad)?;
        let mut parts = stem.splitn(5, '-');
        let (Some(aspect), Some(stage), Some(topology), Some(scores), Some(corpus)) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(bad());
        };

        let (layers, cells) = topology.split_once('x').ok_or_else(bad)?;
        let (train, val) = scores.split_once("val").ok_or_else(bad)?;
        if corpus.is_empty() {
            return Err(bad());
        }

        Ok(Self {
            aspect: AspectKind::from_title(aspect)?,
            stage: stage.parse()?,
            topology: Topology::new(
                layers.parse().map_err(|_| bad())?,
                cells.parse().map_err(|_| bad())?,
            ),
            train_accuracy: train.parse().map_err(|_| bad())?,
            val_accuracy: val.parse().map_err(|_| bad())?,
            corpus: corpus.to_string(),
        })
    }
}

/// Input width and class count recorded in a weight file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactShape {
    pub input_dim: usize,
    pub num_classes: usize,
    pub layers: usize,
}

/// Reads tensor shapes from a weight file without building a model.
pub fn inspect(path: &Path, stage: Stage) -> Result<ArtifactShape> {
    let bytes = std::fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes).map_err(|e| {
        KlisisError::Config(format!("{}: unreadable safetensors: {e}", path.display()))
    })?;
    let shape_of = |name: &str| -> Result<Vec<usize>> {
        tensors.tensor(name).map(|t| t.shape().to_vec()).map_err(|_| {
            KlisisError::Config(format!("{}: tensor {name} missing", path.display()))
        })
    };

    let first = if stage.is_sequence() {
        "lstm.weight_ih_l0"
    } else {
        "hidden0.weight"
    };
    let input = shape_of(first)?;
    let head = shape_of("head.weight")?;
    let layers = tensors
        .names()
        .into_iter()
        .filter(|n| {
            if stage.is_sequence() {
                n.starts_with("lstm.weight_ih_l") && !n.ends_with("_reverse")
            } else {
                n.starts_with("hidden") && n.ends_with(".weight")
            }
        })
        .count();

    match (input.as_slice(), head.as_slice()) {
        ([_, input_dim], [num_classes, _]) => Ok(ArtifactShape {
            input_dim: *input_dim,
            num_classes: *num_classes,
            layers,
        }),
        _ => Err(KlisisError::Config(format!(
            "{}: unexpected weight ranks {input:?} / {head:?}",
            path.display()
        ))),
    }
}

/// Finds and loads artefacts from one directory.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
    corpus_tag: String,
    shapes: StageShapes,
    device: Device,
}

impl ModelStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        corpus_tag: impl Into<String>,
        shapes: StageShapes,
        device: Device,
    ) -> Self {
        Self {
            dir: dir.into(),
            corpus_tag: corpus_tag.into(),
            shapes,
            device,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn shapes(&self) -> &StageShapes {
        &self.shapes
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Where an artefact with this name lives.
    pub fn path_for(&self, name: &ArtifactName) -> PathBuf {
        self.dir.join(name.to_string())
    }

    /// All well-named artefacts for this store's corpus, sorted by file name.
    pub fn list(&self) -> Result<Vec<(ArtifactName, PathBuf)>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match file_name.parse::<ArtifactName>() {
                Ok(name) if name.corpus == self.corpus_tag => found.push((name, path)),
                Ok(_) => {}
                Err(_) => tracing::debug!(file = file_name, "skipping non-artefact file"),
            }
        }
        found.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(found)
    }

    /// The artefact with the highest validation accuracy for (aspect, stage).
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::ModelUnavailable` when none exists.
    pub fn find(&self, aspect: AspectKind, stage: Stage) -> Result<(ArtifactName, PathBuf)> {
        let listing = self.list().map_err(|e| unavailable(aspect, stage, e.to_string()))?;
        listing
            .into_iter()
            .filter(|(name, _)| name.aspect == aspect && name.stage == stage)
            .max_by(|a, b| a.0.val_accuracy.total_cmp(&b.0.val_accuracy))
            .ok_or_else(|| {
                unavailable(
                    aspect,
                    stage,
                    format!(
                        "no artefact for corpus {:?} in {}",
                        self.corpus_tag,
                        self.dir.display()
                    ),
                )
            })
    }

    /// Loads one artefact, checking its recorded shapes first.
    ///
    /// # Errors
    ///
    /// Every failure surfaces as `KlisisError::ModelUnavailable` naming the
    /// aspect, stage and file.
    pub fn load_model(&self, name: &ArtifactName, path: &Path) -> Result<Box<dyn AspectModel>> {
        let (aspect, stage) = (name.aspect, name.stage);
        let fail =
            |reason: String| unavailable(aspect, stage, format!("{}: {reason}", path.display()));

        let recorded = inspect(path, stage).map_err(|e| fail(e.to_string()))?;
        let expected = self.shapes.input_shape(stage);
        let expected_dim = expected[expected.len() - 1];
        if recorded.input_dim != expected_dim {
            return Err(fail(format!(
                "input width {} does not match expected {expected_dim}",
                recorded.input_dim
            )));
        }
        if recorded.num_classes != aspect.num_classes() {
            return Err(fail(format!(
                "{} output classes, expected {}",
                recorded.num_classes,
                aspect.num_classes()
            )));
        }
        if recorded.layers != name.topology.layers {
            return Err(fail(format!(
                "{} layers stored, name says {}",
                recorded.layers, name.topology
            )));
        }

        let model = nn::load(path, aspect, stage, name.topology, &self.shapes, &self.device)
            .map_err(|e| fail(e.to_string()))?;
        tracing::info!(aspect = %aspect, stage = %stage, file = %path.display(), "model loaded");
        Ok(model)
    }

    /// Loads the named stages of one aspect.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::UnknownAspect` for an unknown title and
    /// `KlisisError::ModelUnavailable` for a missing or corrupt artefact.
    pub fn load_aspect(&self, title: &str, stages: &[Stage]) -> Result<Aspect> {
        let kind = AspectKind::from_title(title)?;
        let mut aspect = Aspect::new(kind);
        for &stage in stages {
            let (name, path) = self.find(kind, stage)?;
            aspect = aspect.with_model(stage, self.load_model(&name, &path)?);
        }
        Ok(aspect)
    }

    /// Loads all nine aspects with every stage up to and including `through`.
    pub fn load_registry(&self, through: Stage) -> Result<AspectRegistry> {
        self.load_stages(through.through())
    }

    /// Loads all nine aspects with exactly the given stages. An empty slice
    /// gives a registry of aspects without models.
    pub fn load_stages(&self, stages: &[Stage]) -> Result<AspectRegistry> {
        let aspects = AspectKind::ALL
            .iter()
            .map(|kind| self.load_aspect(kind.title(), stages))
            .collect::<Result<Vec<_>>>()?;
        AspectRegistry::new(aspects)
    }
}

fn unavailable(aspect: AspectKind, stage: Stage, reason: String) -> KlisisError {
    KlisisError::ModelUnavailable {
        aspect: aspect.title().to_string(),
        stage: stage.tag().to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::TrainableModel;

    fn shapes() -> StageShapes {
        StageShapes {
            seq_len: 3,
            char_width: 4,
            annotator_width: 2,
            embedding_dim: 3,
            window_len: 3,
        }
    }

    fn name(stage: Stage, val: f32) -> ArtifactName {
        ArtifactName {
            aspect: AspectKind::Number,
            stage,
            topology: Topology::new(1, 4),
            train_accuracy: 0.9,
            val_accuracy: val,
            corpus: "greek".into(),
        }
    }

    fn write(dir: &Path, name: &ArtifactName) {
        let model = nn::build(
            name.aspect,
            name.stage,
            name.topology,
            &shapes(),
            0.3,
            &Device::Cpu,
        )
        .unwrap();
        model.save(&dir.join(name.to_string())).unwrap();
    }

    #[test]
    fn test_name_round_trip() {
        let parsed: ArtifactName = "pos-lstm1-3x128-0.912val0.897-greek-lit.safetensors"
            .parse()
            .unwrap();
        assert_eq!(parsed.aspect, AspectKind::Pos);
        assert_eq!(parsed.stage, Stage::Sequence1);
        assert_eq!(parsed.topology, Topology::new(3, 128));
        assert_eq!(parsed.corpus, "greek-lit");
        assert_eq!(
            parsed.to_string(),
            "pos-lstm1-3x128-0.912val0.897-greek-lit.safetensors"
        );
    }

    #[test]
    fn test_name_rejects_garbage() {
        assert!("pos-lstm1.safetensors".parse::<ArtifactName>().is_err());
        assert!("pos-lstm9-3x128-0.9val0.9-g.safetensors".parse::<ArtifactName>().is_err());
        assert!(matches!(
            "voices-dnn-2x20-0.9val0.9-g.safetensors".parse::<ArtifactName>(),
            Err(KlisisError::UnknownAspect(_))
        ));
    }

    #[test]
    fn test_find_picks_best_validation() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &name(Stage::Dense, 0.7));
        write(dir.path(), &name(Stage::Dense, 0.8));
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let store = ModelStore::new(dir.path(), "greek", shapes(), Device::Cpu);
        let (best, _) = store.find(AspectKind::Number, Stage::Dense).unwrap();
        assert!((best.val_accuracy - 0.8).abs() < 1e-6);
        assert!(matches!(
            store.find(AspectKind::Number, Stage::Sequence2),
            Err(KlisisError::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn test_load_aspect_prefix() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &name(Stage::Sequence1, 0.5));
        let store = ModelStore::new(dir.path(), "greek", shapes(), Device::Cpu);

        let aspect = store.load_aspect("number", &[Stage::Sequence1]).unwrap();
        assert!(aspect.has_model(Stage::Sequence1));
        assert!(aspect.model(Stage::Dense).is_err());
        assert!(matches!(
            store.load_aspect("aorist", &[Stage::Sequence1]),
            Err(KlisisError::UnknownAspect(_))
        ));
    }

    #[test]
    fn test_load_rejects_wrong_width() {
        let dir = tempfile::tempdir().unwrap();
        let artefact = name(Stage::Dense, 0.5);
        write(dir.path(), &artefact);

        let mut wider = shapes();
        wider.annotator_width = 5;
        let store = ModelStore::new(dir.path(), "greek", wider, Device::Cpu);
        let err = store
            .load_model(&artefact, &store.path_for(&artefact))
            .err()
            .unwrap();
        assert!(matches!(err, KlisisError::ModelUnavailable { .. }));
    }

    #[test]
    fn test_corrupt_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let artefact = name(Stage::Sequence1, 0.5);
        std::fs::write(dir.path().join(artefact.to_string()), b"not weights").unwrap();
        let store = ModelStore::new(dir.path(), "greek", shapes(), Device::Cpu);
        assert!(matches!(
            store.load_aspect("number", &[Stage::Sequence1]),
            Err(KlisisError::ModelUnavailable { .. })
        ));
    }
}
