//! Training samples for one stage.
//!
//! A [`StageSamples`] holds the assembled input tensor for every scorable
//! token of a corpus together with one label vector per aspect. Stage-1
//! inputs come straight from the encoder; later stages run the already
//! trained earlier stages through [`CascadePipeline::stage_input`].

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use klisis_core::{AspectKind, CascadePipeline, Document, KlisisError, LookupMisses, Stage};

/// Inputs and class indices for one (aspect, stage).
#[derive(Debug, Clone)]
pub struct SampleSet {
    /// `[N, ...sample shape]`, f32.
    pub inputs: Tensor,
    /// `[N]`, u32 class indices.
    pub labels: Tensor,
}

impl SampleSet {
    /// # Errors
    ///
    /// Returns `KlisisError::TrainingDataShape` when the inputs have no batch
    /// dimension or the input and label counts differ.
    pub fn new(inputs: Tensor, labels: Tensor) -> klisis_core::Result<Self> {
        let n_labels = labels.dims().first().copied().unwrap_or(0);
        if inputs.rank() == 0 {
            return Err(KlisisError::TrainingDataShape {
                aspect: "-".to_string(),
                stage: "-".to_string(),
                expected: vec![n_labels],
                actual: Vec::new(),
            });
        }
        let n_inputs = inputs.dims()[0];
        if n_inputs != n_labels || labels.rank() != 1 {
            return Err(KlisisError::TrainingDataShape {
                aspect: "-".to_string(),
                stage: "-".to_string(),
                expected: vec![n_inputs],
                actual: labels.dims().to_vec(),
            });
        }
        Ok(Self {
            inputs,
            labels: labels.to_dtype(DType::U32)?,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-sample shape, without the batch dimension.
    pub fn sample_shape(&self) -> &[usize] {
        self.inputs.dims().get(1..).unwrap_or_default()
    }

    /// Splits off the last `fraction` of the samples for validation.
    ///
    /// At least one sample stays on each side when there are two or more.
    pub fn split(&self, fraction: f32) -> candle_core::Result<(SampleSet, SampleSet)> {
        let n = self.len();
        let mut val = ((n as f32) * fraction.clamp(0.0, 1.0)).round() as usize;
        if n >= 2 {
            val = val.clamp(1, n - 1);
        }
        let train = n - val;
        Ok((self.slice(0, train)?, self.slice(train, val)?))
    }

    /// Rows `start..start + len`.
    pub fn slice(&self, start: usize, len: usize) -> candle_core::Result<SampleSet> {
        Ok(SampleSet {
            inputs: self.inputs.narrow(0, start, len)?,
            labels: self.labels.narrow(0, start, len)?,
        })
    }

    /// Rows at `indices`, in that order.
    pub fn select(&self, indices: &[u32]) -> candle_core::Result<SampleSet> {
        let ids = Tensor::from_slice(indices, indices.len(), self.inputs.device())?;
        Ok(SampleSet {
            inputs: self.inputs.index_select(&ids, 0)?,
            labels: self.labels.index_select(&ids, 0)?,
        })
    }
}

/// Inputs for one stage shared by all nine aspects, plus each aspect's labels.
#[derive(Debug, Clone)]
pub struct StageSamples {
    pub stage: Stage,
    pub inputs: Tensor,
    /// One `[N]` u32 tensor per aspect, in [`AspectKind::ALL`] order.
    pub labels: Vec<Tensor>,
}

impl StageSamples {
    /// Assembles samples for `stage` from the scorable tokens of `documents`.
    ///
    /// Each document is windowed on its own. Documents without scorable
    /// tokens are skipped.
    pub fn build(
        pipeline: &CascadePipeline,
        documents: &[Document],
        stage: Stage,
    ) -> anyhow::Result<(Self, LookupMisses)> {
        let mut inputs = Vec::new();
        let mut labels: Vec<Vec<u32>> = vec![Vec::new(); AspectKind::COUNT];
        let mut misses = LookupMisses::default();

        for document in documents {
            let scorable = document.scorable_tokens();
            if scorable.is_empty() {
                tracing::warn!(document = %document.name, "no scorable tokens, skipped");
                continue;
            }
            let (tokens, gold): (Vec<_>, Vec<_>) = scorable.into_iter().unzip();

            let (input, missed) = pipeline
                .stage_input(&tokens, stage)
                .with_context(|| format!("assembling {stage} inputs for {}", document.name))?;
            misses.merge(&missed);
            inputs.push(input);

            for kind in AspectKind::ALL {
                labels[kind.index()]
                    .extend(gold.iter().map(|tag| kind.label_index(tag.get(kind)) as u32));
            }
            tracing::debug!(document = %document.name, tokens = tokens.len(), "samples added");
        }

        if inputs.is_empty() {
            anyhow::bail!("no scorable tokens in {} documents", documents.len());
        }

        let inputs = Tensor::cat(&inputs, 0)?;
        let device = inputs.device().clone();
        let labels = labels
            .into_iter()
            .map(|l| {
                let n = l.len();
                Tensor::from_vec(l, n, &device)
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        tracing::info!(stage = %stage, samples = inputs.dims()[0], "stage samples built");
        Ok((
            Self {
                stage,
                inputs,
                labels,
            },
            misses,
        ))
    }

    pub fn len(&self) -> usize {
        self.inputs.dims().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The samples for one aspect.
    pub fn for_aspect(&self, kind: AspectKind) -> klisis_core::Result<SampleSet> {
        SampleSet::new(self.inputs.clone(), self.labels[kind.index()].clone())
    }

    /// Writes `inputs` and `labels.{aspect}` tensors to a safetensors file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let mut tensors = HashMap::new();
        tensors.insert("inputs".to_string(), self.inputs.clone());
        for kind in AspectKind::ALL {
            tensors.insert(
                format!("labels.{}", kind.title()),
                self.labels[kind.index()].clone(),
            );
        }
        candle_core::safetensors::save(&tensors, path)
            .with_context(|| format!("writing samples to {}", path.display()))?;
        tracing::info!(file = %path.display(), samples = self.len(), "samples saved");
        Ok(())
    }

    /// Reads a file written by [`StageSamples::save`].
    pub fn load(path: &Path, stage: Stage, device: &Device) -> anyhow::Result<Self> {
        let mut tensors = candle_core::safetensors::load(path, device)
            .with_context(|| format!("reading samples from {}", path.display()))?;
        let inputs = tensors
            .remove("inputs")
            .with_context(|| format!("{} has no inputs tensor", path.display()))?;
        let Some(&n_inputs) = inputs.dims().first() else {
            return Err(KlisisError::TrainingDataShape {
                aspect: "-".to_string(),
                stage: stage.tag().to_string(),
                expected: vec![0],
                actual: Vec::new(),
            }
            .into());
        };

        let mut labels = Vec::with_capacity(AspectKind::COUNT);
        for kind in AspectKind::ALL {
            let key = format!("labels.{}", kind.title());
            let tensor = tensors
                .remove(&key)
                .with_context(|| format!("{} has no {key} tensor", path.display()))?;
            if tensor.dims() != [n_inputs] {
                return Err(KlisisError::TrainingDataShape {
                    aspect: kind.title().to_string(),
                    stage: stage.tag().to_string(),
                    expected: vec![n_inputs],
                    actual: tensor.dims().to_vec(),
                }
                .into());
            }
            labels.push(tensor);
        }

        Ok(Self {
            stage,
            inputs,
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(n: usize) -> SampleSet {
        let inputs = Tensor::arange(0f32, (n * 2) as f32, &Device::Cpu)
            .unwrap()
            .reshape((n, 2))
            .unwrap();
        let labels = Tensor::arange(0u32, n as u32, &Device::Cpu).unwrap();
        SampleSet::new(inputs, labels).unwrap()
    }

    #[test]
    fn test_split_takes_last_fraction() {
        let (train, val) = samples(10).split(0.2).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        assert_eq!(val.labels.to_vec1::<u32>().unwrap(), vec![8, 9]);
    }

    #[test]
    fn test_split_keeps_one_on_each_side() {
        let (train, val) = samples(3).split(0.01).unwrap();
        assert_eq!((train.len(), val.len()), (2, 1));
        let (train, val) = samples(3).split(1.0).unwrap();
        assert_eq!((train.len(), val.len()), (1, 2));
    }

    #[test]
    fn test_count_mismatch_is_rejected() {
        let inputs = Tensor::zeros((3, 2), DType::F32, &Device::Cpu).unwrap();
        let labels = Tensor::zeros(2, DType::U32, &Device::Cpu).unwrap();
        assert!(matches!(
            SampleSet::new(inputs, labels),
            Err(KlisisError::TrainingDataShape { .. })
        ));
    }

    #[test]
    fn test_scalar_inputs_are_rejected() {
        let inputs = Tensor::new(1f32, &Device::Cpu).unwrap();
        let labels = Tensor::zeros(1, DType::U32, &Device::Cpu).unwrap();
        assert!(matches!(
            SampleSet::new(inputs, labels),
            Err(KlisisError::TrainingDataShape { .. })
        ));
    }

    #[test]
    fn test_load_rejects_scalar_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dnn.safetensors");
        let mut tensors = HashMap::new();
        tensors.insert("inputs".to_string(), Tensor::new(1f32, &Device::Cpu).unwrap());
        for kind in AspectKind::ALL {
            tensors.insert(
                format!("labels.{}", kind.title()),
                Tensor::zeros(1, DType::U32, &Device::Cpu).unwrap(),
            );
        }
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let err = StageSamples::load(&path, Stage::Dense, &Device::Cpu).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KlisisError>(),
            Some(KlisisError::TrainingDataShape { .. })
        ));
    }

    #[test]
    fn test_select_reorders() {
        let picked = samples(4).select(&[3, 0]).unwrap();
        assert_eq!(picked.labels.to_vec1::<u32>().unwrap(), vec![3, 0]);
        assert_eq!(
            picked.inputs.to_vec2::<f32>().unwrap(),
            vec![vec![6.0, 7.0], vec![0.0, 1.0]]
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lstm1.safetensors");
        let n = 3;
        let samples = StageSamples {
            stage: Stage::Dense,
            inputs: Tensor::ones((n, 5), DType::F32, &Device::Cpu).unwrap(),
            labels: AspectKind::ALL
                .iter()
                .map(|k| Tensor::from_vec(vec![k.index() as u32; n], n, &Device::Cpu).unwrap())
                .collect(),
        };
        samples.save(&path).unwrap();

        let loaded = StageSamples::load(&path, Stage::Dense, &Device::Cpu).unwrap();
        assert_eq!(loaded.len(), 3);
        let case = loaded.for_aspect(AspectKind::Case).unwrap();
        assert_eq!(case.sample_shape(), &[5]);
        assert_eq!(case.labels.to_vec1::<u32>().unwrap(), vec![7, 7, 7]);
    }
}
