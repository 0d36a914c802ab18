//! Training loop for one (aspect, stage) model.

use candle_core::{D, DType, Device};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use klisis_core::artifact::ArtifactName;
use klisis_core::{
    AnnotatorVocab, AspectKind, CascadeConfig, CharVocab, KlisisError, Stage, StageShapes,
    Topology, TrainableModel,
};
use serde::{Deserialize, Serialize};

use crate::checkpoint::{
    BestValidation, CheckpointDecision, CheckpointPolicy, CheckpointRecord, CheckpointSink,
    DirectorySink,
};
use crate::data::{SampleSet, StageSamples};

/// Hyperparameters shared by every training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Dropout on LSTM inputs during training.
    pub dropout: f32,
    pub sequence1: Topology,
    pub dense: Topology,
    pub sequence2: Topology,
    /// Seed for the per-epoch shuffle.
    pub seed: u64,
    /// Fraction held out for validation when no separate validation set is given.
    pub validation_split: f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            learning_rate: 1e-3,
            dropout: 0.3,
            sequence1: Topology::new(2, 128),
            dense: Topology::new(2, 20),
            sequence2: Topology::new(3, 128),
            seed: 42,
            validation_split: 0.1,
        }
    }
}

impl TrainConfig {
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn topology(&self, stage: Stage) -> Topology {
        match stage {
            Stage::Sequence1 => self.sequence1,
            Stage::Dense => self.dense,
            Stage::Sequence2 => self.sequence2,
        }
    }
}

/// Outcome of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub aspect: AspectKind,
    pub stage: Stage,
    pub epochs: usize,
    /// Every checkpoint written, in order.
    pub checkpoints: Vec<CheckpointRecord>,
}

impl TrainingSummary {
    /// The last checkpoint written, which is the best one.
    pub fn best(&self) -> Option<&CheckpointRecord> {
        self.checkpoints.last()
    }
}

/// Trains one model, checkpointing through a policy and a sink.
pub struct Trainer<'a> {
    config: &'a TrainConfig,
    corpus_tag: String,
    device: Device,
}

impl<'a> Trainer<'a> {
    pub fn new(config: &'a TrainConfig, corpus_tag: impl Into<String>, device: Device) -> Self {
        Self {
            config,
            corpus_tag: corpus_tag.into(),
            device,
        }
    }

    /// Builds a fresh model for (aspect, stage) and trains it.
    #[allow(clippy::too_many_arguments)]
    pub fn train(
        &self,
        aspect: AspectKind,
        stage: Stage,
        shapes: &StageShapes,
        train: &SampleSet,
        val: &SampleSet,
        policy: &mut dyn CheckpointPolicy,
        sink: &mut dyn CheckpointSink,
    ) -> anyhow::Result<TrainingSummary> {
        let topology = self.config.topology(stage);
        let model = klisis_core::nn::build(
            aspect,
            stage,
            topology,
            shapes,
            self.config.dropout,
            &self.device,
        )?;
        self.train_model(model.as_ref(), aspect, stage, topology, train, val, policy, sink)
    }

    /// Trains an already built model.
    ///
    /// # Errors
    ///
    /// Fails with `KlisisError::TrainingDataShape` when either sample set does
    /// not match the model's input shape or class count.
    #[allow(clippy::too_many_arguments)]
    pub fn train_model(
        &self,
        model: &dyn TrainableModel,
        aspect: AspectKind,
        stage: Stage,
        topology: Topology,
        train: &SampleSet,
        val: &SampleSet,
        policy: &mut dyn CheckpointPolicy,
        sink: &mut dyn CheckpointSink,
    ) -> anyhow::Result<TrainingSummary> {
        check_shape(model, aspect, stage, train)?;
        check_shape(model, aspect, stage, val)?;
        if train.is_empty() {
            anyhow::bail!("no training samples for {aspect}/{stage}");
        }

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(model.varmap().all_vars(), params)?;
        let mut rng = oorandom::Rand64::new(self.config.seed as u128);
        let batch_size = self.config.batch_size.max(1);

        tracing::info!(
            aspect = %aspect,
            stage = %stage,
            topology = %topology,
            train = train.len(),
            val = val.len(),
            "training started"
        );

        let mut checkpoints = Vec::new();
        for epoch in 1..=self.config.epochs {
            let order = shuffled(train.len(), &mut rng);
            let mut loss_sum = 0f32;
            let mut batches = 0usize;

            for chunk in order.chunks(batch_size) {
                let batch = train.select(chunk)?;
                let logits = model.logits(&batch.inputs, true)?;
                let loss = candle_nn::loss::cross_entropy(&logits, &batch.labels)?;
                optimizer.backward_step(&loss)?;
                loss_sum += loss.to_scalar::<f32>()?;
                batches += 1;
            }

            let train_acc = accuracy(model, train, batch_size)?;
            let val_acc = accuracy(model, val, batch_size)?;
            tracing::info!(
                aspect = %aspect,
                stage = %stage,
                epoch,
                loss = loss_sum / batches.max(1) as f32,
                train_acc,
                val_acc,
                "epoch complete"
            );

            if policy.on_epoch_end(epoch, train_acc, val_acc) == CheckpointDecision::Save {
                let name = ArtifactName {
                    aspect,
                    stage,
                    topology,
                    train_accuracy: train_acc,
                    val_accuracy: val_acc,
                    corpus: self.corpus_tag.clone(),
                };
                let path = sink.write(model, &name)?;
                checkpoints.push(CheckpointRecord {
                    epoch,
                    train_accuracy: train_acc,
                    val_accuracy: val_acc,
                    file_name: path
                        .file_name()
                        .map(|f| f.to_string_lossy().into_owned())
                        .unwrap_or_else(|| name.to_string()),
                });
            }
        }

        let summary = TrainingSummary {
            aspect,
            stage,
            epochs: self.config.epochs,
            checkpoints,
        };
        match summary.best() {
            Some(best) => tracing::info!(
                aspect = %aspect,
                stage = %stage,
                epoch = best.epoch,
                val_acc = best.val_accuracy,
                "best checkpoint"
            ),
            None => tracing::warn!(
                aspect = %aspect,
                stage = %stage,
                "validation accuracy never improved, nothing saved"
            ),
        }
        Ok(summary)
    }
}

/// Stage shapes implied by the vocabulary files named in `cascade`.
pub fn stage_shapes(cascade: &CascadeConfig) -> anyhow::Result<StageShapes> {
    let chars = CharVocab::from_json_file(&cascade.char_vocab)?;
    let annotators = AnnotatorVocab::from_json_files(&cascade.annotator_vocab, None)?;
    Ok(StageShapes {
        seq_len: cascade.seq_len,
        char_width: chars.width(),
        annotator_width: annotators.width(),
        embedding_dim: cascade.embedding_dim,
        window_len: cascade.window_len(),
    })
}

/// Trains `aspects` for one stage from prepared samples, writing checkpoints
/// into the configured model directory.
///
/// Without a separate validation set, the last `validation_split` of
/// `train` is held out.
pub fn train_stage(
    cascade: &CascadeConfig,
    config: &TrainConfig,
    aspects: &[AspectKind],
    train: &StageSamples,
    val: Option<&StageSamples>,
) -> anyhow::Result<Vec<TrainingSummary>> {
    let stage = train.stage;
    if let Some(val) = val {
        if val.stage != stage {
            anyhow::bail!("validation samples are for {}, training for {stage}", val.stage);
        }
    }

    let shapes = stage_shapes(cascade)?;
    let trainer = Trainer::new(config, cascade.corpus_tag.clone(), cascade.device());
    let mut sink = DirectorySink::new(&cascade.model_dir)?;

    let mut summaries = Vec::with_capacity(aspects.len());
    for &aspect in aspects {
        let samples = train.for_aspect(aspect)?;
        let (train_set, val_set) = match val {
            Some(val) => (samples, val.for_aspect(aspect)?),
            None => samples.split(config.validation_split)?,
        };
        let mut policy = BestValidation::new();
        summaries.push(trainer.train(
            aspect,
            stage,
            &shapes,
            &train_set,
            &val_set,
            &mut policy,
            &mut sink,
        )?);
    }
    Ok(summaries)
}

fn check_shape(
    model: &dyn TrainableModel,
    aspect: AspectKind,
    stage: Stage,
    samples: &SampleSet,
) -> klisis_core::Result<()> {
    if samples.sample_shape() != model.input_shape() {
        return Err(KlisisError::TrainingDataShape {
            aspect: aspect.title().to_string(),
            stage: stage.tag().to_string(),
            expected: model.input_shape().to_vec(),
            actual: samples.sample_shape().to_vec(),
        });
    }
    if let Some(&max) = samples.labels.to_vec1::<u32>()?.iter().max() {
        if max as usize >= model.num_classes() {
            return Err(KlisisError::TrainingDataShape {
                aspect: aspect.title().to_string(),
                stage: stage.tag().to_string(),
                expected: vec![model.num_classes()],
                actual: vec![max as usize + 1],
            });
        }
    }
    Ok(())
}

/// Fisher-Yates over `0..n`.
fn shuffled(n: usize, rng: &mut oorandom::Rand64) -> Vec<u32> {
    let mut order: Vec<u32> = (0..n as u32).collect();
    for i in (1..n).rev() {
        let j = rng.rand_range(0..(i as u64 + 1)) as usize;
        order.swap(i, j);
    }
    order
}

/// Share of samples whose argmax matches the label; 0 for an empty set.
fn accuracy(
    model: &dyn TrainableModel,
    samples: &SampleSet,
    batch_size: usize,
) -> candle_core::Result<f32> {
    let n = samples.len();
    if n == 0 {
        return Ok(0.0);
    }
    let mut correct = 0f32;
    let mut start = 0;
    while start < n {
        let len = batch_size.min(n - start);
        let batch = samples.slice(start, len)?;
        let predicted = model.logits(&batch.inputs, false)?.argmax(D::Minus1)?;
        correct += predicted
            .eq(&batch.labels)?
            .to_dtype(DType::F32)?
            .sum_all()?
            .to_scalar::<f32>()?;
        start += len;
    }
    Ok(correct / n as f32)
}
