use candle_core::{Device, Tensor};

use crate::artifact::ModelStore;
use crate::aspect::{AspectKind, AspectRegistry};
use crate::cascade::assembly::{dense_input, frame_input, rows_to_tensor, windows};
use crate::cascade::decode::decode_batch;
use crate::config::CascadeConfig;
use crate::embeddings::WordVectors;
use crate::encoder::{AnnotatorVocab, CharVocab, LookupMisses, TokenEncoder, normalize};
use crate::error::{KlisisError, Result};
use crate::nn::StageShapes;
use crate::types::{Stage, TagPrediction, TokenInput};

/// One aspect's output at one stage.
#[derive(Debug, Clone)]
pub struct AspectOutput {
    pub aspect: AspectKind,
    /// `[N, len(tags) + 1]`.
    pub probabilities: Tensor,
    pub predictions: Vec<TagPrediction>,
}

/// All nine aspects' outputs at one stage, in registry order.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub stage: Stage,
    pub aspects: Vec<AspectOutput>,
}

impl StageOutput {
    fn empty(stage: Stage) -> Self {
        Self {
            stage,
            aspects: Vec::new(),
        }
    }

    pub fn aspect(&self, kind: AspectKind) -> Option<&AspectOutput> {
        self.aspects.iter().find(|a| a.aspect == kind)
    }

    /// The nine predictions for token `i`, or `None` when out of range.
    pub fn token(&self, i: usize) -> Option<Vec<TagPrediction>> {
        self.aspects
            .iter()
            .map(|a| a.predictions.get(i).copied())
            .collect()
    }

    fn probabilities(&self) -> Vec<Tensor> {
        self.aspects.iter().map(|a| a.probabilities.clone()).collect()
    }
}

/// Everything one cascade invocation produced.
#[derive(Debug, Clone)]
pub struct CascadeOutput {
    pub tokens: usize,
    pub stages: Vec<StageOutput>,
    pub misses: LookupMisses,
}

impl CascadeOutput {
    pub fn stage(&self, stage: Stage) -> Option<&StageOutput> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Output of the last stage that ran.
    pub fn last(&self) -> Option<&StageOutput> {
        self.stages.last()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens == 0
    }
}

/// Encoded per-token inputs shared by every stage.
struct Prepared {
    normalized: Vec<String>,
    chars: Tensor,
    annotators: Tensor,
    misses: LookupMisses,
}

/// The three-stage cascade over an immutable [`AspectRegistry`].
///
/// A call to [`CascadePipeline::run`] treats its tokens as one document: the
/// stage-3 windows slide over exactly those tokens.
pub struct CascadePipeline {
    registry: AspectRegistry,
    encoder: TokenEncoder,
    vectors: WordVectors,
    window_padding: usize,
    device: Device,
}

impl CascadePipeline {
    /// # Errors
    ///
    /// Returns `KlisisError::Config` if the word vectors do not have the
    /// configured embedding width or the encoder's sequence length differs
    /// from the configured one.
    pub fn new(
        registry: AspectRegistry,
        encoder: TokenEncoder,
        vectors: WordVectors,
        config: &CascadeConfig,
        device: Device,
    ) -> Result<Self> {
        config.validate()?;
        if vectors.dim() != config.embedding_dim {
            return Err(KlisisError::Config(format!(
                "word vectors have width {}, configured embedding_dim is {}",
                vectors.dim(),
                config.embedding_dim
            )));
        }
        if encoder.seq_len() != config.seq_len {
            return Err(KlisisError::Config(format!(
                "encoder uses {} cells, configured seq_len is {}",
                encoder.seq_len(),
                config.seq_len
            )));
        }

        Ok(Self {
            registry,
            encoder,
            vectors,
            window_padding: config.window_padding,
            device,
        })
    }

    /// Reads vocabularies, word vectors and every model up to `through` from
    /// the locations in `config`.
    ///
    /// Word vectors are only read when stage-3 inputs can be built, i.e. when
    /// `through` is past stage 1.
    pub fn load(config: &CascadeConfig, through: Stage) -> Result<Self> {
        Self::load_stages(config, through.through(), through != Stage::Sequence1)
    }

    /// Reads what is needed to assemble inputs for `stage`: the models of
    /// every earlier stage, and word vectors when `stage` is stage 3.
    ///
    /// For stage 1 no model is read at all.
    pub fn load_inputs_for(config: &CascadeConfig, stage: Stage) -> Result<Self> {
        let earlier = &stage.through()[..stage.index()];
        Self::load_stages(config, earlier, stage == Stage::Sequence2)
    }

    fn load_stages(config: &CascadeConfig, stages: &[Stage], with_vectors: bool) -> Result<Self> {
        config.validate()?;
        let device = config.device();

        let chars = CharVocab::from_json_file(&config.char_vocab)?;
        let annotators =
            AnnotatorVocab::from_json_files(&config.annotator_vocab, config.short_names.as_ref())?
                .with_default(&config.default_annotator);
        let encoder = TokenEncoder::new(chars, annotators, config.seq_len)?;

        let vectors = if with_vectors {
            WordVectors::load_word2vec(&config.word_vectors)?
        } else {
            WordVectors::empty(config.embedding_dim)
        };

        let shapes = StageShapes {
            seq_len: config.seq_len,
            char_width: encoder.chars().width(),
            annotator_width: encoder.annotators().width(),
            embedding_dim: config.embedding_dim,
            window_len: config.window_len(),
        };
        let store = ModelStore::new(&config.model_dir, &config.corpus_tag, shapes, device.clone());
        let registry = store.load_stages(stages)?;
        tracing::info!(
            stages = ?stages,
            dir = %config.model_dir.display(),
            "cascade loaded"
        );

        Self::new(registry, encoder, vectors, config, device)
    }

    pub fn registry(&self) -> &AspectRegistry {
        &self.registry
    }

    pub fn encoder(&self) -> &TokenEncoder {
        &self.encoder
    }

    pub fn vectors(&self) -> &WordVectors {
        &self.vectors
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn shapes(&self) -> StageShapes {
        StageShapes {
            seq_len: self.encoder.seq_len(),
            char_width: self.encoder.chars().width(),
            annotator_width: self.encoder.annotators().width(),
            embedding_dim: self.vectors.dim(),
            window_len: 2 * self.window_padding + 1,
        }
    }

    /// Runs all three stages.
    pub fn run(&self, tokens: &[TokenInput]) -> Result<CascadeOutput> {
        self.run_through(tokens, Stage::Sequence2)
    }

    /// Runs stages up to and including `through`.
    ///
    /// Zero tokens give an empty output for each stage without invoking any
    /// model.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::ModelUnavailable` if a needed stage model is not
    /// loaded and `KlisisError::Encoding` if an assembled input does not match
    /// a model's expected shape.
    pub fn run_through(&self, tokens: &[TokenInput], through: Stage) -> Result<CascadeOutput> {
        for &stage in through.through() {
            self.registry.require_stage(stage)?;
        }

        if tokens.is_empty() {
            return Ok(CascadeOutput {
                tokens: 0,
                stages: through.through().iter().map(|&s| StageOutput::empty(s)).collect(),
                misses: LookupMisses::default(),
            });
        }

        let mut prepared = self.prepare(tokens)?;
        let mut input = prepared.chars.clone();
        let mut stages = Vec::with_capacity(3);

        for &stage in through.through() {
            let output = self.run_stage(stage, &input)?;
            if stage != through {
                input = self.next_input(&output, &mut prepared)?;
            }
            stages.push(output);
        }

        Ok(CascadeOutput {
            tokens: tokens.len(),
            stages,
            misses: prepared.misses,
        })
    }

    /// The assembled input tensor for `stage`, running the earlier stages.
    ///
    /// Used to build training samples for the later stages.
    pub fn stage_input(
        &self,
        tokens: &[TokenInput],
        stage: Stage,
    ) -> Result<(Tensor, LookupMisses)> {
        if tokens.is_empty() {
            return Err(KlisisError::Encoding("no tokens to encode".into()));
        }

        let mut prepared = self.prepare(tokens)?;
        let mut input = prepared.chars.clone();
        for &earlier in stage.through() {
            if earlier == stage {
                break;
            }
            self.registry.require_stage(earlier)?;
            let output = self.run_stage(earlier, &input)?;
            input = self.next_input(&output, &mut prepared)?;
        }
        Ok((input, prepared.misses))
    }

    fn prepare(&self, tokens: &[TokenInput]) -> Result<Prepared> {
        let annotator_vocab = self.encoder.annotators();
        let t = self.encoder.seq_len();
        let cell = self.encoder.cell_width();
        let a = annotator_vocab.width();

        let mut misses = LookupMisses::default();
        let mut normalized = Vec::with_capacity(tokens.len());
        let mut chars = Vec::with_capacity(tokens.len() * t * cell);
        let mut annotators = Vec::with_capacity(tokens.len() * a);

        for token in tokens {
            let (one_hot, missed) = annotator_vocab.one_hot(token.annotator.as_deref());
            if missed {
                misses.unknown_annotators += 1;
                tracing::debug!(
                    annotator = token.annotator.as_deref().unwrap_or_default(),
                    "unknown annotator, using default"
                );
            }

            let form = normalize(&token.form);
            let encoded = self.encoder.encode(&form, &one_hot)?;
            misses.unknown_chars += encoded.unknown_chars();

            chars.extend_from_slice(encoded.as_slice());
            annotators.extend_from_slice(&one_hot);
            normalized.push(form);
        }

        let n = tokens.len();
        Ok(Prepared {
            normalized,
            chars: Tensor::from_vec(chars, (n, t, cell), &self.device)?,
            annotators: rows_to_tensor(annotators, n, a, &self.device)?,
            misses,
        })
    }

    fn run_stage(&self, stage: Stage, xs: &Tensor) -> Result<StageOutput> {
        tracing::debug!(stage = %stage, shape = ?xs.dims(), "running stage");
        let mut aspects = Vec::with_capacity(AspectKind::COUNT);

        for aspect in self.registry.all() {
            let model = aspect.model(stage)?;
            if &xs.dims()[1..] != model.input_shape() {
                return Err(KlisisError::Encoding(format!(
                    "{}/{stage} expects input {:?}, assembled {:?}",
                    aspect.title(),
                    model.input_shape(),
                    &xs.dims()[1..]
                )));
            }

            let probabilities = model.predict(xs)?;
            let predictions = decode_batch(&probabilities, aspect.tags())?;
            aspects.push(AspectOutput {
                aspect: aspect.kind(),
                probabilities,
                predictions,
            });
        }

        Ok(StageOutput { stage, aspects })
    }

    fn next_input(&self, output: &StageOutput, prepared: &mut Prepared) -> Result<Tensor> {
        let probs = output.probabilities();
        match output.stage {
            Stage::Sequence1 => dense_input(&probs, &prepared.annotators),
            Stage::Dense => {
                let embeddings = self.embed(prepared)?;
                let frames = frame_input(&probs, &prepared.annotators, &embeddings)?;
                windows(&frames, self.window_padding)
            }
            Stage::Sequence2 => Err(KlisisError::Config("no stage follows lstm2".into())),
        }
    }

    fn embed(&self, prepared: &mut Prepared) -> Result<Tensor> {
        let dim = self.vectors.dim();
        let mut rows = Vec::with_capacity(prepared.normalized.len() * dim);
        for form in &prepared.normalized {
            if !self.vectors.extend_into(form, &mut rows) {
                prepared.misses.oov_words += 1;
            }
        }
        rows_to_tensor(rows, prepared.normalized.len(), dim, &self.device)
    }
}
