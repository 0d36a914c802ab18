//! End-to-end cascade runs over stub models.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use candle_core::{Device, Tensor};
use klisis_core::encoder::normalize;
use klisis_core::{
    AnnotatorVocab, Aspect, AspectKind, AspectModel, AspectRegistry, CascadeConfig,
    CascadePipeline, CharVocab, Evaluation, KlisisError, MorphTag, Stage, StageShapes,
    TokenEncoder, TokenInput, WordVectors,
};

const EMBEDDING_DIM: usize = 4;

/// Always answers the same class with probability 1.
struct StubModel {
    shape: Vec<usize>,
    classes: usize,
    pick: usize,
    calls: Arc<AtomicUsize>,
}

impl AspectModel for StubModel {
    fn input_shape(&self) -> &[usize] {
        &self.shape
    }

    fn num_classes(&self) -> usize {
        self.classes
    }

    fn predict(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let n = xs.dim(0)?;
        let mut data = vec![0f32; n * self.classes];
        for row in 0..n {
            data[row * self.classes + self.pick] = 1.0;
        }
        Tensor::from_vec(data, (n, self.classes), xs.device())
    }
}

fn encoder() -> TokenEncoder {
    let chars = CharVocab::new(normalize("λόγος").chars().collect()).unwrap();
    let annotators =
        AnnotatorVocab::new(vec!["Vanessa Gorman".to_string(), "Other".to_string()]).unwrap();
    TokenEncoder::new(chars, annotators, 21).unwrap()
}

fn config() -> CascadeConfig {
    CascadeConfig::new().with_embedding_dim(EMBEDDING_DIM)
}

fn shapes() -> StageShapes {
    let encoder = encoder();
    StageShapes {
        seq_len: 21,
        char_width: encoder.chars().width(),
        annotator_width: encoder.annotators().width(),
        embedding_dim: EMBEDDING_DIM,
        window_len: config().window_len(),
    }
}

/// A registry whose every model answers `gold` for its aspect.
fn registry(gold: &MorphTag, stages: &[Stage], calls: &Arc<AtomicUsize>) -> AspectRegistry {
    let shapes = shapes();
    let aspects = AspectKind::ALL
        .iter()
        .map(|&kind| {
            stages.iter().fold(Aspect::new(kind), |aspect, &stage| {
                aspect.with_model(
                    stage,
                    Box::new(StubModel {
                        shape: shapes.input_shape(stage),
                        classes: kind.num_classes(),
                        pick: kind.label_index(gold.get(kind)),
                        calls: Arc::clone(calls),
                    }),
                )
            })
        })
        .collect();
    AspectRegistry::new(aspects).unwrap()
}

fn pipeline(registry: AspectRegistry, vectors: WordVectors) -> CascadePipeline {
    CascadePipeline::new(registry, encoder(), vectors, &config(), Device::Cpu).unwrap()
}

#[test]
fn test_single_token_round_trip() {
    let gold = MorphTag::parse("n-s---mn-").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(
        registry(&gold, &Stage::ALL, &calls),
        WordVectors::empty(EMBEDDING_DIM),
    );

    let output = pipeline.run(&[TokenInput::new("λόγος")]).unwrap();
    assert_eq!(output.stages.len(), 3);
    for stage in &output.stages {
        let pos = stage.aspect(AspectKind::Pos).unwrap();
        assert_eq!(pos.predictions[0].tag, 'n');
        assert_eq!(pos.predictions[0].confidence, 1.0);
    }
    // 9 aspects x 3 stages, one batch each
    assert_eq!(calls.load(Ordering::SeqCst), 27);

    let mut evaluation = Evaluation::new();
    evaluation.record(&output, &[gold]).unwrap();
    assert_eq!(evaluation.accuracy().correct(AspectKind::Pos), 1);
    assert_eq!(evaluation.accuracy().total(AspectKind::Pos), 1);
    assert_eq!(evaluation.accuracy().accuracy(AspectKind::Case), Some(1.0));
    assert_eq!(evaluation.pos_confusion().count('n', 'n'), 1);

    let report = evaluation.report();
    assert_eq!(report.pos_counts.rows.len(), 1);
    assert!(report.render().contains("100.00%"));
    let counts = report.render_counts();
    assert!(counts.contains("pos correct: 1/1"));
    assert!(!counts.lines().last().unwrap().contains('%'));
}

#[test]
fn test_unknown_class_matches_not_applicable() {
    let gold = MorphTag::parse("c________").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(
        registry(&gold, &Stage::ALL, &calls),
        WordVectors::empty(EMBEDDING_DIM),
    );

    let output = pipeline.run(&[TokenInput::new("καί")]).unwrap();
    let last = output.last().unwrap();
    assert!(last.aspect(AspectKind::Person).unwrap().predictions[0].is_unknown());

    let mut evaluation = Evaluation::new();
    evaluation.record(&output, &[gold]).unwrap();
    for kind in AspectKind::ALL {
        assert_eq!(evaluation.accuracy().correct(kind), 1, "{kind}");
    }
    assert_eq!(output.misses.unknown_chars, 3);
}

#[test]
fn test_zero_tokens_invoke_no_model() {
    let gold = MorphTag::parse("n-s---mn-").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(
        registry(&gold, &Stage::ALL, &calls),
        WordVectors::empty(EMBEDDING_DIM),
    );

    let output = pipeline.run(&[]).unwrap();
    assert!(output.is_empty());
    assert_eq!(output.stages.len(), 3);
    assert!(output.stages.iter().all(|s| s.aspects.is_empty()));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_oov_word_counts_and_zero_fills() {
    let gold = MorphTag::parse("n-s---mn-").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let vectors = WordVectors::from_entries(
        EMBEDDING_DIM,
        [(normalize("λόγος"), vec![1.0, 2.0, 3.0, 4.0])],
    )
    .unwrap();
    let pipeline = pipeline(registry(&gold, &Stage::ALL, &calls), vectors);

    let tokens = [TokenInput::new("λόγος"), TokenInput::new("ἔργον")];
    let output = pipeline.run(&tokens).unwrap();
    assert_eq!(output.misses.oov_words, 1);

    let (windows, misses) = pipeline.stage_input(&tokens, Stage::Sequence2).unwrap();
    assert_eq!(misses.oov_words, 1);
    let shapes = pipeline.shapes();
    assert_eq!(windows.dims(), &[2, shapes.window_len, shapes.frame_width()]);

    // centre frame of the second window holds the OOV token: trailing E zeros
    let frames = windows.to_vec3::<f32>().unwrap();
    let centre = &frames[1][shapes.window_len / 2];
    assert!(centre[centre.len() - EMBEDDING_DIM..].iter().all(|&v| v == 0.0));
    let known = &frames[0][shapes.window_len / 2];
    assert_eq!(&known[known.len() - EMBEDDING_DIM..], &[1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_stage_two_input_width() {
    let gold = MorphTag::parse("n-s---mn-").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(
        registry(&gold, &[Stage::Sequence1], &calls),
        WordVectors::empty(EMBEDDING_DIM),
    );

    let (dense, _) = pipeline
        .stage_input(&[TokenInput::new("λόγος")], Stage::Dense)
        .unwrap();
    let annotators = pipeline.encoder().annotators().width();
    let classes: usize = AspectKind::ALL.iter().map(|k| k.num_classes()).sum();
    assert_eq!(classes, 55);
    let expected = classes + annotators;
    assert_eq!(dense.dims(), &[1, expected]);
}

#[test]
fn test_mismatched_model_width_is_rejected() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut wrong = shapes();
    wrong.annotator_width += 1;

    // stage-1 stubs fit, stage-2 stubs expect one column too many
    let mut aspects = Vec::new();
    for kind in AspectKind::ALL {
        let stub = |stage: Stage, shapes: &StageShapes| -> Box<dyn AspectModel> {
            Box::new(StubModel {
                shape: shapes.input_shape(stage),
                classes: kind.num_classes(),
                pick: 0,
                calls: Arc::clone(&calls),
            })
        };
        aspects.push(
            Aspect::new(kind)
                .with_model(Stage::Sequence1, stub(Stage::Sequence1, &shapes()))
                .with_model(Stage::Dense, stub(Stage::Dense, &wrong))
                .with_model(Stage::Sequence2, stub(Stage::Sequence2, &shapes())),
        );
    }
    let registry = AspectRegistry::new(aspects).unwrap();
    let pipeline = pipeline(registry, WordVectors::empty(EMBEDDING_DIM));

    let err = pipeline.run(&[TokenInput::new("λόγος")]).unwrap_err();
    assert!(matches!(err, KlisisError::Encoding(_)), "{err}");
}

#[test]
fn test_missing_stage_is_unavailable() {
    let gold = MorphTag::parse("n-s---mn-").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(
        registry(&gold, &[Stage::Sequence1], &calls),
        WordVectors::empty(EMBEDDING_DIM),
    );

    let tokens = [TokenInput::new("λόγος")];
    assert!(matches!(
        pipeline.run(&tokens),
        Err(KlisisError::ModelUnavailable { .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let output = pipeline.run_through(&tokens, Stage::Sequence1).unwrap();
    assert_eq!(output.stages.len(), 1);
}

#[test]
fn test_unknown_annotator_falls_back() {
    let gold = MorphTag::parse("n-s---mn-").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline(
        registry(&gold, &[Stage::Sequence1], &calls),
        WordVectors::empty(EMBEDDING_DIM),
    );

    let tokens = [
        TokenInput::new("λόγος").with_annotator("Nobody"),
        TokenInput::new("λόγος").with_annotator("Other"),
    ];
    let (chars, misses) = pipeline.stage_input(&tokens, Stage::Sequence1).unwrap();
    assert_eq!(misses.unknown_annotators, 1);

    // last cell of each token carries the annotator one-hot
    let cells = chars.to_vec3::<f32>().unwrap();
    let last = cells[0].len() - 1;
    let a = pipeline.encoder().annotators().width();
    assert_eq!(&cells[0][last][cells[0][last].len() - a..], &[1.0, 0.0]);
    assert_eq!(&cells[1][last][cells[1][last].len() - a..], &[0.0, 1.0]);
}
