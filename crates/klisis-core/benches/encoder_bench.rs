use criterion::{Criterion, black_box, criterion_group, criterion_main};
use klisis_core::encoder::{AnnotatorVocab, CharVocab, TokenEncoder, normalize};

fn bench_encode(c: &mut Criterion) {
    let chars: Vec<char> = "αβγδεζηθικλμνξοπρςστυφχψωάέήίόύώἀἁἐἑἰἱὀὁὐὑἠἡὠὡ’"
        .chars()
        .collect();
    let chars = CharVocab::new(chars).unwrap();
    let annotators = AnnotatorVocab::new(
        (0..37).map(|i| format!("annotator {i}")).collect(),
    )
    .unwrap();
    let encoder = TokenEncoder::new(chars, annotators, 21).unwrap();
    let (annotator, _) = encoder.annotators().one_hot(None);

    let inputs = vec![
        "λόγος",
        "καὶ",
        "ἐπιστήμης",
        "προσαγορευομένοις",
        "ἀντιπαρεξελθόντες",
        "δ'",
    ];

    c.bench_function("encode_single", |b| {
        b.iter(|| encoder.encode(black_box("λόγος"), &annotator).unwrap());
    });

    c.bench_function("normalize_and_encode_batch_6", |b| {
        b.iter(|| {
            for input in &inputs {
                let form = normalize(black_box(input));
                let _ = encoder.encode(&form, &annotator).unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_encode);
criterion_main!(benches);
