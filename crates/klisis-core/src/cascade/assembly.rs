//! Stage-to-stage tensor assembly.
//!
//! Every concatenation walks the aspects in [`AspectKind::ALL`] order.

use candle_core::{Device, Tensor};

use crate::aspect::AspectKind;
use crate::error::{KlisisError, Result};

/// Stage-2 input: nine `[N, C_k]` probability tensors and the `[N, A]`
/// annotator block, concatenated to `[N, 55 + A]`.
pub fn dense_input(probs: &[Tensor], annotators: &Tensor) -> Result<Tensor> {
    check_probabilities(probs)?;
    let mut parts: Vec<&Tensor> = probs.iter().collect();
    parts.push(annotators);
    Ok(Tensor::cat(&parts, 1)?)
}

/// Stage-3 frames: nine stage-2 probability tensors, the annotator block and
/// the `[N, E]` word embeddings, concatenated to `[N, 55 + A + E]`.
pub fn frame_input(probs: &[Tensor], annotators: &Tensor, embeddings: &Tensor) -> Result<Tensor> {
    check_probabilities(probs)?;
    let mut parts: Vec<&Tensor> = probs.iter().collect();
    parts.push(annotators);
    parts.push(embeddings);
    Ok(Tensor::cat(&parts, 1)?)
}

/// Pads `[N, F]` frames with `padding` zero frames at each end and cuts one
/// window of `2 * padding + 1` frames per token, giving `[N, W, F]`.
///
/// Window `i`'s centre slot holds frame `i`.
pub fn windows(frames: &Tensor, padding: usize) -> Result<Tensor> {
    let (n, _) = frames.dims2()?;
    if n == 0 {
        return Err(KlisisError::Encoding("cannot window an empty document".into()));
    }
    let padded = frames.pad_with_zeros(0, padding, padding)?;
    let window_len = 2 * padding + 1;
    let windows = (0..n)
        .map(|i| padded.narrow(0, i, window_len))
        .collect::<candle_core::Result<Vec<_>>>()?;
    Ok(Tensor::stack(&windows, 0)?)
}

/// `[N, width]` tensor from row vectors.
pub fn rows_to_tensor(rows: Vec<f32>, n: usize, width: usize, device: &Device) -> Result<Tensor> {
    if rows.len() != n * width {
        return Err(KlisisError::Encoding(format!(
            "{} values do not form {n} rows of width {width}",
            rows.len()
        )));
    }
    Ok(Tensor::from_vec(rows, (n, width), device)?)
}

fn check_probabilities(probs: &[Tensor]) -> Result<()> {
    if probs.len() != AspectKind::COUNT {
        return Err(KlisisError::Encoding(format!(
            "expected {} aspect outputs, got {}",
            AspectKind::COUNT,
            probs.len()
        )));
    }
    for (kind, p) in AspectKind::ALL.iter().zip(probs) {
        let (_, classes) = p.dims2()?;
        if classes != kind.num_classes() {
            return Err(KlisisError::Encoding(format!(
                "{kind} output has {classes} classes, expected {}",
                kind.num_classes()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use proptest::prelude::*;

    fn uniform(n: usize) -> Vec<Tensor> {
        AspectKind::ALL
            .iter()
            .map(|k| Tensor::ones((n, k.num_classes()), DType::F32, &Device::Cpu).unwrap())
            .collect()
    }

    #[test]
    fn test_dense_width() {
        let annotators = Tensor::zeros((2, 37), DType::F32, &Device::Cpu).unwrap();
        let xs = dense_input(&uniform(2), &annotators).unwrap();
        assert_eq!(xs.dims(), &[2, AspectKind::total_classes() + 37]);
        assert_eq!(xs.dims(), &[2, 92]);
    }

    #[test]
    fn test_frame_width() {
        let annotators = Tensor::zeros((3, 37), DType::F32, &Device::Cpu).unwrap();
        let embeddings = Tensor::zeros((3, 100), DType::F32, &Device::Cpu).unwrap();
        let xs = frame_input(&uniform(3), &annotators, &embeddings).unwrap();
        assert_eq!(xs.dims(), &[3, 192]);
    }

    #[test]
    fn test_rejects_wrong_class_count() {
        let mut probs = uniform(1);
        probs[3] = Tensor::ones((1, 2), DType::F32, &Device::Cpu).unwrap();
        let annotators = Tensor::zeros((1, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            dense_input(&probs, &annotators),
            Err(KlisisError::Encoding(_))
        ));
    }

    #[test]
    fn test_window_edges_are_zero() {
        let frames = Tensor::ones((2, 3), DType::F32, &Device::Cpu).unwrap();
        let w = windows(&frames, 2).unwrap().to_vec3::<f32>().unwrap();
        assert_eq!(w.len(), 2);
        assert_eq!(w[0].len(), 5);
        assert_eq!(w[0][0], vec![0.0; 3]);
        assert_eq!(w[0][2], vec![1.0; 3]);
        assert_eq!(w[1][4], vec![0.0; 3]);
    }

    proptest! {
        #[test]
        fn prop_centre_slot_is_token_frame(n in 1usize..12, padding in 0usize..5, width in 1usize..4) {
            let data: Vec<f32> = (0..n * width).map(|v| v as f32 + 1.0).collect();
            let frames = Tensor::from_vec(data.clone(), (n, width), &Device::Cpu).unwrap();
            let w = windows(&frames, padding).unwrap();
            prop_assert_eq!(w.dims(), &[n, 2 * padding + 1, width]);

            let w = w.to_vec3::<f32>().unwrap();
            for (i, window) in w.iter().enumerate() {
                prop_assert_eq!(&window[padding], &data[i * width..(i + 1) * width].to_vec());
            }
        }
    }
}
