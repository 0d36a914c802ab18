use candle_core::Tensor;

use crate::error::Result;
use crate::types::{TagPrediction, UNKNOWN_MARKER};

/// Maps one probability vector to a tag.
///
/// The argmax picks `tags[i]`, or [`UNKNOWN_MARKER`] for the extra class.
/// Ties go to the lowest index. The confidence is the winning probability.
pub fn decode(probs: &[f32], tags: &[char]) -> TagPrediction {
    let mut best = 0;
    for (i, &p) in probs.iter().enumerate().skip(1) {
        if p > probs[best] {
            best = i;
        }
    }

    TagPrediction {
        tag: tags.get(best).copied().unwrap_or(UNKNOWN_MARKER),
        confidence: probs.get(best).copied().unwrap_or(0.0),
    }
}

/// Decodes every row of a `[N, classes]` probability tensor.
pub fn decode_batch(probs: &Tensor, tags: &[char]) -> Result<Vec<TagPrediction>> {
    Ok(probs
        .to_vec2::<f32>()?
        .iter()
        .map(|row| decode(row, tags))
        .collect())
}
