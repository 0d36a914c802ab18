use serde::{Deserialize, Serialize};

/// Predicted tag character when the model picks the extra, out-of-tagset class.
pub const UNKNOWN_MARKER: char = '-';

/// A decoded prediction for one token and one aspect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagPrediction {
    /// Tag character, or [`UNKNOWN_MARKER`].
    pub tag: char,
    /// Probability of the chosen class.
    pub confidence: f32,
}

impl TagPrediction {
    /// Whether the model abstained by choosing the extra class.
    pub fn is_unknown(&self) -> bool {
        self.tag == UNKNOWN_MARKER
    }
}
