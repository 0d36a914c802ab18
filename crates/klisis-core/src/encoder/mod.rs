pub mod char_tensor;
pub mod normalize;
pub mod vocab;

use serde::{Deserialize, Serialize};

pub use char_tensor::{CharTensor, TokenEncoder};
pub use normalize::{elision_normalize, isolate_punctuation, normalize, strip_punctuation, tokenize};
pub use vocab::{AnnotatorVocab, CharVocab};

/// Lookups that missed a reference table and were recovered with a fallback.
///
/// These never surface as errors; they are counted so a run can report them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupMisses {
    /// Characters encoded with the unknown-character class.
    pub unknown_chars: usize,
    /// Annotator names that fell back to the default annotator.
    pub unknown_annotators: usize,
    /// Word forms absent from the embedding table.
    pub oov_words: usize,
}

impl LookupMisses {
    /// Adds another run's counts to this one.
    pub fn merge(&mut self, other: &LookupMisses) {
        self.unknown_chars += other.unknown_chars;
        self.unknown_annotators += other.unknown_annotators;
        self.oov_words += other.oov_words;
    }

    pub fn total(&self) -> usize {
        self.unknown_chars + self.unknown_annotators + self.oov_words
    }
}
