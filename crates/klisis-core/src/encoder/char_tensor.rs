use crate::encoder::vocab::{AnnotatorVocab, CharVocab};
use crate::error::{KlisisError, Result};

/// A token encoded as `rows` character cells of `width` values each.
#[derive(Debug, Clone, PartialEq)]
pub struct CharTensor {
    data: Vec<f32>,
    rows: usize,
    width: usize,
    unknown_chars: usize,
}

impl CharTensor {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// One character cell.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.width..(i + 1) * self.width]
    }

    /// Characters that fell back to the unknown class.
    pub fn unknown_chars(&self) -> usize {
        self.unknown_chars
    }

    /// Number of rows that are not padding.
    pub fn filled_rows(&self) -> usize {
        (0..self.rows)
            .filter(|&i| self.row(i).iter().any(|&v| v != 0.0))
            .count()
    }

    /// Row-major values, `rows * width` long.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Turns normalised token strings into fixed-shape character tensors.
#[derive(Debug, Clone)]
pub struct TokenEncoder {
    chars: CharVocab,
    annotators: AnnotatorVocab,
    seq_len: usize,
}

impl TokenEncoder {
    /// # Errors
    ///
    /// Returns `KlisisError::Config` when `seq_len` is zero.
    pub fn new(chars: CharVocab, annotators: AnnotatorVocab, seq_len: usize) -> Result<Self> {
        if seq_len == 0 {
            return Err(KlisisError::Config("sequence length must be positive".into()));
        }
        Ok(Self {
            chars,
            annotators,
            seq_len,
        })
    }

    pub fn chars(&self) -> &CharVocab {
        &self.chars
    }

    pub fn annotators(&self) -> &AnnotatorVocab {
        &self.annotators
    }

    /// Cells per token (`T`).
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Width of one cell (`V + A`).
    pub fn cell_width(&self) -> usize {
        self.chars.width() + self.annotators.width()
    }

    /// Row index of the truncation marker in an over-long token.
    pub fn truncation_row(&self) -> usize {
        (self.seq_len - 1) / 2
    }

    /// Encodes one normalised token.
    ///
    /// Short tokens are right-aligned behind zero rows. Tokens longer than
    /// `T` keep their first `(T-1)/2` characters and last `T-1-(T-1)/2`
    /// characters around a single truncation-marker row.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::Encoding` if `annotator` does not have the
    /// annotator vocabulary's width.
    pub fn encode(&self, normalized: &str, annotator: &[f32]) -> Result<CharTensor> {
        if annotator.len() != self.annotators.width() {
            return Err(KlisisError::Encoding(format!(
                "annotator vector has length {}, expected {}",
                annotator.len(),
                self.annotators.width()
            )));
        }

        let t = self.seq_len;
        let width = self.cell_width();
        let v = self.chars.width();
        let mut data = vec![0.0f32; t * width];
        let mut unknown_chars = 0;

        let mut write_cell = |row: usize, class: usize| {
            let cell = &mut data[row * width..(row + 1) * width];
            cell[class] = 1.0;
            cell[v..].copy_from_slice(annotator);
        };

        let chars: Vec<char> = normalized.chars().collect();
        let mut class_of = |c: char| {
            self.chars.index_of(c).unwrap_or_else(|| {
                unknown_chars += 1;
                self.chars.unknown_index()
            })
        };

        if chars.len() <= t {
            let offset = t - chars.len();
            for (i, &c) in chars.iter().enumerate() {
                write_cell(offset + i, class_of(c));
            }
        } else {
            let head = self.truncation_row();
            let tail = t - 1 - head;
            for (i, &c) in chars[..head].iter().enumerate() {
                write_cell(i, class_of(c));
            }
            write_cell(head, self.chars.truncation_index());
            for (i, &c) in chars[chars.len() - tail..].iter().enumerate() {
                write_cell(head + 1 + i, class_of(c));
            }
        }

        Ok(CharTensor {
            data,
            rows: t,
            width,
            unknown_chars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALPHABET: &[char] = &['λ', 'ό', 'γ', 'ο', 'ς', 'α', 'ι'];

    fn encoder(seq_len: usize) -> TokenEncoder {
        let chars = CharVocab::new(ALPHABET.to_vec()).unwrap();
        let annotators = AnnotatorVocab::new(vec!["A".into(), "B".into(), "C".into()]).unwrap();
        TokenEncoder::new(chars, annotators, seq_len).unwrap()
    }

    #[test]
    fn test_short_token_is_right_aligned() {
        let enc = encoder(21);
        let tensor = enc.encode("λόγος", &[0.0, 1.0, 0.0]).unwrap();
        assert_eq!(tensor.rows(), 21);
        assert_eq!(tensor.width(), 9 + 3);
        for i in 0..16 {
            assert!(tensor.row(i).iter().all(|&v| v == 0.0));
        }
        // λ is class 0 at row 16, ς is class 4 at row 20
        assert_eq!(tensor.row(16)[0], 1.0);
        assert_eq!(tensor.row(20)[4], 1.0);
        assert_eq!(&tensor.row(16)[9..], &[0.0, 1.0, 0.0]);
        assert_eq!(tensor.unknown_chars(), 0);
    }

    #[test]
    fn test_unknown_character() {
        let enc = encoder(5);
        let tensor = enc.encode("λω", &[1.0, 0.0, 0.0]).unwrap();
        assert_eq!(tensor.row(4)[enc.chars().unknown_index()], 1.0);
        assert_eq!(tensor.unknown_chars(), 1);
    }

    #[test]
    fn test_long_token_is_truncated() {
        let enc = encoder(5);
        let tensor = enc.encode("λογοςαι", &[1.0, 0.0, 0.0]).unwrap();
        assert_eq!(tensor.rows(), 5);
        assert_eq!(tensor.filled_rows(), 5);
        // first two characters, marker, last two characters
        assert_eq!(tensor.row(0)[0], 1.0);
        assert_eq!(tensor.row(1)[3], 1.0);
        assert_eq!(tensor.row(2)[enc.chars().truncation_index()], 1.0);
        assert_eq!(tensor.row(3)[5], 1.0);
        assert_eq!(tensor.row(4)[6], 1.0);
    }

    #[test]
    fn test_even_length_truncation_keeps_longer_tail() {
        let enc = encoder(6);
        let tensor = enc.encode("λογοςαι", &[1.0, 0.0, 0.0]).unwrap();
        // head = 2, tail = 3
        assert_eq!(enc.truncation_row(), 2);
        assert_eq!(tensor.row(2)[enc.chars().truncation_index()], 1.0);
        assert_eq!(tensor.row(3)[4], 1.0);
    }

    #[test]
    fn test_empty_token_is_all_padding() {
        let enc = encoder(21);
        let tensor = enc.encode("", &[0.0, 0.0, 1.0]).unwrap();
        assert_eq!(tensor.rows(), 21);
        assert_eq!(tensor.filled_rows(), 0);
        assert!(tensor.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_annotator_width_mismatch() {
        let enc = encoder(21);
        let err = enc.encode("λόγος", &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, KlisisError::Encoding(_)));
    }

    fn token_strategy(max: usize) -> impl Strategy<Value = String> {
        let pool: Vec<char> = ALPHABET.iter().copied().chain(['ω', 'ῇ']).collect();
        prop::collection::vec(prop::sample::select(pool), 0..=max)
            .prop_map(|chars| chars.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_short_tokens_fill_exactly_their_length(token in token_strategy(21)) {
            let enc = encoder(21);
            let tensor = enc.encode(&token, &[0.0, 1.0, 0.0]).unwrap();
            prop_assert_eq!(tensor.rows(), 21);
            prop_assert_eq!(tensor.as_slice().len(), 21 * enc.cell_width());
            prop_assert_eq!(tensor.filled_rows(), token.chars().count());
        }

        #[test]
        fn prop_long_tokens_have_one_marker_at_midpoint(
            token in token_strategy(60).prop_filter("longer than T", |t| t.chars().count() > 21)
        ) {
            let enc = encoder(21);
            let tensor = enc.encode(&token, &[0.0, 1.0, 0.0]).unwrap();
            let marker = enc.chars().truncation_index();
            let marker_rows: Vec<usize> = (0..tensor.rows())
                .filter(|&i| tensor.row(i)[marker] == 1.0)
                .collect();
            prop_assert_eq!(tensor.rows(), 21);
            prop_assert_eq!(tensor.filled_rows(), 21);
            prop_assert_eq!(marker_rows, vec![10]);
        }
    }
}
