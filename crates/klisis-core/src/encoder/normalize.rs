//! # Greek Text Normalisation
//!
//! Maps the many look-alike apostrophes onto U+2019 and folds grave accents
//! onto acute so that a word is spelled the same wherever it stands in a
//! sentence.

use unicode_normalization::UnicodeNormalization;

/// Punctuation marks that the treebanks tokenise separately.
pub const GREEK_PUNCTUATION: &[char] = &[',', '·', ';', '.', '?', '»', '«', '“', '„'];

/// Characters used for elision that should all read as U+2019.
const ELISION_MARKS: &[char] = &['\u{02BC}', '\u{1FBF}', '\u{0027}', '\u{1FBD}'];

const VARIA: char = '\u{0300}';
const OXIA: char = '\u{0301}';

/// Replaces look-alike elision marks with U+2019.
pub fn elision_normalize(s: &str) -> String {
    s.chars()
        .map(|c| if ELISION_MARKS.contains(&c) { '\u{2019}' } else { c })
        .collect()
}

/// Folds grave accents onto acute and recomposes the word (NFC).
///
/// Decomposed and precomposed spellings of a word come out identical, and
/// oxia forms collapse onto their tonos equivalents.
pub fn grave_to_acute(word: &str) -> String {
    word.nfd()
        .map(|c| if c == VARIA { OXIA } else { c })
        .nfc()
        .collect()
}

/// Full normalisation applied before encoding and embedding lookup.
pub fn normalize(form: &str) -> String {
    grave_to_acute(&elision_normalize(form.trim()))
}

/// Surrounds every punctuation mark with spaces so it splits into its own token.
pub fn isolate_punctuation(sentence: &str) -> String {
    let mut out = String::with_capacity(sentence.len() + 8);
    for c in sentence.chars() {
        if GREEK_PUNCTUATION.contains(&c) {
            out.push(' ');
            out.push(c);
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

/// Removes punctuation marks from a word.
pub fn strip_punctuation(word: &str) -> String {
    word.chars().filter(|c| !GREEK_PUNCTUATION.contains(c)).collect()
}

/// Splits raw text into tokens, punctuation included.
pub fn tokenize(text: &str) -> Vec<String> {
    isolate_punctuation(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
