//! Character and annotator vocabularies.
//!
//! Both are curated externally and loaded read-only from JSON. Their order
//! defines the one-hot indices, so they must never be re-sorted.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{KlisisError, Result};

/// Known normalised characters plus the truncation and unknown classes.
#[derive(Debug, Clone)]
pub struct CharVocab {
    chars: Vec<char>,
    char_to_idx: HashMap<char, usize>,
}

impl CharVocab {
    /// Builds a vocabulary from an ordered character list.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::Vocabulary` if a character repeats.
    pub fn new(chars: Vec<char>) -> Result<Self> {
        let mut char_to_idx = HashMap::with_capacity(chars.len());
        for (idx, &c) in chars.iter().enumerate() {
            if char_to_idx.insert(c, idx).is_some() {
                return Err(KlisisError::Vocabulary(format!(
                    "character {c:?} listed twice"
                )));
            }
        }
        Ok(Self { chars, char_to_idx })
    }

    /// Loads a JSON array of single-character strings.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let entries: Vec<String> = serde_json::from_str(&content)?;
        let chars = entries
            .iter()
            .map(|entry| {
                let mut it = entry.chars();
                match (it.next(), it.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(KlisisError::Vocabulary(format!(
                        "{}: entry {entry:?} is not a single character",
                        path.as_ref().display()
                    ))),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(chars)
    }

    /// Number of known characters.
    pub fn known(&self) -> usize {
        self.chars.len()
    }

    /// One-hot width: known characters, truncation marker, unknown character.
    pub fn width(&self) -> usize {
        self.chars.len() + 2
    }

    /// Index of the truncation-marker class.
    pub fn truncation_index(&self) -> usize {
        self.chars.len()
    }

    /// Index of the unknown-character class.
    pub fn unknown_index(&self) -> usize {
        self.chars.len() + 1
    }

    pub fn index_of(&self, c: char) -> Option<usize> {
        self.char_to_idx.get(&c).copied()
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }
}

/// Annotator names (domain-adaptation context) and their short aliases.
#[derive(Debug, Clone)]
pub struct AnnotatorVocab {
    names: Vec<String>,
    name_to_idx: HashMap<String, usize>,
    short_names: HashMap<String, String>,
    default_idx: usize,
}

impl AnnotatorVocab {
    /// Builds a vocabulary from an ordered list of full names.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::Vocabulary` if the list is empty or has duplicates.
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(KlisisError::Vocabulary(
                "annotator list must not be empty".into(),
            ));
        }
        let mut name_to_idx = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            if name_to_idx.insert(name.clone(), idx).is_some() {
                return Err(KlisisError::Vocabulary(format!(
                    "annotator {name:?} listed twice"
                )));
            }
        }
        Ok(Self {
            names,
            name_to_idx,
            short_names: HashMap::new(),
            default_idx: 0,
        })
    }

    /// Loads a JSON array of names, plus an optional JSON object of short names.
    pub fn from_json_files<P: AsRef<Path>>(names: P, short_names: Option<P>) -> Result<Self> {
        let content = std::fs::read_to_string(names)?;
        let vocab = Self::new(serde_json::from_str(&content)?)?;
        match short_names {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                Ok(vocab.with_short_names(serde_json::from_str(&content)?))
            }
            None => Ok(vocab),
        }
    }

    /// Registers short-name aliases (`"short" -> "Full Name"`).
    pub fn with_short_names(mut self, short_names: HashMap<String, String>) -> Self {
        self.short_names = short_names;
        self
    }

    /// Picks the annotator used when a token names none.
    ///
    /// An unrecognised default keeps index 0.
    pub fn with_default(mut self, name: &str) -> Self {
        if let Some(idx) = self.index_of(name) {
            self.default_idx = idx;
        } else {
            tracing::warn!(annotator = name, "default annotator not in vocabulary, using index 0");
        }
        self
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Resolves a full or short name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_idx.get(name).copied().or_else(|| {
            self.short_names
                .get(name)
                .and_then(|full| self.name_to_idx.get(full).copied())
        })
    }

    /// Expands a short name to the full name, if it is one.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.short_names.get(name).map_or(name, String::as_str)
    }

    /// One-hot vector for an annotator, and whether the lookup missed.
    ///
    /// `None` selects the default annotator; an unknown name falls back to it
    /// and reports a miss.
    pub fn one_hot(&self, name: Option<&str>) -> (Vec<f32>, bool) {
        let (idx, missed) = match name {
            None => (self.default_idx, false),
            Some(name) => match self.index_of(name) {
                Some(idx) => (idx, false),
                None => (self.default_idx, true),
            },
        };
        let mut vector = vec![0.0; self.names.len()];
        vector[idx] = 1.0;
        (vector, missed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_char_vocab_indices() {
        let vocab = CharVocab::new(vec!['α', 'β', 'γ']).unwrap();
        assert_eq!(vocab.width(), 5);
        assert_eq!(vocab.index_of('β'), Some(1));
        assert_eq!(vocab.index_of('ω'), None);
        assert_eq!(vocab.truncation_index(), 3);
        assert_eq!(vocab.unknown_index(), 4);
    }

    #[test]
    fn test_char_vocab_rejects_duplicates() {
        assert!(CharVocab::new(vec!['α', 'α']).is_err());
    }

    #[test]
    fn test_char_vocab_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["λ", "ό", "γ"]"#).unwrap();
        let vocab = CharVocab::from_json_file(file.path()).unwrap();
        assert_eq!(vocab.known(), 3);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, r#"["λό"]"#).unwrap();
        assert!(CharVocab::from_json_file(bad.path()).is_err());
    }

    #[test]
    fn test_annotator_one_hot() {
        let vocab = AnnotatorVocab::new(vec!["Vanessa Gorman".into(), "Giuseppe Celano".into()])
            .unwrap()
            .with_short_names(HashMap::from([("gcelano".into(), "Giuseppe Celano".into())]));

        assert_eq!(vocab.one_hot(None), (vec![1.0, 0.0], false));
        assert_eq!(vocab.one_hot(Some("gcelano")), (vec![0.0, 1.0], false));
        assert_eq!(vocab.one_hot(Some("nobody")), (vec![1.0, 0.0], true));
        assert_eq!(vocab.resolve("gcelano"), "Giuseppe Celano");
    }

    #[test]
    fn test_annotator_default() {
        let vocab = AnnotatorVocab::new(vec!["A".into(), "B".into()])
            .unwrap()
            .with_default("B");
        assert_eq!(vocab.one_hot(None).0, vec![0.0, 1.0]);
        assert!(AnnotatorVocab::new(vec![]).is_err());
    }
}
