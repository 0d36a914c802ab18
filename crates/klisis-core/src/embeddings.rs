//! # Word Vectors
//!
//! Key → fixed-length vector table queried by normalised word form. Loaded
//! from the word2vec text format: a `count dim` header line followed by one
//! `word v1 … vdim` line per entry.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{KlisisError, Result};

/// Read-only word-embedding table.
#[derive(Debug, Clone)]
pub struct WordVectors {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl WordVectors {
    /// An empty table; every lookup misses.
    pub fn empty(dim: usize) -> Self {
        Self {
            dim,
            vectors: HashMap::new(),
        }
    }

    /// Builds a table from in-memory entries.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::Vocabulary` if an entry is not `dim` long.
    pub fn from_entries<I>(dim: usize, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        let mut vectors = HashMap::new();
        for (word, vector) in entries {
            if vector.len() != dim {
                return Err(KlisisError::Vocabulary(format!(
                    "vector for {word:?} has {} components, expected {dim}",
                    vector.len()
                )));
            }
            vectors.insert(word, vector);
        }
        Ok(Self { dim, vectors })
    }

    /// Loads a word2vec text file.
    pub fn load_word2vec<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();

        let header = lines
            .next()
            .ok_or_else(|| KlisisError::Vocabulary(format!("{}: empty file", path.display())))??;
        let mut parts = header.split_whitespace();
        let parse_field = |field: Option<&str>| {
            field.and_then(|f| f.parse::<usize>().ok()).ok_or_else(|| {
                KlisisError::Vocabulary(format!("{}: malformed header {header:?}", path.display()))
            })
        };
        let count = parse_field(parts.next())?;
        let dim = parse_field(parts.next())?;

        let mut vectors = HashMap::with_capacity(count);
        for (line_no, line) in lines.enumerate() {
            let line = line?;
            let mut fields = line.split(' ').filter(|f| !f.is_empty());
            let Some(word) = fields.next() else {
                continue;
            };
            let vector = fields
                .map(|f| f.parse::<f32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    KlisisError::Vocabulary(format!(
                        "{}:{}: {e}",
                        path.display(),
                        line_no + 2
                    ))
                })?;
            if vector.len() != dim {
                return Err(KlisisError::Vocabulary(format!(
                    "{}:{}: expected {dim} components, found {}",
                    path.display(),
                    line_no + 2,
                    vector.len()
                )));
            }
            vectors.insert(word.to_string(), vector);
        }

        if vectors.len() != count {
            tracing::warn!(
                path = %path.display(),
                declared = count,
                loaded = vectors.len(),
                "word vector count differs from header"
            );
        }
        tracing::info!(path = %path.display(), words = vectors.len(), dim, "word vectors loaded");

        Ok(Self { dim, vectors })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.vectors.get(word).map(Vec::as_slice)
    }

    /// Appends the vector for `word` to `out`, or `dim` zeros when absent.
    ///
    /// Returns `false` on a miss.
    pub fn extend_into(&self, word: &str, out: &mut Vec<f32>) -> bool {
        match self.vectors.get(word) {
            Some(v) => {
                out.extend_from_slice(v);
                true
            }
            None => {
                out.resize(out.len() + self.dim, 0.0);
                false
            }
        }
    }

    /// The `n` entries with the highest cosine similarity to `word`.
    pub fn most_similar(&self, word: &str, n: usize) -> Vec<(&str, f32)> {
        let Some(query) = self.vectors.get(word) else {
            return Vec::new();
        };
        let query_norm = norm(query);
        if query_norm == 0.0 {
            return Vec::new();
        }

        let mut scored: Vec<(&str, f32)> = self
            .vectors
            .iter()
            .filter(|(other, _)| other.as_str() != word)
            .filter_map(|(other, v)| {
                let other_norm = norm(v);
                (other_norm > 0.0)
                    .then(|| (other.as_str(), dot(query, v) / (query_norm * other_norm)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        scored.truncate(n);
        scored
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f32]) -> f32 {
    dot(a, a).sqrt()
}
