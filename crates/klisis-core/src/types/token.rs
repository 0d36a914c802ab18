use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aspect::AspectKind;

/// Gold tag character meaning "feature not applicable to this token".
pub const NOT_APPLICABLE: char = '_';

/// A gold morphological tag: one character per aspect, in registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MorphTag([char; AspectKind::COUNT]);

impl MorphTag {
    /// Parses a treebank `postag` attribute.
    ///
    /// Returns `None` unless the string holds exactly nine characters.
    pub fn parse(postag: &str) -> Option<Self> {
        let mut chars = [NOT_APPLICABLE; AspectKind::COUNT];
        let mut count = 0;
        for c in postag.chars() {
            if count == AspectKind::COUNT {
                return None;
            }
            chars[count] = c;
            count += 1;
        }
        (count == AspectKind::COUNT).then_some(Self(chars))
    }

    /// The gold character for one aspect.
    pub fn get(&self, aspect: AspectKind) -> char {
        self.0[aspect.index()]
    }

    /// All nine characters.
    pub fn chars(&self) -> &[char; AspectKind::COUNT] {
        &self.0
    }
}

impl fmt::Display for MorphTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0 {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// One corpus word or punctuation mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Surface form as written in the treebank.
    pub form: String,
    /// Raw `postag` attribute.
    pub postag: String,
    /// Synthetic tokens (ellipsis reconstructions) carry `artificial`.
    pub artificial: bool,
}

impl Token {
    /// The parsed gold tag, if the postag has the expected length.
    pub fn gold(&self) -> Option<MorphTag> {
        MorphTag::parse(&self.postag)
    }

    /// Whether this token takes part in training and evaluation.
    pub fn is_scorable(&self) -> bool {
        !self.artificial && self.gold().is_some()
    }
}

/// A treebank sentence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    /// The sentence `id` attribute, when present.
    pub id: Option<String>,
    /// Annotators named on the sentence, resolved to full names where possible.
    pub annotators: Vec<String>,
    /// Tokens in reading order.
    pub tokens: Vec<Token>,
}

/// A treebank document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Source name (usually the file stem).
    pub name: String,
    /// Annotators named in the document header.
    pub annotators: Vec<String>,
    /// Short annotator names declared in the header, mapped to full names.
    pub short_names: BTreeMap<String, String>,
    /// Sentences in reading order.
    pub sentences: Vec<Sentence>,
}

impl Document {
    /// Scorable tokens in order, each paired with the annotator credited for it.
    ///
    /// A sentence-level annotator wins over the document header; tokens with
    /// neither carry `None` and fall back to the default annotator downstream.
    pub fn scorable_tokens(&self) -> Vec<(TokenInput, MorphTag)> {
        let header = self.annotators.first();
        self.sentences
            .iter()
            .flat_map(|sentence| {
                let annotator = sentence.annotators.first().or(header).cloned();
                sentence.tokens.iter().filter_map(move |token| {
                    if token.artificial {
                        return None;
                    }
                    let gold = token.gold()?;
                    Some((
                        TokenInput {
                            form: token.form.clone(),
                            annotator: annotator.clone(),
                        },
                        gold,
                    ))
                })
            })
            .collect()
    }

    /// Total number of tokens, including unscorable ones.
    pub fn token_count(&self) -> usize {
        self.sentences.iter().map(|s| s.tokens.len()).sum()
    }
}

/// A token as handed to the cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInput {
    /// Surface form; normalisation happens inside the pipeline.
    pub form: String,
    /// Annotator whose conventions the prediction should follow.
    pub annotator: Option<String>,
}

impl TokenInput {
    /// A token with the default annotator.
    pub fn new(form: impl Into<String>) -> Self {
        Self {
            form: form.into(),
            annotator: None,
        }
    }

    /// Sets the annotator.
    pub fn with_annotator(mut self, annotator: impl Into<String>) -> Self {
        self.annotator = Some(annotator.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(form: &str, postag: &str, artificial: bool) -> Token {
        Token {
            form: form.into(),
            postag: postag.into(),
            artificial,
        }
    }

    #[test]
    fn test_parse_morph_tag() {
        let tag = MorphTag::parse("n-s---mn-").unwrap();
        assert_eq!(tag.get(AspectKind::Pos), 'n');
        assert_eq!(tag.get(AspectKind::Number), 's');
        assert_eq!(tag.get(AspectKind::Case), 'n');
        assert_eq!(tag.to_string(), "n-s---mn-");
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(MorphTag::parse("n-s---mn").is_none());
        assert!(MorphTag::parse("n-s---mn--").is_none());
        assert!(MorphTag::parse("").is_none());
    }

    #[test]
    fn test_scorable_tokens() {
        let doc = Document {
            name: "test".into(),
            annotators: vec!["Header Person".into()],
            short_names: BTreeMap::new(),
            sentences: vec![
                Sentence {
                    id: Some("1".into()),
                    annotators: vec![],
                    tokens: vec![
                        token("λόγος", "n-s---mn-", false),
                        token("[0]", "v3spia---", true),
                        token("καί", "c--", false),
                    ],
                },
                Sentence {
                    id: Some("2".into()),
                    annotators: vec!["Vanessa Gorman".into()],
                    tokens: vec![token(".", "u--------", false)],
                },
            ],
        };

        let tokens = doc.scorable_tokens();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].0.form, "λόγος");
        assert_eq!(tokens[0].0.annotator.as_deref(), Some("Header Person"));
        assert_eq!(tokens[1].0.annotator.as_deref(), Some("Vanessa Gorman"));
        assert_eq!(doc.token_count(), 4);
    }
}
