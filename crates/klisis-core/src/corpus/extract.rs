//! Vocabulary extraction for curating the character and annotator files.

use std::collections::BTreeMap;

use crate::encoder::normalize;
use crate::types::Document;

/// Every character of every normalised, non-artificial token form, in order
/// of first appearance.
pub fn collect_characters(documents: &[Document]) -> Vec<char> {
    let mut seen = Vec::new();
    for token in documents
        .iter()
        .flat_map(|d| &d.sentences)
        .flat_map(|s| &s.tokens)
        .filter(|t| !t.artificial)
    {
        for c in normalize(&token.form).chars() {
            if !seen.contains(&c) {
                seen.push(c);
            }
        }
    }
    seen
}

/// Header annotators across documents in order of first appearance, and the
/// union of their short-name declarations.
pub fn collect_annotators(documents: &[Document]) -> (Vec<String>, BTreeMap<String, String>) {
    let mut names: Vec<String> = Vec::new();
    let mut short_names = BTreeMap::new();
    for doc in documents {
        for name in &doc.annotators {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        short_names.extend(doc.short_names.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    (names, short_names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sentence, Token};

    fn doc(annotator: &str, forms: &[(&str, bool)]) -> Document {
        Document {
            name: "d".into(),
            annotators: vec![annotator.into()],
            short_names: BTreeMap::from([("s".to_string(), annotator.to_string())]),
            sentences: vec![Sentence {
                id: None,
                annotators: vec![],
                tokens: forms
                    .iter()
                    .map(|&(form, artificial)| Token {
                        form: form.into(),
                        postag: "n-s---mn-".into(),
                        artificial,
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn test_characters_in_first_seen_order() {
        let docs = [doc("A", &[("τ\u{1F78}ν", false), ("[0]", true), ("\u{1F41}", false)])];
        // grave folds to acute
        assert_eq!(
            collect_characters(&docs),
            vec!['τ', '\u{03CC}', 'ν', '\u{1F41}']
        );
    }

    #[test]
    fn test_annotators_deduplicated() {
        let docs = [doc("A", &[]), doc("B", &[]), doc("A", &[])];
        let (names, shorts) = collect_annotators(&docs);
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(shorts.get("s").map(String::as_str), Some("A"));
    }
}
