//! # Treebank Reader
//!
//! Reads Perseus/Gorman-style treebank XML. Only the handful of elements the
//! cascade needs are recognised: `<sentence>`, `<word>`/`<token>`, and the
//! annotator declarations in the header and on sentences.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{KlisisError, Result};
use crate::types::{Document, Sentence, Token};

/// Annotator names that are tools, not people.
const IGNORED_ANNOTATORS: &[&str] = &["arethusa"];

/// Pattern-based treebank parser.
pub struct TreebankReader {
    re_sentence: Regex,
    re_token: Regex,
    re_attribute: Regex,
    re_resp_stmt: Regex,
    re_resp: Regex,
    re_annotator_block: Regex,
    re_name: Regex,
    re_short: Regex,
    re_sentence_annotator: Regex,
    short_names: HashMap<String, String>,
}

impl TreebankReader {
    /// # Errors
    ///
    /// Returns `KlisisError::Regex` if a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_sentence: Regex::new(r"(?s)<sentence\b([^>]*?)(?:/>|>(.*?)</sentence>)")?,
            re_token: Regex::new(r"<(?:word|token)\b([^>]*?)/?>")?,
            re_attribute: Regex::new(r#"([\w:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)?,
            re_resp_stmt: Regex::new(r"(?s)<respStmt\b[^>]*>(.*?)</respStmt>")?,
            re_resp: Regex::new(r"(?s)<resp\b[^>]*>(.*?)</resp>")?,
            re_annotator_block: Regex::new(r"(?s)<annotator\b[^>]*>(.*?)</annotator>")?,
            re_name: Regex::new(r"(?s)<name\b[^>]*>(.*?)</name>")?,
            re_short: Regex::new(r"(?s)<short\b[^>]*>(.*?)</short>")?,
            re_sentence_annotator: Regex::new(
                r"<(?:annotator|primary|secondary)\b[^>]*>([^<]*)</(?:annotator|primary|secondary)>",
            )?,
            short_names: HashMap::new(),
        })
    }

    /// Short names used to resolve sentence-level annotators, in addition to
    /// those each document declares.
    pub fn with_short_names(mut self, short_names: HashMap<String, String>) -> Self {
        self.short_names = short_names;
        self
    }

    /// Parses one document from text.
    pub fn parse_str(&self, name: &str, xml: &str) -> Result<Document> {
        let header_end = self
            .re_sentence
            .find(xml)
            .map_or(xml.len(), |m| m.start());
        let header = &xml[..header_end];
        let (annotators, short_names) = self.header_annotators(header);

        let mut sentences = Vec::new();
        let mut dropped = 0;
        for caps in self.re_sentence.captures_iter(xml) {
            let attrs = self.attributes(caps.get(1).map_or("", |m| m.as_str()));
            let body = caps.get(2).map_or("", |m| m.as_str());

            let sentence_annotators = self
                .re_sentence_annotator
                .captures_iter(body)
                .filter_map(|c| c.get(1))
                .map(|m| unescape(m.as_str().trim()))
                .filter(|n| !n.is_empty())
                .map(|n| {
                    short_names
                        .get(&n)
                        .or_else(|| self.short_names.get(&n))
                        .cloned()
                        .unwrap_or(n)
                })
                .collect();

            let mut tokens = Vec::new();
            for token in self.re_token.captures_iter(body) {
                let attrs = self.attributes(token.get(1).map_or("", |m| m.as_str()));
                match (attrs.get("form"), attrs.get("postag")) {
                    (Some(form), Some(postag)) => tokens.push(Token {
                        form: form.clone(),
                        postag: postag.clone(),
                        artificial: attrs.contains_key("artificial"),
                    }),
                    _ => dropped += 1,
                }
            }

            sentences.push(Sentence {
                id: attrs.get("id").cloned(),
                annotators: sentence_annotators,
                tokens,
            });
        }

        if sentences.is_empty() {
            return Err(KlisisError::Corpus(format!("{name}: no <sentence> elements")));
        }
        if dropped > 0 {
            tracing::debug!(document = name, dropped, "tokens without form or postag skipped");
        }

        Ok(Document {
            name: name.to_string(),
            annotators,
            short_names,
            sentences,
        })
    }

    /// Parses a file, naming the document after the file stem.
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<Document> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        self.parse_str(name, &xml)
            .map_err(|e| KlisisError::Corpus(format!("{}: {e}", path.display())))
    }

    /// Parses every `.xml` file in a directory, in file-name order.
    pub fn read_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<Document>> {
        xml_files(dir.as_ref())?
            .iter()
            .map(|path| self.parse_file(path))
            .collect()
    }

    fn header_annotators(&self, header: &str) -> (Vec<String>, BTreeMap<String, String>) {
        let mut annotators: Vec<String> = Vec::new();
        let mut short_names = BTreeMap::new();
        let add = |name: String, annotators: &mut Vec<String>| {
            if !name.is_empty()
                && !IGNORED_ANNOTATORS.contains(&name.as_str())
                && !annotators.contains(&name)
            {
                annotators.push(name);
            }
        };

        for stmt in self.re_resp_stmt.captures_iter(header) {
            let body = stmt.get(1).map_or("", |m| m.as_str());
            let is_annotator = self
                .re_resp
                .captures(body)
                .and_then(|c| c.get(1))
                .is_some_and(|m| m.as_str().contains("annotator"));
            if !is_annotator {
                continue;
            }
            let Some(name) = self.inner_text(&self.re_name, body) else {
                continue;
            };
            if let Some(short) = self.inner_text(&self.re_short, body) {
                short_names.insert(short, name.clone());
            }
            add(name, &mut annotators);
        }

        for block in self.re_annotator_block.captures_iter(header) {
            let body = block.get(1).map_or("", |m| m.as_str());
            if let Some(name) = self.inner_text(&self.re_name, body) {
                if let Some(short) = self.inner_text(&self.re_short, body) {
                    short_names.insert(short, name.clone());
                }
                add(name, &mut annotators);
            }
        }

        (annotators, short_names)
    }

    fn inner_text(&self, re: &Regex, body: &str) -> Option<String> {
        re.captures(body)
            .and_then(|c| c.get(1))
            .map(|m| unescape(m.as_str().trim()))
    }

    fn attributes(&self, tag_body: &str) -> HashMap<String, String> {
        self.re_attribute
            .captures_iter(tag_body)
            .filter_map(|c| {
                let key = c.get(1)?.as_str().to_string();
                let value = c.get(2).or_else(|| c.get(3))?.as_str();
                Some((key, unescape(value)))
            })
            .collect()
    }
}

/// `.xml` files directly inside `dir`, sorted.
pub fn xml_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "xml"))
        .collect();
    files.sort();
    Ok(files)
}

/// Replaces the predefined XML entities and numeric character references.
fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
