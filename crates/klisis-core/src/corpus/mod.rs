//! # Corpus
//!
//! Treebank documents and the vocabularies derived from them.

pub mod extract;
pub mod treebank;

pub use extract::{collect_annotators, collect_characters};
pub use treebank::{TreebankReader, xml_files};
