//! # Klisis Core
//!
//! Cascaded neural morphological tagging for Ancient Greek treebanks. Each of
//! nine aspects (part of speech, person, number, tense, mood, voice, gender,
//! case, degree) is predicted by three chained models: a character-level
//! BiLSTM, a dense reconciliation network over all nine first-stage outputs,
//! and a BiLSTM over a sliding window of second-stage outputs and word
//! embeddings.
//!
//! ## Quick Start
//!
//! ```rust
//! use klisis_core::encoder::{normalize, AnnotatorVocab, CharVocab, TokenEncoder};
//!
//! let chars = CharVocab::new(vec!['λ', 'ό', 'γ', 'ο', 'ς']).unwrap();
//! let annotators = AnnotatorVocab::new(vec!["Vanessa Gorman".to_string()]).unwrap();
//! let encoder = TokenEncoder::new(chars, annotators, 21).unwrap();
//!
//! let (annotator, _) = encoder.annotators().one_hot(None);
//! let tensor = encoder.encode(&normalize("λόγος"), &annotator).unwrap();
//!
//! assert_eq!(tensor.rows(), 21);
//! assert_eq!(tensor.filled_rows(), 5);
//! ```
pub mod artifact;
pub mod aspect;
pub mod cascade;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod encoder;
pub mod error;
pub mod nn;
pub mod scoring;
pub mod types;

// Re-export primary API
pub use artifact::{ArtifactName, ModelStore};
pub use aspect::{Aspect, AspectKind, AspectRegistry};
pub use cascade::{AspectOutput, CascadeOutput, CascadePipeline, StageOutput};
pub use config::{CascadeConfig, DevicePreference};
pub use corpus::TreebankReader;
pub use embeddings::WordVectors;
pub use encoder::{AnnotatorVocab, CharVocab, LookupMisses, TokenEncoder};
pub use error::{KlisisError, Result};
pub use nn::{AspectModel, StageShapes, Topology, TrainableModel};
pub use scoring::{Evaluation, EvaluationReport};
pub use types::{
    Document, MorphTag, NOT_APPLICABLE, Sentence, Stage, TagPrediction, Token, TokenInput,
    UNKNOWN_MARKER,
};
