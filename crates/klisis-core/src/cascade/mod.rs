//! # Cascade Pipeline
//!
//! Chains the three stages per aspect. Stage 1 reads character tensors,
//! stage 2 reads the nine stage-1 probability vectors plus the annotator, and
//! stage 3 reads windows of stage-2 frames extended with word embeddings.

pub mod assembly;
pub mod decode;
pub mod pipeline;

pub use assembly::{dense_input, frame_input, windows};
pub use decode::{decode, decode_batch};
pub use pipeline::{AspectOutput, CascadeOutput, CascadePipeline, StageOutput};
