pub mod prediction;
pub mod stage;
pub mod token;

pub use prediction::{TagPrediction, UNKNOWN_MARKER};
pub use stage::Stage;
pub use token::{Document, MorphTag, NOT_APPLICABLE, Sentence, Token, TokenInput};
