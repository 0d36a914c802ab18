use thiserror::Error;

/// Errors that can occur during Klisis core operations.
#[derive(Debug, Error)]
pub enum KlisisError {
    /// Tensor assembly was handed malformed input.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The aspect title is not one of the nine morphological aspects.
    #[error("unknown aspect: {0:?}")]
    UnknownAspect(String),

    /// A model artefact is missing, corrupt, or was never loaded.
    #[error("model unavailable for {aspect}/{stage}: {reason}")]
    ModelUnavailable {
        /// Aspect title.
        aspect: String,
        /// Stage tag (`lstm1`, `dnn`, `lstm2`).
        stage: String,
        /// What went wrong, including the file involved when there is one.
        reason: String,
    },

    /// Training data does not fit the model it is meant for.
    #[error("training data shape mismatch for {aspect}/{stage}: expected {expected:?}, got {actual:?}")]
    TrainingDataShape {
        /// Aspect title.
        aspect: String,
        /// Stage tag.
        stage: String,
        /// Per-sample shape the model expects.
        expected: Vec<usize>,
        /// Per-sample shape found in the data.
        actual: Vec<usize>,
    },

    /// A vocabulary or embedding file could not be interpreted.
    #[error("vocabulary error: {0}")]
    Vocabulary(String),

    /// A treebank document could not be read.
    #[error("corpus error: {0}")]
    Corpus(String),

    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regex pattern failed to compile (should not happen with static patterns).
    #[error("regex compilation error: {0}")]
    Regex(#[from] regex::Error),

    /// Candle ML framework error.
    #[error("tensor backend error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for Klisis operations.
pub type Result<T> = std::result::Result<T, KlisisError>;
