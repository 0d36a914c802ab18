use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KlisisError;

/// One phase of the prediction cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Bidirectional LSTM over per-token character cells.
    Sequence1,
    /// Dense reconciliation over all aspects' stage-1 outputs.
    Dense,
    /// Bidirectional LSTM over a window of stage-2 frames.
    Sequence2,
}

impl Stage {
    /// All stages in dependency order.
    pub const ALL: [Stage; 3] = [Stage::Sequence1, Stage::Dense, Stage::Sequence2];

    /// Position of this stage in the cascade.
    pub fn index(self) -> usize {
        match self {
            Stage::Sequence1 => 0,
            Stage::Dense => 1,
            Stage::Sequence2 => 2,
        }
    }

    /// Short tag used in artefact file names.
    pub fn tag(self) -> &'static str {
        match self {
            Stage::Sequence1 => "lstm1",
            Stage::Dense => "dnn",
            Stage::Sequence2 => "lstm2",
        }
    }

    /// Whether the stage consumes a sequence (and therefore uses an LSTM stack).
    pub fn is_sequence(self) -> bool {
        !matches!(self, Stage::Dense)
    }

    /// The stages that must have run before this one, followed by this one.
    pub fn through(self) -> &'static [Stage] {
        &Self::ALL[..=self.index()]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Stage {
    type Err = KlisisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lstm1" => Ok(Stage::Sequence1),
            "dnn" => Ok(Stage::Dense),
            "lstm2" => Ok(Stage::Sequence2),
            other => Err(KlisisError::Config(format!("unknown stage {other:?}"))),
        }
    }
}
