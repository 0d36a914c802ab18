//! # Evaluation
//!
//! Accuracy per aspect and the part-of-speech confusion matrix over the
//! final-stage predictions of held-out documents.

pub mod accuracy;
pub mod confusion;

use serde::{Deserialize, Serialize};

use crate::aspect::AspectKind;
use crate::cascade::CascadeOutput;
use crate::encoder::LookupMisses;
use crate::error::{KlisisError, Result};
use crate::types::MorphTag;

pub use accuracy::{AccuracyTally, AspectScore, is_correct};
pub use confusion::{CellUnit, ConfusionMatrix, ConfusionTable};

/// Running evaluation over any number of documents.
#[derive(Debug, Clone)]
pub struct Evaluation {
    tokens: usize,
    accuracy: AccuracyTally,
    pos_confusion: ConfusionMatrix,
    misses: LookupMisses,
}

impl Default for Evaluation {
    fn default() -> Self {
        Self {
            tokens: 0,
            accuracy: AccuracyTally::new(),
            pos_confusion: ConfusionMatrix::new(AspectKind::Pos),
            misses: LookupMisses::default(),
        }
    }
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scores the last stage of `output` against `gold`, one tag per token.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::Encoding` when the token counts differ.
    pub fn record(&mut self, output: &CascadeOutput, gold: &[MorphTag]) -> Result<()> {
        if output.tokens != gold.len() {
            return Err(KlisisError::Encoding(format!(
                "{} tokens predicted, {} gold tags",
                output.tokens,
                gold.len()
            )));
        }
        self.misses.merge(&output.misses);
        let Some(stage) = output.last() else {
            return Ok(());
        };

        self.accuracy.record_stage(stage, gold)?;
        if let Some(pos) = stage.aspect(AspectKind::Pos) {
            for (prediction, tag) in pos.predictions.iter().zip(gold) {
                self.pos_confusion.record(prediction.tag, tag.get(AspectKind::Pos));
            }
        }
        self.tokens += gold.len();
        Ok(())
    }

    pub fn tokens(&self) -> usize {
        self.tokens
    }

    pub fn accuracy(&self) -> &AccuracyTally {
        &self.accuracy
    }

    pub fn pos_confusion(&self) -> &ConfusionMatrix {
        &self.pos_confusion
    }

    pub fn report(&self) -> EvaluationReport {
        EvaluationReport {
            tokens: self.tokens,
            aspects: self.accuracy.scores(),
            pos_confusion: self.pos_confusion.percentages(),
            pos_counts: self.pos_confusion.counts(),
            misses: self.misses,
        }
    }
}

/// Serializable summary of an [`Evaluation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub tokens: usize,
    pub aspects: Vec<AspectScore>,
    /// Row percentages.
    pub pos_confusion: ConfusionTable,
    pub pos_counts: ConfusionTable,
    pub misses: LookupMisses,
}

impl EvaluationReport {
    /// Accuracy lines followed by the percentage confusion table.
    pub fn render(&self) -> String {
        self.render_with(&self.pos_confusion)
    }

    /// Accuracy lines followed by the raw-count confusion table.
    pub fn render_counts(&self) -> String {
        self.render_with(&self.pos_counts)
    }

    fn render_with(&self, table: &ConfusionTable) -> String {
        let mut out = String::new();
        for score in &self.aspects {
            out.push_str(&format!(
                "{} correct: {}/{} = {:.2}%\n",
                score.aspect,
                score.correct,
                score.total,
                100.0 * score.accuracy
            ));
        }
        out.push_str(&format!(
            "lookup misses: {} unknown chars, {} unknown annotators, {} OOV words\n\n",
            self.misses.unknown_chars, self.misses.unknown_annotators, self.misses.oov_words
        ));
        out.push_str(&table.render());
        out
    }
}
