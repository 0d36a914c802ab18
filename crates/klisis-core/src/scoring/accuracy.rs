use serde::{Deserialize, Serialize};

use crate::aspect::AspectKind;
use crate::cascade::StageOutput;
use crate::error::{KlisisError, Result};
use crate::types::{MorphTag, NOT_APPLICABLE, TagPrediction, UNKNOWN_MARKER};

/// Whether a prediction counts as correct against a gold character.
///
/// The unknown marker matches the not-applicable gold tag.
// TODO: decide with the corpus maintainers whether `-` vs `_` should keep
// counting as correct or be reported as its own column.
pub fn is_correct(predicted: char, gold: char) -> bool {
    predicted == gold || (predicted == UNKNOWN_MARKER && gold == NOT_APPLICABLE)
}

/// Per-aspect correct/total counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccuracyTally {
    correct: [usize; AspectKind::COUNT],
    total: [usize; AspectKind::COUNT],
}

/// One aspect's line in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectScore {
    pub aspect: String,
    pub correct: usize,
    pub total: usize,
    /// `correct / total`, or 0 for an empty tally.
    pub accuracy: f64,
}

impl AccuracyTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, aspect: AspectKind, predicted: char, gold: char) {
        let i = aspect.index();
        self.total[i] += 1;
        if is_correct(predicted, gold) {
            self.correct[i] += 1;
        }
    }

    /// Records one token's nine predictions.
    pub fn record_token(&mut self, predictions: &[TagPrediction], gold: &MorphTag) {
        for (kind, prediction) in AspectKind::ALL.iter().zip(predictions) {
            self.record(*kind, prediction.tag, gold.get(*kind));
        }
    }

    /// Records every token of a stage output against its gold tags.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::Encoding` when the token counts differ.
    pub fn record_stage(&mut self, output: &StageOutput, gold: &[MorphTag]) -> Result<()> {
        for aspect in &output.aspects {
            if aspect.predictions.len() != gold.len() {
                return Err(KlisisError::Encoding(format!(
                    "{} predictions for {} gold tags",
                    aspect.predictions.len(),
                    gold.len()
                )));
            }
            for (prediction, tag) in aspect.predictions.iter().zip(gold) {
                self.record(aspect.aspect, prediction.tag, tag.get(aspect.aspect));
            }
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &AccuracyTally) {
        for i in 0..AspectKind::COUNT {
            self.correct[i] += other.correct[i];
            self.total[i] += other.total[i];
        }
    }

    pub fn correct(&self, aspect: AspectKind) -> usize {
        self.correct[aspect.index()]
    }

    pub fn total(&self, aspect: AspectKind) -> usize {
        self.total[aspect.index()]
    }

    pub fn accuracy(&self, aspect: AspectKind) -> Option<f64> {
        let total = self.total(aspect);
        (total > 0).then(|| self.correct(aspect) as f64 / total as f64)
    }

    pub fn scores(&self) -> Vec<AspectScore> {
        AspectKind::ALL
            .iter()
            .map(|&kind| AspectScore {
                aspect: kind.title().to_string(),
                correct: self.correct(kind),
                total: self.total(kind),
                accuracy: self.accuracy(kind).unwrap_or(0.0),
            })
            .collect()
    }
}
