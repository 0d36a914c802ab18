//! # Morphological Aspects
//!
//! The nine aspects of a treebank `postag`, their tag sets, and the registry
//! that holds each aspect's three cascade models.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KlisisError, Result};
use crate::nn::AspectModel;
use crate::types::Stage;

/// One morphological category. Variant order is the registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectKind {
    Pos,
    Person,
    Number,
    Tense,
    Mood,
    Voice,
    Gender,
    Case,
    Degree,
}

impl AspectKind {
    /// Number of aspects (and characters in a `postag`).
    pub const COUNT: usize = 9;

    /// All aspects in registry order. Every concatenation follows this order.
    pub const ALL: [AspectKind; Self::COUNT] = [
        AspectKind::Pos,
        AspectKind::Person,
        AspectKind::Number,
        AspectKind::Tense,
        AspectKind::Mood,
        AspectKind::Voice,
        AspectKind::Gender,
        AspectKind::Case,
        AspectKind::Degree,
    ];

    /// Position in the registry and in the `postag` string.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Unique title, used in artefact names and reports.
    pub fn title(self) -> &'static str {
        match self {
            AspectKind::Pos => "pos",
            AspectKind::Person => "person",
            AspectKind::Number => "number",
            AspectKind::Tense => "tense",
            AspectKind::Mood => "mood",
            AspectKind::Voice => "voice",
            AspectKind::Gender => "gender",
            AspectKind::Case => "case",
            AspectKind::Degree => "degree",
        }
    }

    /// Legal tag characters. Position `i` is output class `i`.
    pub fn tags(self) -> &'static [char] {
        match self {
            AspectKind::Pos => &['l', 'n', 'a', 'r', 'c', 'i', 'p', 'v', 'd', 'm', 'g', 'u'],
            AspectKind::Person => &['1', '2', '3'],
            AspectKind::Number => &['s', 'p', 'd'],
            AspectKind::Tense => &['p', 'i', 'r', 'l', 't', 'f', 'a'],
            AspectKind::Mood => &['i', 's', 'n', 'm', 'p', 'o'],
            AspectKind::Voice => &['a', 'p', 'm', 'e'],
            AspectKind::Gender => &['m', 'f', 'n'],
            AspectKind::Case => &['n', 'g', 'd', 'a', 'v'],
            AspectKind::Degree => &['p', 'c', 's'],
        }
    }

    /// Output classes: the tag set plus one class for anything else.
    pub fn num_classes(self) -> usize {
        self.tags().len() + 1
    }

    /// Combined width of all nine aspects' probability vectors.
    pub fn total_classes() -> usize {
        Self::ALL.iter().map(|a| a.num_classes()).sum()
    }

    /// Class index for a gold tag character; unrecognised tags use the extra class.
    pub fn label_index(self, gold: char) -> usize {
        let tags = self.tags();
        tags.iter().position(|&t| t == gold).unwrap_or(tags.len())
    }

    /// Resolves a title.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::UnknownAspect` for anything but the nine titles.
    pub fn from_title(title: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.title() == title)
            .ok_or_else(|| KlisisError::UnknownAspect(title.to_string()))
    }
}

impl fmt::Display for AspectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// An aspect together with whichever of its stage models have been loaded.
pub struct Aspect {
    kind: AspectKind,
    models: [Option<Box<dyn AspectModel>>; 3],
}

impl Aspect {
    /// An aspect with no models attached.
    pub fn new(kind: AspectKind) -> Self {
        Self {
            kind,
            models: [None, None, None],
        }
    }

    /// Attaches the model for one stage.
    pub fn with_model(mut self, stage: Stage, model: Box<dyn AspectModel>) -> Self {
        self.models[stage.index()] = Some(model);
        self
    }

    pub fn kind(&self) -> AspectKind {
        self.kind
    }

    pub fn title(&self) -> &'static str {
        self.kind.title()
    }

    pub fn tags(&self) -> &'static [char] {
        self.kind.tags()
    }

    /// Whether the stage model is present.
    pub fn has_model(&self, stage: Stage) -> bool {
        self.models[stage.index()].is_some()
    }

    /// The model for a stage.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::ModelUnavailable` when the stage was not loaded.
    pub fn model(&self, stage: Stage) -> Result<&dyn AspectModel> {
        self.models[stage.index()]
            .as_deref()
            .ok_or_else(|| KlisisError::ModelUnavailable {
                aspect: self.title().to_string(),
                stage: stage.tag().to_string(),
                reason: "stage model was not loaded".into(),
            })
    }
}

impl fmt::Debug for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loaded: Vec<&str> = Stage::ALL
            .iter()
            .filter(|s| self.has_model(**s))
            .map(|s| s.tag())
            .collect();
        f.debug_struct("Aspect")
            .field("kind", &self.kind)
            .field("loaded", &loaded)
            .finish()
    }
}

/// The nine aspects, fixed in [`AspectKind::ALL`] order. Immutable once built.
#[derive(Debug)]
pub struct AspectRegistry {
    aspects: Vec<Aspect>,
}

impl AspectRegistry {
    /// Builds a registry from exactly one `Aspect` per kind, in any order.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::Config` if an aspect is missing or duplicated.
    pub fn new(aspects: Vec<Aspect>) -> Result<Self> {
        let mut slots: Vec<Option<Aspect>> = AspectKind::ALL.iter().map(|_| None).collect();
        for aspect in aspects {
            let slot = &mut slots[aspect.kind().index()];
            if slot.is_some() {
                return Err(KlisisError::Config(format!(
                    "aspect {} registered twice",
                    aspect.kind()
                )));
            }
            *slot = Some(aspect);
        }

        let aspects = slots
            .into_iter()
            .zip(AspectKind::ALL)
            .map(|(slot, kind)| {
                slot.ok_or_else(|| KlisisError::Config(format!("aspect {kind} missing")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { aspects })
    }

    /// Looks an aspect up by title.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::UnknownAspect` for titles outside the nine.
    pub fn aspect(&self, title: &str) -> Result<&Aspect> {
        Ok(self.get(AspectKind::from_title(title)?))
    }

    pub fn get(&self, kind: AspectKind) -> &Aspect {
        &self.aspects[kind.index()]
    }

    /// All aspects in registry order.
    pub fn all(&self) -> &[Aspect] {
        &self.aspects
    }

    /// Checks that every aspect has the given stage loaded.
    ///
    /// # Errors
    ///
    /// Returns `KlisisError::ModelUnavailable` naming the first aspect without it.
    pub fn require_stage(&self, stage: Stage) -> Result<()> {
        for aspect in &self.aspects {
            aspect.model(stage)?;
        }
        Ok(())
    }
}
