//! Counterfactual edits.
//!
//! A [`CandidateEdit`] is a named [`Perturbation`] of a feature vector that
//! models one small, concrete improvement an editor could make. The
//! [`EditSimulator`] applies every entry of an [`EditCatalog`] to a vector
//! without scoring anything; the [`EditRanker`] scores the results against a
//! model and keeps only edits that raise the expected tier.

pub mod catalog;
pub mod ranker;
pub mod simulator;

use serde::{Deserialize, Serialize};

use crate::features::{per_word, per_word_name, FeatureError, FeatureVector, WORDS};

pub use catalog::{CatalogError, EditCatalog};
pub use ranker::{quality_score, EditRanker, EditRanking, RankedEdit, SkippedEdit};
pub use simulator::{EditSimulator, SimulatedEdit};

/// A pure transformation of one feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Perturbation {
    /// `words += words`, floored at 1.
    AddWords { words: f64 },
    /// `feature += count` (floored at 0) at a cost of `words` extra words.
    AddPerWord {
        feature: String,
        count: f64,
        words: f64,
    },
    /// Force a binary feature to 1.
    SetFlag { feature: String },
    /// Resolve one maintenance-backlog issue, floored at 0.
    ReduceBacklog { feature: String },
}

impl Perturbation {
    /// Perturbed copy of `vector`, with every per-word ratio re-derived.
    pub fn apply(&self, vector: &FeatureVector) -> Result<FeatureVector, FeatureError> {
        let out = match self {
            Perturbation::AddWords { words } => {
                let total = (vector.require(WORDS)? + words).max(1.0);
                vector.clone().with(WORDS, total)
            }
            Perturbation::AddPerWord {
                feature,
                count,
                words,
            } => {
                let total = (vector.require(WORDS)? + words).max(1.0);
                let value = (vector.require(feature)? + count).max(0.0);
                vector
                    .clone()
                    .with(WORDS, total)
                    .with(feature.as_str(), value)
                    .with(per_word_name(feature), per_word(value, total))
            }
            Perturbation::SetFlag { feature } => {
                vector.require(feature)?;
                vector.clone().with(feature.as_str(), 1.0)
            }
            Perturbation::ReduceBacklog { feature } => {
                let value = (vector.require(feature)? - 1.0).max(0.0);
                vector.clone().with(feature.as_str(), value)
            }
        };
        Ok(out.rederive_ratios())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEdit {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
    pub perturbation: Perturbation,
}

impl CandidateEdit {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        perturbation: Perturbation,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            help_url: None,
            perturbation,
        }
    }

    #[must_use]
    pub fn with_help_url(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}
