//! Prediction entry point: tier distribution plus ranked edit suggestions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ServiceConfig;
use crate::edits::{
    CatalogError, EditRanker, EditSimulator, RankedEdit, SkippedEdit,
};
use crate::features::{FeatureError, FeatureVector, Preprocessor};
use crate::model::{median_class, LogisticRegression, ModelError, SequentialOrdinalClassifier, TierModel};
use crate::tier::{QualityTier, TIER_COUNT};

/// Shared handle to a fitted tier model.
pub type ModelHandle<E = LogisticRegression> = Arc<SequentialOrdinalClassifier<E>>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("model predicts {found} classes, the service needs {expected}")]
    ClassCount { expected: usize, found: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierProbability {
    pub tier: QualityTier,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// One entry per tier, Stub first.
    pub distribution: Vec<TierProbability>,
    /// Median-rule tier.
    pub best_tier: QualityTier,
    /// Expected tier index in [0, 5].
    pub score: f64,
    /// Every edit with positive delta, best first.
    pub ranked_edits: Vec<RankedEdit>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_edits: Vec<SkippedEdit>,
}

impl PredictionResult {
    pub fn probability(&self, tier: QualityTier) -> f64 {
        self.distribution
            .iter()
            .find(|p| p.tier == tier)
            .map_or(0.0, |p| p.probability)
    }

    /// The first `n` ranked edits whose delta is at least `min_delta`.
    pub fn top_edits(&self, n: usize, min_delta: f64) -> Vec<&RankedEdit> {
        self.ranked_edits
            .iter()
            .filter(|e| e.delta >= min_delta)
            .take(n)
            .collect()
    }
}

/// Immutable after construction; share across threads behind an `Arc`.
pub struct PredictionService<M: TierModel + ?Sized = SequentialOrdinalClassifier<LogisticRegression>> {
    model: Arc<M>,
    preprocessor: Preprocessor,
    simulator: EditSimulator,
    top_n: usize,
    min_display_delta: f64,
}

impl<M: TierModel + ?Sized> PredictionService<M> {
    pub fn new(
        model: Arc<M>,
        preprocessor: Preprocessor,
        simulator: EditSimulator,
    ) -> Result<Self, ServiceError> {
        let found = model.n_classes();
        if found != TIER_COUNT {
            return Err(ServiceError::ClassCount {
                expected: TIER_COUNT,
                found,
            });
        }
        let defaults = ServiceConfig::default();
        Ok(Self {
            model,
            preprocessor,
            simulator,
            top_n: defaults.top_n,
            min_display_delta: defaults.min_display_delta,
        })
    }

    pub fn from_config(
        model: Arc<M>,
        preprocessor: Preprocessor,
        config: &ServiceConfig,
    ) -> Result<Self, ServiceError> {
        let simulator = EditSimulator::new(config.edit_catalog()?);
        let mut service = Self::new(model, preprocessor, simulator)?;
        service.top_n = config.top_n;
        service.min_display_delta = config.min_display_delta;
        Ok(service)
    }

    pub fn model(&self) -> &Arc<M> {
        &self.model
    }

    pub fn simulator(&self) -> &EditSimulator {
        &self.simulator
    }

    /// Tier distribution, median tier, score and ranked edits for one revision.
    pub fn predict(&self, raw: &FeatureVector) -> Result<PredictionResult, ServiceError> {
        let prepared = self.preprocessor.prepare(raw)?;
        let simulated = self.simulator.simulate(&prepared);
        let ranking = EditRanker::new(self.model.as_ref()).rank(&prepared, simulated)?;

        let found = ranking.base_distribution.len();
        if found != TIER_COUNT {
            return Err(ServiceError::ClassCount {
                expected: TIER_COUNT,
                found,
            });
        }
        let best_tier = QualityTier::from_index(median_class(&ranking.base_distribution))
            .ok_or(ServiceError::ClassCount {
                expected: TIER_COUNT,
                found,
            })?;
        let distribution = QualityTier::ALL
            .iter()
            .zip(&ranking.base_distribution)
            .map(|(tier, p)| TierProbability {
                tier: *tier,
                probability: *p,
            })
            .collect();

        debug!(
            best_tier = %best_tier,
            score = ranking.base_score,
            ranked = ranking.ranked.len(),
            skipped = ranking.skipped.len(),
            "prediction complete"
        );
        Ok(PredictionResult {
            distribution,
            best_tier,
            score: ranking.base_score,
            ranked_edits: ranking.ranked,
            skipped_edits: ranking.skipped,
        })
    }

    /// The edits worth showing, per the configured top-N and display threshold.
    pub fn displayed_edits<'r>(&self, result: &'r PredictionResult) -> Vec<&'r RankedEdit> {
        result.top_edits(self.top_n, self.min_display_delta)
    }
}
