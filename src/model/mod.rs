//! Ordinal tier models.
//!
//! Two classifiers are provided:
//! - [`SequentialOrdinalClassifier`]: K-1 boundary estimators, each trained on
//!   every row to answer "tier > k?", telescoped into a full distribution.
//!   This is the model the edit ranker uses.
//! - [`OneVsRestOrdinalClassifier`]: boundary k trained only on rows with
//!   tier >= k, combined by hard or soft voting.
//!
//! Both take any [`BinaryEstimator`] as the per-boundary model.

pub mod artifact;
pub mod estimator;
pub mod sequential;
pub mod voting;

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use nalgebra::DMatrix;
use rayon::prelude::*;
use tracing::debug;

use crate::features::{FeatureError, FeatureSchema, FeatureVector};
use crate::tier::{QualityTier, TIER_COUNT};

pub use artifact::{load_model, save_model, ArtifactError, ModelArtifact};
pub use estimator::{BinaryEstimator, EstimatorError, LogisticRegression};
pub use sequential::{telescope_log_proba, SequentialOrdinalClassifier, Telescoped};
pub use voting::{OneVsRestOrdinalClassifier, Voting};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid ordinal target: {0}")]
    InvalidTarget(String),
    #[error("model has not been fitted")]
    NotFitted,
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error("boundary {boundary} estimator failed: {source}")]
    Boundary {
        boundary: usize,
        #[source]
        source: EstimatorError,
    },
    #[error("model has {found} classes, expected {expected}")]
    ClassCount { expected: usize, found: usize },
    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

/// A fitted model producing a distribution over ordered classes.
pub trait TierModel: Send + Sync {
    fn n_classes(&self) -> usize;

    /// Per-class probabilities for one feature vector, in class order.
    fn predict_distribution(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError>;
}

// ---------------------------------------------------------------------
//  Ordinal targets
// ---------------------------------------------------------------------

/// Class codes over a fixed, ordered category set `0..n_classes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinalTarget {
    codes: Vec<usize>,
    n_classes: usize,
}

impl OrdinalTarget {
    pub fn new(codes: Vec<usize>, n_classes: usize) -> Result<Self, ModelError> {
        if n_classes < 2 {
            return Err(ModelError::InvalidTarget(format!(
                "an ordinal target needs at least 2 categories, got {n_classes}"
            )));
        }
        if let Some(bad) = codes.iter().find(|c| **c >= n_classes) {
            return Err(ModelError::InvalidTarget(format!(
                "code {bad} is outside the category set 0..{n_classes}"
            )));
        }
        Ok(Self { codes, n_classes })
    }

    pub fn from_tiers(tiers: &[QualityTier]) -> Self {
        Self {
            codes: tiers.iter().map(|t| t.index()).collect(),
            n_classes: TIER_COUNT,
        }
    }

    /// Parse WP10 labels (`"Stub"`, `"GA"`, ...).
    pub fn parse_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self, ModelError> {
        let tiers = labels
            .iter()
            .map(|label| {
                label
                    .as_ref()
                    .parse::<QualityTier>()
                    .map_err(|e| ModelError::InvalidTarget(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_tiers(&tiers))
    }

    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Number of distinct classes actually observed.
    pub fn distinct(&self) -> usize {
        self.codes.iter().collect::<BTreeSet<_>>().len()
    }

    /// Restrict to the given row indices.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            codes: indices.iter().map(|&i| self.codes[i]).collect(),
            n_classes: self.n_classes,
        }
    }
}

/// Training checks shared by both ordinal classifiers.
fn validate_training(
    rows: &[FeatureVector],
    target: &OrdinalTarget,
    n_classes: usize,
) -> Result<(), ModelError> {
    if target.n_classes() != n_classes {
        return Err(ModelError::InvalidTarget(format!(
            "target has {} categories, model expects {n_classes}",
            target.n_classes()
        )));
    }
    if rows.len() != target.len() {
        return Err(ModelError::InvalidTarget(format!(
            "{} labels for {} rows",
            target.len(),
            rows.len()
        )));
    }
    let distinct = target.distinct();
    if distinct < 2 {
        return Err(ModelError::InvalidTarget(format!(
            "need at least 2 distinct tiers to fit, found {distinct}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------
//  Shared numerics
// ---------------------------------------------------------------------

/// Rows of `vectors` laid out in `schema` column order.
pub fn design_matrix(
    schema: &FeatureSchema,
    vectors: &[FeatureVector],
) -> Result<DMatrix<f64>, FeatureError> {
    let mut data = Vec::with_capacity(vectors.len() * schema.len());
    for vector in vectors {
        data.extend(schema.row(vector)?);
    }
    Ok(DMatrix::from_row_slice(vectors.len(), schema.len(), &data))
}

/// Median rule: the first class whose cumulative probability reaches 0.5.
pub fn median_class(distribution: &[f64]) -> usize {
    let mut cdf = 0.0;
    for (k, p) in distribution.iter().enumerate() {
        cdf += p;
        if cdf >= 0.5 {
            return k;
        }
    }
    distribution.len().saturating_sub(1)
}

/// `1 - mean(|pred - truth|) / (K - 1)`: 1.0 is perfect, 0.0 is maximally wrong.
pub fn ordinal_score(predicted: &[usize], truth: &[usize], n_classes: usize) -> f64 {
    if predicted.is_empty() || n_classes < 2 {
        return 1.0;
    }
    let total: usize = predicted
        .iter()
        .zip(truth.iter())
        .map(|(p, t)| p.abs_diff(*t))
        .sum();
    let mae = total as f64 / predicted.len() as f64;
    1.0 - mae / (n_classes - 1) as f64
}

pub fn available_parallelism_or_one() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Training rows and binary labels for one boundary.
pub(crate) struct BoundaryTask<'a> {
    pub x: Cow<'a, DMatrix<f64>>,
    pub y: Vec<bool>,
}

/// Fit an independent clone of `base` per task on a dedicated worker pool.
///
/// Output order matches task order.
pub(crate) fn fit_boundaries<E>(
    base: &E,
    tasks: &[BoundaryTask<'_>],
    n_jobs: Option<usize>,
) -> Result<Vec<E>, ModelError>
where
    E: BinaryEstimator + Clone,
{
    let threads = n_jobs
        .unwrap_or_else(available_parallelism_or_one)
        .clamp(1, tasks.len().max(1));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| ModelError::WorkerPool(e.to_string()))?;

    pool.install(|| {
        tasks
            .par_iter()
            .enumerate()
            .map(|(boundary, task)| {
                let mut estimator = base.clone();
                estimator
                    .fit(&task.x, &task.y)
                    .map_err(|source| ModelError::Boundary { boundary, source })?;
                debug!(
                    boundary,
                    rows = task.y.len(),
                    positives = task.y.iter().filter(|v| **v).count(),
                    "fitted boundary estimator"
                );
                Ok(estimator)
            })
            .collect::<Result<Vec<_>, ModelError>>()
    })
}
