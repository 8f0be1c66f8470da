//! Sequential (cumulative-boundary) ordinal classifier.
//!
//! Boundary k is trained on every row with label `tier > k`. At inference the
//! boundary outputs `log P(tier > k)` are telescoped into per-tier log
//! probabilities:
//!
//! ```text
//! P(0)   = 1 - P(>0)
//! P(k)   = P(>k-1) - P(>k)        0 < k < K-1
//! P(K-1) = P(>K-2)
//! ```
//!
//! Boundaries are fitted independently, so their outputs need not be
//! monotone; negative differences are clamped to zero and the row is
//! renormalized.

use std::borrow::Cow;
use std::f64::consts::LN_2;

use tracing::{info, warn};

use crate::features::{FeatureSchema, FeatureVector};
use crate::tier::{QualityTier, TIER_COUNT};

use super::{
    design_matrix, fit_boundaries, median_class, ordinal_score, validate_training,
    BinaryEstimator, BoundaryTask, ModelError, OrdinalTarget, TierModel,
};

/// Telescoped log distribution for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Telescoped {
    pub log_proba: Vec<f64>,
    /// True when a boundary output fell outside [0, 1] or the boundaries
    /// were not monotone and probabilities had to be clamped.
    pub clamped: bool,
}

/// `ln(1 - e^d)` for `d <= 0`.
fn log1mexp(d: f64) -> f64 {
    if d > -LN_2 {
        (-d.exp_m1()).ln()
    } else {
        (-d.exp()).ln_1p()
    }
}

/// `ln(e^a - e^b)`, or `None` when `b > a`.
fn log_diff_exp(a: f64, b: f64) -> Option<f64> {
    if b > a {
        return None;
    }
    if b == f64::NEG_INFINITY {
        return Some(a);
    }
    if a == b {
        return Some(f64::NEG_INFINITY);
    }
    Some(a + log1mexp(b - a))
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Telescope K-1 boundary log probabilities `log P(tier > k)` into K
/// normalized per-tier log probabilities.
pub fn telescope_log_proba(boundary_log_proba: &[f64]) -> Telescoped {
    let mut clamped = false;
    let mut out = Vec::with_capacity(boundary_log_proba.len() + 1);

    // log P(tier > -1) = log 1
    let mut prev = 0.0;
    for &raw in boundary_log_proba {
        let cur = if raw.is_nan() {
            clamped = true;
            f64::NEG_INFINITY
        } else if raw > 0.0 {
            clamped = true;
            0.0
        } else {
            raw
        };
        let slot = match log_diff_exp(prev, cur) {
            Some(v) => v,
            None => {
                clamped = true;
                f64::NEG_INFINITY
            }
        };
        out.push(slot);
        prev = cur;
    }
    out.push(prev);

    let total = log_sum_exp(&out);
    if !total.is_finite() {
        let uniform = -(out.len() as f64).ln();
        return Telescoped {
            log_proba: vec![uniform; out.len()],
            clamped: true,
        };
    }
    for v in &mut out {
        *v = (*v - total).min(0.0);
    }
    Telescoped {
        log_proba: out,
        clamped,
    }
}

// ---------------------------------------------------------------------
//  Classifier
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SequentialOrdinalClassifier<E> {
    base: E,
    schema: FeatureSchema,
    n_classes: usize,
    n_jobs: Option<usize>,
    estimators: Option<Vec<E>>,
}

impl<E: BinaryEstimator + Clone> SequentialOrdinalClassifier<E> {
    /// Unfitted classifier over `n_classes` ordered categories.
    pub fn new(base: E, schema: FeatureSchema, n_classes: usize) -> Result<Self, ModelError> {
        if n_classes < 2 {
            return Err(ModelError::ClassCount {
                expected: 2,
                found: n_classes,
            });
        }
        Ok(Self {
            base,
            schema,
            n_classes,
            n_jobs: None,
            estimators: None,
        })
    }

    /// Unfitted classifier over the six WP10 tiers.
    pub fn for_quality_tiers(base: E, schema: FeatureSchema) -> Self {
        Self {
            base,
            schema,
            n_classes: TIER_COUNT,
            n_jobs: None,
            estimators: None,
        }
    }

    /// Rebuild a fitted classifier from its boundary estimators.
    pub fn from_fitted(
        base: E,
        schema: FeatureSchema,
        estimators: Vec<E>,
    ) -> Result<Self, ModelError> {
        let n_classes = estimators.len() + 1;
        let mut model = Self::new(base, schema, n_classes)?;
        model.estimators = Some(estimators);
        Ok(model)
    }

    /// Worker count for boundary fits; `None` uses every available core.
    #[must_use]
    pub fn with_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn fit(&mut self, rows: &[FeatureVector], target: &OrdinalTarget) -> Result<(), ModelError> {
        validate_training(rows, target, self.n_classes)?;
        let x = design_matrix(&self.schema, rows)?;

        let tasks: Vec<BoundaryTask<'_>> = (0..self.n_classes - 1)
            .map(|k| BoundaryTask {
                x: Cow::Borrowed(&x),
                y: target.codes().iter().map(|&c| c > k).collect(),
            })
            .collect();

        let estimators = fit_boundaries(&self.base, &tasks, self.n_jobs)?;
        info!(
            rows = rows.len(),
            boundaries = estimators.len(),
            features = self.schema.len(),
            "fitted sequential ordinal classifier"
        );
        self.estimators = Some(estimators);
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        self.estimators.is_some()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// The unfitted template cloned for each boundary.
    pub fn base(&self) -> &E {
        &self.base
    }

    pub fn estimators(&self) -> Result<&[E], ModelError> {
        self.estimators.as_deref().ok_or(ModelError::NotFitted)
    }

    /// `log P(tier > k)` for each row, boundaries in order.
    pub fn boundary_log_proba(&self, rows: &[FeatureVector]) -> Result<Vec<Vec<f64>>, ModelError> {
        let estimators = self.estimators()?;
        let x = design_matrix(&self.schema, rows)?;

        let mut per_row = vec![Vec::with_capacity(estimators.len()); rows.len()];
        for (boundary, estimator) in estimators.iter().enumerate() {
            let column = estimator
                .predict_log_proba(&x)
                .map_err(|source| ModelError::Boundary { boundary, source })?;
            for (row, value) in per_row.iter_mut().zip(column) {
                row.push(value);
            }
        }
        Ok(per_row)
    }

    pub fn predict_log_proba(&self, rows: &[FeatureVector]) -> Result<Vec<Vec<f64>>, ModelError> {
        let boundaries = self.boundary_log_proba(rows)?;
        let mut clamped_rows = 0usize;
        let out = boundaries
            .iter()
            .map(|b| {
                let t = telescope_log_proba(b);
                if t.clamped {
                    clamped_rows += 1;
                }
                t.log_proba
            })
            .collect();
        if clamped_rows > 0 {
            warn!(
                rows = clamped_rows,
                "telescoped tier probabilities fell outside [0, 1] and were clamped"
            );
        }
        Ok(out)
    }

    pub fn predict_proba(&self, rows: &[FeatureVector]) -> Result<Vec<Vec<f64>>, ModelError> {
        Ok(self
            .predict_log_proba(rows)?
            .into_iter()
            .map(|row| row.into_iter().map(f64::exp).collect())
            .collect())
    }

    /// Median-rule class codes.
    pub fn predict(&self, rows: &[FeatureVector]) -> Result<Vec<usize>, ModelError> {
        Ok(self
            .predict_proba(rows)?
            .iter()
            .map(|p| median_class(p))
            .collect())
    }

    /// Median-rule tiers; only valid for a six-tier model.
    pub fn predict_tiers(&self, rows: &[FeatureVector]) -> Result<Vec<QualityTier>, ModelError> {
        if self.n_classes != TIER_COUNT {
            return Err(ModelError::ClassCount {
                expected: TIER_COUNT,
                found: self.n_classes,
            });
        }
        Ok(self
            .predict(rows)?
            .into_iter()
            .filter_map(QualityTier::from_index)
            .collect())
    }

    /// Normalized ordinal accuracy in [0, 1].
    pub fn score(&self, rows: &[FeatureVector], target: &OrdinalTarget) -> Result<f64, ModelError> {
        if rows.len() != target.len() {
            return Err(ModelError::InvalidTarget(format!(
                "{} labels for {} rows",
                target.len(),
                rows.len()
            )));
        }
        let predicted = self.predict(rows)?;
        Ok(ordinal_score(&predicted, target.codes(), self.n_classes))
    }
}

impl<E: BinaryEstimator + Clone> TierModel for SequentialOrdinalClassifier<E> {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_distribution(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        let mut rows = self.predict_proba(std::slice::from_ref(features))?;
        rows.pop().ok_or(ModelError::NotFitted)
    }
}
