//! One-vs-rest ordinal classifier.
//!
//! Boundary k is trained only on rows whose tier is at least k, so it learns
//! the conditional `q_k = P(tier > k | tier >= k)`. Predictions combine the
//! boundaries by voting:
//! - hard: the tier is the number of boundaries voting "above";
//! - soft: the continuation-ratio distribution
//!   `P(k) = q_0 * ... * q_{k-1} * (1 - q_k)`, argmax.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::features::{FeatureSchema, FeatureVector};

use super::sequential::Telescoped;
use super::{
    design_matrix, fit_boundaries, ordinal_score, validate_training, BinaryEstimator,
    BoundaryTask, ModelError, OrdinalTarget, TierModel,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voting {
    #[default]
    Soft,
    Hard,
}

#[derive(Debug, Clone)]
pub struct OneVsRestOrdinalClassifier<E> {
    base: E,
    schema: FeatureSchema,
    n_classes: usize,
    n_jobs: Option<usize>,
    voting: Voting,
    estimators: Option<Vec<E>>,
}

/// Continuation-ratio distribution from conditional log probabilities.
fn continuation_log_proba(conditional: &[f64]) -> Telescoped {
    let mut clamped = false;
    let mut out = Vec::with_capacity(conditional.len() + 1);
    let mut reached = 0.0; // log P(tier >= k)
    for &raw in conditional {
        let lq = if raw.is_nan() {
            clamped = true;
            f64::NEG_INFINITY
        } else if raw > 0.0 {
            clamped = true;
            0.0
        } else {
            raw
        };
        // log(1 - q)
        let stop = if lq == 0.0 {
            f64::NEG_INFINITY
        } else {
            (-lq.exp()).ln_1p()
        };
        out.push(reached + stop);
        reached += lq;
    }
    out.push(reached);
    Telescoped {
        log_proba: out,
        clamped,
    }
}

impl<E: BinaryEstimator + Clone> OneVsRestOrdinalClassifier<E> {
    pub fn new(
        base: E,
        schema: FeatureSchema,
        n_classes: usize,
        voting: Voting,
    ) -> Result<Self, ModelError> {
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
            voting,
            estimators: None,
        })
    }

    #[must_use]
    pub fn with_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn voting(&self) -> Voting {
        self.voting
    }

    pub fn is_fitted(&self) -> bool {
        self.estimators.is_some()
    }

    pub fn fit(&mut self, rows: &[FeatureVector], target: &OrdinalTarget) -> Result<(), ModelError> {
        validate_training(rows, target, self.n_classes)?;
        let x = design_matrix(&self.schema, rows)?;

        let tasks: Vec<BoundaryTask<'_>> = (0..self.n_classes - 1)
            .map(|k| {
                let keep: Vec<usize> = target
                    .codes()
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| **c >= k)
                    .map(|(i, _)| i)
                    .collect();
                if keep.is_empty() {
                    // Nothing reaches this tier: learn "never above" from all rows.
                    BoundaryTask {
                        x: Cow::Borrowed(&x),
                        y: vec![false; rows.len()],
                    }
                } else {
                    BoundaryTask {
                        x: Cow::Owned(x.select_rows(keep.iter())),
                        y: keep.iter().map(|&i| target.codes()[i] > k).collect(),
                    }
                }
            })
            .collect();

        let estimators = fit_boundaries(&self.base, &tasks, self.n_jobs)?;
        info!(
            rows = rows.len(),
            boundaries = estimators.len(),
            voting = ?self.voting,
            "fitted one-vs-rest ordinal classifier"
        );
        self.estimators = Some(estimators);
        Ok(())
    }

    /// `log P(tier > k | tier >= k)` per row, boundaries in order.
    fn conditional_log_proba(&self, rows: &[FeatureVector]) -> Result<Vec<Vec<f64>>, ModelError> {
        let estimators = self.estimators.as_deref().ok_or(ModelError::NotFitted)?;
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

    /// Soft-voting distribution per row.
    pub fn predict_proba(&self, rows: &[FeatureVector]) -> Result<Vec<Vec<f64>>, ModelError> {
        Ok(self
            .conditional_log_proba(rows)?
            .iter()
            .map(|c| {
                continuation_log_proba(c)
                    .log_proba
                    .into_iter()
                    .map(f64::exp)
                    .collect()
            })
            .collect())
    }

    pub fn predict(&self, rows: &[FeatureVector]) -> Result<Vec<usize>, ModelError> {
        match self.voting {
            Voting::Hard => Ok(self
                .conditional_log_proba(rows)?
                .iter()
                .map(|c| {
                    c.iter()
                        .filter(|lq| **lq >= 0.5_f64.ln())
                        .count()
                        .min(self.n_classes - 1)
                })
                .collect()),
            Voting::Soft => Ok(self
                .predict_proba(rows)?
                .iter()
                .map(|p| argmax(p))
                .collect()),
        }
    }

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

/// First index of the maximum.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

impl<E: BinaryEstimator + Clone> TierModel for OneVsRestOrdinalClassifier<E> {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_distribution(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        let mut rows = self.predict_proba(std::slice::from_ref(features))?;
        rows.pop().ok_or(ModelError::NotFitted)
    }
}
