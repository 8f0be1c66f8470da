//! Binary estimators used at each tier boundary.
//!
//! Any type implementing [`BinaryEstimator`] can sit at a boundary; the
//! ordinal classifiers clone the supplied template once per boundary.

use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::function::logistic::logistic;

/// Ridge added to the Newton system when Cholesky fails, in escalation order.
const RIDGE_LADDER: [f64; 5] = [0.0, 1e-10, 1e-8, 1e-6, 1e-4];

/// Maximum step halvings in the backtracking line search.
const MAX_HALVINGS: usize = 40;

/// Columns with a spread below this are centred but not scaled.
const MIN_SCALE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EstimatorError {
    #[error("estimator has not been fitted")]
    NotFitted,
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("got {labels} labels for {rows} rows")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("expected {expected} feature columns, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// A probabilistic binary classifier: `P(label = true | row)`.
pub trait BinaryEstimator: Send + Sync {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[bool]) -> Result<(), EstimatorError>;

    /// Positive-class probability per row.
    fn predict_proba(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, EstimatorError>;

    /// Positive-class log probability per row.
    ///
    /// Estimators that can compute this directly should override it; the
    /// default takes the log of [`BinaryEstimator::predict_proba`].
    fn predict_log_proba(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, EstimatorError> {
        Ok(self.predict_proba(x)?.into_iter().map(f64::ln).collect())
    }
}

/// `ln(1 + e^z)` without overflow.
pub(crate) fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

// ---------------------------------------------------------------------
//  Logistic regression
// ---------------------------------------------------------------------

/// L2-penalised logistic regression fitted by Newton's method (IRLS).
///
/// Features are standardised internally; the intercept is not penalised.
/// When a boundary sees a single class the model keeps zero weights and a
/// smoothed prior intercept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub l2: f64,
    pub max_iter: usize,
    pub tol: f64,
    #[serde(default)]
    fitted: Option<LogisticFit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LogisticFit {
    mean: Vec<f64>,
    scale: Vec<f64>,
    coef: Vec<f64>,
    intercept: f64,
    iterations: usize,
    converged: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(1e-4, 100, 1e-9)
    }
}

impl LogisticRegression {
    pub fn new(l2: f64, max_iter: usize, tol: f64) -> Self {
        Self {
            l2: l2.max(0.0),
            max_iter,
            tol,
            fitted: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Newton iterations used by the last fit.
    pub fn iterations(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.iterations)
    }

    pub fn converged(&self) -> Option<bool> {
        self.fitted.as_ref().map(|f| f.converged)
    }

    fn decision(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, EstimatorError> {
        let fit = self.fitted.as_ref().ok_or(EstimatorError::NotFitted)?;
        if x.ncols() != fit.coef.len() {
            return Err(EstimatorError::DimensionMismatch {
                expected: fit.coef.len(),
                found: x.ncols(),
            });
        }
        Ok((0..x.nrows())
            .map(|i| {
                let mut eta = fit.intercept;
                for j in 0..x.ncols() {
                    eta += fit.coef[j] * (x[(i, j)] - fit.mean[j]) / fit.scale[j];
                }
                eta
            })
            .collect())
    }
}

/// Standardised design matrix with a trailing intercept column.
fn augmented_design(x: &DMatrix<f64>, mean: &[f64], scale: &[f64]) -> DMatrix<f64> {
    let (n, d) = (x.nrows(), x.ncols());
    DMatrix::from_fn(n, d + 1, |i, j| {
        if j == d {
            1.0
        } else {
            (x[(i, j)] - mean[j]) / scale[j]
        }
    })
}

fn column_moments(x: &DMatrix<f64>) -> (Vec<f64>, Vec<f64>) {
    let n = x.nrows() as f64;
    let mut mean = Vec::with_capacity(x.ncols());
    let mut scale = Vec::with_capacity(x.ncols());
    for col in x.column_iter() {
        let m = col.sum() / n;
        let var = col.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n;
        let sd = var.sqrt();
        mean.push(m);
        scale.push(if sd > MIN_SCALE { sd } else { 1.0 });
    }
    (mean, scale)
}

struct Objective<'a> {
    z: &'a DMatrix<f64>,
    y: &'a DVector<f64>,
    l2: f64,
}

impl Objective<'_> {
    /// Mean log loss plus the ridge penalty on the non-intercept weights.
    fn value(&self, beta: &DVector<f64>) -> f64 {
        let eta = self.z * beta;
        let n = self.y.len() as f64;
        let loss: f64 = eta
            .iter()
            .zip(self.y.iter())
            .map(|(e, y)| softplus(*e) - y * e)
            .sum::<f64>()
            / n;
        let d = beta.len() - 1;
        let penalty: f64 = beta.rows(0, d).iter().map(|b| b * b).sum();
        loss + 0.5 * self.l2 * penalty
    }

    fn gradient_and_hessian(&self, beta: &DVector<f64>) -> (DVector<f64>, DMatrix<f64>) {
        let eta = self.z * beta;
        let n = self.y.len();
        let p = DVector::from_iterator(n, eta.iter().map(|e| logistic(*e)));
        let resid = &p - self.y;
        let inv_n = 1.0 / n as f64;

        let mut grad = self.z.transpose() * resid * inv_n;
        let mut weighted = self.z.clone();
        for i in 0..n {
            let w = (p[i] * (1.0 - p[i])).max(1e-12);
            weighted.row_mut(i).scale_mut(w);
        }
        let mut hess = self.z.transpose() * weighted * inv_n;

        let d = beta.len() - 1;
        for j in 0..d {
            grad[j] += self.l2 * beta[j];
            hess[(j, j)] += self.l2;
        }
        (grad, hess)
    }
}

fn newton_direction(hess: &DMatrix<f64>, grad: &DVector<f64>) -> Option<DVector<f64>> {
    for ridge in RIDGE_LADDER {
        let mut h = hess.clone();
        if ridge > 0.0 {
            for d in 0..h.nrows() {
                h[(d, d)] += ridge;
            }
        }
        if let Some(chol) = Cholesky::new(h) {
            return Some(chol.solve(grad));
        }
    }
    None
}

impl BinaryEstimator for LogisticRegression {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[bool]) -> Result<(), EstimatorError> {
        let n = x.nrows();
        if n == 0 {
            return Err(EstimatorError::EmptyTrainingSet);
        }
        if y.len() != n {
            return Err(EstimatorError::LengthMismatch {
                rows: n,
                labels: y.len(),
            });
        }

        let d = x.ncols();
        let (mean, scale) = column_moments(x);
        let positives = y.iter().filter(|v| **v).count();
        let prior = (positives as f64 + 0.5) / (n as f64 + 1.0);

        let mut beta = DVector::<f64>::zeros(d + 1);
        beta[d] = (prior / (1.0 - prior)).ln();

        if positives == 0 || positives == n {
            self.fitted = Some(LogisticFit {
                mean,
                scale,
                coef: vec![0.0; d],
                intercept: beta[d],
                iterations: 0,
                converged: true,
            });
            return Ok(());
        }

        let z = augmented_design(x, &mean, &scale);
        let target = DVector::from_iterator(n, y.iter().map(|v| if *v { 1.0 } else { 0.0 }));
        let objective = Objective {
            z: &z,
            y: &target,
            l2: self.l2,
        };

        let mut converged = false;
        let mut iterations = 0;
        let mut current = objective.value(&beta);
        for iter in 0..self.max_iter {
            iterations = iter + 1;
            let (grad, hess) = objective.gradient_and_hessian(&beta);
            if grad.amax() < self.tol {
                converged = true;
                break;
            }
            let Some(step) = newton_direction(&hess, &grad) else {
                break;
            };

            let slope = grad.dot(&step);
            let mut t = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_HALVINGS {
                let candidate = &beta - &step * t;
                let value = objective.value(&candidate);
                if value.is_finite() && value <= current - 1e-4 * t * slope {
                    accepted = Some((candidate, value));
                    break;
                }
                t *= 0.5;
            }
            let Some((next, value)) = accepted else {
                // No descent left at machine precision.
                converged = true;
                break;
            };
            let improvement = current - value;
            beta = next;
            current = value;
            if improvement.abs() < self.tol * self.tol {
                converged = true;
                break;
            }
        }

        self.fitted = Some(LogisticFit {
            mean,
            scale,
            coef: beta.rows(0, d).iter().copied().collect(),
            intercept: beta[d],
            iterations,
            converged,
        });
        Ok(())
    }

    fn predict_proba(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, EstimatorError> {
        Ok(self.decision(x)?.into_iter().map(logistic).collect())
    }

    fn predict_log_proba(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, EstimatorError> {
        Ok(self
            .decision(x)?
            .into_iter()
            .map(|eta| -softplus(-eta))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[f64]) -> DMatrix<f64> {
        DMatrix::from_column_slice(values.len(), 1, values)
    }

    #[test]
    fn separates_a_one_dimensional_threshold() {
        let x = column(&[1.0, 2.0, 3.0, 11.0, 12.0, 13.0]);
        let y = [false, false, false, true, true, true];
        let mut lr = LogisticRegression::default();
        lr.fit(&x, &y).unwrap();

        let p = lr.predict_proba(&x).unwrap();
        for (pi, yi) in p.iter().zip(y.iter()) {
            assert_eq!(*pi > 0.5, *yi, "p={pi} y={yi}");
        }
        assert_eq!(lr.converged(), Some(true));
    }

    #[test]
    fn log_proba_matches_log_of_proba() {
        let x = column(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let y = [false, true, false, true, true, true];
        let mut lr = LogisticRegression::default();
        lr.fit(&x, &y).unwrap();

        let p = lr.predict_proba(&x).unwrap();
        let lp = lr.predict_log_proba(&x).unwrap();
        for (a, b) in p.iter().zip(lp.iter()) {
            assert!((a.ln() - b).abs() < 1e-12);
        }
    }

    #[test]
    fn single_class_uses_smoothed_prior() {
        let x = column(&[1.0, 2.0, 3.0]);
        let mut lr = LogisticRegression::default();
        lr.fit(&x, &[false, false, false]).unwrap();
        let p = lr.predict_proba(&column(&[100.0])).unwrap();
        assert!((p[0] - 0.5 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_unfitted_and_mismatched_input() {
        let lr = LogisticRegression::default();
        assert_eq!(
            lr.predict_proba(&column(&[1.0])).unwrap_err(),
            EstimatorError::NotFitted
        );

        let mut lr = LogisticRegression::default();
        assert_eq!(
            lr.fit(&column(&[1.0, 2.0]), &[true]).unwrap_err(),
            EstimatorError::LengthMismatch { rows: 2, labels: 1 }
        );
        lr.fit(&column(&[1.0, 2.0]), &[true, false]).unwrap();
        let wide = DMatrix::<f64>::zeros(1, 3);
        assert!(matches!(
            lr.predict_proba(&wide),
            Err(EstimatorError::DimensionMismatch { expected: 1, found: 3 })
        ));
    }
}
