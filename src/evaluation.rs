//! Offline evaluation of tier models.
//!
//! Metrics work with any fitted [`TierModel`]. The synthetic suite trains the
//! sequential classifier on generated revisions whose counts grow with tier,
//! so regressions in training or telescoping show up without real data.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

use crate::dataset::{DatasetError, LabeledRevision, TrainingSet};
use crate::features::{FeatureVector, Preprocessor, EXTENDED_PER_WORD_FEATURES, WORDS};
use crate::model::{
    median_class, ordinal_score, LogisticRegression, ModelError, OrdinalTarget,
    SequentialOrdinalClassifier, TierModel,
};
use crate::tier::{QualityTier, TIER_COUNT};

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("unknown synthetic case `{0}`")]
    UnknownCase(String),
}

// =============================================================================
// Metrics
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrdinalMetrics {
    pub n: usize,
    /// `1 - MAE / (K - 1)`.
    pub ordinal_score: f64,
    pub accuracy: f64,
    pub mean_abs_error: f64,
    /// `confusion[truth][predicted]`.
    pub confusion: Vec<Vec<usize>>,
}

impl OrdinalMetrics {
    pub fn from_predictions(predicted: &[usize], truth: &[usize], n_classes: usize) -> Self {
        let n = predicted.len().min(truth.len());
        let mut confusion = vec![vec![0usize; n_classes]; n_classes];
        let mut hits = 0usize;
        let mut abs_error = 0usize;
        for (p, t) in predicted.iter().zip(truth) {
            if *p < n_classes && *t < n_classes {
                confusion[*t][*p] += 1;
            }
            if p == t {
                hits += 1;
            }
            abs_error += p.abs_diff(*t);
        }
        let (accuracy, mean_abs_error) = if n == 0 {
            (1.0, 0.0)
        } else {
            (hits as f64 / n as f64, abs_error as f64 / n as f64)
        };
        Self {
            n,
            ordinal_score: ordinal_score(&predicted[..n], &truth[..n], n_classes),
            accuracy,
            mean_abs_error,
            confusion,
        }
    }
}

/// Median-rule predictions of `model` scored against `target`.
pub fn evaluate<M: TierModel + ?Sized>(
    model: &M,
    rows: &[FeatureVector],
    target: &OrdinalTarget,
) -> Result<OrdinalMetrics, ModelError> {
    if rows.len() != target.len() {
        return Err(ModelError::InvalidTarget(format!(
            "{} labels for {} rows",
            target.len(),
            rows.len()
        )));
    }
    let predicted = rows
        .iter()
        .map(|row| Ok(median_class(&model.predict_distribution(row)?)))
        .collect::<Result<Vec<_>, ModelError>>()?;
    Ok(OrdinalMetrics::from_predictions(
        &predicted,
        target.codes(),
        model.n_classes(),
    ))
}

// =============================================================================
// Synthetic revisions
// =============================================================================

/// Revisions with 30% multiplicative noise, `per_tier` of each tier.
pub fn synthetic_revisions(per_tier: usize, seed: u64) -> Vec<LabeledRevision> {
    synthetic_revisions_with_noise(per_tier, 0.3, seed)
}

/// Revisions interleaved by tier (Stub, Start, ..., FA, Stub, ...).
///
/// Each count scales with tier and is jittered by a uniform factor in
/// `[1 - noise, 1 + noise]`.
pub fn synthetic_revisions_with_noise(
    per_tier: usize,
    noise: f64,
    seed: u64,
) -> Vec<LabeledRevision> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = noise.clamp(0.0, 0.95);
    let mut out = Vec::with_capacity(per_tier * TIER_COUNT);
    for i in 0..per_tier {
        for tier in QualityTier::ALL {
            let revid = (i * TIER_COUNT + tier.index()) as u64 + 1;
            out.push(LabeledRevision {
                revid: Some(revid),
                title: Some(format!("Synthetic {} {i}", tier.label())),
                wp10: tier.label().to_string(),
                features: synthetic_features(&mut rng, tier, noise),
            });
        }
    }
    out
}

fn synthetic_features(rng: &mut StdRng, tier: QualityTier, noise: f64) -> FeatureVector {
    let t = tier.index() as f64;
    let mut jitter = |value: f64| -> f64 { (value * rng.gen_range(1.0 - noise..=1.0 + noise)).round() };

    let words = jitter(150.0 * 2.2_f64.powf(t)).max(1.0);
    let mut v = FeatureVector::new()
        .with(WORDS, words)
        .with("headings", jitter(1.0 + 2.0 * t))
        .with("sub_headings", jitter(1.5 * t))
        .with("images", jitter(0.5 + t))
        .with("categories", jitter(2.0 + 2.0 * t))
        .with("wikilinks", jitter(words * 0.04))
        .with("external_links", jitter(1.0 + 2.0 * t))
        .with("cite_templates", jitter(2.0 * t * t))
        .with("ref", jitter(words * 0.01 * t))
        .with("backlog_accuracy", jitter((3.0 - t).max(0.0)))
        .with("backlog_content", jitter((2.0 - t).max(0.0)))
        .with("backlog_other", jitter((2.0 - 0.5 * t).max(0.0)))
        .with("backlog_style", jitter((3.0 - t).max(0.0)))
        .with("backlog_links", jitter((1.0 - 0.25 * t).max(0.0)));
    for (k, name) in EXTENDED_PER_WORD_FEATURES.iter().enumerate() {
        v = v.with(*name, jitter((k as f64 + 1.0) * t));
    }
    let coordinates = rng.gen_bool((0.1 + 0.15 * t).min(1.0));
    let infoboxes = rng.gen_bool((0.2 + 0.15 * t).min(1.0));
    v.with("coordinates", f64::from(u8::from(coordinates)))
        .with("infoboxes", f64::from(u8::from(infoboxes)))
}

// =============================================================================
// Synthetic suite
// =============================================================================

#[derive(Debug, Clone)]
pub struct SyntheticCase {
    pub name: &'static str,
    pub per_tier: usize,
    pub noise: f64,
    pub test_fraction: f64,
    pub extended_features: bool,
    pub n_jobs: Option<usize>,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub case_name: String,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train: OrdinalMetrics,
    pub test: OrdinalMetrics,
    pub latency_ms: u128,
}

pub fn synthetic_cases() -> Vec<SyntheticCase> {
    vec![
        SyntheticCase {
            name: "clean_small",
            per_tier: 20,
            noise: 0.1,
            test_fraction: 0.25,
            extended_features: false,
            n_jobs: None,
            seed: 42,
        },
        SyntheticCase {
            name: "standard_200",
            per_tier: 200,
            noise: 0.3,
            test_fraction: 0.2,
            extended_features: false,
            n_jobs: None,
            seed: 43,
        },
        SyntheticCase {
            name: "extended_features_100",
            per_tier: 100,
            noise: 0.3,
            test_fraction: 0.2,
            extended_features: true,
            n_jobs: None,
            seed: 44,
        },
        SyntheticCase {
            name: "noisy_serial_100",
            per_tier: 100,
            noise: 0.7,
            test_fraction: 0.2,
            extended_features: false,
            n_jobs: Some(1),
            seed: 45,
        },
    ]
}

pub fn run_synthetic_suite(filter: Option<&str>) -> Result<Vec<EvaluationResult>, EvaluationError> {
    let cases = synthetic_cases();
    let selected: Vec<SyntheticCase> = match filter {
        Some(name) => cases.into_iter().filter(|c| c.name == name).collect(),
        None => cases,
    };
    if let (Some(name), true) = (filter, selected.is_empty()) {
        return Err(EvaluationError::UnknownCase(name.to_string()));
    }
    selected.iter().map(run_synthetic_case).collect()
}

pub fn run_synthetic_case(case: &SyntheticCase) -> Result<EvaluationResult, EvaluationError> {
    let started = Instant::now();
    let revisions = synthetic_revisions_with_noise(case.per_tier, case.noise, case.seed);
    let preprocessor = if case.extended_features {
        Preprocessor::extended()
    } else {
        Preprocessor::standard()
    };
    let set = TrainingSet::from_revisions(&revisions, &preprocessor)?;
    let (train, test) = set.train_test_split(case.test_fraction, case.seed);

    let mut model =
        SequentialOrdinalClassifier::for_quality_tiers(LogisticRegression::default(), preprocessor.schema())
            .with_jobs(case.n_jobs);
    model.fit(&train.rows, &train.target)?;

    let train_metrics = evaluate(&model, &train.rows, &train.target)?;
    let test_metrics = evaluate(&model, &test.rows, &test.target)?;
    let latency_ms = started.elapsed().as_millis();
    info!(
        case = case.name,
        train_score = train_metrics.ordinal_score,
        test_score = test_metrics.ordinal_score,
        latency_ms = latency_ms as u64,
        "synthetic case finished"
    );

    Ok(EvaluationResult {
        case_name: case.name.to_string(),
        train_rows: train.len(),
        test_rows: test.len(),
        train: train_metrics,
        test: test_metrics,
        latency_ms,
    })
}
