#![forbid(unsafe_code)]

//! # wikidit
//!
//! Predicts the WP10 quality tier of a Wikipedia article from structural
//! features of its wikitext, and suggests the small edits most likely to
//! raise it.
//!
//! The tier model is a sequential ordinal classifier: one binary estimator
//! per tier boundary answers "is the tier above k?", and the boundary
//! outputs are telescoped into a full distribution over the six tiers. The
//! predicted tier is the median of that distribution. To rank edits, each
//! catalog edit is applied to the feature vector and the change in expected
//! tier index is measured.
//!
//! See `DESIGN.md` for the module map.

pub mod config;
pub mod dataset;
pub mod edits;
pub mod evaluation;
pub mod features;
pub mod model;
pub mod service;
pub mod tier;

pub use config::{load_config, Config, ConfigError, ServiceConfig, TrainingConfig};
pub use dataset::{read_jsonl, write_jsonl, DatasetError, LabeledRevision, TrainingSet};
pub use edits::{
    quality_score, CandidateEdit, EditCatalog, EditRanker, EditRanking, EditSimulator,
    Perturbation, RankedEdit, SimulatedEdit, SkippedEdit,
};
pub use evaluation::{evaluate, run_synthetic_suite, EvaluationResult, OrdinalMetrics};
pub use features::{FeatureError, FeatureSchema, FeatureVector, Preprocessor};
pub use model::{
    load_model, save_model, ArtifactError, BinaryEstimator, LogisticRegression, ModelError,
    OneVsRestOrdinalClassifier, OrdinalTarget, SequentialOrdinalClassifier, TierModel, Voting,
};
pub use service::{ModelHandle, PredictionResult, PredictionService, ServiceError, TierProbability};
pub use tier::{QualityTier, TIER_COUNT};
