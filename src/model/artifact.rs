//! Persisted model artifacts.
//!
//! A trained [`SequentialOrdinalClassifier`] is written as a single JSON
//! document holding the schema, the unfitted base estimator and one fitted
//! estimator per boundary. A blake3 fingerprint over the schema and
//! estimators is checked on load. Floats round-trip exactly, so a loaded
//! model reproduces `predict_proba` bit for bit.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::features::FeatureSchema;

use super::{BinaryEstimator, ModelError, SequentialOrdinalClassifier};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact<E> {
    pub format_version: u32,
    pub created_at_ms: i64,
    pub n_classes: usize,
    pub schema: FeatureSchema,
    pub base: E,
    pub estimators: Vec<E>,
    pub fingerprint: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported artifact format version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("artifact fingerprint mismatch: stored {stored}, computed {computed}")]
    Fingerprint { stored: String, computed: String },
    #[error("artifact declares {declared} classes but holds {estimators} boundary estimators")]
    Shape { declared: usize, estimators: usize },
    #[error(transparent)]
    Model(#[from] ModelError),
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn fingerprint<E: Serialize>(
    schema: &FeatureSchema,
    estimators: &[E],
) -> Result<String, serde_json::Error> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&serde_json::to_vec(schema)?);
    hasher.update(b"\n");
    hasher.update(&serde_json::to_vec(estimators)?);
    Ok(hasher.finalize().to_hex().to_string())
}

impl<E> ModelArtifact<E>
where
    E: BinaryEstimator + Clone + Serialize + DeserializeOwned,
{
    pub fn from_model(model: &SequentialOrdinalClassifier<E>) -> Result<Self, ArtifactError> {
        let estimators = model.estimators()?.to_vec();
        let fingerprint = fingerprint(model.schema(), &estimators)?;
        Ok(Self {
            format_version: FORMAT_VERSION,
            created_at_ms: now_epoch_ms(),
            n_classes: model.n_classes(),
            schema: model.schema().clone(),
            base: model.base().clone(),
            estimators,
            fingerprint,
        })
    }

    /// Verify the artifact and rebuild the fitted classifier.
    pub fn into_model(self) -> Result<SequentialOrdinalClassifier<E>, ArtifactError> {
        if self.format_version != FORMAT_VERSION {
            return Err(ArtifactError::Version {
                found: self.format_version,
                expected: FORMAT_VERSION,
            });
        }
        if self.estimators.len() + 1 != self.n_classes {
            return Err(ArtifactError::Shape {
                declared: self.n_classes,
                estimators: self.estimators.len(),
            });
        }
        let computed = fingerprint(&self.schema, &self.estimators)?;
        if computed != self.fingerprint {
            return Err(ArtifactError::Fingerprint {
                stored: self.fingerprint,
                computed,
            });
        }
        Ok(SequentialOrdinalClassifier::from_fitted(
            self.base,
            self.schema,
            self.estimators,
        )?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub fn save_model<E>(
    model: &SequentialOrdinalClassifier<E>,
    path: impl AsRef<Path>,
) -> Result<(), ArtifactError>
where
    E: BinaryEstimator + Clone + Serialize + DeserializeOwned,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let bytes = ModelArtifact::from_model(model)?.to_bytes()?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn load_model<E>(path: impl AsRef<Path>) -> Result<SequentialOrdinalClassifier<E>, ArtifactError>
where
    E: BinaryEstimator + Clone + Serialize + DeserializeOwned,
{
    let bytes = std::fs::read(path)?;
    ModelArtifact::<E>::from_bytes(&bytes)?.into_model()
}
