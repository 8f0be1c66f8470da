//! JSON configuration for training and serving.
//!
//! Every field has a default, so `{}` is a valid config file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::edits::{CandidateEdit, CatalogError, EditCatalog};
use crate::features::Preprocessor;
use crate::model::LogisticRegression;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("invalid edit catalog: {0}")]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Boundary-fit worker threads; `None` uses every available core.
    #[serde(default)]
    pub n_jobs: Option<usize>,
    #[serde(default = "default_l2")]
    pub l2: f64,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default = "default_tol")]
    pub tol: f64,
    /// Also use `main_templates`, `templates` and `smartlists`.
    #[serde(default)]
    pub extended_features: bool,
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_jobs: None,
            l2: default_l2(),
            max_iter: default_max_iter(),
            tol: default_tol(),
            extended_features: false,
            test_fraction: default_test_fraction(),
            seed: default_seed(),
        }
    }
}

impl TrainingConfig {
    pub fn estimator(&self) -> LogisticRegression {
        LogisticRegression::new(self.l2, self.max_iter, self.tol)
    }

    pub fn preprocessor(&self) -> Preprocessor {
        if self.extended_features {
            Preprocessor::extended()
        } else {
            Preprocessor::standard()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Edits below this delta are hidden from display, not from the ranking.
    #[serde(default = "default_min_display_delta")]
    pub min_display_delta: f64,
    /// Replaces the built-in edit catalog when set.
    #[serde(default)]
    pub catalog: Option<Vec<CandidateEdit>>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            min_display_delta: default_min_display_delta(),
            catalog: None,
        }
    }
}

impl ServiceConfig {
    pub fn edit_catalog(&self) -> Result<EditCatalog, CatalogError> {
        match &self.catalog {
            Some(edits) => EditCatalog::new(edits.clone()),
            None => Ok(EditCatalog::default()),
        }
    }
}

fn default_l2() -> f64 {
    1e-4
}

fn default_max_iter() -> usize {
    100
}

fn default_tol() -> f64 {
    1e-9
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_top_n() -> usize {
    5
}

fn default_min_display_delta() -> f64 {
    0.005
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.training;
        if !(t.l2.is_finite() && t.l2 >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "training.l2 must be finite and >= 0, got {}",
                t.l2
            )));
        }
        if t.max_iter == 0 {
            return Err(ConfigError::Invalid(
                "training.max_iter must be positive".to_string(),
            ));
        }
        if !(t.tol.is_finite() && t.tol > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "training.tol must be positive, got {}",
                t.tol
            )));
        }
        if t.n_jobs == Some(0) {
            return Err(ConfigError::Invalid(
                "training.n_jobs must be positive when set".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&t.test_fraction) {
            return Err(ConfigError::Invalid(format!(
                "training.test_fraction must be in [0, 1), got {}",
                t.test_fraction
            )));
        }
        if !(self.service.min_display_delta.is_finite() && self.service.min_display_delta >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "service.min_display_delta must be finite and >= 0, got {}",
                self.service.min_display_delta
            )));
        }
        self.service.edit_catalog()?;
        Ok(())
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_json::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}
