//! Pipeline configuration, loaded from TOML.
//!
//! Every key has a default, so an empty file (or no file) is a valid
//! configuration. Controllers receive a `PipelineConfig` at construction
//! and never read the environment.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use churnlab_core::domain::{CHURN_LABEL, DEFAULT_RETRAIN_THRESHOLD};
use churnlab_core::drift::DriftThresholds;
use churnlab_core::features::FeatureRef;
use churnlab_core::model::TrainParams;
use churnlab_core::store::LabelAlignment;
use churnlab_core::DEFAULT_PROMOTION_DELTA;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub store: StoreConfig,
    pub registry: RegistryConfig,
    pub tracking: TrackingConfig,
    pub features: FeaturesConfig,
    pub labels: LabelsConfig,
    pub training: TrainingConfig,
    pub monitoring: MonitoringConfig,
    pub serving: ServingConfig,
    pub ingest: IngestConfig,
}

impl PipelineConfig {
    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.training;
        if !(t.test_fraction > 0.0 && t.test_fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "training.test_fraction must be in (0, 1), got {}",
                t.test_fraction
            )));
        }
        if !t.promotion_delta.is_finite() || t.promotion_delta < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "training.promotion_delta must be a non-negative number, got {}",
                t.promotion_delta
            )));
        }
        if t.epochs == 0 {
            return Err(ConfigError::Invalid("training.epochs must be positive".into()));
        }
        if !(t.learning_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "training.learning_rate must be positive, got {}",
                t.learning_rate
            )));
        }
        if t.l2 < 0.0 {
            return Err(ConfigError::Invalid("training.l2 must be >= 0".into()));
        }

        let m = &self.monitoring;
        for (key, value) in [
            ("retrain_threshold", m.retrain_threshold),
            ("dataset_drift_share", m.dataset_drift_share),
            ("numeric_p_value", m.numeric_p_value),
            ("categorical_distance", m.categorical_distance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "monitoring.{key} must be in [0, 1], got {value}"
                )));
            }
        }

        if self.features.refs.is_empty() {
            return Err(ConfigError::Invalid("features.refs must not be empty".into()));
        }
        for r in &self.features.refs {
            r.resolve()
                .map_err(|e| ConfigError::Invalid(format!("features.refs: {e}")))?;
        }
        if self.labels.column.trim().is_empty() {
            return Err(ConfigError::Invalid("labels.column must not be empty".into()));
        }
        if self.registry.model_name.trim().is_empty() {
            return Err(ConfigError::Invalid("registry.model_name must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/churnlab.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub path: PathBuf,
    pub model_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/registry.db"),
            model_name: "streamflow_churn".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub experiment: String,
    pub runs_path: PathBuf,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            experiment: "streamflow".into(),
            runs_path: PathBuf::from("runs/experiments.jsonl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub refs: Vec<FeatureRef>,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            refs: FeatureRef::defaults(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelsConfig {
    pub alignment: LabelAlignment,
    pub column: String,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            alignment: LabelAlignment::default(),
            column: CHURN_LABEL.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub seed: u64,
    pub test_fraction: f64,
    /// Minimum AUC gain over production required to promote.
    pub promotion_delta: f64,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub balanced_class_weight: bool,
}

impl TrainingConfig {
    pub fn train_params(&self) -> TrainParams {
        TrainParams {
            epochs: self.epochs,
            learning_rate: self.learning_rate,
            l2: self.l2,
            balanced_class_weight: self.balanced_class_weight,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let params = TrainParams::default();
        Self {
            seed: 42,
            test_fraction: 0.25,
            promotion_delta: DEFAULT_PROMOTION_DELTA,
            epochs: params.epochs,
            learning_rate: params.learning_rate,
            l2: params.l2,
            balanced_class_weight: params.balanced_class_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Drift share at or above which retraining is triggered.
    pub retrain_threshold: f64,
    pub dataset_drift_share: f64,
    pub numeric_p_value: f64,
    pub categorical_distance: f64,
    pub report_dir: PathBuf,
}

impl MonitoringConfig {
    pub fn thresholds(&self) -> DriftThresholds {
        DriftThresholds {
            numeric_p_value: self.numeric_p_value,
            categorical_distance: self.categorical_distance,
            dataset_drift_share: self.dataset_drift_share,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        let t = DriftThresholds::default();
        Self {
            retrain_threshold: DEFAULT_RETRAIN_THRESHOLD,
            dataset_drift_share: t.dataset_drift_share,
            numeric_p_value: t.numeric_p_value,
            categorical_distance: t.categorical_distance,
            report_dir: PathBuf::from("reports/drift"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServingConfig {
    pub bind: String,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub seed_dir: PathBuf,
    pub as_of: NaiveDate,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            seed_dir: PathBuf::from("data/seeds/month_000"),
            as_of: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap_or_default(),
        }
    }
}
