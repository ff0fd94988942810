//! Model registry: versioned artifacts with lifecycle stages.
//!
//! The registry is the only shared mutable state between pipeline runs. A
//! stage transition is atomic: readers observe either the old or the new
//! stage assignment, never a mix, so there is never zero or two
//! `Production` versions once one has been promoted.

pub mod sqlite;

pub use sqlite::SqliteRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{DatasetHash, ModelStage, ModelVersion, RunId};
use crate::model::{ChurnClassifier, ModelError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("no model '{name}' in stage {stage}")]
    NoModelInStage { name: String, stage: ModelStage },

    #[error("model '{name}' has no version {version}")]
    VersionNotFound { name: String, version: ModelVersion },

    #[error("stage {stage} of '{name}' is held by {holder}; pass archive_existing to replace it")]
    StageOccupied {
        name: String,
        stage: ModelStage,
        holder: ModelVersion,
    },
}

/// Registry metadata of one model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersionInfo {
    pub name: String,
    pub version: ModelVersion,
    pub stage: ModelStage,
    pub run_id: Option<RunId>,
    pub dataset_hash: Option<DatasetHash>,
    pub metrics: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A model to register.
#[derive(Debug, Clone)]
pub struct NewModel {
    pub name: String,
    pub classifier: ChurnClassifier,
    pub run_id: Option<RunId>,
    pub dataset_hash: Option<DatasetHash>,
    pub metrics: BTreeMap<String, f64>,
}

/// A deserialised artifact with its registry metadata.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub info: ModelVersionInfo,
    pub classifier: ChurnClassifier,
}

pub trait ModelRegistry: Send + Sync {
    /// Highest version of `name` currently in `stage`.
    fn get_latest(
        &self,
        name: &str,
        stage: ModelStage,
    ) -> Result<Option<ModelVersionInfo>, RegistryError>;

    /// Load the artifact of [`ModelRegistry::get_latest`]. Fails with
    /// `NoModelInStage` when the stage is empty.
    fn load(&self, name: &str, stage: ModelStage) -> Result<LoadedModel, RegistryError>;

    /// Store a new version (`max + 1`) in stage `None`.
    fn register(&self, model: NewModel) -> Result<ModelVersionInfo, RegistryError>;

    /// Move `version` to `stage`. With `archive_existing`, other holders of
    /// `stage` are archived in the same transaction.
    fn transition(
        &self,
        name: &str,
        version: ModelVersion,
        stage: ModelStage,
        archive_existing: bool,
    ) -> Result<ModelVersionInfo, RegistryError>;

    /// Every version of `name`, ascending.
    fn list_versions(&self, name: &str) -> Result<Vec<ModelVersionInfo>, RegistryError>;
}

/// Metrics map as logged and registered: `val_auc` is omitted when undefined.
pub fn metric_map(auc: Option<f64>, f1: f64, accuracy: f64) -> BTreeMap<String, f64> {
    let mut m = BTreeMap::new();
    if let Some(auc) = auc {
        m.insert("val_auc".to_string(), auc);
    }
    m.insert("val_f1".to_string(), f1);
    m.insert("val_acc".to_string(), accuracy);
    m
}
