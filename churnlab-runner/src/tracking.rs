//! Experiment log: append-only JSONL, one record per training or evaluation run.
//!
//! Each line is an independent JSON object, so a partial write only loses
//! that line. Malformed lines are skipped when reading.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use churnlab_core::domain::{DatasetHash, ModelVersion, RunId};
use churnlab_core::model::FeatureSchema;
use churnlab_core::store::AppliedAlignment;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("experiment log io error: {0}")]
    Io(#[from] io::Error),
    #[error("experiment record serialization: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parameters recorded with a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub as_of: NaiveDate,
    pub seed: u64,
    pub test_fraction: f64,
    pub model_type: String,
    pub alignment: Option<AppliedAlignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub experiment: String,
    pub run_id: RunId,
    pub run_name: String,
    pub started_at: DateTime<Utc>,
    pub params: RunParams,
    /// `val_auc` (absent when undefined), `val_f1`, `val_acc`, `train_time_s`.
    pub metrics: BTreeMap<String, f64>,
    pub feature_schema: FeatureSchema,
    pub dataset_hash: DatasetHash,
    pub registered_version: Option<ModelVersion>,
}

/// JSONL experiment log for one experiment name.
#[derive(Debug, Clone)]
pub struct ExperimentLog {
    path: PathBuf,
    experiment: String,
}

impl ExperimentLog {
    pub fn new(path: impl Into<PathBuf>, experiment: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            experiment: experiment.into(),
        }
    }

    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    pub fn append(&self, record: &RunRecord) -> Result<(), TrackingError> {
        let json = serde_json::to_string(record)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()?;
        debug!(run = %record.run_name, run_id = %record.run_id, "run logged");
        Ok(())
    }

    /// Every record of this experiment, in file order.
    pub fn read_all(&self) -> Result<Vec<RunRecord>, TrackingError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = io::BufReader::new(fs::File::open(&self.path)?);
        let mut records = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunRecord>(&line) {
                Ok(r) if r.experiment == self.experiment => records.push(r),
                Ok(_) => {}
                Err(e) => warn!(line = n + 1, error = %e, "skipping malformed experiment record"),
            }
        }
        Ok(records)
    }
}
