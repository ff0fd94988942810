//! ChurnLab Runner: pipeline orchestration on top of `churnlab-core`.
//!
//! This crate provides:
//! - `PipelineConfig` loaded from TOML, passed explicitly to every controller
//! - Monthly ingest (seed CSVs → validation → snapshot)
//! - Dataset assembly for training and monitoring
//! - The training/promotion controller and the retraining controller
//! - JSONL experiment log and drift reports

pub mod config;
pub mod dataset;
pub mod error;
pub mod ingest;
pub mod monitoring;
pub mod reporting;
pub mod tracking;
pub mod training;

pub use config::{ConfigError, PipelineConfig};
pub use dataset::{export_parquet, AssembledDataset, DatasetAssembler, DatasetError};
pub use error::StageFailure;
pub use ingest::{ingest_month, IngestError, IngestSummary};
pub use monitoring::{MonitorError, MonitorOutcome, MonitorStage, RetrainingController};
pub use reporting::{write_drift_report, ReportError, ReportPaths};
pub use tracking::{ExperimentLog, RunRecord, TrackingError};
pub use training::{CandidateRun, TrainingController, TrainingError, TrainingOutcome, TrainingStage};

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::NaiveDate;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::TempDir;

    use churnlab_core::store::SnapshotStore;

    use crate::ingest::{ingest_month, SEED_TABLES};

    pub fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub fn seed_dir(month: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../data/seeds")
            .join(month)
    }

    pub fn as_of(month: &str) -> NaiveDate {
        match month {
            "month_000" => date("2024-01-31"),
            "month_001" => date("2024-02-29"),
            other => panic!("no as_of for {other}"),
        }
    }

    /// Copy a seed month into a temp dir, replacing (`Some`) or removing
    /// (`None`) individual files.
    pub fn stage_seeds(month: &str, overrides: &[(&str, Option<&str>)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for table in SEED_TABLES {
            let target = dir.path().join(format!("{table}.csv"));
            match overrides.iter().find(|(t, _)| *t == table) {
                Some((_, Some(content))) => std::fs::write(&target, content).unwrap(),
                Some((_, None)) => {}
                None => {
                    std::fs::copy(seed_dir(month).join(format!("{table}.csv")), &target).unwrap();
                }
            }
        }
        dir
    }

    /// In-memory store with the given months ingested in order.
    pub fn seeded_store(months: &[&str]) -> Arc<SnapshotStore> {
        let store = SnapshotStore::open_in_memory().unwrap();
        for month in months {
            ingest_month(&store, &seed_dir(month), as_of(month)).unwrap();
        }
        Arc::new(store)
    }
}
