//! Retraining controller.
//!
//! `FETCH_REFERENCE → FETCH_CURRENT → COMPUTE_DRIFT → DECIDE →
//! {RETRAIN_TRIGGERED | NO_ACTION}`
//!
//! Only the drift share gates the decision. Target drift is computed when
//! both slices carry labels and is reported alongside it.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, info_span};

use churnlab_core::domain::{DriftResult, RetrainingSignal};
use churnlab_core::drift::{DriftEvaluation, DriftEvaluator, ShareSource, StatisticalDriftService};
use churnlab_core::features::FeatureStore;
use churnlab_core::store::{AppliedAlignment, SnapshotStore};

use crate::config::PipelineConfig;
use crate::dataset::{AssembledDataset, DatasetAssembler};
use crate::error::StageFailure;
use crate::reporting::{write_drift_report, ReportContext, ReportPaths};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorStage {
    FetchReference,
    FetchCurrent,
    ComputeDrift,
    Decide,
}

impl fmt::Display for MonitorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MonitorStage::FetchReference => "FETCH_REFERENCE",
            MonitorStage::FetchCurrent => "FETCH_CURRENT",
            MonitorStage::ComputeDrift => "COMPUTE_DRIFT",
            MonitorStage::Decide => "DECIDE",
        })
    }
}

#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct MonitorError {
    pub stage: MonitorStage,
    pub source: StageFailure,
}

impl MonitorError {
    fn at<E: Into<StageFailure>>(stage: MonitorStage) -> impl FnOnce(E) -> Self {
        move |e| Self {
            stage,
            source: e.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorOutcome {
    pub reference: NaiveDate,
    pub current: NaiveDate,
    pub result: DriftResult,
    pub share_source: ShareSource,
    pub threshold: f64,
    pub signal: RetrainingSignal,
    pub reference_alignment: Option<AppliedAlignment>,
    pub current_alignment: Option<AppliedAlignment>,
    pub report: ReportPaths,
}

impl MonitorOutcome {
    /// One-line decision message, e.g. for the CLI.
    pub fn message(&self) -> String {
        let cmp = if self.signal.is_triggered() { ">=" } else { "<" };
        let target = if self.result.has_target_drift() {
            format!("{:.4}", self.result.target_drift)
        } else {
            "NaN".to_string()
        };
        format!(
            "{} drift_share={:.2} {cmp} {:.2} (target_drift={target})",
            self.signal, self.result.drift_share, self.threshold
        )
    }
}

pub struct RetrainingController<'a> {
    config: &'a PipelineConfig,
    store: &'a SnapshotStore,
    features: &'a dyn FeatureStore,
}

impl<'a> RetrainingController<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        store: &'a SnapshotStore,
        features: &'a dyn FeatureStore,
    ) -> Self {
        Self {
            config,
            store,
            features,
        }
    }

    pub fn run(&self, reference: NaiveDate, current: NaiveDate) -> Result<MonitorOutcome, MonitorError> {
        let _span = info_span!("monitor", %reference, %current).entered();
        let assembler = DatasetAssembler::new(self.store, self.features, self.config);

        let reference_ds = assembler
            .monitoring(reference)
            .map_err(MonitorError::at(MonitorStage::FetchReference))?;
        info!(stage = %MonitorStage::FetchReference, rows = reference_ds.frame.len(), "slice ready");

        let current_ds = assembler
            .monitoring(current)
            .map_err(MonitorError::at(MonitorStage::FetchCurrent))?;
        info!(stage = %MonitorStage::FetchCurrent, rows = current_ds.frame.len(), "slice ready");

        let threshold = self.config.monitoring.retrain_threshold;
        let evaluation = self
            .compute_drift(&reference_ds, &current_ds)
            .map_err(MonitorError::at(MonitorStage::ComputeDrift))?;

        let signal = RetrainingSignal::decide(evaluation.result.drift_share, threshold);

        let context = ReportContext {
            reference_as_of: reference,
            current_as_of: current,
            reference_alignment: reference_ds.alignment,
            current_alignment: current_ds.alignment,
            retrain_threshold: threshold,
            signal,
        };
        let report = write_drift_report(&self.config.monitoring.report_dir, &context, &evaluation)
            .map_err(MonitorError::at(MonitorStage::Decide))?;

        let outcome = MonitorOutcome {
            reference,
            current,
            result: evaluation.result,
            share_source: evaluation.share_source,
            threshold,
            signal,
            reference_alignment: reference_ds.alignment,
            current_alignment: current_ds.alignment,
            report,
        };
        info!(stage = %MonitorStage::Decide, decision = %outcome.message(), "monitoring complete");
        Ok(outcome)
    }

    fn compute_drift(
        &self,
        reference: &AssembledDataset,
        current: &AssembledDataset,
    ) -> Result<DriftEvaluation, StageFailure> {
        let label = self.config.labels.column.as_str();
        let service = StatisticalDriftService::new(self.config.monitoring.thresholds())
            .with_value_drift(label);
        let evaluation = DriftEvaluator::new(service, label).evaluate(&reference.frame, &current.frame)?;
        info!(
            stage = %MonitorStage::ComputeDrift,
            drift_share = evaluation.result.drift_share,
            target_drift = evaluation.result.target_drift,
            numerical = evaluation.partition.numerical.len(),
            categorical = evaluation.partition.categorical.len(),
            "drift computed"
        );
        Ok(evaluation)
    }
}
