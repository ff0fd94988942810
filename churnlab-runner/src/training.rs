//! Training/promotion controller.
//!
//! `TRAIN_CANDIDATE → EVALUATE_PRODUCTION → COMPARE → {PROMOTED | SKIPPED}`
//!
//! The candidate and the production model are scored on the same validation
//! rows: one assembled as-of slice, one seeded stratified split. Promotion
//! moves the candidate to Production and archives the previous holder in a
//! single registry transaction.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, info_span};

use churnlab_core::compare::comparison_reason;
use churnlab_core::domain::{DatasetHash, MetricSnapshot, ModelStage, PromotionDecision, RunId};
use churnlab_core::features::FeatureStore;
use churnlab_core::frame::FeatureFrame;
use churnlab_core::model::{label_vector, stratified_split, ChurnClassifier, MODEL_TYPE};
use churnlab_core::registry::{metric_map, ModelRegistry, NewModel};
use churnlab_core::should_promote;
use churnlab_core::store::{AppliedAlignment, SnapshotStore};

use crate::config::PipelineConfig;
use crate::dataset::DatasetAssembler;
use crate::error::StageFailure;
use crate::tracking::{ExperimentLog, RunParams, RunRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainingStage {
    TrainCandidate,
    EvaluateProduction,
    Compare,
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrainingStage::TrainCandidate => "TRAIN_CANDIDATE",
            TrainingStage::EvaluateProduction => "EVALUATE_PRODUCTION",
            TrainingStage::Compare => "COMPARE",
        })
    }
}

#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct TrainingError {
    pub stage: TrainingStage,
    pub source: StageFailure,
}

impl TrainingError {
    fn at(stage: TrainingStage) -> impl FnOnce(StageFailure) -> Self {
        move |source| Self { stage, source }
    }
}

/// A trained and registered model version.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateRun {
    pub as_of: NaiveDate,
    pub run_id: RunId,
    pub run_name: String,
    pub dataset_hash: DatasetHash,
    pub alignment: Option<AppliedAlignment>,
    pub metrics: MetricSnapshot,
    pub train_time_s: f64,
    pub train_rows: usize,
    pub validation_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub as_of: NaiveDate,
    pub candidate: CandidateRun,
    pub production: MetricSnapshot,
    pub decision: PromotionDecision,
    pub reason: String,
}

pub struct TrainingController<'a> {
    config: &'a PipelineConfig,
    store: &'a SnapshotStore,
    features: &'a dyn FeatureStore,
    registry: &'a dyn ModelRegistry,
    log: ExperimentLog,
}

impl<'a> TrainingController<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        store: &'a SnapshotStore,
        features: &'a dyn FeatureStore,
        registry: &'a dyn ModelRegistry,
    ) -> Self {
        let log = ExperimentLog::new(
            config.tracking.runs_path.clone(),
            config.tracking.experiment.clone(),
        );
        Self {
            config,
            store,
            features,
            registry,
            log,
        }
    }

    /// Train and register a first model (`baseline_{as_of}`) without any
    /// comparison. Promote it with a manual stage transition.
    pub fn train_baseline(&self, as_of: NaiveDate) -> Result<CandidateRun, TrainingError> {
        let _span = info_span!("train_baseline", %as_of).entered();
        let (run, _) = self
            .train_candidate(as_of, "baseline")
            .map_err(TrainingError::at(TrainingStage::TrainCandidate))?;
        Ok(run)
    }

    /// Train a candidate on `as_of`, score production on the same split and
    /// promote the candidate when it wins by more than the configured delta.
    pub fn train_and_compare(&self, as_of: NaiveDate) -> Result<TrainingOutcome, TrainingError> {
        let _span = info_span!("train_and_compare", %as_of).entered();

        let (candidate, validation) = self
            .train_candidate(as_of, "candidate")
            .map_err(TrainingError::at(TrainingStage::TrainCandidate))?;

        let production = self
            .evaluate_production(&validation)
            .map_err(TrainingError::at(TrainingStage::EvaluateProduction))?;

        let (decision, reason) = self
            .compare(&candidate.metrics, &production)
            .map_err(TrainingError::at(TrainingStage::Compare))?;

        info!(
            %as_of,
            candidate = %candidate.metrics.version,
            candidate_auc = ?candidate.metrics.auc,
            production = %production.version,
            production_auc = ?production.auc,
            %decision,
            "training summary"
        );
        Ok(TrainingOutcome {
            as_of,
            candidate,
            production,
            decision,
            reason,
        })
    }

    fn train_candidate(
        &self,
        as_of: NaiveDate,
        run_prefix: &str,
    ) -> Result<(CandidateRun, FeatureFrame), StageFailure> {
        let training = &self.config.training;
        let label = self.config.labels.column.as_str();

        let dataset =
            DatasetAssembler::new(self.store, self.features, self.config).training(as_of)?;
        let labels = label_vector(&dataset.frame, label)?;
        let split = stratified_split(&labels, training.test_fraction, training.seed)?;
        let train = dataset.frame.select_rows(&split.train);
        let validation = dataset.frame.select_rows(&split.validation);

        let run_name = format!("{run_prefix}_{as_of}");
        let started_at = Utc::now();
        let run_id = RunId::derive(&run_name, &dataset.dataset_hash, &started_at.naive_utc());

        let timer = Instant::now();
        let classifier = ChurnClassifier::fit(&train, label, &training.train_params())?;
        let train_time_s = timer.elapsed().as_secs_f64();
        let scores = classifier.evaluate(&validation, label)?;
        let feature_schema = classifier.schema.clone();

        let registered = self.registry.register(NewModel {
            name: self.config.registry.model_name.clone(),
            classifier,
            run_id: Some(run_id.clone()),
            dataset_hash: Some(dataset.dataset_hash.clone()),
            metrics: metric_map(scores.auc, scores.f1, scores.accuracy),
        })?;

        let mut metrics = metric_map(scores.auc, scores.f1, scores.accuracy);
        metrics.insert("train_time_s".into(), train_time_s);
        self.log.append(&RunRecord {
            experiment: self.log.experiment().to_string(),
            run_id: run_id.clone(),
            run_name: run_name.clone(),
            started_at,
            params: RunParams {
                as_of,
                seed: training.seed,
                test_fraction: training.test_fraction,
                model_type: MODEL_TYPE.to_string(),
                alignment: dataset.alignment,
            },
            metrics,
            feature_schema,
            dataset_hash: dataset.dataset_hash.clone(),
            registered_version: Some(registered.version),
        })?;

        info!(
            stage = %TrainingStage::TrainCandidate,
            run = %run_name,
            version = %registered.version,
            auc = ?scores.auc,
            f1 = scores.f1,
            accuracy = scores.accuracy,
            train_rows = train.len(),
            validation_rows = validation.len(),
            dataset = dataset.dataset_hash.short(),
            "candidate registered"
        );

        let run = CandidateRun {
            as_of,
            run_id,
            run_name,
            dataset_hash: dataset.dataset_hash,
            alignment: dataset.alignment,
            metrics: MetricSnapshot {
                auc: scores.auc,
                f1: scores.f1,
                accuracy: scores.accuracy,
                version: registered.version,
            },
            train_time_s,
            train_rows: train.len(),
            validation_rows: validation.len(),
        };
        Ok((run, validation))
    }

    fn evaluate_production(&self, validation: &FeatureFrame) -> Result<MetricSnapshot, StageFailure> {
        let name = &self.config.registry.model_name;
        let production = self.registry.load(name, ModelStage::Production)?;
        let scores = production
            .classifier
            .evaluate(validation, &self.config.labels.column)?;
        info!(
            stage = %TrainingStage::EvaluateProduction,
            version = %production.info.version,
            auc = ?scores.auc,
            f1 = scores.f1,
            accuracy = scores.accuracy,
            "production evaluated"
        );
        Ok(MetricSnapshot {
            auc: scores.auc,
            f1: scores.f1,
            accuracy: scores.accuracy,
            version: production.info.version,
        })
    }

    fn compare(
        &self,
        candidate: &MetricSnapshot,
        production: &MetricSnapshot,
    ) -> Result<(PromotionDecision, String), StageFailure> {
        let delta = self.config.training.promotion_delta;
        let promote = should_promote(candidate.auc, production.auc, delta);
        let reason = comparison_reason(candidate.auc, production.auc, delta);
        if promote {
            self.registry.transition(
                &self.config.registry.model_name,
                candidate.version,
                ModelStage::Production,
                true,
            )?;
        }
        let decision = PromotionDecision::from_flag(promote);
        info!(stage = %TrainingStage::Compare, %decision, %reason, "comparison");
        Ok((decision, reason))
    }
}
