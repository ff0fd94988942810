//! Drift evaluation between two time-sliced feature/label frames.
//!
//! - [`partition_columns`] splits feature columns into numerical and
//!   categorical (text and boolean).
//! - [`DriftService`] compares two frames and returns a JSON summary.
//! - [`DriftEvaluator`] reduces that summary to a [`DriftResult`]: the share of
//!   drifted columns plus the target (label-rate) drift.

pub mod service;
pub mod stats;

pub use service::{ColumnDrift, DriftService, DriftThresholds, StatTest, StatisticalDriftService};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{DriftResult, EVENT_TIMESTAMP, USER_ID};
use crate::frame::{FeatureFrame, ValueKind};

#[derive(Debug, Error)]
pub enum DriftError {
    #[error("drift summary serialization failed: {0}")]
    Summary(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numerical,
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numerical => f.write_str("num"),
            ColumnKind::Categorical => f.write_str("cat"),
        }
    }
}

/// Feature columns split by statistical treatment, in frame order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnPartition {
    pub numerical: Vec<String>,
    pub categorical: Vec<String>,
}

impl ColumnPartition {
    pub fn len(&self) -> usize {
        self.numerical.len() + self.categorical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnKind)> {
        self.numerical
            .iter()
            .map(|c| (c.as_str(), ColumnKind::Numerical))
            .chain(
                self.categorical
                    .iter()
                    .map(|c| (c.as_str(), ColumnKind::Categorical)),
            )
    }
}

/// Text and boolean columns are categorical; every other non-identifier
/// column is numerical.
pub fn partition_columns(frame: &FeatureFrame) -> ColumnPartition {
    let mut partition = ColumnPartition::default();
    for column in &frame.columns {
        if column.name == USER_ID || column.name == EVENT_TIMESTAMP {
            continue;
        }
        match column.kind {
            ValueKind::Text | ValueKind::Bool => partition.categorical.push(column.name.clone()),
            ValueKind::Int | ValueKind::Float => partition.numerical.push(column.name.clone()),
        }
    }
    partition
}

/// `|mean(current) - mean(reference)|` of the label column, or NaN when the
/// column is missing from either frame or has no non-null values.
pub fn compute_target_drift(
    reference: &FeatureFrame,
    current: &FeatureFrame,
    label_column: &str,
) -> f64 {
    let (Some(r), Some(c)) = (reference.column(label_column), current.column(label_column)) else {
        warn!(label_column, "label column absent; target drift not computed");
        return f64::NAN;
    };
    let (Some(ref_rate), Some(cur_rate)) = (
        stats::mean(&r.numeric_values()),
        stats::mean(&c.numeric_values()),
    ) else {
        warn!(label_column, "no labels in one slice; target drift not computed");
        return f64::NAN;
    };
    let drift = (cur_rate - ref_rate).abs();
    info!(ref_rate, cur_rate, target_drift = drift, "target drift");
    drift
}

/// Where a drift share came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareSource {
    /// Read from the summary's drifted-columns metric.
    Reported,
    /// The summary lacked the field; the neutral 0.0 was used.
    Defaulted,
}

/// Drift share found in a service summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractedShare {
    pub share: f64,
    pub source: ShareSource,
}

/// Read the share of drifted columns from a summary: the last metric whose
/// `metric_id` contains `DriftedColumnsCount`, field `value.share`.
pub fn extract_drift_share(summary: &serde_json::Value) -> ExtractedShare {
    let found = summary
        .get("metrics")
        .and_then(|m| m.as_array())
        .into_iter()
        .flatten()
        .filter(|m| {
            m.get("metric_id")
                .and_then(|id| id.as_str())
                .is_some_and(|id| id.contains("DriftedColumnsCount"))
        })
        .filter_map(|m| m.get("value")?.get("share")?.as_f64())
        .last();

    match found {
        Some(share) => ExtractedShare {
            share,
            source: ShareSource::Reported,
        },
        None => {
            warn!("drift summary has no drifted-columns share; defaulting to 0.0");
            ExtractedShare {
                share: 0.0,
                source: ShareSource::Defaulted,
            }
        }
    }
}

/// Full output of one evaluation.
#[derive(Debug, Clone)]
pub struct DriftEvaluation {
    pub result: DriftResult,
    pub share_source: ShareSource,
    pub partition: ColumnPartition,
    pub summary: serde_json::Value,
}

/// Combines a drift service with target-drift computation.
pub struct DriftEvaluator<S: DriftService> {
    service: S,
    label_column: String,
}

impl<S: DriftService> DriftEvaluator<S> {
    pub fn new(service: S, label_column: impl Into<String>) -> Self {
        Self {
            service,
            label_column: label_column.into(),
        }
    }

    pub fn evaluate(
        &self,
        reference: &FeatureFrame,
        current: &FeatureFrame,
    ) -> Result<DriftEvaluation, DriftError> {
        let partition = partition_columns(reference);
        let target_drift = compute_target_drift(reference, current, &self.label_column);
        let summary = self.service.compare(reference, current)?;
        let extracted = extract_drift_share(&summary);

        Ok(DriftEvaluation {
            result: DriftResult {
                drift_share: extracted.share,
                target_drift,
            },
            share_source: extracted.source,
            partition,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{EntityKey, FeatureValue};
    use chrono::NaiveDate;
    use serde_json::json;

    fn labelled(n: usize, churned: usize) -> FeatureFrame {
        let d = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let mut f = FeatureFrame::new((0..n).map(|i| EntityKey::new(format!("u{i}"), d)).collect());
        f.push_column(
            "watch_hours_30d",
            ValueKind::Float,
            (0..n).map(|i| FeatureValue::Float((i % 10) as f64)).collect(),
        )
        .unwrap();
        f.push_column(
            "churn_label",
            ValueKind::Int,
            (0..n).map(|i| FeatureValue::Int(i64::from(i < churned))).collect(),
        )
        .unwrap();
        f
    }

    struct FixedSummary(serde_json::Value);

    impl DriftService for FixedSummary {
        fn compare(&self, _: &FeatureFrame, _: &FeatureFrame) -> Result<serde_json::Value, DriftError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn partition_treats_bool_as_categorical() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let mut f = FeatureFrame::new(vec![EntityKey::new("u1", d)]);
        f.push_column("months_active", ValueKind::Int, vec![FeatureValue::Int(3)]).unwrap();
        f.push_column("paperless_billing", ValueKind::Bool, vec![FeatureValue::Bool(true)]).unwrap();
        f.push_column("net_service", ValueKind::Text, vec![FeatureValue::Text("dsl".into())]).unwrap();
        f.push_column("user_id", ValueKind::Text, vec![FeatureValue::Text("u1".into())]).unwrap();
        let p = partition_columns(&f);
        assert_eq!(p.numerical, vec!["months_active"]);
        assert_eq!(p.categorical, vec!["paperless_billing", "net_service"]);
    }

    #[test]
    fn target_drift_is_rate_difference() {
        let reference = labelled(100, 20);
        let current = labelled(100, 35);
        let drift = compute_target_drift(&reference, &current, "churn_label");
        assert!((drift - 0.15).abs() < 1e-9);
    }

    #[test]
    fn target_drift_nan_without_label() {
        let reference = labelled(10, 2);
        let current = labelled(10, 2).without_column("churn_label");
        assert!(compute_target_drift(&reference, &current, "churn_label").is_nan());
    }

    #[test]
    fn target_drift_nan_when_labels_all_null() {
        let reference = labelled(4, 1);
        let mut current = labelled(4, 1).without_column("churn_label");
        current
            .push_column("churn_label", ValueKind::Int, vec![FeatureValue::Null; 4])
            .unwrap();
        assert!(compute_target_drift(&reference, &current, "churn_label").is_nan());
    }

    #[test]
    fn extract_reads_last_matching_metric() {
        let summary = json!({
            "metrics": [
                {"metric_id": "RowCount", "value": {"reference": 10}},
                {"metric_id": "DriftedColumnsCount(drift_share=0.3)", "value": {"count": 2, "share": 0.4}},
            ]
        });
        let e = extract_drift_share(&summary);
        assert_eq!(e.share, 0.4);
        assert_eq!(e.source, ShareSource::Reported);
    }

    #[test]
    fn extract_defaults_when_field_missing() {
        for summary in [
            json!({}),
            json!({"metrics": []}),
            json!({"metrics": [{"metric_id": "DriftedColumnsCount", "value": {"count": 1}}]}),
        ] {
            let e = extract_drift_share(&summary);
            assert_eq!(e.share, 0.0);
            assert_eq!(e.source, ShareSource::Defaulted);
        }
    }

    #[test]
    fn identical_datasets_have_zero_share() {
        let f = labelled(60, 12);
        let evaluator = DriftEvaluator::new(StatisticalDriftService::default(), "churn_label");
        let eval = evaluator.evaluate(&f, &f).unwrap();
        assert_eq!(eval.result.drift_share, 0.0);
        assert_eq!(eval.result.target_drift, 0.0);
        assert_eq!(eval.share_source, ShareSource::Reported);
    }

    #[test]
    fn evaluator_defaults_on_unexpected_summary() {
        let f = labelled(10, 2);
        let evaluator = DriftEvaluator::new(FixedSummary(json!({"unexpected": true})), "churn_label");
        let eval = evaluator.evaluate(&f, &f).unwrap();
        assert_eq!(eval.result.drift_share, 0.0);
        assert_eq!(eval.share_source, ShareSource::Defaulted);
    }
}
