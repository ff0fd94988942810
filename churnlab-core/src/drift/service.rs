//! Statistical drift-report service.
//!
//! Produces a JSON summary in the report layout the evaluator reads:
//! a `metrics` array of `{metric_id, value}` entries (dataset-level drifted
//! column count and share, and a per-label value drift) plus per-column
//! results.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stats::{jensen_shannon_distance, ks_p_value, ks_statistic};
use super::{partition_columns, ColumnKind, DriftError};
use crate::frame::{FeatureFrame, FrameColumn};

/// Per-column drift decision thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftThresholds {
    /// Numerical columns drift when the KS p-value is below this.
    pub numeric_p_value: f64,
    /// Categorical columns drift when the Jensen–Shannon distance exceeds this.
    pub categorical_distance: f64,
    /// Dataset-level drift flag when the drifted share reaches this.
    pub dataset_drift_share: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            numeric_p_value: 0.05,
            categorical_distance: 0.1,
            dataset_drift_share: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatTest {
    Ks,
    JensenShannon,
}

/// Outcome of the comparison of one matched column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub column: String,
    pub kind: ColumnKind,
    pub stat_test: StatTest,
    /// p-value (KS) or distance (Jensen–Shannon); `None` with insufficient data.
    pub score: Option<f64>,
    pub threshold: f64,
    pub drifted: bool,
    pub reference_values: usize,
    pub current_values: usize,
}

/// Anything that can compare two slices and summarise the drift as JSON.
pub trait DriftService: Send + Sync {
    fn compare(
        &self,
        reference: &FeatureFrame,
        current: &FeatureFrame,
    ) -> Result<serde_json::Value, DriftError>;
}

/// KS test on numerical columns, Jensen–Shannon distance on categorical ones.
#[derive(Debug, Clone, Default)]
pub struct StatisticalDriftService {
    pub thresholds: DriftThresholds,
    /// Column whose value drift is reported separately (usually the label).
    pub value_drift_column: Option<String>,
}

impl StatisticalDriftService {
    pub fn new(thresholds: DriftThresholds) -> Self {
        Self {
            thresholds,
            value_drift_column: None,
        }
    }

    pub fn with_value_drift(mut self, column: impl Into<String>) -> Self {
        self.value_drift_column = Some(column.into());
        self
    }

    /// Compare every column present in both frames.
    pub fn column_drifts(&self, reference: &FeatureFrame, current: &FeatureFrame) -> Vec<ColumnDrift> {
        let partition = partition_columns(reference);
        let matched: Vec<(&FrameColumn, &FrameColumn, ColumnKind)> = partition
            .iter()
            .filter_map(|(name, kind)| {
                let r = reference.column(name)?;
                let c = current.column(name)?;
                Some((r, c, kind))
            })
            .collect();

        matched
            .par_iter()
            .map(|(r, c, kind)| self.column_drift(r, c, *kind))
            .collect()
    }

    fn column_drift(&self, reference: &FrameColumn, current: &FrameColumn, kind: ColumnKind) -> ColumnDrift {
        match kind {
            ColumnKind::Numerical => {
                let (a, b) = (reference.numeric_values(), current.numeric_values());
                let score = ks_statistic(&a, &b).map(|d| ks_p_value(d, a.len(), b.len()));
                let threshold = self.thresholds.numeric_p_value;
                ColumnDrift {
                    column: reference.name.clone(),
                    kind,
                    stat_test: StatTest::Ks,
                    score,
                    threshold,
                    drifted: score.is_some_and(|p| p < threshold),
                    reference_values: a.len(),
                    current_values: b.len(),
                }
            }
            ColumnKind::Categorical => {
                let (a, b) = (reference.category_values(), current.category_values());
                let score = jensen_shannon_distance(&a, &b);
                let threshold = self.thresholds.categorical_distance;
                ColumnDrift {
                    column: reference.name.clone(),
                    kind,
                    stat_test: StatTest::JensenShannon,
                    score,
                    threshold,
                    drifted: score.is_some_and(|d| d > threshold),
                    reference_values: a.len(),
                    current_values: b.len(),
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct MetricEntry {
    metric_id: String,
    value: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct Summary {
    metrics: Vec<MetricEntry>,
    dataset_drift: bool,
    reference_rows: usize,
    current_rows: usize,
    columns: Vec<ColumnDrift>,
}

impl DriftService for StatisticalDriftService {
    fn compare(
        &self,
        reference: &FeatureFrame,
        current: &FeatureFrame,
    ) -> Result<serde_json::Value, DriftError> {
        let columns = self.column_drifts(reference, current);
        let drifted = columns.iter().filter(|c| c.drifted).count();
        let share = if columns.is_empty() {
            0.0
        } else {
            drifted as f64 / columns.len() as f64
        };
        debug!(columns = columns.len(), drifted, share, "column drift computed");

        let mut metrics = vec![
            MetricEntry {
                metric_id: "RowCount".into(),
                value: serde_json::json!({
                    "reference": reference.len(),
                    "current": current.len(),
                }),
            },
            MetricEntry {
                metric_id: format!(
                    "DriftedColumnsCount(drift_share={})",
                    self.thresholds.dataset_drift_share
                ),
                value: serde_json::json!({ "count": drifted, "share": share }),
            },
        ];
        if let Some(label) = &self.value_drift_column {
            if let Some(col) = columns.iter().find(|c| &c.column == label) {
                metrics.push(MetricEntry {
                    metric_id: format!("ValueDrift(column={label})"),
                    value: serde_json::json!(col.score),
                });
            }
        }

        let summary = Summary {
            metrics,
            dataset_drift: share >= self.thresholds.dataset_drift_share,
            reference_rows: reference.len(),
            current_rows: current.len(),
            columns,
        };
        Ok(serde_json::to_value(summary)?)
    }
}
