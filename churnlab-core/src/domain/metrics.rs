use serde::{Deserialize, Serialize};

use super::ModelVersion;

/// Validation metrics of one model version on one as-of slice.
///
/// `auc` is `None` when it cannot be computed (single-class validation set).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub auc: Option<f64>,
    pub f1: f64,
    pub accuracy: f64,
    pub version: ModelVersion,
}
