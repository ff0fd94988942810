//! Outcome types of the two control loops.
//!
//! Both decisions are pure functions of their inputs and carry no state
//! beyond the registry's stage field.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default drift share at or above which retraining is triggered.
pub const DEFAULT_RETRAIN_THRESHOLD: f64 = 0.3;

/// Outcome of comparing a candidate against production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionDecision {
    Promoted,
    Skipped,
}

impl PromotionDecision {
    pub fn from_flag(promote: bool) -> Self {
        if promote {
            PromotionDecision::Promoted
        } else {
            PromotionDecision::Skipped
        }
    }
}

impl fmt::Display for PromotionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromotionDecision::Promoted => f.write_str("promoted"),
            PromotionDecision::Skipped => f.write_str("skipped"),
        }
    }
}

/// Drift between a reference and a current slice.
///
/// `target_drift` is NaN when the label was not available on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
    pub drift_share: f64,
    pub target_drift: f64,
}

impl DriftResult {
    pub fn has_target_drift(&self) -> bool {
        !self.target_drift.is_nan()
    }
}

/// Outcome of the retraining decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrainingSignal {
    RetrainTriggered,
    NoAction,
}

impl RetrainingSignal {
    /// Retrain iff `drift_share >= threshold` (inclusive).
    ///
    /// A NaN drift share never triggers.
    pub fn decide(drift_share: f64, threshold: f64) -> Self {
        if drift_share >= threshold {
            RetrainingSignal::RetrainTriggered
        } else {
            RetrainingSignal::NoAction
        }
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self, RetrainingSignal::RetrainTriggered)
    }
}

impl fmt::Display for RetrainingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrainingSignal::RetrainTriggered => f.write_str("RETRAIN_TRIGGERED"),
            RetrainingSignal::NoAction => f.write_str("NO_ACTION"),
        }
    }
}
