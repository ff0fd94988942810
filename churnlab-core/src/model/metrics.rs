//! Binary classification metrics.

use serde::{Deserialize, Serialize};

/// Validation metrics of one model on one slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub auc: Option<f64>,
    pub f1: f64,
    pub accuracy: f64,
}

impl ClassificationMetrics {
    /// Score probabilities against labels, predicting positive at `p >= 0.5`.
    pub fn evaluate(labels: &[bool], probabilities: &[f64]) -> Self {
        let predictions: Vec<bool> = probabilities.iter().map(|p| *p >= 0.5).collect();
        Self {
            auc: roc_auc(labels, probabilities),
            f1: f1_score(labels, &predictions),
            accuracy: accuracy(labels, &predictions),
        }
    }
}

/// Area under the ROC curve via the rank-sum statistic, with average ranks
/// for tied scores. `None` when only one class is present.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    let n = labels.len().min(scores.len());
    let positives = labels[..n].iter().filter(|&&l| l).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks i+1..=j+1 share their average.
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            if labels[idx] {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let p = positives as f64;
    let u = rank_sum_pos - p * (p + 1.0) / 2.0;
    Some(u / (p * negatives as f64))
}

/// F1 of the positive class; 0.0 when there are no true positives.
pub fn f1_score(labels: &[bool], predictions: &[bool]) -> f64 {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;
    for (&y, &p) in labels.iter().zip(predictions) {
        match (y, p) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    if tp == 0 {
        return 0.0;
    }
    2.0 * tp as f64 / (2 * tp + fp + fn_) as f64
}

pub fn accuracy(labels: &[bool], predictions: &[bool]) -> f64 {
    let n = labels.len().min(predictions.len());
    if n == 0 {
        return 0.0;
    }
    let correct = labels.iter().zip(predictions).filter(|(y, p)| y == p).count();
    correct as f64 / n as f64
}
