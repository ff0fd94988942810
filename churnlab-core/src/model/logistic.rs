//! L2-regularised logistic regression fitted by full-batch gradient descent.

use serde::{Deserialize, Serialize};

/// Optimiser settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    /// Weight samples by `n / (2 * n_class)` so both classes contribute equally.
    pub balanced_class_weight: bool,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            epochs: 400,
            learning_rate: 0.1,
            l2: 1e-3,
            balanced_class_weight: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub weights: Vec<f64>,
    pub bias: f64,
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl LogisticRegression {
    /// Fit from zero-initialised weights. Deterministic in its inputs.
    pub fn fit(x: &[Vec<f64>], y: &[bool], params: &TrainParams) -> Self {
        let width = x.first().map_or(0, Vec::len);
        let mut model = Self {
            weights: vec![0.0; width],
            bias: 0.0,
        };
        if x.is_empty() {
            return model;
        }

        let sample_weights = class_weights(y, params.balanced_class_weight);
        let total_weight: f64 = sample_weights.iter().sum();

        let mut grad = vec![0.0; width];
        for _ in 0..params.epochs {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_bias = 0.0;

            for ((row, &label), &w) in x.iter().zip(y).zip(&sample_weights) {
                let err = w * (model.predict_proba(row) - f64::from(u8::from(label)));
                for (g, xi) in grad.iter_mut().zip(row) {
                    *g += err * xi;
                }
                grad_bias += err;
            }

            for (wj, g) in model.weights.iter_mut().zip(&grad) {
                *wj -= params.learning_rate * (g / total_weight + params.l2 * *wj);
            }
            model.bias -= params.learning_rate * grad_bias / total_weight;
        }
        model
    }

    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let z: f64 = self
            .weights
            .iter()
            .zip(row)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        sigmoid(z)
    }
}

fn class_weights(y: &[bool], balanced: bool) -> Vec<f64> {
    if !balanced {
        return vec![1.0; y.len()];
    }
    let n = y.len() as f64;
    let pos = y.iter().filter(|&&l| l).count() as f64;
    let neg = n - pos;
    y.iter()
        .map(|&l| {
            let count = if l { pos } else { neg };
            n / (2.0 * count)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learns_separable_data() {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![if i < 20 { -1.0 } else { 1.0 }]).collect();
        let y: Vec<bool> = (0..40).map(|i| i >= 20).collect();
        let model = LogisticRegression::fit(&x, &y, &TrainParams::default());
        assert!(model.predict_proba(&[1.0]) > 0.8);
        assert!(model.predict_proba(&[-1.0]) < 0.2);
    }

    #[test]
    fn deterministic() {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![(i % 7) as f64, (i % 3) as f64]).collect();
        let y: Vec<bool> = (0..30).map(|i| i % 4 == 0).collect();
        let p = TrainParams::default();
        assert_eq!(LogisticRegression::fit(&x, &y, &p), LogisticRegression::fit(&x, &y, &p));
    }

    #[test]
    fn balanced_weights_sum_to_n() {
        let y = [true, false, false, false];
        let w = class_weights(&y, true);
        assert!((w.iter().sum::<f64>() - 4.0).abs() < 1e-12);
        assert!((w[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn sigmoid_is_stable() {
        assert!((sigmoid(-800.0)).abs() < 1e-300);
        assert!((sigmoid(800.0) - 1.0).abs() < 1e-12);
    }
}
