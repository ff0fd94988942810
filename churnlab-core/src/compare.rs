//! Metric comparator: decides whether a candidate replaces production.
//!
//! Gate order:
//! 1. Candidate AUC missing or NaN → never promote (nothing to evaluate).
//! 2. Production AUC missing or NaN → promote (bootstrap).
//! 3. Otherwise promote iff `new_auc > prod_auc + delta` (ties do not promote).

/// Default minimum AUC improvement over production.
pub const DEFAULT_PROMOTION_DELTA: f64 = 0.01;

/// Whether a candidate with `new_auc` should replace a production model
/// scoring `prod_auc`. Total over all inputs; never panics.
pub fn should_promote(new_auc: Option<f64>, prod_auc: Option<f64>, delta: f64) -> bool {
    let new_auc = match new_auc {
        Some(auc) if !auc.is_nan() => auc,
        _ => return false,
    };
    match prod_auc {
        Some(prod) if !prod.is_nan() => new_auc > prod + delta,
        _ => true,
    }
}

/// Human-readable reason for a comparison outcome, for logs and summaries.
pub fn comparison_reason(new_auc: Option<f64>, prod_auc: Option<f64>, delta: f64) -> String {
    match (new_auc.filter(|a| !a.is_nan()), prod_auc.filter(|a| !a.is_nan())) {
        (None, _) => "candidate AUC unavailable".into(),
        (Some(new), None) => format!("no production AUC; bootstrap promotion of {new:.4}"),
        (Some(new), Some(prod)) => {
            if should_promote(Some(new), Some(prod), delta) {
                format!("{new:.4} > {prod:.4} + {delta:.4}")
            } else {
                format!("{new:.4} <= {prod:.4} + {delta:.4}")
            }
        }
    }
}
