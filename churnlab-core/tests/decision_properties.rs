//! Property tests for the pure decision functions.
//!
//! Uses proptest to verify:
//! 1. Bootstrap: no production AUC promotes any real candidate
//! 2. Missing candidate never promotes
//! 3. Numeric inputs promote exactly when `new > prod + delta`
//! 4. Retraining fires exactly when `drift_share >= threshold`

use churnlab_core::compare::should_promote;
use churnlab_core::domain::{PromotionDecision, RetrainingSignal};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_auc() -> impl Strategy<Value = f64> {
    0.0..=1.0_f64
}

fn arb_missing() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![Just(None), Just(Some(f64::NAN))]
}

fn arb_delta() -> impl Strategy<Value = f64> {
    0.0..0.2_f64
}

// ── 1. Bootstrap ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn bootstrap_promotes_any_candidate(new in arb_auc(), prod in arb_missing(), delta in arb_delta()) {
        prop_assert!(should_promote(Some(new), prod, delta));
    }
}

// ── 2. Missing candidate ─────────────────────────────────────────────

proptest! {
    #[test]
    fn missing_candidate_never_promotes(
        new in arb_missing(),
        prod in prop::option::of(arb_auc()),
        delta in arb_delta(),
    ) {
        prop_assert!(!should_promote(new, prod, delta));
    }
}

// ── 3. Strict margin ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn numeric_inputs_use_strict_margin(new in arb_auc(), prod in arb_auc(), delta in arb_delta()) {
        prop_assert_eq!(should_promote(Some(new), Some(prod), delta), new > prod + delta);
    }

    #[test]
    fn decision_is_deterministic(new in arb_auc(), prod in arb_auc(), delta in arb_delta()) {
        let a = PromotionDecision::from_flag(should_promote(Some(new), Some(prod), delta));
        let b = PromotionDecision::from_flag(should_promote(Some(new), Some(prod), delta));
        prop_assert_eq!(a, b);
    }
}

// ── 4. Retraining threshold ──────────────────────────────────────────

proptest! {
    #[test]
    fn retrain_iff_share_reaches_threshold(share in 0.0..=1.0_f64, threshold in 0.0..=1.0_f64) {
        let signal = RetrainingSignal::decide(share, threshold);
        prop_assert_eq!(signal.is_triggered(), share >= threshold);
    }
}

#[test]
fn documented_examples() {
    assert!(should_promote(Some(0.80), Some(0.78), 0.01));
    assert!(!should_promote(Some(0.785), Some(0.78), 0.01));
    assert!(!should_promote(Some(0.79), Some(0.78), 0.01));
    assert!(!should_promote(None, None, 0.01));
    assert_eq!(RetrainingSignal::decide(0.3, 0.3), RetrainingSignal::RetrainTriggered);
    assert_eq!(RetrainingSignal::decide(0.29, 0.3), RetrainingSignal::NoAction);
}
