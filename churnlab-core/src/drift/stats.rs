//! Two-sample statistics used by the drift service.

use std::collections::BTreeMap;

/// Two-sample Kolmogorov–Smirnov statistic `D = sup |F_a(x) - F_b(x)|`.
///
/// Returns `None` when either sample is empty. NaNs are ignored.
pub fn ks_statistic(a: &[f64], b: &[f64]) -> Option<f64> {
    let mut a: Vec<f64> = a.iter().copied().filter(|v| !v.is_nan()).collect();
    let mut b: Vec<f64> = b.iter().copied().filter(|v| !v.is_nan()).collect();
    if a.is_empty() || b.is_empty() {
        return None;
    }
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);

    let (n, m) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n - j as f64 / m).abs());
    }
    Some(d)
}

/// Asymptotic p-value of a two-sample KS statistic (Kolmogorov distribution
/// with the Stephens small-sample correction).
pub fn ks_p_value(d: f64, n: usize, m: usize) -> f64 {
    if n == 0 || m == 0 || d <= 0.0 {
        return 1.0;
    }
    let en = ((n * m) as f64 / (n + m) as f64).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * d;
    kolmogorov_q(lambda)
}

/// `Q_KS(λ) = 2 Σ_{j≥1} (-1)^{j-1} exp(-2 j² λ²)`, clamped to `[0, 1]`.
fn kolmogorov_q(lambda: f64) -> f64 {
    const EPS1: f64 = 1e-6;
    const EPS2: f64 = 1e-16;

    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut prev_term: f64 = 0.0;
    for j in 1..=100 {
        let term = fac * (a2 * (j * j) as f64).exp();
        sum += term;
        if term.abs() <= EPS1 * prev_term || term.abs() <= EPS2 * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        prev_term = term.abs();
    }
    // Series did not converge: λ is tiny, distributions are indistinguishable.
    1.0
}

/// Jensen–Shannon distance (base 2, in `[0, 1]`) between the category
/// frequency distributions of two samples. `None` when either is empty.
pub fn jensen_shannon_distance(reference: &[String], current: &[String]) -> Option<f64> {
    if reference.is_empty() || current.is_empty() {
        return None;
    }
    let mut counts: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for c in reference {
        counts.entry(c.as_str()).or_default().0 += 1.0;
    }
    for c in current {
        counts.entry(c.as_str()).or_default().1 += 1.0;
    }

    let (n, m) = (reference.len() as f64, current.len() as f64);
    let mut divergence = 0.0;
    for (p, q) in counts.values() {
        let (p, q) = (p / n, q / m);
        let mid = 0.5 * (p + q);
        if p > 0.0 {
            divergence += 0.5 * p * (p / mid).log2();
        }
        if q > 0.0 {
            divergence += 0.5 * q * (q / mid).log2();
        }
    }
    Some(divergence.max(0.0).sqrt())
}

/// Mean of the non-NaN values, `None` when there are none.
pub fn mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cats(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ks_identical_samples() {
        let a = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(ks_statistic(&a, &a), Some(0.0));
        assert_eq!(ks_p_value(0.0, 4, 4), 1.0);
    }

    #[test]
    fn ks_disjoint_samples() {
        let a: Vec<f64> = (0..200).map(f64::from).collect();
        let b: Vec<f64> = (1000..1200).map(f64::from).collect();
        let d = ks_statistic(&a, &b).unwrap();
        assert!((d - 1.0).abs() < 1e-12);
        assert!(ks_p_value(d, a.len(), b.len()) < 1e-6);
    }

    #[test]
    fn ks_handles_ties() {
        let a = [1.0, 1.0, 2.0, 2.0];
        let b = [1.0, 2.0, 2.0, 2.0];
        let d = ks_statistic(&a, &b).unwrap();
        assert!((d - 0.25).abs() < 1e-12);
    }

    #[test]
    fn ks_empty_sample() {
        assert_eq!(ks_statistic(&[], &[1.0]), None);
    }

    #[test]
    fn kolmogorov_q_known_values() {
        // Q_KS(1.0) ≈ 0.27, Q_KS(1.36) ≈ 0.049
        assert!((kolmogorov_q(1.0) - 0.26999967).abs() < 1e-4);
        assert!((kolmogorov_q(1.36) - 0.0494).abs() < 1e-3);
    }

    #[test]
    fn js_identical_is_zero() {
        let a = cats(&["a", "b", "b", "c"]);
        assert!(jensen_shannon_distance(&a, &a).unwrap().abs() < 1e-12);
    }

    #[test]
    fn js_disjoint_is_one() {
        let a = cats(&["a", "a"]);
        let b = cats(&["b", "b", "b"]);
        assert!((jensen_shannon_distance(&a, &b).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mean_skips_nan() {
        assert_eq!(mean(&[1.0, f64::NAN, 3.0]), Some(2.0));
        assert_eq!(mean(&[]), None);
    }
}
