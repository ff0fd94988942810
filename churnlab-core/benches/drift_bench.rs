//! Criterion benchmarks for the drift and training hot paths.
//!
//! Benchmarks:
//! 1. Two-sample KS statistic on growing samples
//! 2. Full drift evaluation over a synthetic monthly frame
//! 3. Classifier fit on the same frame

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use churnlab_core::drift::stats::{jensen_shannon_distance, ks_statistic};
use churnlab_core::drift::{DriftEvaluator, StatisticalDriftService};
use churnlab_core::frame::{EntityKey, FeatureFrame, FeatureValue, ValueKind};
use churnlab_core::model::{ChurnClassifier, TrainParams};

// ── Helpers ──────────────────────────────────────────────────────────

fn sample(n: usize, shift: f64) -> Vec<f64> {
    (0..n).map(|i| (i as f64 * 0.37).sin() * 10.0 + shift).collect()
}

fn make_frame(rows: usize, shift: f64) -> FeatureFrame {
    let as_of = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
    let keys = (0..rows).map(|i| EntityKey::new(format!("U{i:06}"), as_of)).collect();
    let mut frame = FeatureFrame::new(keys);
    for (c, name) in ["watch_hours_30d", "avg_session_mins_7d", "monthly_fee", "skips_7d"]
        .iter()
        .enumerate()
    {
        let values = sample(rows, shift + c as f64)
            .into_iter()
            .map(FeatureValue::Float)
            .collect();
        frame.push_column(*name, ValueKind::Float, values).unwrap();
    }
    let services = ["fiber", "dsl", "none"];
    frame
        .push_column(
            "net_service",
            ValueKind::Text,
            (0..rows)
                .map(|i| FeatureValue::Text(services[(i + shift as usize) % 3].to_string()))
                .collect(),
        )
        .unwrap();
    frame
        .push_column(
            "churn_label",
            ValueKind::Int,
            (0..rows)
                .map(|i| FeatureValue::Int(i64::from(i % 5 == 0)))
                .collect(),
        )
        .unwrap();
    frame
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("drift_stats");
    for n in [1_000usize, 10_000, 100_000] {
        let a = sample(n, 0.0);
        let b = sample(n, 0.5);
        group.bench_with_input(BenchmarkId::new("ks_statistic", n), &n, |bench, _| {
            bench.iter(|| ks_statistic(black_box(&a), black_box(&b)))
        });
    }
    let reference: Vec<String> = (0..10_000).map(|i| format!("c{}", i % 7)).collect();
    let current: Vec<String> = (0..10_000).map(|i| format!("c{}", i % 9)).collect();
    group.bench_function("jensen_shannon_10k", |bench| {
        bench.iter(|| jensen_shannon_distance(black_box(&reference), black_box(&current)))
    });
    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("drift_evaluate");
    let evaluator = DriftEvaluator::new(StatisticalDriftService::default(), "churn_label");
    for rows in [1_000usize, 20_000] {
        let reference = make_frame(rows, 0.0);
        let current = make_frame(rows, 1.0);
        group.bench_with_input(BenchmarkId::new("six_columns", rows), &rows, |bench, _| {
            bench.iter(|| evaluator.evaluate(black_box(&reference), black_box(&current)))
        });
    }
    group.finish();
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("classifier");
    group.sample_size(10);
    let frame = make_frame(5_000, 0.0);
    let params = TrainParams::default();
    group.bench_function("fit_5k_rows", |bench| {
        bench.iter(|| ChurnClassifier::fit(black_box(&frame), "churn_label", &params))
    });
    group.finish();
}

criterion_group!(benches, bench_stats, bench_evaluate, bench_fit);
criterion_main!(benches);
