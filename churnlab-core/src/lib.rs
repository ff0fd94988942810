//! ChurnLab Core: domain types, relational store, features, classifier,
//! registry, drift and promotion decisions.
//!
//! This crate contains the pure decisions and the storage they act on:
//! - Domain types (metric snapshots, drift results, stages, decisions)
//! - Metric comparator (`should_promote`)
//! - SQLite snapshot store with seed ingestion and validation suites
//! - Point-in-time feature store over the snapshot tables
//! - Drift evaluation (column partition, statistical service, target drift)
//! - Churn classifier (encoder + logistic regression + metrics)
//! - Model registry with atomic stage transitions
//! - Parquet export of assembled datasets

pub mod compare;
pub mod domain;
pub mod drift;
pub mod export;
pub mod features;
pub mod frame;
pub mod model;
pub mod registry;
pub mod store;

pub use compare::{should_promote, DEFAULT_PROMOTION_DELTA};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared with the online service or
    /// across controller threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::MetricSnapshot>();
        require_sync::<domain::MetricSnapshot>();
        require_send::<domain::DriftResult>();
        require_sync::<domain::DriftResult>();
        require_send::<domain::ModelStage>();
        require_sync::<domain::ModelStage>();

        require_send::<frame::FeatureFrame>();
        require_sync::<frame::FeatureFrame>();

        require_send::<store::SnapshotStore>();
        require_sync::<store::SnapshotStore>();
        require_send::<features::SqliteFeatureStore>();
        require_sync::<features::SqliteFeatureStore>();
        require_send::<registry::SqliteRegistry>();
        require_sync::<registry::SqliteRegistry>();

        require_send::<model::ChurnClassifier>();
        require_sync::<model::ChurnClassifier>();
        require_send::<drift::StatisticalDriftService>();
        require_sync::<drift::StatisticalDriftService>();
    }

    /// Architecture contract: the comparator is a plain function of three
    /// values, with no access to the registry or any store.
    #[test]
    fn comparator_is_pure() {
        let f: fn(Option<f64>, Option<f64>, f64) -> bool = should_promote;
        assert!(f(Some(0.9), None, DEFAULT_PROMOTION_DELTA));
    }
}
