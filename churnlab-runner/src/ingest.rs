//! Monthly ingest: upsert seed CSVs, validate, snapshot.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use churnlab_core::store::{SnapshotCounts, SnapshotStore, StoreError};

/// Seed files loaded per month, in load order. Each is `{table}.csv`.
pub const SEED_TABLES: [&str; 6] = [
    "users",
    "subscriptions",
    "usage_agg_30d",
    "payments_agg_90d",
    "support_agg_90d",
    "labels",
];

/// Tables whose expectation suites gate the snapshot.
pub const VALIDATED_TABLES: [&str; 3] = ["users", "subscriptions", "usage_agg_30d"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("seed file for '{table}' not found at {}", .path.display())]
    MissingSeed { table: &'static str, path: PathBuf },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub as_of: NaiveDate,
    pub upserted: BTreeMap<&'static str, usize>,
    pub snapshot: SnapshotCounts,
}

/// Load one month of seeds into the store and snapshot it at `as_of`.
///
/// All seed files must exist before anything is written. The first failing
/// expectation aborts before the snapshot is taken.
pub fn ingest_month(
    store: &SnapshotStore,
    seed_dir: &Path,
    as_of: NaiveDate,
) -> Result<IngestSummary, IngestError> {
    let mut paths = Vec::with_capacity(SEED_TABLES.len());
    for table in SEED_TABLES {
        let path = seed_dir.join(format!("{table}.csv"));
        if !path.is_file() {
            return Err(IngestError::MissingSeed { table, path });
        }
        paths.push((table, path));
    }

    let mut upserted = BTreeMap::new();
    for (table, path) in &paths {
        let n = store.upsert_csv(table, path)?;
        upserted.insert(*table, n);
    }

    for table in VALIDATED_TABLES {
        let report = store.validate(table)?;
        info!(table, sampled = report.sampled_rows, success = report.success(), "validation");
        report.into_result()?;
    }

    let snapshot = store.snapshot(as_of)?;
    info!(%as_of, seed_dir = %seed_dir.display(), "ingest complete");
    Ok(IngestSummary {
        as_of,
        upserted,
        snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{date, seed_dir, stage_seeds};

    #[test]
    fn ingests_and_snapshots_a_month() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let summary = ingest_month(&store, &seed_dir("month_000"), date("2024-01-31")).unwrap();
        assert_eq!(summary.upserted["users"], 60);
        assert_eq!(summary.upserted["labels"], 60);
        assert_eq!(summary.snapshot["subscriptions_profile_snapshots"], 60);
        assert_eq!(store.fetch_entities(date("2024-01-31")).unwrap().len(), 60);
    }

    #[test]
    fn missing_seed_file_writes_nothing() {
        let dir = stage_seeds("month_000", &[("support_agg_90d", None)]);
        let store = SnapshotStore::open_in_memory().unwrap();
        let err = ingest_month(&store, dir.path(), date("2024-01-31")).unwrap_err();
        assert!(matches!(
            err,
            IngestError::MissingSeed { table: "support_agg_90d", .. }
        ));
        assert_eq!(store.row_count("users").unwrap(), 0);
    }

    #[test]
    fn failed_validation_blocks_snapshot() {
        let dir = stage_seeds(
            "month_000",
            &[(
                "subscriptions",
                Some(
                    "user_id,months_active,plan_stream_tv,plan_stream_movies,contract_type,\
                     paperless_billing,monthly_fee,total_paid,net_service,add_on_security,\
                     add_on_backup,add_on_device_protect,add_on_support\n\
                     U0000,3,yes,no,monthly,yes,-5.0,10.0,fiber,no,no,no,no\n",
                ),
            )],
        );
        let store = SnapshotStore::open_in_memory().unwrap();
        let err = ingest_month(&store, dir.path(), date("2024-01-31")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "validation failed for subscriptions: column 'monthly_fee' values >= 0"
        );
        assert!(store.snapshot_dates().unwrap().is_empty());
    }
}
