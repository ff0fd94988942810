//! Relational snapshot store (SQLite).
//!
//! - Base tables are upserted from seed CSVs ([`SnapshotStore::upsert_csv`]).
//! - [`SnapshotStore::snapshot`] freezes the base tables at an as-of date.
//! - Entity and label slices are read back per as-of date.
//!
//! The connection sits behind a mutex so the store can be shared between
//! threads (the online service holds it in an `Arc`).

pub mod ingest;
pub mod labels;
pub mod schema;
pub mod validate;

pub use labels::{AppliedAlignment, LabelAlignment, LabelSet};
pub use validate::{Expectation, ValidationReport};

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::{EntityKey, LabelRow};
use schema::{TableSpec, BASE_TABLES, SNAPSHOT_TABLES};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown column '{column}' for table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("seed for '{table}' is missing primary key column '{column}'")]
    MissingPrimaryKey { table: String, column: String },

    #[error("{table}.{column} row {row}: cannot parse '{value}' as {expected}")]
    InvalidValue {
        table: String,
        column: String,
        row: usize,
        value: String,
        expected: &'static str,
    },

    #[error("no snapshot rows found at as_of={as_of}")]
    NoSnapshot { as_of: NaiveDate },

    #[error("validation failed for {table}: {expectation}")]
    Validation { table: String, expectation: String },
}

/// Rows written per snapshot table by one [`SnapshotStore::snapshot`] call.
pub type SnapshotCounts = BTreeMap<&'static str, usize>;

pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

impl SnapshotStore {
    /// Open (or create) the store at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave SQLite half-written:
        // every multi-statement write is a transaction.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        for table in BASE_TABLES.iter() {
            conn.execute(&table.create_sql(), [])?;
        }
        for snap in SNAPSHOT_TABLES.iter() {
            conn.execute(&snap.create_sql(), [])?;
        }
        Ok(())
    }

    // ─── Writes ──────────────────────────────────────────────────────

    /// Upsert a seed CSV into a base table. Returns the number of rows written.
    pub fn upsert_csv(&self, table: &str, path: &Path) -> Result<usize, StoreError> {
        let spec = schema::base_table(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let seed = ingest::read_seed_csv(path, spec)?;
        let columns: Vec<&str> = seed.columns.iter().map(|c| c.name).collect();
        let written = self.upsert_rows(spec, &columns, &seed.rows)?;
        info!(table, rows = written, path = %path.display(), "upserted seed");
        Ok(written)
    }

    /// Insert-or-update rows on the table's primary key, in one transaction.
    pub fn upsert_rows(
        &self,
        spec: &TableSpec,
        columns: &[&str],
        rows: &[Vec<rusqlite::types::Value>],
    ) -> Result<usize, StoreError> {
        for c in columns {
            if spec.column(c).is_none() {
                return Err(StoreError::UnknownColumn {
                    table: spec.name.to_string(),
                    column: c.to_string(),
                });
            }
        }
        let sql = upsert_sql(spec, columns);

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Copy the current base tables into the snapshot tables at `as_of`.
    pub fn snapshot(&self, as_of: NaiveDate) -> Result<SnapshotCounts, StoreError> {
        let stamp = as_of.format("%Y-%m-%d").to_string();
        let mut counts = SnapshotCounts::new();

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for snap in SNAPSHOT_TABLES.iter() {
            let n = tx.execute(&snap.snapshot_sql(), params![stamp])?;
            counts.insert(snap.name, n);
        }
        tx.commit()?;

        info!(%as_of, tables = counts.len(), "snapshot written");
        Ok(counts)
    }

    // ─── Reads ───────────────────────────────────────────────────────

    /// Distinct as-of dates present in the profile snapshot table, ascending.
    pub fn snapshot_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT as_of FROM subscriptions_profile_snapshots ORDER BY as_of",
        )?;
        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(raw
            .iter()
            .filter_map(|s| ingest::parse_date(s))
            .collect())
    }

    /// Entity rows `{user_id, event_timestamp = as_of}` at exactly `as_of`.
    ///
    /// Fatal (`NoSnapshot`) when the slice is empty.
    pub fn fetch_entities(&self, as_of: NaiveDate) -> Result<Vec<EntityKey>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT user_id FROM subscriptions_profile_snapshots WHERE as_of = ?1 ORDER BY user_id",
        )?;
        let ids = stmt
            .query_map(params![as_of.format("%Y-%m-%d").to_string()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if ids.is_empty() {
            return Err(StoreError::NoSnapshot { as_of });
        }
        debug!(%as_of, entities = ids.len(), "fetched entities");
        Ok(ids.into_iter().map(|id| EntityKey::new(id, as_of)).collect())
    }

    /// Labels for `as_of` under the given alignment policy. May be empty.
    pub fn fetch_labels(
        &self,
        as_of: NaiveDate,
        alignment: LabelAlignment,
    ) -> Result<LabelSet, StoreError> {
        let period = || self.query_labels(Some(as_of), as_of);
        let global = || self.query_labels(None, as_of);

        match alignment {
            LabelAlignment::Period => Ok(LabelSet {
                rows: period()?,
                alignment_used: AppliedAlignment::Period,
            }),
            LabelAlignment::Global => Ok(LabelSet {
                rows: global()?,
                alignment_used: AppliedAlignment::Global,
            }),
            LabelAlignment::PeriodWithGlobalFallback => {
                let rows = period()?;
                if !rows.is_empty() {
                    return Ok(LabelSet {
                        rows,
                        alignment_used: AppliedAlignment::Period,
                    });
                }
                let rows = global()?;
                warn!(
                    %as_of,
                    rows = rows.len(),
                    "no period-aligned labels; using unaligned labels stamped with as_of"
                );
                Ok(LabelSet {
                    rows,
                    alignment_used: AppliedAlignment::Global,
                })
            }
        }
    }

    fn query_labels(
        &self,
        period: Option<NaiveDate>,
        stamp: NaiveDate,
    ) -> Result<Vec<LabelRow>, StoreError> {
        let key = period
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT user_id, churn_label FROM labels WHERE period_start = ?1 ORDER BY user_id",
        )?;
        let rows = stmt
            .query_map(params![key], |row| {
                Ok(LabelRow {
                    user_id: row.get(0)?,
                    event_timestamp: stamp,
                    churned: row.get::<_, i64>(1)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Row count of any base or snapshot table.
    pub fn row_count(&self, table: &str) -> Result<usize, StoreError> {
        let known = BASE_TABLES.iter().any(|t| t.name == table)
            || SNAPSHOT_TABLES.iter().any(|s| s.name == table);
        if !known {
            return Err(StoreError::UnknownTable(table.to_string()));
        }
        let conn = self.lock();
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(n as usize)
    }

    /// Run a base table's expectation suite.
    pub fn validate(&self, table: &str) -> Result<ValidationReport, StoreError> {
        let spec = schema::base_table(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let suite = validate::suite_for(spec);
        let conn = self.lock();
        validate::run_suite(&conn, spec, &suite)
    }

    /// Run `f` with the locked connection. Used by the feature store.
    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        let conn = self.lock();
        Ok(f(&conn)?)
    }
}

fn upsert_sql(spec: &TableSpec, columns: &[&str]) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !spec.primary_key.iter().any(|pk| pk == *c))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    let on_conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        spec.name,
        columns.join(", "),
        placeholders.join(", "),
        spec.primary_key.join(", "),
        on_conflict
    )
}
