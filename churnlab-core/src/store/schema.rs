//! Relational catalog: base tables fed by seed CSVs and the as-of snapshot
//! tables the feature store reads from.

/// Storage type of a column. Booleans are stored as INTEGER 0/1 and dates
/// as ISO `YYYY-MM-DD` TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Boolean,
    Date,
}

impl SqlType {
    pub fn ddl(&self) -> &'static str {
        match self {
            SqlType::Text | SqlType::Date => "TEXT",
            SqlType::Integer | SqlType::Boolean => "INTEGER",
            SqlType::Real => "REAL",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub not_null: bool,
    /// Literal stored when the CSV cell is empty or the column is absent.
    pub default: Option<&'static str>,
}

const fn col(name: &'static str, sql_type: SqlType) -> ColumnSpec {
    ColumnSpec {
        name,
        sql_type,
        not_null: false,
        default: None,
    }
}

const fn key(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        sql_type: SqlType::Text,
        not_null: true,
        default: None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    pub primary_key: &'static [&'static str],
}

impl TableSpec {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", c.name, c.sql_type.ddl());
                if c.not_null {
                    def.push_str(" NOT NULL");
                }
                if let Some(default) = c.default {
                    def.push_str(&format!(" DEFAULT '{default}'"));
                }
                def
            })
            .collect();
        parts.push(format!("PRIMARY KEY ({})", self.primary_key.join(", ")));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name,
            parts.join(", ")
        )
    }
}

pub const USERS: TableSpec = TableSpec {
    name: "users",
    columns: &[
        key("user_id"),
        col("signup_date", SqlType::Date),
        col("user_gender", SqlType::Text),
        col("user_is_senior", SqlType::Boolean),
        col("has_family", SqlType::Boolean),
        col("has_dependents", SqlType::Boolean),
    ],
    primary_key: &["user_id"],
};

pub const SUBSCRIPTIONS: TableSpec = TableSpec {
    name: "subscriptions",
    columns: &[
        key("user_id"),
        col("months_active", SqlType::Integer),
        col("plan_stream_tv", SqlType::Boolean),
        col("plan_stream_movies", SqlType::Boolean),
        col("contract_type", SqlType::Text),
        col("paperless_billing", SqlType::Boolean),
        col("monthly_fee", SqlType::Real),
        col("total_paid", SqlType::Real),
        col("net_service", SqlType::Text),
        col("add_on_security", SqlType::Text),
        col("add_on_backup", SqlType::Text),
        col("add_on_device_protect", SqlType::Text),
        col("add_on_support", SqlType::Text),
    ],
    primary_key: &["user_id"],
};

pub const USAGE_AGG_30D: TableSpec = TableSpec {
    name: "usage_agg_30d",
    columns: &[
        key("user_id"),
        col("watch_hours_30d", SqlType::Real),
        col("avg_session_mins_7d", SqlType::Real),
        col("unique_devices_30d", SqlType::Integer),
        col("skips_7d", SqlType::Integer),
        col("rebuffer_events_7d", SqlType::Integer),
    ],
    primary_key: &["user_id"],
};

pub const PAYMENTS_AGG_90D: TableSpec = TableSpec {
    name: "payments_agg_90d",
    columns: &[key("user_id"), col("failed_payments_90d", SqlType::Integer)],
    primary_key: &["user_id"],
};

pub const SUPPORT_AGG_90D: TableSpec = TableSpec {
    name: "support_agg_90d",
    columns: &[
        key("user_id"),
        col("support_tickets_90d", SqlType::Integer),
        col("ticket_avg_resolution_hrs_90d", SqlType::Real),
    ],
    primary_key: &["user_id"],
};

/// Churn labels. An empty `period_start` marks a label that is not aligned to
/// any as-of period.
pub const LABELS: TableSpec = TableSpec {
    name: "labels",
    columns: &[
        key("user_id"),
        ColumnSpec {
            name: "period_start",
            sql_type: SqlType::Date,
            not_null: true,
            default: Some(""),
        },
        ColumnSpec {
            name: "churn_label",
            sql_type: SqlType::Boolean,
            not_null: true,
            default: None,
        },
    ],
    primary_key: &["user_id", "period_start"],
};

pub static BASE_TABLES: [TableSpec; 6] = [
    USERS,
    SUBSCRIPTIONS,
    USAGE_AGG_30D,
    PAYMENTS_AGG_90D,
    SUPPORT_AGG_90D,
    LABELS,
];

/// Look up a base table by name.
pub fn base_table(name: &str) -> Option<&'static TableSpec> {
    BASE_TABLES.iter().find(|t| t.name == name)
}

/// An as-of snapshot of selected base-table columns, keyed by `(user_id, as_of)`.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotSpec {
    pub name: &'static str,
    pub source: &'static TableSpec,
    pub columns: &'static [&'static str],
}

impl SnapshotSpec {
    pub fn create_sql(&self) -> String {
        let mut parts = vec![
            "user_id TEXT NOT NULL".to_string(),
            "as_of TEXT NOT NULL".to_string(),
        ];
        for name in self.columns {
            let ty = self
                .source
                .column(name)
                .map(|c| c.sql_type.ddl())
                .unwrap_or("TEXT");
            parts.push(format!("{name} {ty}"));
        }
        parts.push("PRIMARY KEY (user_id, as_of)".into());
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.name, parts.join(", "))
    }

    /// Idempotent copy of the source table stamped with `?1` as the as-of date.
    pub fn snapshot_sql(&self) -> String {
        let cols = self.columns.join(", ");
        let updates: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        // `WHERE true` disambiguates INSERT ... SELECT from the upsert clause.
        format!(
            "INSERT INTO {snap} (user_id, as_of, {cols}) \
             SELECT user_id, ?1, {cols} FROM {src} WHERE true \
             ON CONFLICT (user_id, as_of) DO UPDATE SET {updates}",
            snap = self.name,
            src = self.source.name,
            updates = updates.join(", "),
        )
    }
}

pub const SUBSCRIPTIONS_PROFILE_SNAPSHOTS: SnapshotSpec = SnapshotSpec {
    name: "subscriptions_profile_snapshots",
    source: &SUBSCRIPTIONS,
    columns: &[
        "months_active",
        "monthly_fee",
        "paperless_billing",
        "plan_stream_tv",
        "plan_stream_movies",
        "net_service",
    ],
};

pub const USAGE_AGG_30D_SNAPSHOTS: SnapshotSpec = SnapshotSpec {
    name: "usage_agg_30d_snapshots",
    source: &USAGE_AGG_30D,
    columns: &[
        "watch_hours_30d",
        "avg_session_mins_7d",
        "unique_devices_30d",
        "skips_7d",
        "rebuffer_events_7d",
    ],
};

pub const PAYMENTS_AGG_90D_SNAPSHOTS: SnapshotSpec = SnapshotSpec {
    name: "payments_agg_90d_snapshots",
    source: &PAYMENTS_AGG_90D,
    columns: &["failed_payments_90d"],
};

pub const SUPPORT_AGG_90D_SNAPSHOTS: SnapshotSpec = SnapshotSpec {
    name: "support_agg_90d_snapshots",
    source: &SUPPORT_AGG_90D,
    columns: &["support_tickets_90d", "ticket_avg_resolution_hrs_90d"],
};

pub static SNAPSHOT_TABLES: [SnapshotSpec; 4] = [
    SUBSCRIPTIONS_PROFILE_SNAPSHOTS,
    USAGE_AGG_30D_SNAPSHOTS,
    PAYMENTS_AGG_90D_SNAPSHOTS,
    SUPPORT_AGG_90D_SNAPSHOTS,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_primary_key_column_exists() {
        for table in BASE_TABLES {
            for pk in table.primary_key {
                assert!(table.column(pk).is_some(), "{}.{pk}", table.name);
            }
        }
    }

    #[test]
    fn every_snapshot_column_exists_in_source() {
        for snap in SNAPSHOT_TABLES {
            for c in snap.columns {
                assert!(snap.source.column(c).is_some(), "{}.{c}", snap.name);
            }
        }
    }

    #[test]
    fn labels_ddl_has_defaulted_period() {
        let sql = LABELS.create_sql();
        assert!(sql.contains("period_start TEXT NOT NULL DEFAULT ''"));
        assert!(sql.contains("PRIMARY KEY (user_id, period_start)"));
    }

    #[test]
    fn snapshot_sql_is_an_upsert() {
        let sql = PAYMENTS_AGG_90D_SNAPSHOTS.snapshot_sql();
        assert!(sql.contains("FROM payments_agg_90d WHERE true"));
        assert!(sql.contains("failed_payments_90d = excluded.failed_payments_90d"));
    }

    #[test]
    fn base_table_lookup() {
        assert_eq!(base_table("labels").unwrap().name, "labels");
        assert!(base_table("bars").is_none());
    }
}
