//! Post-ingest expectation suites.
//!
//! Each suite is a list of [`Expectation`]s evaluated against a sample of at
//! most [`SAMPLE_LIMIT`] rows. The ingest flow aborts on the first failure.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use super::schema::{self, TableSpec};
use super::StoreError;

pub const SAMPLE_LIMIT: usize = 50_000;

#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    ColumnsMatchSet(Vec<&'static str>),
    NotNull(&'static str),
    AtLeast { column: &'static str, min: f64 },
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::ColumnsMatchSet(cols) => {
                write!(f, "table columns match set [{}]", cols.join(", "))
            }
            Expectation::NotNull(c) => write!(f, "column '{c}' has no nulls"),
            Expectation::AtLeast { column, min } => {
                write!(f, "column '{column}' values >= {min}")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpectationResult {
    pub expectation: String,
    pub success: bool,
    pub unexpected_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub table: String,
    pub sampled_rows: usize,
    pub results: Vec<ExpectationResult>,
}

impl ValidationReport {
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn first_failure(&self) -> Option<&ExpectationResult> {
        self.results.iter().find(|r| !r.success)
    }

    /// `Err(StoreError::Validation)` naming the first failed expectation.
    pub fn into_result(self) -> Result<Self, StoreError> {
        match self.first_failure() {
            Some(failed) => Err(StoreError::Validation {
                table: self.table.clone(),
                expectation: failed.expectation.clone(),
            }),
            None => Ok(self),
        }
    }
}

/// The expectation suite for a base table.
pub fn suite_for(table: &TableSpec) -> Vec<Expectation> {
    let mut suite = Vec::new();
    match table.name {
        "users" => {
            suite.push(Expectation::ColumnsMatchSet(schema::USERS.column_names()));
            suite.push(Expectation::NotNull("user_id"));
        }
        "subscriptions" => {
            suite.push(Expectation::ColumnsMatchSet(schema::SUBSCRIPTIONS.column_names()));
            suite.push(Expectation::NotNull("user_id"));
            suite.push(Expectation::AtLeast { column: "months_active", min: 0.0 });
            suite.push(Expectation::AtLeast { column: "monthly_fee", min: 0.0 });
        }
        "usage_agg_30d" => {
            suite.push(Expectation::ColumnsMatchSet(schema::USAGE_AGG_30D.column_names()));
            suite.push(Expectation::NotNull("user_id"));
            suite.push(Expectation::AtLeast { column: "watch_hours_30d", min: 0.0 });
            suite.push(Expectation::AtLeast { column: "avg_session_mins_7d", min: 0.0 });
        }
        _ => suite.push(Expectation::NotNull("user_id")),
    }
    suite
}

pub(crate) fn run_suite(
    conn: &Connection,
    table: &TableSpec,
    suite: &[Expectation],
) -> Result<ValidationReport, StoreError> {
    let sampled_rows: usize = conn.query_row(
        &format!("SELECT COUNT(*) FROM (SELECT 1 FROM {} LIMIT {SAMPLE_LIMIT})", table.name),
        [],
        |row| row.get::<_, i64>(0),
    )? as usize;

    let mut results = Vec::with_capacity(suite.len());
    for expectation in suite {
        let unexpected_count = match expectation {
            Expectation::ColumnsMatchSet(expected) => {
                let actual = table_columns(conn, table.name)?;
                let expected: BTreeSet<String> = expected.iter().map(|s| s.to_string()).collect();
                actual.symmetric_difference(&expected).count()
            }
            Expectation::NotNull(column) => count_sample(
                conn,
                table.name,
                column,
                &format!("{column} IS NULL"),
            )?,
            Expectation::AtLeast { column, min } => count_sample(
                conn,
                table.name,
                column,
                &format!("{column} IS NOT NULL AND {column} < {min}"),
            )?,
        };
        results.push(ExpectationResult {
            expectation: expectation.to_string(),
            success: unexpected_count == 0,
            unexpected_count,
        });
    }

    Ok(ValidationReport {
        table: table.name.to_string(),
        sampled_rows,
        results,
    })
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(names)
}

fn count_sample(
    conn: &Connection,
    table: &str,
    column: &str,
    predicate: &str,
) -> Result<usize, StoreError> {
    let sql = format!(
        "SELECT COUNT(*) FROM (SELECT {column} FROM {table} LIMIT {SAMPLE_LIMIT}) WHERE {predicate}"
    );
    let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriptions_suite_has_range_checks() {
        let suite = suite_for(&schema::SUBSCRIPTIONS);
        assert!(suite.contains(&Expectation::AtLeast { column: "monthly_fee", min: 0.0 }));
        assert_eq!(suite.len(), 4);
    }

    #[test]
    fn other_tables_only_check_user_id() {
        assert_eq!(suite_for(&schema::LABELS), vec![Expectation::NotNull("user_id")]);
    }

    #[test]
    fn display_names_the_column() {
        let e = Expectation::AtLeast { column: "watch_hours_30d", min: 0.0 };
        assert_eq!(e.to_string(), "column 'watch_hours_30d' values >= 0");
    }
}
