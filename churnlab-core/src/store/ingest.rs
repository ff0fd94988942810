//! Seed CSV parsing and per-column coercion into SQLite values.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use std::path::Path;

use super::schema::{ColumnSpec, SqlType, TableSpec};
use super::StoreError;

/// Parsed, coerced rows of one seed file, in header order.
#[derive(Debug, Clone)]
pub struct SeedRows {
    pub columns: Vec<&'static ColumnSpec>,
    pub rows: Vec<Vec<Value>>,
}

/// Read a seed CSV for `table`.
///
/// Unknown columns are rejected. Primary-key columns without a default must be
/// present in the header.
pub fn read_seed_csv(path: &Path, table: &'static TableSpec) -> Result<SeedRows, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let mut columns = Vec::with_capacity(headers.len());
    for name in headers.iter() {
        let spec = table.column(name).ok_or_else(|| StoreError::UnknownColumn {
            table: table.name.to_string(),
            column: name.to_string(),
        })?;
        columns.push(spec);
    }
    for pk in table.primary_key {
        let present = columns.iter().any(|c| c.name == *pk);
        let defaulted = table.column(pk).is_some_and(|c| c.default.is_some());
        if !present && !defaulted {
            return Err(StoreError::MissingPrimaryKey {
                table: table.name.to_string(),
                column: pk.to_string(),
            });
        }
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let mut row = Vec::with_capacity(columns.len());
        for (spec, raw) in columns.iter().zip(record.iter()) {
            row.push(coerce(raw, spec).map_err(|expected| StoreError::InvalidValue {
                table: table.name.to_string(),
                column: spec.name.to_string(),
                row: line + 1,
                value: raw.to_string(),
                expected,
            })?);
        }
        rows.push(row);
    }

    Ok(SeedRows { columns, rows })
}

/// Coerce one raw CSV cell. The error is the expected type name.
pub fn coerce(raw: &str, spec: &ColumnSpec) -> Result<Value, &'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(match spec.default {
            Some(d) => Value::Text(d.to_string()),
            None => Value::Null,
        });
    }
    match spec.sql_type {
        SqlType::Text => Ok(Value::Text(raw.to_string())),
        SqlType::Boolean => parse_bool(raw)
            .map(|b| Value::Integer(i64::from(b)))
            .ok_or("boolean"),
        SqlType::Integer => {
            if let Ok(v) = raw.parse::<i64>() {
                return Ok(Value::Integer(v));
            }
            match raw.parse::<f64>() {
                Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(Value::Integer(v as i64)),
                _ => Err("integer"),
            }
        }
        SqlType::Real => raw.parse::<f64>().map(Value::Real).map_err(|_| "real"),
        // Unparseable dates become NULL unless the column forbids it.
        SqlType::Date => match parse_date(raw) {
            Some(d) => Ok(Value::Text(d.format("%Y-%m-%d").to_string())),
            None if spec.not_null => Err("date"),
            None => Ok(Value::Null),
        },
    }
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::{LABELS, SUBSCRIPTIONS, USERS};
    use std::io::Write;

    fn spec(table: &'static TableSpec, name: &str) -> &'static ColumnSpec {
        table.column(name).unwrap()
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let c = spec(&USERS, "has_family");
        assert_eq!(coerce("Yes", c).unwrap(), Value::Integer(1));
        assert_eq!(coerce("no", c).unwrap(), Value::Integer(0));
        assert_eq!(coerce("1", c).unwrap(), Value::Integer(1));
        assert_eq!(coerce("FALSE", c).unwrap(), Value::Integer(0));
        assert!(coerce("maybe", c).is_err());
    }

    #[test]
    fn integers_accept_whole_floats() {
        let c = spec(&SUBSCRIPTIONS, "months_active");
        assert_eq!(coerce("12", c).unwrap(), Value::Integer(12));
        assert_eq!(coerce("12.0", c).unwrap(), Value::Integer(12));
        assert!(coerce("12.5", c).is_err());
    }

    #[test]
    fn bad_dates_coerce_to_null() {
        let c = spec(&USERS, "signup_date");
        assert_eq!(coerce("2023-05-01", c).unwrap(), Value::Text("2023-05-01".into()));
        assert_eq!(
            coerce("2023-05-01 10:00:00", c).unwrap(),
            Value::Text("2023-05-01".into())
        );
        assert_eq!(coerce("not a date", c).unwrap(), Value::Null);
    }

    #[test]
    fn bad_date_in_not_null_column_is_rejected() {
        let c = spec(&LABELS, "period_start");
        assert_eq!(coerce("2024-01-31", c).unwrap(), Value::Text("2024-01-31".into()));
        assert_eq!(coerce("not-a-date", c), Err("date"));
    }

    #[test]
    fn malformed_period_start_names_row_and_value() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "user_id,period_start,churn_label").unwrap();
        writeln!(f, "U0000,2024-01-31,0").unwrap();
        writeln!(f, "U0001,not-a-date,1").unwrap();
        match read_seed_csv(f.path(), &LABELS).unwrap_err() {
            StoreError::InvalidValue {
                table,
                column,
                row,
                value,
                expected,
            } => {
                assert_eq!(table, "labels");
                assert_eq!(column, "period_start");
                assert_eq!(row, 2);
                assert_eq!(value, "not-a-date");
                assert_eq!(expected, "date");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_cell_uses_column_default() {
        let c = spec(&LABELS, "period_start");
        assert_eq!(coerce("", c).unwrap(), Value::Text(String::new()));
        assert_eq!(coerce("", spec(&USERS, "user_gender")).unwrap(), Value::Null);
    }

    #[test]
    fn rejects_unknown_columns() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "user_id,shoe_size").unwrap();
        writeln!(f, "u1,42").unwrap();
        let err = read_seed_csv(f.path(), &USERS).unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[test]
    fn labels_without_period_column_are_accepted() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "user_id,churn_label").unwrap();
        writeln!(f, "u1,1").unwrap();
        writeln!(f, "u2,no").unwrap();
        let seed = read_seed_csv(f.path(), &LABELS).unwrap();
        assert_eq!(seed.rows.len(), 2);
        assert_eq!(seed.rows[1][1], Value::Integer(0));
    }

    #[test]
    fn reports_row_of_invalid_value() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "user_id,monthly_fee").unwrap();
        writeln!(f, "u1,9.99").unwrap();
        writeln!(f, "u2,abc").unwrap();
        match read_seed_csv(f.path(), &SUBSCRIPTIONS).unwrap_err() {
            StoreError::InvalidValue { row, column, .. } => {
                assert_eq!(row, 2);
                assert_eq!(column, "monthly_fee");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
