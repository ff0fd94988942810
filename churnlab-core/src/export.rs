//! Parquet export of assembled feature frames.
//!
//! Layout: `user_id` (str), `event_timestamp` (date), then one column per
//! feature with its logical type. Writes are atomic (write `.tmp`, rename).

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::domain::{EVENT_TIMESTAMP, USER_ID};
use crate::frame::{EntityKey, FeatureFrame, FeatureValue, FrameError, ValueKind};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_FROM_CE: i32 = 719_163;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("parquet error: {0}")]
    Polars(#[from] PolarsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has unsupported type {dtype}")]
    UnsupportedType { column: String, dtype: String },

    #[error("null or out-of-range key at row {0}")]
    BadKey(usize),
}

/// Write `frame` to `path` as Parquet. Returns the row count.
pub fn write_parquet(frame: &FeatureFrame, path: &Path) -> Result<usize, ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut df = frame_to_dataframe(frame)?;
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)?;
    ParquetWriter::new(file).finish(&mut df)?;
    fs::rename(&tmp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp_path);
    })?;
    Ok(frame.len())
}

/// Read a frame written by [`write_parquet`].
pub fn read_parquet(path: &Path) -> Result<FeatureFrame, ExportError> {
    let file = fs::File::open(path)?;
    let df = ParquetReader::new(file).finish()?;
    dataframe_to_frame(&df)
}

fn frame_to_dataframe(frame: &FeatureFrame) -> Result<DataFrame, ExportError> {
    let users: Vec<&str> = frame.keys.iter().map(|k| k.user_id.as_str()).collect();
    let days: Vec<i32> = frame
        .keys
        .iter()
        .map(|k| k.event_timestamp.num_days_from_ce() - UNIX_EPOCH_FROM_CE)
        .collect();

    let mut columns = vec![
        Column::new(USER_ID.into(), users),
        Column::new(EVENT_TIMESTAMP.into(), days).cast(&DataType::Date)?,
    ];

    for c in &frame.columns {
        let name: PlSmallStr = c.name.as_str().into();
        let column = match c.kind {
            ValueKind::Int => Column::new(
                name,
                c.values
                    .iter()
                    .map(|v| match v {
                        FeatureValue::Int(i) => Some(*i),
                        other => other.as_f64().map(|f| f as i64),
                    })
                    .collect::<Vec<Option<i64>>>(),
            ),
            ValueKind::Float => Column::new(
                name,
                c.values.iter().map(FeatureValue::as_f64).collect::<Vec<Option<f64>>>(),
            ),
            ValueKind::Bool => Column::new(
                name,
                c.values
                    .iter()
                    .map(|v| v.as_f64().map(|f| f != 0.0))
                    .collect::<Vec<Option<bool>>>(),
            ),
            ValueKind::Text => Column::new(
                name,
                c.values.iter().map(FeatureValue::category).collect::<Vec<Option<String>>>(),
            ),
        };
        columns.push(column);
    }

    Ok(DataFrame::new(columns)?)
}

fn dataframe_to_frame(df: &DataFrame) -> Result<FeatureFrame, ExportError> {
    let users = df
        .column(USER_ID)
        .map_err(|_| ExportError::MissingColumn(USER_ID.into()))?
        .str()?;
    let dates = df
        .column(EVENT_TIMESTAMP)
        .map_err(|_| ExportError::MissingColumn(EVENT_TIMESTAMP.into()))?
        .date()?;

    let n = df.height();
    let mut keys = Vec::with_capacity(n);
    for i in 0..n {
        let user = users.get(i).ok_or(ExportError::BadKey(i))?;
        let days = dates.get(i).ok_or(ExportError::BadKey(i))?;
        let date = NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_FROM_CE)
            .ok_or(ExportError::BadKey(i))?;
        keys.push(EntityKey::new(user, date));
    }

    let mut frame = FeatureFrame::new(keys);
    for column in df.get_columns() {
        let name = column.name().as_str();
        if name == USER_ID || name == EVENT_TIMESTAMP {
            continue;
        }
        let (kind, values) = match column.dtype() {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                let ca = column.cast(&DataType::Int64)?;
                let ca = ca.i64()?;
                (
                    ValueKind::Int,
                    (0..n).map(|i| ca.get(i).map_or(FeatureValue::Null, FeatureValue::Int)).collect(),
                )
            }
            DataType::Float32 | DataType::Float64 => {
                let ca = column.cast(&DataType::Float64)?;
                let ca = ca.f64()?;
                (
                    ValueKind::Float,
                    (0..n).map(|i| ca.get(i).map_or(FeatureValue::Null, FeatureValue::Float)).collect(),
                )
            }
            DataType::Boolean => {
                let ca = column.bool()?;
                (
                    ValueKind::Bool,
                    (0..n).map(|i| ca.get(i).map_or(FeatureValue::Null, FeatureValue::Bool)).collect(),
                )
            }
            DataType::String => {
                let ca = column.str()?;
                (
                    ValueKind::Text,
                    (0..n)
                        .map(|i| {
                            ca.get(i)
                                .map_or(FeatureValue::Null, |s| FeatureValue::Text(s.to_string()))
                        })
                        .collect(),
                )
            }
            other => {
                return Err(ExportError::UnsupportedType {
                    column: name.to_string(),
                    dtype: other.to_string(),
                })
            }
        };
        frame.push_column(name, kind, values)?;
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureFrame {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let mut f = FeatureFrame::new(vec![EntityKey::new("u1", d), EntityKey::new("u2", d)]);
        f.push_column("months_active", ValueKind::Int, vec![FeatureValue::Int(3), FeatureValue::Null])
            .unwrap();
        f.push_column(
            "monthly_fee",
            ValueKind::Float,
            vec![FeatureValue::Float(9.5), FeatureValue::Float(12.0)],
        )
        .unwrap();
        f.push_column(
            "paperless_billing",
            ValueKind::Bool,
            vec![FeatureValue::Bool(true), FeatureValue::Bool(false)],
        )
        .unwrap();
        f.push_column(
            "net_service",
            ValueKind::Text,
            vec![FeatureValue::Text("fiber".into()), FeatureValue::Null],
        )
        .unwrap();
        f
    }

    #[test]
    fn parquet_preserves_keys_and_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datasets").join("train.parquet");
        assert_eq!(write_parquet(&sample(), &path).unwrap(), 2);
        assert!(!path.with_extension("parquet.tmp").exists());
        let back = read_parquet(&path).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn epoch_offset_is_correct() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(epoch.num_days_from_ce(), UNIX_EPOCH_FROM_CE);
    }
}
