//! Feature frames: columnar, entity-keyed tables passed between stages.
//!
//! Every row is keyed by `(user_id, event_timestamp)`. Identifier columns live
//! in `keys`, never in `columns`, so downstream consumers (drift, encoder)
//! cannot accidentally treat them as features.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::domain::DatasetHash;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FeatureValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FeatureValue::Null)
    }

    /// Numeric view: ints, floats and booleans (as 0/1). Text and null → None.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Int(v) => Some(*v as f64),
            FeatureValue::Float(v) if !v.is_nan() => Some(*v),
            FeatureValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Category label used by categorical statistics and one-hot encoding.
    pub fn category(&self) -> Option<String> {
        match self {
            FeatureValue::Null => None,
            FeatureValue::Bool(b) => Some(b.to_string()),
            FeatureValue::Int(v) => Some(v.to_string()),
            FeatureValue::Float(v) => Some(v.to_string()),
            FeatureValue::Text(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Null => f.write_str("null"),
            FeatureValue::Bool(b) => write!(f, "{b}"),
            FeatureValue::Int(v) => write!(f, "{v}"),
            FeatureValue::Float(v) => write!(f, "{v}"),
            FeatureValue::Text(s) => f.write_str(s),
        }
    }
}

/// Logical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Int,
    Float,
    Bool,
    Text,
}

/// Row key: entity id plus the as-of timestamp the row describes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub user_id: String,
    pub event_timestamp: NaiveDate,
}

impl EntityKey {
    pub fn new(user_id: impl Into<String>, event_timestamp: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            event_timestamp,
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameColumn {
    pub name: String,
    pub kind: ValueKind,
    pub values: Vec<FeatureValue>,
}

impl FrameColumn {
    /// Non-null numeric values.
    pub fn numeric_values(&self) -> Vec<f64> {
        self.values.iter().filter_map(FeatureValue::as_f64).collect()
    }

    /// Non-null category labels.
    pub fn category_values(&self) -> Vec<String> {
        self.values.iter().filter_map(FeatureValue::category).collect()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }
}

/// A labelled outcome for one entity at one as-of date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRow {
    pub user_id: String,
    pub event_timestamp: NaiveDate,
    pub churned: bool,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("column '{column}' has {actual} values, frame has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
}

/// Entity-keyed columnar table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    pub keys: Vec<EntityKey>,
    pub columns: Vec<FrameColumn>,
}

impl FeatureFrame {
    pub fn new(keys: Vec<EntityKey>) -> Self {
        Self {
            keys,
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        kind: ValueKind,
        values: Vec<FeatureValue>,
    ) -> Result<(), FrameError> {
        let name = name.into();
        if values.len() != self.keys.len() {
            return Err(FrameError::LengthMismatch {
                column: name,
                expected: self.keys.len(),
                actual: values.len(),
            });
        }
        if self.has_column(&name) {
            return Err(FrameError::DuplicateColumn(name));
        }
        self.columns.push(FrameColumn { name, kind, values });
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&FrameColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The values of row `i`, in column order.
    pub fn row(&self, i: usize) -> Vec<&FeatureValue> {
        self.columns.iter().map(|c| &c.values[i]).collect()
    }

    /// New frame holding only the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> FeatureFrame {
        FeatureFrame {
            keys: indices.iter().map(|&i| self.keys[i].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| FrameColumn {
                    name: c.name.clone(),
                    kind: c.kind,
                    values: indices.iter().map(|&i| c.values[i].clone()).collect(),
                })
                .collect(),
        }
    }

    /// Copy of the frame without the named column.
    pub fn without_column(&self, name: &str) -> FeatureFrame {
        FeatureFrame {
            keys: self.keys.clone(),
            columns: self
                .columns
                .iter()
                .filter(|c| c.name != name)
                .cloned()
                .collect(),
        }
    }

    /// Sort rows by `(user_id, event_timestamp)` so that row order is a
    /// function of content only.
    pub fn sorted_by_key(&self) -> FeatureFrame {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.keys[a].cmp(&self.keys[b]));
        self.select_rows(&order)
    }

    /// Inner join with labels on `(user_id, event_timestamp)`.
    ///
    /// Rows without a match on either side are dropped. The label is appended
    /// as an integer 0/1 column named `label_column`.
    pub fn inner_join_labels(&self, labels: &[LabelRow], label_column: &str) -> FeatureFrame {
        let lookup: HashMap<(&str, NaiveDate), bool> = labels
            .iter()
            .map(|l| ((l.user_id.as_str(), l.event_timestamp), l.churned))
            .collect();

        let mut kept = Vec::new();
        let mut label_values = Vec::new();
        for (i, key) in self.keys.iter().enumerate() {
            if let Some(churned) = lookup.get(&(key.user_id.as_str(), key.event_timestamp)) {
                kept.push(i);
                label_values.push(FeatureValue::Int(i64::from(*churned)));
            }
        }

        let mut joined = self.without_column(label_column).select_rows(&kept);
        joined.columns.push(FrameColumn {
            name: label_column.to_string(),
            kind: ValueKind::Int,
            values: label_values,
        });
        joined
    }

    /// Deterministic BLAKE3 hash over keys, column names, kinds and values.
    pub fn fingerprint(&self) -> DatasetHash {
        let mut hasher = blake3::Hasher::new();
        for column in &self.columns {
            hasher.update(column.name.as_bytes());
            hasher.update(format!("{:?}", column.kind).as_bytes());
        }
        for (i, key) in self.keys.iter().enumerate() {
            hasher.update(key.user_id.as_bytes());
            hasher.update(key.event_timestamp.to_string().as_bytes());
            for column in &self.columns {
                hasher.update(column.values[i].to_string().as_bytes());
                hasher.update(b"\x1f");
            }
        }
        DatasetHash(hasher.finalize().to_hex().to_string())
    }
}
