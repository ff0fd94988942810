//! Churn classifier.
//!
//! - [`FeatureSchema`] splits input columns into categorical (text) and
//!   numeric (everything else, booleans included).
//! - [`FeatureEncoder`] one-hot encodes categories and standardises numbers.
//! - [`LogisticRegression`] produces churn probabilities.
//! - [`ChurnClassifier`] bundles the three and is the registered artifact.

pub mod encoder;
pub mod logistic;
pub mod metrics;
pub mod split;

pub use encoder::{EncodedFeature, FeatureEncoder};
pub use logistic::{LogisticRegression, TrainParams};
pub use metrics::{accuracy, f1_score, roc_auc, ClassificationMetrics};
pub use split::{stratified_split, Split};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{EVENT_TIMESTAMP, USER_ID};
use crate::frame::{FeatureFrame, FeatureValue, ValueKind};

/// Model family recorded in experiment params.
pub const MODEL_TYPE: &str = "LogisticRegression";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("missing feature column '{0}'")]
    MissingColumn(String),

    #[error("label column '{column}' has a null at row {row}")]
    NullLabel { column: String, row: usize },

    #[error("invalid split: {0}")]
    InvalidSplit(String),

    #[error("cannot train on an empty dataset")]
    EmptyTrainingSet,

    #[error("model artifact error: {0}")]
    Artifact(#[from] serde_json::Error),
}

/// Input columns by encoding, as logged with each training run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub categorical_cols: Vec<String>,
    pub numeric_cols: Vec<String>,
}

impl FeatureSchema {
    /// Derive from a frame, skipping the label and identifier columns.
    pub fn from_frame(frame: &FeatureFrame, label_column: &str) -> Self {
        let mut schema = Self::default();
        for column in &frame.columns {
            let name = column.name.as_str();
            if name == label_column || name == USER_ID || name == EVENT_TIMESTAMP {
                continue;
            }
            match column.kind {
                ValueKind::Text => schema.categorical_cols.push(column.name.clone()),
                _ => schema.numeric_cols.push(column.name.clone()),
            }
        }
        schema
    }

    pub fn len(&self) -> usize {
        self.categorical_cols.len() + self.numeric_cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.numeric_cols
            .iter()
            .chain(&self.categorical_cols)
            .map(String::as_str)
    }
}

/// Binary labels of `label_column`. Any non-zero value is churn.
pub fn label_vector(frame: &FeatureFrame, label_column: &str) -> Result<Vec<bool>, ModelError> {
    let column = frame
        .column(label_column)
        .ok_or_else(|| ModelError::MissingColumn(label_column.to_string()))?;
    column
        .values
        .iter()
        .enumerate()
        .map(|(row, v)| {
            v.as_f64().map(|x| x != 0.0).ok_or_else(|| ModelError::NullLabel {
                column: label_column.to_string(),
                row,
            })
        })
        .collect()
}

/// One online prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub probability: f64,
    pub churn: bool,
}

/// Trained, serialisable churn model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnClassifier {
    pub model_type: String,
    pub schema: FeatureSchema,
    pub encoder: FeatureEncoder,
    pub model: LogisticRegression,
    pub params: TrainParams,
}

impl ChurnClassifier {
    pub fn fit(
        frame: &FeatureFrame,
        label_column: &str,
        params: &TrainParams,
    ) -> Result<Self, ModelError> {
        if frame.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        let labels = label_vector(frame, label_column)?;
        let schema = FeatureSchema::from_frame(frame, label_column);
        let encoder = FeatureEncoder::fit(frame, &schema)?;
        let x = encoder.transform(frame)?;
        let model = LogisticRegression::fit(&x, &labels, params);
        Ok(Self {
            model_type: MODEL_TYPE.to_string(),
            schema,
            encoder,
            model,
            params: *params,
        })
    }

    /// Feature columns a prediction needs.
    pub fn required_features(&self) -> Vec<&str> {
        self.encoder.columns()
    }

    pub fn predict_proba(&self, frame: &FeatureFrame) -> Result<Vec<f64>, ModelError> {
        Ok(self
            .encoder
            .transform(frame)?
            .iter()
            .map(|row| self.model.predict_proba(row))
            .collect())
    }

    pub fn predict_one(
        &self,
        features: &BTreeMap<String, FeatureValue>,
    ) -> Result<Prediction, ModelError> {
        let row = self.encoder.transform_row(features)?;
        let probability = self.model.predict_proba(&row);
        Ok(Prediction {
            probability,
            churn: probability >= 0.5,
        })
    }

    /// AUC, F1 and accuracy against the frame's labels.
    pub fn evaluate(
        &self,
        frame: &FeatureFrame,
        label_column: &str,
    ) -> Result<ClassificationMetrics, ModelError> {
        let labels = label_vector(frame, label_column)?;
        let probabilities = self.predict_proba(frame)?;
        Ok(ClassificationMetrics::evaluate(&labels, &probabilities))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
