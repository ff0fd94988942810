//! Feature encoding: standardised numeric pass-through and one-hot categories.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{FeatureSchema, ModelError};
use crate::frame::{FeatureFrame, FeatureValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EncodedFeature {
    /// Missing values take `mean`; output is `(x - mean) / std`.
    Numeric { column: String, mean: f64, std: f64 },
    /// One output per category seen in training; unseen categories encode to
    /// all zeros.
    OneHot { column: String, categories: Vec<String> },
}

impl EncodedFeature {
    pub fn column(&self) -> &str {
        match self {
            EncodedFeature::Numeric { column, .. } | EncodedFeature::OneHot { column, .. } => {
                column.as_str()
            }
        }
    }

    fn width(&self) -> usize {
        match self {
            EncodedFeature::Numeric { .. } => 1,
            EncodedFeature::OneHot { categories, .. } => categories.len(),
        }
    }

    fn encode_into(&self, value: &FeatureValue, out: &mut Vec<f64>) {
        match self {
            EncodedFeature::Numeric { mean, std, .. } => {
                let x = value.as_f64().unwrap_or(*mean);
                out.push((x - mean) / std);
            }
            EncodedFeature::OneHot { categories, .. } => {
                let category = value.category();
                out.extend(
                    categories
                        .iter()
                        .map(|c| if category.as_deref() == Some(c.as_str()) { 1.0 } else { 0.0 }),
                );
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    pub features: Vec<EncodedFeature>,
}

impl FeatureEncoder {
    /// Learn means, spreads and category vocabularies from the training rows.
    pub fn fit(frame: &FeatureFrame, schema: &FeatureSchema) -> Result<Self, ModelError> {
        let mut features = Vec::with_capacity(schema.len());
        for name in &schema.numeric_cols {
            let column = frame
                .column(name)
                .ok_or_else(|| ModelError::MissingColumn(name.clone()))?;
            let values = column.numeric_values();
            let (mean, std) = if values.is_empty() {
                (0.0, 1.0)
            } else {
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                (mean, if std > 1e-12 { std } else { 1.0 })
            };
            features.push(EncodedFeature::Numeric {
                column: name.clone(),
                mean,
                std,
            });
        }
        for name in &schema.categorical_cols {
            let column = frame
                .column(name)
                .ok_or_else(|| ModelError::MissingColumn(name.clone()))?;
            let categories: BTreeSet<String> = column.category_values().into_iter().collect();
            features.push(EncodedFeature::OneHot {
                column: name.clone(),
                categories: categories.into_iter().collect(),
            });
        }
        Ok(Self { features })
    }

    /// Number of encoded inputs.
    pub fn width(&self) -> usize {
        self.features.iter().map(EncodedFeature::width).sum()
    }

    /// Input column names the encoder needs.
    pub fn columns(&self) -> Vec<&str> {
        self.features.iter().map(EncodedFeature::column).collect()
    }

    /// Encode every row of `frame`.
    pub fn transform(&self, frame: &FeatureFrame) -> Result<Vec<Vec<f64>>, ModelError> {
        let columns = self
            .features
            .iter()
            .map(|f| {
                frame
                    .column(f.column())
                    .ok_or_else(|| ModelError::MissingColumn(f.column().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let width = self.width();
        Ok((0..frame.len())
            .map(|i| {
                let mut row = Vec::with_capacity(width);
                for (feature, column) in self.features.iter().zip(&columns) {
                    feature.encode_into(&column.values[i], &mut row);
                }
                row
            })
            .collect())
    }

    /// Encode a single row given as a name → value map.
    pub fn transform_row(&self, values: &BTreeMap<String, FeatureValue>) -> Result<Vec<f64>, ModelError> {
        let mut row = Vec::with_capacity(self.width());
        for feature in &self.features {
            let value = values
                .get(feature.column())
                .ok_or_else(|| ModelError::MissingColumn(feature.column().to_string()))?;
            feature.encode_into(value, &mut row);
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{EntityKey, ValueKind};
    use chrono::NaiveDate;

    fn frame() -> FeatureFrame {
        let d = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let mut f = FeatureFrame::new((0..3).map(|i| EntityKey::new(format!("u{i}"), d)).collect());
        f.push_column(
            "monthly_fee",
            ValueKind::Float,
            vec![FeatureValue::Float(10.0), FeatureValue::Float(20.0), FeatureValue::Null],
        )
        .unwrap();
        f.push_column(
            "net_service",
            ValueKind::Text,
            vec![
                FeatureValue::Text("fiber".into()),
                FeatureValue::Text("dsl".into()),
                FeatureValue::Text("fiber".into()),
            ],
        )
        .unwrap();
        f
    }

    fn schema() -> FeatureSchema {
        FeatureSchema {
            categorical_cols: vec!["net_service".into()],
            numeric_cols: vec!["monthly_fee".into()],
        }
    }

    #[test]
    fn standardises_and_imputes() {
        let enc = FeatureEncoder::fit(&frame(), &schema()).unwrap();
        let rows = enc.transform(&frame()).unwrap();
        assert_eq!(enc.width(), 3);
        assert!((rows[0][0] + 1.0).abs() < 1e-12);
        assert!((rows[1][0] - 1.0).abs() < 1e-12);
        // Null fee imputed with the mean → 0 after centring.
        assert!(rows[2][0].abs() < 1e-12);
        // Categories sorted: [dsl, fiber]
        assert_eq!(&rows[0][1..], &[0.0, 1.0]);
        assert_eq!(&rows[1][1..], &[1.0, 0.0]);
    }

    #[test]
    fn unseen_category_is_all_zero() {
        let enc = FeatureEncoder::fit(&frame(), &schema()).unwrap();
        let mut values = BTreeMap::new();
        values.insert("monthly_fee".to_string(), FeatureValue::Float(15.0));
        values.insert("net_service".to_string(), FeatureValue::Text("satellite".into()));
        assert_eq!(enc.transform_row(&values).unwrap(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn missing_column_is_an_error() {
        let enc = FeatureEncoder::fit(&frame(), &schema()).unwrap();
        let f = frame().without_column("net_service");
        assert!(matches!(enc.transform(&f), Err(ModelError::MissingColumn(c)) if c == "net_service"));
    }
}
