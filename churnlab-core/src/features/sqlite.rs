use chrono::NaiveDate;
use rusqlite::params;
use rusqlite::types::ValueRef;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::views::{FeatureField, FeatureView};
use super::{FeatureError, FeatureRef, FeatureStore, OnlineFeatures};
use crate::frame::{EntityKey, FeatureFrame, FeatureValue, ValueKind};
use crate::store::ingest::parse_date;
use crate::store::SnapshotStore;

/// Feature store over the SQLite snapshot tables.
#[derive(Clone)]
pub struct SqliteFeatureStore {
    store: Arc<SnapshotStore>,
}

/// Snapshot rows of one view for one user, ascending by as-of date.
type History = Vec<(NaiveDate, Vec<FeatureValue>)>;

impl SqliteFeatureStore {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self { store }
    }

    /// Group refs by view, preserving first-seen view order.
    fn plan(
        refs: &[FeatureRef],
    ) -> Result<Vec<(&'static FeatureView, Vec<FeatureField>)>, FeatureError> {
        let mut plan: Vec<(&'static FeatureView, Vec<FeatureField>)> = Vec::new();
        for r in refs {
            let (view, field) = r.resolve()?;
            match plan.iter_mut().find(|(v, _)| v.name == view.name) {
                Some((_, fields)) => fields.push(field),
                None => plan.push((view, vec![field])),
            }
        }
        Ok(plan)
    }

    fn load_history(
        &self,
        view: &FeatureView,
        fields: &[FeatureField],
        up_to: NaiveDate,
    ) -> Result<HashMap<String, History>, FeatureError> {
        let cols: Vec<&str> = fields.iter().map(|f| f.name).collect();
        let sql = format!(
            "SELECT user_id, as_of, {} FROM {} WHERE as_of <= ?1 ORDER BY user_id, as_of",
            cols.join(", "),
            view.source.name
        );
        let rows = self.store.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mapped = stmt.query_map(params![up_to.format("%Y-%m-%d").to_string()], |row| {
                let user: String = row.get(0)?;
                let as_of: String = row.get(1)?;
                let mut values = Vec::with_capacity(fields.len());
                for (i, f) in fields.iter().enumerate() {
                    values.push(to_feature(row.get_ref(i + 2)?, f.kind));
                }
                Ok((user, as_of, values))
            })?;
            mapped.collect::<Result<Vec<_>, _>>()
        })?;

        let mut history: HashMap<String, History> = HashMap::new();
        for (user, as_of, values) in rows {
            if let Some(d) = parse_date(&as_of) {
                history.entry(user).or_default().push((d, values));
            }
        }
        Ok(history)
    }
}

impl FeatureStore for SqliteFeatureStore {
    fn get_historical_features(
        &self,
        entities: &[EntityKey],
        refs: &[FeatureRef],
    ) -> Result<FeatureFrame, FeatureError> {
        let mut frame = FeatureFrame::new(entities.to_vec());
        let Some(up_to) = entities.iter().map(|e| e.event_timestamp).max() else {
            return Ok(frame);
        };

        let plan = Self::plan(refs)?;
        let mut by_field: HashMap<&str, (ValueKind, Vec<FeatureValue>)> = HashMap::new();

        for (view, fields) in &plan {
            let history = self.load_history(view, fields, up_to)?;
            let mut columns: Vec<Vec<FeatureValue>> =
                vec![Vec::with_capacity(entities.len()); fields.len()];

            for entity in entities {
                let hit = history.get(&entity.user_id).and_then(|rows| {
                    let idx = rows.partition_point(|(d, _)| *d <= entity.event_timestamp);
                    idx.checked_sub(1).map(|i| &rows[i].1)
                });
                for (j, column) in columns.iter_mut().enumerate() {
                    column.push(hit.map_or(FeatureValue::Null, |v| v[j].clone()));
                }
            }

            for (f, values) in fields.iter().zip(columns) {
                by_field.insert(f.name, (f.kind, values));
            }
            debug!(view = view.name, users = history.len(), "point-in-time join");
        }

        for r in refs {
            if let Some((kind, values)) = by_field.remove(r.field.as_str()) {
                frame.push_column(r.field.clone(), kind, values)?;
            }
        }
        Ok(frame)
    }

    fn get_online_features(
        &self,
        user_id: &str,
        refs: &[FeatureRef],
    ) -> Result<OnlineFeatures, FeatureError> {
        let plan = Self::plan(refs)?;
        let mut out = OnlineFeatures::new();

        for (view, fields) in &plan {
            let cols: Vec<&str> = fields.iter().map(|f| f.name).collect();
            let sql = format!(
                "SELECT {} FROM {} WHERE user_id = ?1 ORDER BY as_of DESC LIMIT 1",
                cols.join(", "),
                view.source.name
            );
            let latest = self.store.with_connection(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![user_id])?;
                let mut values = None;
                if let Some(row) = rows.next()? {
                    let mut row_values = Vec::with_capacity(fields.len());
                    for (i, f) in fields.iter().enumerate() {
                        row_values.push(to_feature(row.get_ref(i)?, f.kind));
                    }
                    values = Some(row_values);
                }
                Ok(values)
            })?;

            for (i, f) in fields.iter().enumerate() {
                let value = latest
                    .as_ref()
                    .map_or(FeatureValue::Null, |v| v[i].clone());
                out.insert(f.name.to_string(), value);
            }
        }
        Ok(out)
    }
}

/// Convert a stored SQLite value to the view field's logical kind. Values
/// that do not fit the kind become `Null`.
fn to_feature(value: ValueRef<'_>, kind: ValueKind) -> FeatureValue {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => FeatureValue::Null,
        ValueRef::Integer(i) => match kind {
            ValueKind::Int => FeatureValue::Int(i),
            ValueKind::Float => FeatureValue::Float(i as f64),
            ValueKind::Bool => FeatureValue::Bool(i != 0),
            ValueKind::Text => FeatureValue::Text(i.to_string()),
        },
        ValueRef::Real(f) => match kind {
            ValueKind::Int if f.fract() == 0.0 => FeatureValue::Int(f as i64),
            ValueKind::Int => FeatureValue::Null,
            ValueKind::Float => FeatureValue::Float(f),
            ValueKind::Bool => FeatureValue::Bool(f != 0.0),
            ValueKind::Text => FeatureValue::Text(f.to_string()),
        },
        ValueRef::Text(raw) => {
            let s = String::from_utf8_lossy(raw).into_owned();
            match kind {
                ValueKind::Text => FeatureValue::Text(s),
                ValueKind::Int => s.parse().map_or(FeatureValue::Null, FeatureValue::Int),
                ValueKind::Float => s.parse().map_or(FeatureValue::Null, FeatureValue::Float),
                ValueKind::Bool => crate::store::ingest::parse_bool(&s)
                    .map_or(FeatureValue::Null, FeatureValue::Bool),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema;
    use rusqlite::types::Value;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn refs(list: &[&str]) -> Vec<FeatureRef> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    /// Two snapshots: u1 on both dates with different fees, u2 only on the second.
    fn store() -> SqliteFeatureStore {
        let snap = SnapshotStore::open_in_memory().unwrap();
        let cols = ["user_id", "monthly_fee", "net_service", "paperless_billing"];
        snap.upsert_rows(
            &schema::SUBSCRIPTIONS,
            &cols,
            &[vec![
                Value::Text("u1".into()),
                Value::Real(10.0),
                Value::Text("fiber".into()),
                Value::Integer(1),
            ]],
        )
        .unwrap();
        snap.snapshot(d("2024-01-31")).unwrap();
        snap.upsert_rows(
            &schema::SUBSCRIPTIONS,
            &cols,
            &[
                vec![
                    Value::Text("u1".into()),
                    Value::Real(12.5),
                    Value::Text("fiber".into()),
                    Value::Integer(0),
                ],
                vec![
                    Value::Text("u2".into()),
                    Value::Real(8.0),
                    Value::Null,
                    Value::Integer(1),
                ],
            ],
        )
        .unwrap();
        snap.snapshot(d("2024-02-29")).unwrap();
        SqliteFeatureStore::new(Arc::new(snap))
    }

    #[test]
    fn point_in_time_join_uses_latest_prior_snapshot() {
        let fs = store();
        let entities = vec![
            EntityKey::new("u1", d("2024-01-31")),
            EntityKey::new("u1", d("2024-02-15")),
            EntityKey::new("u1", d("2024-03-31")),
            EntityKey::new("u2", d("2024-01-31")),
        ];
        let frame = fs
            .get_historical_features(&entities, &refs(&["subs_profile_fv:monthly_fee"]))
            .unwrap();
        let fee = frame.column("monthly_fee").unwrap();
        assert_eq!(fee.kind, ValueKind::Float);
        assert_eq!(
            fee.values,
            vec![
                FeatureValue::Float(10.0),
                FeatureValue::Float(10.0),
                FeatureValue::Float(12.5),
                FeatureValue::Null,
            ]
        );
    }

    #[test]
    fn output_columns_follow_ref_order() {
        let fs = store();
        let entities = vec![EntityKey::new("u1", d("2024-02-29"))];
        let frame = fs
            .get_historical_features(
                &entities,
                &refs(&[
                    "subs_profile_fv:paperless_billing",
                    "payments_agg_90d_fv:failed_payments_90d",
                    "subs_profile_fv:net_service",
                ]),
            )
            .unwrap();
        assert_eq!(
            frame.column_names(),
            vec!["paperless_billing", "failed_payments_90d", "net_service"]
        );
        assert_eq!(frame.column("paperless_billing").unwrap().values[0], FeatureValue::Bool(false));
        // No payments rows were ever snapshotted.
        assert!(frame.column("failed_payments_90d").unwrap().values[0].is_null());
    }

    #[test]
    fn online_features_take_latest_snapshot() {
        let fs = store();
        let online = fs
            .get_online_features("u1", &refs(&["subs_profile_fv:monthly_fee"]))
            .unwrap();
        assert_eq!(online["monthly_fee"], FeatureValue::Float(12.5));

        let unknown = fs
            .get_online_features("nobody", &refs(&["subs_profile_fv:monthly_fee"]))
            .unwrap();
        assert!(unknown["monthly_fee"].is_null());
    }

    #[test]
    fn unknown_ref_is_an_error() {
        let fs = store();
        let err = fs
            .get_online_features("u1", &refs(&["subs_profile_fv:shoe_size"]))
            .unwrap_err();
        assert!(matches!(err, FeatureError::UnknownField { .. }));
    }
}
