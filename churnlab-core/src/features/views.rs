//! Feature view registry and `view:field` references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::FeatureError;
use crate::frame::ValueKind;
use crate::store::schema::{
    SnapshotSpec, PAYMENTS_AGG_90D_SNAPSHOTS, SUBSCRIPTIONS_PROFILE_SNAPSHOTS,
    SUPPORT_AGG_90D_SNAPSHOTS, USAGE_AGG_30D_SNAPSHOTS,
};

/// Entity join key shared by every view.
pub const ENTITY_JOIN_KEY: &str = "user_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureField {
    pub name: &'static str,
    pub kind: ValueKind,
}

const fn field(name: &'static str, kind: ValueKind) -> FeatureField {
    FeatureField { name, kind }
}

/// A named group of features backed by one snapshot table. Views have no TTL:
/// any snapshot at or before the requested timestamp is eligible.
#[derive(Debug, Clone, Copy)]
pub struct FeatureView {
    pub name: &'static str,
    pub source: &'static SnapshotSpec,
    pub fields: &'static [FeatureField],
}

impl FeatureView {
    pub fn field(&self, name: &str) -> Option<&FeatureField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub static FEATURE_VIEWS: [FeatureView; 4] = [
    FeatureView {
        name: "subs_profile_fv",
        source: &SUBSCRIPTIONS_PROFILE_SNAPSHOTS,
        fields: &[
            field("months_active", ValueKind::Int),
            field("monthly_fee", ValueKind::Float),
            field("paperless_billing", ValueKind::Bool),
            field("plan_stream_tv", ValueKind::Bool),
            field("plan_stream_movies", ValueKind::Bool),
            field("net_service", ValueKind::Text),
        ],
    },
    FeatureView {
        name: "usage_agg_30d_fv",
        source: &USAGE_AGG_30D_SNAPSHOTS,
        fields: &[
            field("watch_hours_30d", ValueKind::Float),
            field("avg_session_mins_7d", ValueKind::Float),
            field("unique_devices_30d", ValueKind::Int),
            field("skips_7d", ValueKind::Int),
            field("rebuffer_events_7d", ValueKind::Int),
        ],
    },
    FeatureView {
        name: "payments_agg_90d_fv",
        source: &PAYMENTS_AGG_90D_SNAPSHOTS,
        fields: &[field("failed_payments_90d", ValueKind::Int)],
    },
    FeatureView {
        name: "support_agg_90d_fv",
        source: &SUPPORT_AGG_90D_SNAPSHOTS,
        fields: &[
            field("support_tickets_90d", ValueKind::Int),
            field("ticket_avg_resolution_hrs_90d", ValueKind::Float),
        ],
    },
];

pub fn feature_view(name: &str) -> Option<&'static FeatureView> {
    FEATURE_VIEWS.iter().find(|v| v.name == name)
}

/// The full feature list used by training, monitoring and serving.
pub const DEFAULT_FEATURE_REFS: [&str; 14] = [
    "subs_profile_fv:months_active",
    "subs_profile_fv:monthly_fee",
    "subs_profile_fv:paperless_billing",
    "subs_profile_fv:plan_stream_tv",
    "subs_profile_fv:plan_stream_movies",
    "subs_profile_fv:net_service",
    "usage_agg_30d_fv:watch_hours_30d",
    "usage_agg_30d_fv:avg_session_mins_7d",
    "usage_agg_30d_fv:unique_devices_30d",
    "usage_agg_30d_fv:skips_7d",
    "usage_agg_30d_fv:rebuffer_events_7d",
    "payments_agg_90d_fv:failed_payments_90d",
    "support_agg_90d_fv:support_tickets_90d",
    "support_agg_90d_fv:ticket_avg_resolution_hrs_90d",
];

/// `view:field` reference to one feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureRef {
    pub view: String,
    pub field: String,
}

impl FeatureRef {
    /// Check the reference against the view registry.
    pub fn resolve(&self) -> Result<(&'static FeatureView, FeatureField), FeatureError> {
        let view = feature_view(&self.view)
            .ok_or_else(|| FeatureError::UnknownView(self.view.clone()))?;
        let field = view.field(&self.field).ok_or_else(|| FeatureError::UnknownField {
            view: self.view.clone(),
            field: self.field.clone(),
        })?;
        Ok((view, *field))
    }

    pub fn defaults() -> Vec<FeatureRef> {
        DEFAULT_FEATURE_REFS
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

impl FromStr for FeatureRef {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((view, field)) if !view.is_empty() && !field.is_empty() && !field.contains(':') => {
                Ok(FeatureRef {
                    view: view.trim().to_string(),
                    field: field.trim().to_string(),
                })
            }
            _ => Err(FeatureError::InvalidRef(s.to_string())),
        }
    }
}

impl TryFrom<String> for FeatureRef {
    type Error = FeatureError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FeatureRef> for String {
    fn from(r: FeatureRef) -> Self {
        r.to_string()
    }
}

impl fmt::Display for FeatureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.view, self.field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_resolve() {
        let refs = FeatureRef::defaults();
        assert_eq!(refs.len(), 14);
        for r in &refs {
            r.resolve().unwrap();
        }
    }

    #[test]
    fn view_fields_exist_in_snapshot_tables() {
        for view in FEATURE_VIEWS.iter() {
            for f in view.fields {
                assert!(view.source.columns.contains(&f.name), "{}:{}", view.name, f.name);
            }
        }
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("subs_profile_fv".parse::<FeatureRef>().is_err());
        assert!(":monthly_fee".parse::<FeatureRef>().is_err());
        assert!("a:b:c".parse::<FeatureRef>().is_err());
    }

    #[test]
    fn resolve_reports_unknown_field() {
        let r: FeatureRef = "subs_profile_fv:shoe_size".parse().unwrap();
        assert!(matches!(r.resolve(), Err(FeatureError::UnknownField { .. })));
        let r: FeatureRef = "nope_fv:x".parse().unwrap();
        assert!(matches!(r.resolve(), Err(FeatureError::UnknownView(_))));
    }

    #[test]
    fn serde_uses_string_form() {
        let r: FeatureRef = "payments_agg_90d_fv:failed_payments_90d".parse().unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"payments_agg_90d_fv:failed_payments_90d\"");
        let back: FeatureRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
