//! Feature retrieval keyed by `(user_id, event_timestamp)`.
//!
//! [`FeatureStore`] is the seam the controllers and the online service depend
//! on; [`SqliteFeatureStore`] serves it from the snapshot tables.

pub mod sqlite;
pub mod views;

pub use sqlite::SqliteFeatureStore;
pub use views::{feature_view, FeatureField, FeatureRef, FeatureView, DEFAULT_FEATURE_REFS};

use std::collections::BTreeMap;
use thiserror::Error;

use crate::frame::{EntityKey, FeatureFrame, FeatureValue, FrameError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("invalid feature reference '{0}' (expected view:field)")]
    InvalidRef(String),

    #[error("unknown feature view '{0}'")]
    UnknownView(String),

    #[error("feature view '{view}' has no field '{field}'")]
    UnknownField { view: String, field: String },
}

/// Latest feature values for one entity, by field name.
pub type OnlineFeatures = BTreeMap<String, FeatureValue>;

pub trait FeatureStore: Send + Sync {
    /// Point-in-time join: for each entity row, the latest source row whose
    /// as-of date is at or before `event_timestamp`. Output columns are the
    /// field names of `refs`, in order; rows keep the order of `entities`.
    fn get_historical_features(
        &self,
        entities: &[EntityKey],
        refs: &[FeatureRef],
    ) -> Result<FeatureFrame, FeatureError>;

    /// Latest snapshot values for one user. Absent values are `Null`.
    fn get_online_features(
        &self,
        user_id: &str,
        refs: &[FeatureRef],
    ) -> Result<OnlineFeatures, FeatureError>;
}
