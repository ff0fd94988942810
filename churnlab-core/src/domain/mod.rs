//! Domain types shared across the pipeline.

pub mod decision;
pub mod ids;
pub mod metrics;
pub mod stage;

pub use decision::{DriftResult, PromotionDecision, RetrainingSignal, DEFAULT_RETRAIN_THRESHOLD};
pub use ids::{DatasetHash, ModelVersion, RunId};
pub use metrics::MetricSnapshot;
pub use stage::ModelStage;

/// Entity join key column.
pub const USER_ID: &str = "user_id";
/// Point-in-time key column.
pub const EVENT_TIMESTAMP: &str = "event_timestamp";
/// Default label column.
pub const CHURN_LABEL: &str = "churn_label";
