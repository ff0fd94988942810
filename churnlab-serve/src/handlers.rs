//! Route handlers.
//!
//! Feature-store and model calls are synchronous (SQLite behind a mutex),
//! so they run on the blocking pool.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use churnlab_core::domain::ModelVersion;
use churnlab_core::features::OnlineFeatures;
use churnlab_core::frame::FeatureValue;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeaturesResponse {
    pub user_id: String,
    pub features: OnlineFeatures,
}

pub async fn get_features(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<FeaturesResponse>, ApiError> {
    let store = state.features.clone().ok_or(ApiError::NotReady("feature store"))?;
    let refs = state.refs.clone();
    let lookup_id = user_id.clone();
    let features =
        tokio::task::spawn_blocking(move || store.get_online_features(&lookup_id, &refs)).await??;
    debug!(%user_id, n = features.len(), "online features served");
    Ok(Json(FeaturesResponse { user_id, features }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub user_id: String,
    /// 1 when the user is predicted to churn.
    pub prediction: u8,
    pub probability: f64,
    pub model_version: ModelVersion,
    pub features_used: BTreeMap<String, FeatureValue>,
}

pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    let store = state.features.clone().ok_or(ApiError::NotReady("feature store"))?;
    let model = state.model.clone().ok_or(ApiError::NotReady("production model"))?;
    let refs = state.refs.clone();
    let user_id = request.user_id;
    let model_version = model.info.version;

    let lookup_id = user_id.clone();
    let (prediction, features_used) = tokio::task::spawn_blocking(move || {
        let online = store.get_online_features(&lookup_id, &refs)?;
        let required = model.classifier.required_features();
        let missing: Vec<String> = required
            .iter()
            .filter(|name| online.get(**name).map_or(true, FeatureValue::is_null))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ApiError::MissingFeatures { missing });
        }
        let used: BTreeMap<String, FeatureValue> = required
            .iter()
            .filter_map(|name| online.get(*name).map(|v| (name.to_string(), v.clone())))
            .collect();
        let prediction = model.classifier.predict_one(&used)?;
        Ok((prediction, used))
    })
    .await??;

    info!(%user_id, probability = prediction.probability, version = %model_version, "prediction");
    Ok(Json(PredictResponse {
        user_id,
        prediction: u8::from(prediction.churn),
        probability: prediction.probability,
        model_version,
        features_used,
    }))
}
