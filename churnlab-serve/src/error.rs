//! Service errors: startup failures and per-request error payloads.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use churnlab_core::features::FeatureError;
use churnlab_core::model::ModelError;

/// Failures that stop the server.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-request failures, each rendered as a JSON payload.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not loaded")]
    NotReady(&'static str),

    #[error("missing features for user")]
    MissingFeatures { missing: Vec<String> },

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing_features: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, missing_features) = match &self {
            ApiError::NotReady(_) => (StatusCode::SERVICE_UNAVAILABLE, None),
            ApiError::MissingFeatures { missing } => {
                (StatusCode::UNPROCESSABLE_ENTITY, Some(missing.clone()))
            }
            ApiError::Feature(_) | ApiError::Model(_) | ApiError::Join(_) => {
                error!(error = %self, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };
        let body = ErrorBody {
            error: self.to_string(),
            missing_features,
        };
        (status, Json(body)).into_response()
    }
}
