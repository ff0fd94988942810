//! ChurnLab Serve: online churn prediction over HTTP.
//!
//! Routes:
//! - `GET /health` liveness probe
//! - `GET /features/{user_id}` latest online feature values
//! - `POST /predict` churn probability from the Production model
//!
//! The Production model is resolved once at startup. When the registry has
//! none, or the feature store is unavailable, the service still starts and
//! the dependent routes answer 503.

pub mod error;
pub mod handlers;

pub use error::{ApiError, ServeError};

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use churnlab_core::domain::ModelStage;
use churnlab_core::features::{FeatureRef, FeatureStore};
use churnlab_core::registry::{LoadedModel, ModelRegistry, RegistryError};

#[derive(Clone)]
pub struct AppState {
    pub features: Option<Arc<dyn FeatureStore>>,
    pub model: Option<Arc<LoadedModel>>,
    pub refs: Arc<Vec<FeatureRef>>,
}

impl AppState {
    pub fn new(
        features: Option<Arc<dyn FeatureStore>>,
        model: Option<LoadedModel>,
        refs: Vec<FeatureRef>,
    ) -> Self {
        Self {
            features,
            model: model.map(Arc::new),
            refs: Arc::new(refs),
        }
    }

    /// Load the Production version of `model_name`. A missing Production
    /// model leaves prediction disabled; any other registry failure is
    /// returned.
    pub fn from_registry(
        features: Option<Arc<dyn FeatureStore>>,
        registry: &dyn ModelRegistry,
        model_name: &str,
        refs: Vec<FeatureRef>,
    ) -> Result<Self, RegistryError> {
        let model = match registry.load(model_name, ModelStage::Production) {
            Ok(loaded) => {
                info!(
                    model = model_name,
                    version = %loaded.info.version,
                    "production model loaded"
                );
                Some(loaded)
            }
            Err(RegistryError::NoModelInStage { .. }) => {
                warn!(model = model_name, "no production model; /predict disabled");
                None
            }
            Err(e) => return Err(e),
        };
        Ok(Self::new(features, model, refs))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/features/{user_id}", get(handlers::get_features))
        .route("/predict", post(handlers::predict))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(state: AppState, addr: &str) -> Result<(), ServeError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!(addr, "serving");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; serving until killed");
        std::future::pending::<()>().await;
    }
}
