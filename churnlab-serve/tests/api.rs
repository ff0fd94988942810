//! HTTP contract of the online service, driven through `oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower::ServiceExt;

use churnlab_core::domain::ModelStage;
use churnlab_core::features::{FeatureRef, FeatureStore, SqliteFeatureStore};
use churnlab_core::registry::{ModelRegistry, SqliteRegistry};
use churnlab_core::store::SnapshotStore;
use churnlab_runner::{ingest_month, PipelineConfig, TrainingController};
use churnlab_serve::{router, AppState};

const JAN: &str = "2024-01-31";

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn seeds(month: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../data/seeds")
        .join(month)
}

struct Fixture {
    _dir: tempfile::TempDir,
    config: PipelineConfig,
    features: Arc<dyn FeatureStore>,
    registry: SqliteRegistry,
}

fn fixture(promote: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.tracking.runs_path = dir.path().join("runs/experiments.jsonl");

    let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
    ingest_month(&store, &seeds("month_000"), date(JAN)).unwrap();
    let features = SqliteFeatureStore::new(store.clone());
    let registry = SqliteRegistry::open_in_memory().unwrap();

    let baseline = TrainingController::new(&config, &store, &features, &registry)
        .train_baseline(date(JAN))
        .unwrap();
    if promote {
        registry
            .transition(
                &config.registry.model_name,
                baseline.metrics.version,
                ModelStage::Production,
                true,
            )
            .unwrap();
    }
    Fixture {
        _dir: dir,
        config,
        features: Arc::new(features),
        registry,
    }
}

fn state(f: &Fixture) -> AppState {
    AppState::from_registry(
        Some(f.features.clone()),
        &f.registry,
        &f.config.registry.model_name,
        f.config.features.refs.clone(),
    )
    .unwrap()
}

async fn send(state: AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn predict_request(user_id: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "user_id": user_id }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_is_ok_without_dependencies() {
    let state = AppState::new(None, None, FeatureRef::defaults());
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn features_returns_latest_values() {
    let f = fixture(false);
    let request = Request::builder()
        .uri("/features/U0001")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(state(&f), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "U0001");
    let features = body["features"].as_object().unwrap();
    assert_eq!(features.len(), 14);
    assert!(features["monthly_fee"].is_number());
    assert!(features["net_service"].is_string());
}

#[tokio::test]
async fn predict_scores_known_user() {
    let f = fixture(true);
    let (status, body) = send(state(&f), predict_request("U0001")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["user_id"], "U0001");
    let prediction = body["prediction"].as_u64().unwrap();
    assert!(prediction <= 1);
    let probability = body["probability"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&probability));
    assert_eq!(prediction == 1, probability >= 0.5);
    assert_eq!(body["model_version"], 1);
    assert_eq!(body["features_used"].as_object().unwrap().len(), 14);
}

#[tokio::test]
async fn predict_unknown_user_lists_missing_features() {
    let f = fixture(true);
    let (status, body) = send(state(&f), predict_request("U9999")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "missing features for user");
    let missing = body["missing_features"].as_array().unwrap();
    assert_eq!(missing.len(), 14);
    assert!(missing.contains(&serde_json::json!("watch_hours_30d")));
}

#[tokio::test]
async fn predict_without_production_model_is_unavailable() {
    let f = fixture(false);
    let state = state(&f);
    assert!(state.model.is_none());
    let (status, body) = send(state, predict_request("U0001")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "production model not loaded");
    assert!(body.get("missing_features").is_none());
}

#[tokio::test]
async fn feature_routes_without_store_are_unavailable() {
    let state = AppState::new(None, None, FeatureRef::defaults());
    let request = Request::builder()
        .uri("/features/U0001")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(state.clone(), request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "feature store not loaded");

    let (status, _) = send(state, predict_request("U0001")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
