//! Shared fakes for integration tests: no network, no ONNX Runtime.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use embedding_api::{
    router, AppError, AppState, Config, Embedder, LoadedModel, ModelCache, ModelFactory, ModelHub,
    ModelKind, Reranker,
};
use ndarray::{arr0, ArrayD, IxDyn};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// Hub that materializes an empty snapshot directory and counts fetches.
#[derive(Default)]
pub struct CountingHub {
    pub calls: AtomicUsize,
}

impl CountingHub {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelHub for CountingHub {
    async fn fetch(&self, model_id: &str, cache_dir: &Path) -> anyhow::Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let dir = cache_dir.join(format!("models--{}", model_id.replace('/', "--")));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

/// Hub whose fetch panics on the request task, outside any blocking pool.
pub struct PanickingHub;

#[async_trait]
impl ModelHub for PanickingHub {
    async fn fetch(&self, _model_id: &str, _cache_dir: &Path) -> anyhow::Result<PathBuf> {
        panic!("hub credentials at /secret/token rejected")
    }
}

/// Encoder returning row `i` = `[0.1 + i, 0.2]`.
pub struct StubEmbedder;

impl Embedder for StubEmbedder {
    fn encode(&self, texts: &[String]) -> Result<ArrayD<f32>, AppError> {
        let data: Vec<f32> = (0..texts.len())
            .flat_map(|i| [0.1 + i as f32, 0.2])
            .collect();
        ArrayD::from_shape_vec(IxDyn(&[texts.len(), 2]), data)
            .map_err(|e| AppError::InferenceError(e.to_string()))
    }
}

/// Encoder that returns a bare vector regardless of batch size.
pub struct VectorEmbedder;

impl Embedder for VectorEmbedder {
    fn encode(&self, _texts: &[String]) -> Result<ArrayD<f32>, AppError> {
        ArrayD::from_shape_vec(IxDyn(&[2]), vec![0.1, 0.2])
            .map_err(|e| AppError::InferenceError(e.to_string()))
    }
}

/// Scores a pair by document length / 10; one pair yields a 0-d scalar.
pub struct LengthReranker;

impl Reranker for LengthReranker {
    fn compute_score(
        &self,
        pairs: &[(String, String)],
        _normalize: bool,
    ) -> Result<ArrayD<f32>, AppError> {
        let scores: Vec<f32> = pairs
            .iter()
            .map(|(_, doc)| doc.chars().count() as f32 / 10.0)
            .collect();
        if scores.len() == 1 {
            return Ok(arr0(scores[0]).into_dyn());
        }
        Ok(ArrayD::from_shape_vec(IxDyn(&[scores.len()]), scores)
            .map_err(|e| AppError::InferenceError(e.to_string()))?)
    }
}

pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn encode(&self, _texts: &[String]) -> Result<ArrayD<f32>, AppError> {
        Err(AppError::InferenceError("encoder exploded".to_string()))
    }
}

/// Hands out the configured stub for each kind and counts instantiations.
pub struct StubFactory {
    pub embedder: Arc<dyn Embedder>,
    pub reranker: Arc<dyn Reranker>,
    pub created: AtomicUsize,
}

impl Default for StubFactory {
    fn default() -> Self {
        Self::with_embedder(Arc::new(StubEmbedder))
    }
}

impl StubFactory {
    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            reranker: Arc::new(LengthReranker),
            created: AtomicUsize::new(0),
        }
    }
}

impl ModelFactory for StubFactory {
    fn create(
        &self,
        kind: ModelKind,
        _model_dir: &Path,
        _use_fp16: bool,
    ) -> Result<LoadedModel, AppError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(match kind {
            ModelKind::Embedding => LoadedModel::Embedding(Arc::clone(&self.embedder)),
            ModelKind::Reranking => LoadedModel::Reranking(Arc::clone(&self.reranker)),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub hub: Arc<CountingHub>,
    pub factory: Arc<StubFactory>,
    pub storage: tempfile::TempDir,
}

pub fn test_app() -> TestApp {
    test_app_with(StubFactory::default())
}

pub fn test_app_with(factory: StubFactory) -> TestApp {
    let storage = tempfile::tempdir().expect("temp storage dir");
    let hub = Arc::new(CountingHub::default());
    let factory = Arc::new(factory);

    TestApp {
        router: build_router(storage.path(), hub.clone(), factory.clone()),
        hub,
        factory,
        storage,
    }
}

/// Production router over an arbitrary hub; the storage dir must outlive it.
pub fn router_with_hub(storage: &Path, hub: Arc<dyn ModelHub>) -> Router {
    build_router(storage, hub, Arc::new(StubFactory::default()))
}

fn build_router(storage: &Path, hub: Arc<dyn ModelHub>, factory: Arc<dyn ModelFactory>) -> Router {
    let config = Config {
        model_storage_path: storage.to_path_buf(),
        use_fp16: false,
        ..Config::default()
    };
    let models = ModelCache::new(storage, config.use_fp16, hub, factory);
    let state = Arc::new(AppState::with_models(config, models));
    router(state, None)
}

/// Helper to make a JSON request to the router.
pub async fn json_request(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let req = match method {
        "GET" => Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
        "POST" => Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.unwrap_or(json!({})).to_string()))
            .unwrap(),
        _ => panic!("Unsupported method"),
    };

    raw_request(app, req).await
}

pub async fn raw_request(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));

    (status, body)
}
