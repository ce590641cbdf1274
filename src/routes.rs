use crate::handlers::{
    config_handler, embeddings_handler, health_handler, models_handler, rerank_handler,
    root_handler,
};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Inference requests may carry large document batches.
const INFERENCE_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Build the service router.
///
/// `metrics` adds a `/metrics` route rendering the Prometheus recorder.
pub fn router(state: Arc<AppState>, metrics: Option<PrometheusHandle>) -> Router {
    let mut app = Router::new()
        .route(
            "/v1/embeddings",
            post(embeddings_handler).layer(DefaultBodyLimit::max(INFERENCE_BODY_LIMIT)),
        )
        .route(
            "/v1/rerank",
            post(rerank_handler).layer(DefaultBodyLimit::max(INFERENCE_BODY_LIMIT)),
        )
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/models", get(models_handler))
        .route("/config", get(config_handler));

    if let Some(handle) = metrics {
        app = app.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::custom(handle_panic)),
    )
    .with_state(state)
}

/// Convert a panicking handler into a generic 500 so clients never see a dropped connection.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic payload"
    };
    tracing::error!(panic = %detail, "Unhandled error while processing request");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "internal server error",
            "detail": "The server encountered an unexpected error, please retry later",
        })),
    )
        .into_response()
}
