use crate::config::ConfigInfo;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ModelsResponse {
    pub loaded_models: Vec<String>,
}

/// GET / - Service status message
pub async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Embedding API is running",
    })
}

/// GET /health - Liveness probe
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /models - Models loaded in this process
pub async fn models_handler(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        loaded_models: state.models.loaded(),
    })
}

/// GET /config - Active configuration
pub async fn config_handler(State(state): State<Arc<AppState>>) -> Json<ConfigInfo> {
    Json(state.config.info())
}
