use crate::config::Config;
use crate::models::ModelCache;
use std::sync::Arc;

/// Application state shared across all request handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub models: ModelCache,
}

impl AppState {
    /// State with the default HuggingFace Hub + ONNX Runtime model cache.
    ///
    /// Nothing is loaded here; models are materialized on first request.
    pub fn new(config: Config) -> Self {
        let models = ModelCache::from_config(&config);
        Self::with_models(config, models)
    }

    /// State with an explicitly constructed cache (custom hub or factory).
    pub fn with_models(config: Config, models: ModelCache) -> Self {
        Self {
            config: Arc::new(config),
            models,
        }
    }
}
