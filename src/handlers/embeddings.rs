use crate::error::{AppError, Result};
use crate::extract::ApiJson;
use crate::state::AppState;
use crate::tokens::estimate_tokens;
use axum::{extract::State, Json};
use ndarray::{Array2, ArrayD, Axis, Ix2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingResponse {
    pub object: &'static str,
    pub data: Vec<EmbeddingData>,
    pub model: String,
    pub usage: Usage,
}

#[derive(Debug, Serialize)]
pub struct EmbeddingData {
    pub object: &'static str,
    pub index: usize,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub total_tokens: usize,
}

impl EmbeddingRequest {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Model name cannot be empty".to_string(),
            ));
        }
        if self.input.is_empty() {
            return Err(AppError::ValidationError(
                "Input texts cannot be empty".to_string(),
            ));
        }
        if self.input.iter().all(|text| text.trim().is_empty()) {
            return Err(AppError::ValidationError(
                "Input texts cannot all be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// POST /v1/embeddings - Encode texts into embedding vectors.
///
/// # Flow
/// 1. Validate input (400 before any model is touched)
/// 2. Resolve the model through the cache, downloading on first use
/// 3. Encode on the blocking pool
/// 4. One `data` entry per input row, in input order
pub async fn embeddings_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<EmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>> {
    request.validate()?;

    let start = std::time::Instant::now();
    let embedder = state
        .models
        .get_or_load(&request.model)
        .await?
        .embedder(&request.model)?;

    let input = request.input.clone();
    let raw = tokio::task::spawn_blocking(move || embedder.encode(&input))
        .await
        .map_err(|e| AppError::InferenceError(format!("Task join error: {}", e)))??;

    let matrix = into_rows(raw)?;
    let data: Vec<EmbeddingData> = matrix
        .outer_iter()
        .enumerate()
        .map(|(index, row)| EmbeddingData {
            object: "embedding",
            index,
            embedding: row.to_vec(),
        })
        .collect();

    let prompt_tokens = estimate_tokens(&request.input);

    tracing::debug!(
        model = %request.model,
        inputs = request.input.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Embeddings completed"
    );

    metrics::counter!("embedding_requests_total").increment(1);
    metrics::histogram!("embedding_batch_size").record(request.input.len() as f64);

    Ok(Json(EmbeddingResponse {
        object: "list",
        data,
        model: request.model,
        usage: Usage {
            prompt_tokens,
            total_tokens: prompt_tokens,
        },
    }))
}

/// Coerce encoder output into (rows, dim), promoting a single vector to one row.
pub fn into_rows(embeddings: ArrayD<f32>) -> Result<Array2<f32>> {
    let embeddings = match embeddings.ndim() {
        1 => embeddings.insert_axis(Axis(0)),
        2 => embeddings,
        n => {
            return Err(AppError::InferenceError(format!(
                "Expected 1-D or 2-D embeddings, got {} dimensions",
                n
            )))
        }
    };
    embeddings
        .into_dimensionality::<Ix2>()
        .map_err(|e| AppError::InferenceError(e.to_string()))
}
