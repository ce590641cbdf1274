use crate::error::{AppError, Result};
use crate::extract::ApiJson;
use crate::state::AppState;
use crate::tokens::estimate_tokens;
use axum::{extract::State, Json};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_max_chunks_per_doc() -> i64 {
    1024
}

fn default_overlap_tokens() -> i64 {
    80
}

#[derive(Debug, Deserialize)]
pub struct RerankRequest {
    pub model: String,
    pub query: String,
    pub documents: Vec<String>,
    /// Keep only the best `top_n` results. Zero means no limit.
    #[serde(default)]
    pub top_n: Option<i64>,
    #[serde(default)]
    pub return_documents: bool,
    /// Accepted for API compatibility; documents are scored whole.
    #[serde(default = "default_max_chunks_per_doc")]
    pub max_chunks_per_doc: i64,
    /// Accepted for API compatibility; documents are scored whole.
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: i64,
}

#[derive(Debug, Serialize)]
pub struct RerankResponse {
    pub id: String,
    pub results: Vec<RerankResult>,
    pub tokens: RerankTokens,
}

#[derive(Debug, Serialize)]
pub struct RerankResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<RerankDocument>,
    pub index: usize,
    pub relevance_score: f32,
}

#[derive(Debug, Serialize)]
pub struct RerankDocument {
    pub text: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RerankTokens {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl RerankRequest {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Model name cannot be empty".to_string(),
            ));
        }
        if self.query.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Query cannot be empty".to_string(),
            ));
        }
        if self.documents.is_empty() {
            return Err(AppError::ValidationError(
                "Documents list cannot be empty".to_string(),
            ));
        }
        if self.documents.iter().all(|doc| doc.trim().is_empty()) {
            return Err(AppError::ValidationError(
                "Documents cannot all be empty".to_string(),
            ));
        }
        if matches!(self.top_n, Some(n) if n < 0) {
            return Err(AppError::ValidationError(
                "top_n cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// POST /v1/rerank - Rerank documents by relevance to query.
///
/// # Flow
/// 1. Validate input
/// 2. Resolve the reranking model through the cache
/// 3. Score (query, document) pairs on the blocking pool with sigmoid normalization
/// 4. Stable sort by score descending, apply `top_n`
pub async fn rerank_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<RerankRequest>,
) -> Result<Json<RerankResponse>> {
    request.validate()?;

    let start = std::time::Instant::now();
    let reranker = state
        .models
        .get_or_load(&request.model)
        .await?
        .reranker(&request.model)?;

    let pairs: Vec<(String, String)> = request
        .documents
        .iter()
        .map(|doc| (request.query.clone(), doc.clone()))
        .collect();

    let raw = tokio::task::spawn_blocking(move || reranker.compute_score(&pairs, true))
        .await
        .map_err(|e| AppError::InferenceError(format!("Task join error: {}", e)))??;

    let scores = scores_to_vec(raw);
    if scores.len() != request.documents.len() {
        return Err(AppError::InferenceError(format!(
            "Model returned {} scores for {} documents",
            scores.len(),
            request.documents.len()
        )));
    }

    let ranked = rank_scores(scores, request.top_n);

    let mut results = Vec::with_capacity(ranked.len());
    for (index, relevance_score) in ranked {
        let document = if request.return_documents {
            let text = request.documents.get(index).ok_or_else(|| {
                AppError::InferenceError(format!(
                    "Document index {} out of range ({} documents)",
                    index,
                    request.documents.len()
                ))
            })?;
            Some(RerankDocument { text: text.clone() })
        } else {
            None
        };
        results.push(RerankResult {
            document,
            index,
            relevance_score,
        });
    }

    let input_tokens = estimate_tokens(&[request.query.as_str()])
        + estimate_tokens(&request.documents);

    tracing::debug!(
        model = %request.model,
        documents = request.documents.len(),
        top_n = ?request.top_n,
        results = results.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Rerank completed"
    );

    metrics::counter!("rerank_requests_total").increment(1);
    metrics::histogram!("rerank_batch_size").record(request.documents.len() as f64);

    Ok(Json(RerankResponse {
        id: uuid::Uuid::new_v4().to_string(),
        results,
        tokens: RerankTokens {
            input_tokens,
            output_tokens: 0,
        },
    }))
}

/// Flatten scorer output into one score per pair; a 0-d scalar becomes a single score.
pub fn scores_to_vec(scores: ArrayD<f32>) -> Vec<f32> {
    scores.iter().copied().collect()
}

/// Pair each score with its document index and sort by score descending.
///
/// The sort is stable, so equal scores keep document order. A positive
/// `top_n` truncates; zero or absent returns everything.
pub fn rank_scores(scores: Vec<f32>, top_n: Option<i64>) -> Vec<(usize, f32)> {
    // NaN scores rank last so the comparator stays a total order
    let mut ranked: Vec<(usize, f32)> = scores
        .into_iter()
        .map(|s| if s.is_nan() { f32::NEG_INFINITY } else { s })
        .enumerate()
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    if let Some(n) = top_n.filter(|&n| n > 0) {
        ranked.truncate(n as usize);
    }
    ranked
}
