//! Model download through the HuggingFace Hub.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use hf_hub::api::tokio::{ApiBuilder, ApiRepo};
use std::path::{Path, PathBuf};

/// Source of model artifacts.
///
/// `fetch` must be safe to repeat: fetching an already-downloaded model
/// returns the existing directory.
#[async_trait]
pub trait ModelHub: Send + Sync {
    /// Download `model_id` under `cache_dir` and return the directory holding its files.
    async fn fetch(&self, model_id: &str, cache_dir: &Path) -> anyhow::Result<PathBuf>;
}

/// Half-precision ONNX exports, tried first when fp16 is preferred.
pub const FP16_WEIGHT_FILES: &[&str] = &["onnx/model_fp16.onnx", "model_fp16.onnx"];

/// Full-precision ONNX exports.
pub const WEIGHT_FILES: &[&str] = &["onnx/model.onnx", "model.onnx"];

/// Files some models need that are not present in every repository.
const OPTIONAL_FILES: &[&str] = &[
    "config.json",
    "tokenizer_config.json",
    "special_tokens_map.json",
];

/// Downloads the tokenizer, architecture config and one ONNX weight file.
pub struct HfHub {
    prefer_fp16: bool,
}

impl HfHub {
    pub fn new(prefer_fp16: bool) -> Self {
        Self { prefer_fp16 }
    }

    fn weight_candidates(&self) -> Vec<&'static str> {
        if self.prefer_fp16 {
            FP16_WEIGHT_FILES.iter().chain(WEIGHT_FILES).copied().collect()
        } else {
            WEIGHT_FILES.to_vec()
        }
    }

    async fn fetch_weights(&self, repo: &ApiRepo, model_id: &str) -> anyhow::Result<PathBuf> {
        for file in self.weight_candidates() {
            match repo.get(file).await {
                Ok(path) => {
                    tracing::debug!(model_id = %model_id, file = %file, "Downloaded weight file");
                    return Ok(path);
                }
                Err(e) => {
                    tracing::debug!(model_id = %model_id, file = %file, error = %e, "Weight file unavailable");
                }
            }
        }
        Err(anyhow!(
            "no ONNX weights found for {} (tried {:?})",
            model_id,
            self.weight_candidates()
        ))
    }
}

#[async_trait]
impl ModelHub for HfHub {
    async fn fetch(&self, model_id: &str, cache_dir: &Path) -> anyhow::Result<PathBuf> {
        tracing::info!(
            model_id = %model_id,
            cache_dir = %cache_dir.display(),
            "Starting model download via hf-hub"
        );

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.to_path_buf())
            .with_progress(false)
            .build()
            .context("Failed to create HF API client")?;
        let repo = api.model(model_id.to_string());

        let tokenizer_path = repo
            .get("tokenizer.json")
            .await
            .with_context(|| format!("Failed to download tokenizer.json for {}", model_id))?;

        self.fetch_weights(&repo, model_id).await?;

        for file in OPTIONAL_FILES {
            if repo.get(file).await.is_ok() {
                tracing::debug!(model_id = %model_id, file = %file, "Downloaded optional file");
            }
        }

        // The snapshot directory is the parent of tokenizer.json
        let snapshot = tokenizer_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("Model downloaded but snapshot path not found for {}", model_id))?;

        tracing::info!(model_id = %model_id, path = %snapshot.display(), "Model download complete");
        Ok(snapshot)
    }
}
