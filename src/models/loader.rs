use crate::config::{Config, Pooling};
use crate::error::{AppError, Result};
use crate::inference::{CrossEncoder, OnnxEmbedder, SessionPool, TokenizerWrapper};
use crate::models::hub::{FP16_WEIGHT_FILES, WEIGHT_FILES};
use crate::models::{LoadedModel, ModelKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builds an inference-ready model from a directory of downloaded artifacts.
///
/// Called on the blocking pool; implementations may do heavy I/O and CPU work.
pub trait ModelFactory: Send + Sync {
    fn create(&self, kind: ModelKind, model_dir: &Path, use_fp16: bool) -> Result<LoadedModel>;
}

/// The parts of a HuggingFace `config.json` we care about.
#[derive(Debug, Default, Deserialize)]
struct ArchitectureConfig {
    #[serde(default)]
    model_type: String,
}

impl ArchitectureConfig {
    fn read(model_dir: &Path) -> Self {
        let path = model_dir.join("config.json");
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// RoBERTa-family exports (including XLM-RoBERTa rerankers) take no token_type_ids.
    fn uses_token_types(&self) -> bool {
        !self.model_type.to_lowercase().contains("roberta")
    }
}

/// Pick the ONNX weight file inside `model_dir`, preferring fp16 when asked.
pub fn resolve_weights(model_dir: &Path, use_fp16: bool) -> Option<PathBuf> {
    let fp16: &[&str] = if use_fp16 { FP16_WEIGHT_FILES } else { &[] };
    fp16.iter()
        .chain(WEIGHT_FILES)
        .map(|f| model_dir.join(f))
        .find(|p| p.is_file())
}

/// ONNX Runtime backed models.
pub struct OnnxModelFactory {
    max_sequence_length: usize,
    batch_size: usize,
    intra_threads: usize,
    pool_size: usize,
    pooling: Pooling,
}

impl OnnxModelFactory {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_sequence_length: config.max_sequence_length,
            batch_size: config.batch_size,
            intra_threads: config.intra_threads,
            pool_size: config.effective_pool_size(),
            pooling: config.pooling,
        }
    }
}

impl ModelFactory for OnnxModelFactory {
    fn create(&self, kind: ModelKind, model_dir: &Path, use_fp16: bool) -> Result<LoadedModel> {
        let weights = resolve_weights(model_dir, use_fp16).ok_or_else(|| {
            AppError::ModelInitError(format!(
                "No ONNX weights found in {}",
                model_dir.display()
            ))
        })?;
        let arch = ArchitectureConfig::read(model_dir);
        let with_token_types = arch.uses_token_types();

        let tokenizer =
            TokenizerWrapper::load(&model_dir.join("tokenizer.json"), self.max_sequence_length)?;
        let pool = SessionPool::load(&weights, self.pool_size, self.intra_threads)?;

        tracing::info!(
            kind = ?kind,
            weights = %weights.display(),
            model_type = %arch.model_type,
            with_token_types,
            "Model instantiated"
        );

        Ok(match kind {
            ModelKind::Embedding => LoadedModel::Embedding(Arc::new(OnnxEmbedder::new(
                pool,
                tokenizer,
                self.pooling,
                self.batch_size,
                with_token_types,
            ))),
            ModelKind::Reranking => LoadedModel::Reranking(Arc::new(CrossEncoder::new(
                pool,
                tokenizer,
                self.batch_size,
                with_token_types,
            ))),
        })
    }
}
