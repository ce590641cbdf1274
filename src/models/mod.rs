//! Model resolution: hub download, on-disk pointers, and the in-memory cache.

pub mod cache;
pub mod hub;
pub mod kind;
pub mod loader;
pub mod pointer;

pub use cache::ModelCache;
pub use hub::{HfHub, ModelHub};
pub use kind::{ModelClassifier, ModelKind, SubstringClassifier};
pub use loader::{ModelFactory, OnnxModelFactory};
pub use pointer::PointerFile;

use crate::error::{AppError, Result};
use crate::inference::{Embedder, Reranker};
use std::sync::Arc;

/// A model handle ready for inference.
#[derive(Clone)]
pub enum LoadedModel {
    Embedding(Arc<dyn Embedder>),
    Reranking(Arc<dyn Reranker>),
}

impl LoadedModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            LoadedModel::Embedding(_) => ModelKind::Embedding,
            LoadedModel::Reranking(_) => ModelKind::Reranking,
        }
    }

    pub fn embedder(&self, model_id: &str) -> Result<Arc<dyn Embedder>> {
        match self {
            LoadedModel::Embedding(model) => Ok(Arc::clone(model)),
            LoadedModel::Reranking(_) => Err(AppError::InferenceError(format!(
                "model '{}' is a reranking model and cannot produce embeddings",
                model_id
            ))),
        }
    }

    pub fn reranker(&self, model_id: &str) -> Result<Arc<dyn Reranker>> {
        match self {
            LoadedModel::Reranking(model) => Ok(Arc::clone(model)),
            LoadedModel::Embedding(_) => Err(AppError::InferenceError(format!(
                "model '{}' is an embedding model and cannot score document pairs",
                model_id
            ))),
        }
    }
}
