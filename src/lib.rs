//! Embedding API - text embedding and reranking over lazily downloaded models
//!
//! This library exposes the core components of the service, enabling
//! integration tests and embedding the router in other applications.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod inference;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;
pub mod tokens;

// Re-export key types for convenience
pub use config::{Config, ConfigInfo};
pub use error::{AppError, Result};
pub use handlers::{embeddings_handler, health_handler, rerank_handler};
pub use inference::{Embedder, Reranker};
pub use models::{LoadedModel, ModelCache, ModelFactory, ModelHub, ModelKind};
pub use routes::router;
pub use state::AppState;
