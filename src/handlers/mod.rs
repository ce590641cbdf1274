pub mod embeddings;
pub mod health;
pub mod rerank;

pub use embeddings::embeddings_handler;
pub use health::{config_handler, health_handler, models_handler, root_handler};
pub use rerank::rerank_handler;
