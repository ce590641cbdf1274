pub mod embedder;
pub mod reranker;
pub mod session;
pub mod tokenize;

pub use embedder::OnnxEmbedder;
pub use reranker::CrossEncoder;
pub use session::SessionPool;
pub use tokenize::TokenizerWrapper;

use crate::error::Result;
use ndarray::ArrayD;

/// A model that maps texts to embedding vectors.
///
/// Implementations may return a (batch, dim) matrix or, for a single input,
/// a bare 1-D vector; callers normalize the shape.
pub trait Embedder: Send + Sync {
    fn encode(&self, texts: &[String]) -> Result<ArrayD<f32>>;
}

/// A model that scores (query, document) pairs.
///
/// The result may be a 0-d scalar for a single pair or a 1-D/2-D array with
/// one score per pair. With `normalize` the scores are mapped into (0, 1).
pub trait Reranker: Send + Sync {
    fn compute_score(&self, pairs: &[(String, String)], normalize: bool) -> Result<ArrayD<f32>>;
}
